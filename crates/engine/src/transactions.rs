//! Transaction primitives.
//!
//! A `Transaction` is one row of the ledger. Own-account transfers are split
//! into two rows (an outflow leg and an inflow leg) sharing a
//! `transfer_group_id`; every other kind is a single row.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Category, Currency, EngineError, InstrumentRef, Money, ResultEngine,
    state_machine::{StateContext, StateMachine, TransactionState},
    util::parse_uuid,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Expense,
    Income,
    TransferOwnAccounts,
    TransferThirdParty,
    Withdrawal,
    Deposit,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
            Self::TransferOwnAccounts => "transfer_own_accounts",
            Self::TransferThirdParty => "transfer_third_party",
            Self::Withdrawal => "withdrawal",
            Self::Deposit => "deposit",
        }
    }
}

impl TryFrom<&str> for TransactionKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "expense" => Ok(Self::Expense),
            "income" => Ok(Self::Income),
            "transfer_own_accounts" => Ok(Self::TransferOwnAccounts),
            "transfer_third_party" => Ok(Self::TransferThirdParty),
            "withdrawal" => Ok(Self::Withdrawal),
            "deposit" => Ok(Self::Deposit),
            other => Err(EngineError::InvalidInput(format!(
                "invalid transaction kind: {other}"
            ))),
        }
    }
}

/// Which half of a split transfer a row is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferLeg {
    Outflow,
    Inflow,
}

impl TransferLeg {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Outflow => "outflow",
            Self::Inflow => "inflow",
        }
    }
}

impl TryFrom<&str> for TransferLeg {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "outflow" => Ok(Self::Outflow),
            "inflow" => Ok(Self::Inflow),
            other => Err(EngineError::InvalidInput(format!(
                "invalid transfer leg: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    DebitCard,
    CreditCard,
    BankTransfer,
    DigitalWallet,
    Other,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::DebitCard => "debit_card",
            Self::CreditCard => "credit_card",
            Self::BankTransfer => "bank_transfer",
            Self::DigitalWallet => "digital_wallet",
            Self::Other => "other",
        }
    }
}

impl TryFrom<&str> for PaymentMethod {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cash" => Ok(Self::Cash),
            "debit_card" => Ok(Self::DebitCard),
            "credit_card" => Ok(Self::CreditCard),
            "bank_transfer" => Ok(Self::BankTransfer),
            "digital_wallet" => Ok(Self::DigitalWallet),
            "other" => Ok(Self::Other),
            other => Err(EngineError::InvalidInput(format!(
                "invalid payment method: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: String,
    pub kind: TransactionKind,
    pub category: Category,
    pub amount: Money,
    pub currency: Currency,
    pub description: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub source: Option<InstrumentRef>,
    pub target: Option<InstrumentRef>,
    pub contact_id: Option<String>,
    pub transfer_leg: Option<TransferLeg>,
    pub transfer_group_id: Option<Uuid>,
    pub state: TransactionState,
    /// Transition timestamps and annotations.
    pub state_context: StateContext,
    pub idempotency_key: String,
    pub is_transfer_between_own_accounts: bool,
    pub is_transfer_to_third_party: bool,
    pub is_cash_withdrawal: bool,
    pub is_cash_deposit: bool,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Rehydrates the lifecycle machine of this row.
    pub fn state_machine(&self) -> StateMachine {
        StateMachine::with_state(self.state, self.state_context.clone())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub category: String,
    pub amount: String,
    pub currency: String,
    pub description: Option<String>,
    pub payment_method: Option<String>,
    pub from_account_id: Option<String>,
    pub from_bank_account_id: Option<String>,
    pub from_wallet_id: Option<String>,
    pub to_account_id: Option<String>,
    pub to_bank_account_id: Option<String>,
    pub to_wallet_id: Option<String>,
    pub contact_id: Option<String>,
    pub transfer_leg: Option<String>,
    pub transfer_group_id: Option<String>,
    pub state: String,
    /// Serialized state-machine context.
    pub state_machine: String,
    pub idempotency_key: String,
    pub is_transfer_between_own_accounts: bool,
    pub is_transfer_to_third_party: bool,
    pub is_cash_withdrawal: bool,
    pub is_cash_deposit: bool,
    pub occurred_at: DateTimeUtc,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::transaction_metadata::Entity")]
    Metadata,
}

impl Related<super::transaction_metadata::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Metadata.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Transaction> for ActiveModel {
    fn from(tx: &Transaction) -> Self {
        let (from_account_id, from_bank_account_id, from_wallet_id) =
            InstrumentRef::columns(tx.source);
        let (to_account_id, to_bank_account_id, to_wallet_id) = InstrumentRef::columns(tx.target);
        Self {
            id: ActiveValue::Set(tx.id.to_string()),
            user_id: ActiveValue::Set(tx.user_id.clone()),
            kind: ActiveValue::Set(tx.kind.as_str().to_string()),
            category: ActiveValue::Set(tx.category.as_str().to_string()),
            amount: ActiveValue::Set(tx.amount.to_storage()),
            currency: ActiveValue::Set(tx.currency.code().to_string()),
            description: ActiveValue::Set(tx.description.clone()),
            payment_method: ActiveValue::Set(tx.payment_method.map(|m| m.as_str().to_string())),
            from_account_id: ActiveValue::Set(from_account_id),
            from_bank_account_id: ActiveValue::Set(from_bank_account_id),
            from_wallet_id: ActiveValue::Set(from_wallet_id),
            to_account_id: ActiveValue::Set(to_account_id),
            to_bank_account_id: ActiveValue::Set(to_bank_account_id),
            to_wallet_id: ActiveValue::Set(to_wallet_id),
            contact_id: ActiveValue::Set(tx.contact_id.clone()),
            transfer_leg: ActiveValue::Set(tx.transfer_leg.map(|l| l.as_str().to_string())),
            transfer_group_id: ActiveValue::Set(tx.transfer_group_id.map(|id| id.to_string())),
            state: ActiveValue::Set(tx.state.as_str().to_string()),
            state_machine: ActiveValue::Set(tx.state_machine().context_blob()),
            idempotency_key: ActiveValue::Set(tx.idempotency_key.clone()),
            is_transfer_between_own_accounts: ActiveValue::Set(
                tx.is_transfer_between_own_accounts,
            ),
            is_transfer_to_third_party: ActiveValue::Set(tx.is_transfer_to_third_party),
            is_cash_withdrawal: ActiveValue::Set(tx.is_cash_withdrawal),
            is_cash_deposit: ActiveValue::Set(tx.is_cash_deposit),
            occurred_at: ActiveValue::Set(tx.occurred_at),
            created_at: ActiveValue::Set(tx.created_at),
            updated_at: ActiveValue::Set(tx.updated_at),
        }
    }
}

impl TryFrom<Model> for Transaction {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let state = TransactionState::try_from(model.state.as_str())?;
        let machine = StateMachine::restore(state, &model.state_machine)?;
        Ok(Self {
            id: parse_uuid(&model.id, "transaction")?,
            source: InstrumentRef::from_columns(
                "source",
                model.from_account_id.as_deref(),
                model.from_bank_account_id.as_deref(),
                model.from_wallet_id.as_deref(),
            )?,
            target: InstrumentRef::from_columns(
                "target",
                model.to_account_id.as_deref(),
                model.to_bank_account_id.as_deref(),
                model.to_wallet_id.as_deref(),
            )?,
            user_id: model.user_id,
            kind: TransactionKind::try_from(model.kind.as_str())?,
            category: Category::try_from(model.category.as_str())?,
            amount: Money::from_storage(&model.amount)?,
            currency: Currency::try_from(model.currency.as_str())?,
            description: model.description,
            payment_method: model
                .payment_method
                .as_deref()
                .map(PaymentMethod::try_from)
                .transpose()?,
            contact_id: model.contact_id,
            transfer_leg: model
                .transfer_leg
                .as_deref()
                .map(TransferLeg::try_from)
                .transpose()?,
            transfer_group_id: model
                .transfer_group_id
                .as_deref()
                .map(|id| parse_uuid(id, "transfer group"))
                .transpose()?,
            state,
            state_context: machine.context(),
            idempotency_key: model.idempotency_key,
            is_transfer_between_own_accounts: model.is_transfer_between_own_accounts,
            is_transfer_to_third_party: model.is_transfer_to_third_party,
            is_cash_withdrawal: model.is_cash_withdrawal,
            is_cash_deposit: model.is_cash_deposit,
            occurred_at: model.occurred_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

pub(crate) fn models_to_transactions(models: Vec<Model>) -> ResultEngine<Vec<Transaction>> {
    models.into_iter().map(Transaction::try_from).collect()
}
