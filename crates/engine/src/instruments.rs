//! Balance-holding instruments.
//!
//! Three concrete kinds are stored in three tables (`accounts`,
//! `bank_accounts`, `digital_wallets`). Everywhere else they are addressed
//! through [`InstrumentRef`], so a transaction side can only ever point at one
//! instrument.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Currency, EngineError, Money, ResultEngine, accounts, bank_accounts, wallets};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    Account,
    BankAccount,
    Wallet,
}

impl InstrumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::BankAccount => "bank_account",
            Self::Wallet => "wallet",
        }
    }
}

impl TryFrom<&str> for InstrumentKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "account" => Ok(Self::Account),
            "bank_account" | "bank" => Ok(Self::BankAccount),
            "wallet" => Ok(Self::Wallet),
            other => Err(EngineError::InvalidInput(format!(
                "invalid instrument kind: {other}"
            ))),
        }
    }
}

/// Typed pointer to one instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum InstrumentRef {
    Account(Uuid),
    BankAccount(Uuid),
    Wallet(Uuid),
}

impl InstrumentRef {
    pub fn new(kind: InstrumentKind, id: Uuid) -> Self {
        match kind {
            InstrumentKind::Account => Self::Account(id),
            InstrumentKind::BankAccount => Self::BankAccount(id),
            InstrumentKind::Wallet => Self::Wallet(id),
        }
    }

    pub fn kind(self) -> InstrumentKind {
        match self {
            Self::Account(_) => InstrumentKind::Account,
            Self::BankAccount(_) => InstrumentKind::BankAccount,
            Self::Wallet(_) => InstrumentKind::Wallet,
        }
    }

    pub fn id(self) -> Uuid {
        match self {
            Self::Account(id) | Self::BankAccount(id) | Self::Wallet(id) => id,
        }
    }

    /// Splits into the `(account, bank_account, wallet)` column triple.
    pub(crate) fn columns(this: Option<Self>) -> (Option<String>, Option<String>, Option<String>) {
        match this {
            None => (None, None, None),
            Some(Self::Account(id)) => (Some(id.to_string()), None, None),
            Some(Self::BankAccount(id)) => (None, Some(id.to_string()), None),
            Some(Self::Wallet(id)) => (None, None, Some(id.to_string())),
        }
    }

    /// Inverse of [`InstrumentRef::columns`]; more than one populated column
    /// is rejected.
    pub(crate) fn from_columns(
        side: &str,
        account: Option<&str>,
        bank_account: Option<&str>,
        wallet: Option<&str>,
    ) -> ResultEngine<Option<Self>> {
        let populated = [
            account.map(|id| (InstrumentKind::Account, id)),
            bank_account.map(|id| (InstrumentKind::BankAccount, id)),
            wallet.map(|id| (InstrumentKind::Wallet, id)),
        ];
        let mut found = populated.into_iter().flatten();
        let Some((kind, id)) = found.next() else {
            return Ok(None);
        };
        if found.next().is_some() {
            return Err(EngineError::InvalidInput(format!(
                "{side} references more than one instrument"
            )));
        }
        let id = crate::util::parse_uuid(id, kind.as_str())?;
        Ok(Some(Self::new(kind, id)))
    }
}

impl fmt::Display for InstrumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind().as_str(), self.id())
    }
}

/// Parses `kind:uuid`, e.g. `wallet:6a8416ed-b8e6-4732-a591-bf55da9687e7`.
impl FromStr for InstrumentRef {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s.split_once(':').ok_or_else(|| {
            EngineError::InvalidInput(format!("invalid instrument reference: {s}"))
        })?;
        let kind = InstrumentKind::try_from(kind)?;
        let id = crate::util::parse_uuid(id.trim(), kind.as_str())?;
        Ok(Self::new(kind, id))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bank {
    Galicia,
    Santander,
    Bbva,
    Nacion,
    Macro,
    Hsbc,
    Icbc,
    Brubank,
    Other,
}

impl Bank {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Galicia => "galicia",
            Self::Santander => "santander",
            Self::Bbva => "bbva",
            Self::Nacion => "nacion",
            Self::Macro => "macro",
            Self::Hsbc => "hsbc",
            Self::Icbc => "icbc",
            Self::Brubank => "brubank",
            Self::Other => "other",
        }
    }
}

impl TryFrom<&str> for Bank {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "galicia" => Ok(Self::Galicia),
            "santander" => Ok(Self::Santander),
            "bbva" => Ok(Self::Bbva),
            "nacion" => Ok(Self::Nacion),
            "macro" => Ok(Self::Macro),
            "hsbc" => Ok(Self::Hsbc),
            "icbc" => Ok(Self::Icbc),
            "brubank" => Ok(Self::Brubank),
            "other" => Ok(Self::Other),
            other => Err(EngineError::InvalidInput(format!("invalid bank: {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletProvider {
    MercadoPago,
    Uala,
    NaranjaX,
    PersonalPay,
    Paypal,
    Other,
}

impl WalletProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MercadoPago => "mercado_pago",
            Self::Uala => "uala",
            Self::NaranjaX => "naranja_x",
            Self::PersonalPay => "personal_pay",
            Self::Paypal => "paypal",
            Self::Other => "other",
        }
    }
}

impl TryFrom<&str> for WalletProvider {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mercado_pago" => Ok(Self::MercadoPago),
            "uala" => Ok(Self::Uala),
            "naranja_x" => Ok(Self::NaranjaX),
            "personal_pay" => Ok(Self::PersonalPay),
            "paypal" => Ok(Self::Paypal),
            "other" => Ok(Self::Other),
            other => Err(EngineError::InvalidInput(format!(
                "invalid wallet provider: {other}"
            ))),
        }
    }
}

/// Read model of any instrument.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub reference: InstrumentRef,
    pub user_id: String,
    pub name: String,
    pub balance: Money,
    pub currency: Currency,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank: Option<Bank>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<WalletProvider>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<accounts::Model> for Instrument {
    type Error = EngineError;

    fn try_from(model: accounts::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            reference: InstrumentRef::Account(crate::util::parse_uuid(&model.id, "account")?),
            user_id: model.user_id,
            name: model.name,
            balance: Money::from_storage(&model.balance)?,
            currency: Currency::try_from(model.currency.as_str())?,
            bank: None,
            provider: None,
            updated_at: model.updated_at,
        })
    }
}

impl TryFrom<bank_accounts::Model> for Instrument {
    type Error = EngineError;

    fn try_from(model: bank_accounts::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            reference: InstrumentRef::BankAccount(crate::util::parse_uuid(
                &model.id,
                "bank_account",
            )?),
            user_id: model.user_id,
            name: model.name,
            balance: Money::from_storage(&model.balance)?,
            currency: Currency::try_from(model.currency.as_str())?,
            bank: Some(Bank::try_from(model.bank.as_str())?),
            provider: None,
            updated_at: model.updated_at,
        })
    }
}

impl TryFrom<wallets::Model> for Instrument {
    type Error = EngineError;

    fn try_from(model: wallets::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            reference: InstrumentRef::Wallet(crate::util::parse_uuid(&model.id, "wallet")?),
            user_id: model.user_id,
            name: model.name,
            balance: Money::from_storage(&model.balance)?,
            currency: Currency::try_from(model.currency.as_str())?,
            bank: None,
            provider: Some(WalletProvider::try_from(model.provider.as_str())?),
            updated_at: model.updated_at,
        })
    }
}
