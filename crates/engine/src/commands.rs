//! Command structs for engine operations.
//!
//! These types group parameters for write operations, keeping call sites
//! readable and avoiding long argument lists. They derive `Serialize` so they
//! can be logged (through [`crate::redact::redacted`]).

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    Bank, Category, Currency, InstrumentRef, Money, PaymentMethod, TransactionKind,
    WalletProvider,
};

/// Create a transaction.
///
/// `kind` and `category` are inferred from the routing and the description
/// when not given.
#[derive(Clone, Debug, Serialize)]
pub struct CreateTransactionCmd {
    pub amount: Money,
    pub currency: Currency,
    pub kind: Option<TransactionKind>,
    pub category: Option<Category>,
    pub source: Option<InstrumentRef>,
    pub target: Option<InstrumentRef>,
    pub contact_id: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub idempotency_key: Option<String>,
}

impl CreateTransactionCmd {
    #[must_use]
    pub fn new(amount: Money, currency: Currency, occurred_at: DateTime<Utc>) -> Self {
        Self {
            amount,
            currency,
            kind: None,
            category: None,
            source: None,
            target: None,
            contact_id: None,
            payment_method: None,
            description: None,
            occurred_at,
            idempotency_key: None,
        }
    }

    #[must_use]
    pub fn kind(mut self, kind: TransactionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    #[must_use]
    pub fn from(mut self, source: InstrumentRef) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn to(mut self, target: InstrumentRef) -> Self {
        self.target = Some(target);
        self
    }

    #[must_use]
    pub fn contact(mut self, contact_id: impl Into<String>) -> Self {
        self.contact_id = Some(contact_id.into());
        self
    }

    #[must_use]
    pub fn payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = Some(method);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Open a new instrument with an opening balance.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NewInstrument {
    Account {
        name: String,
        currency: Currency,
        balance: Money,
    },
    BankAccount {
        name: String,
        bank: Bank,
        currency: Currency,
        balance: Money,
    },
    Wallet {
        name: String,
        provider: WalletProvider,
        currency: Currency,
        balance: Money,
    },
}

impl NewInstrument {
    pub fn account(name: impl Into<String>, currency: Currency, balance: Money) -> Self {
        Self::Account {
            name: name.into(),
            currency,
            balance,
        }
    }

    pub fn bank_account(
        name: impl Into<String>,
        bank: Bank,
        currency: Currency,
        balance: Money,
    ) -> Self {
        Self::BankAccount {
            name: name.into(),
            bank,
            currency,
            balance,
        }
    }

    pub fn wallet(
        name: impl Into<String>,
        provider: WalletProvider,
        currency: Currency,
        balance: Money,
    ) -> Self {
        Self::Wallet {
            name: name.into(),
            provider,
            currency,
            balance,
        }
    }

    pub(crate) fn currency(&self) -> Currency {
        match self {
            Self::Account { currency, .. }
            | Self::BankAccount { currency, .. }
            | Self::Wallet { currency, .. } => *currency,
        }
    }

    pub(crate) fn balance(&self) -> Money {
        match self {
            Self::Account { balance, .. }
            | Self::BankAccount { balance, .. }
            | Self::Wallet { balance, .. } => *balance,
        }
    }
}
