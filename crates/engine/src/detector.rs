//! Heuristics run at creation time: what kind of movement a request is, and
//! whether it looks suspicious.
//!
//! Everything here is pure. Storage lookups (owned instruments, history) are
//! done by the caller and passed in.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    InstrumentRef, PaymentMethod, TransactionKind, config::SuspicionConfig, util::fold_text,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Ids of every instrument the principal owns, per kind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OwnedInstruments {
    pub accounts: HashSet<Uuid>,
    pub bank_accounts: HashSet<Uuid>,
    pub wallets: HashSet<Uuid>,
}

impl OwnedInstruments {
    pub fn contains(&self, reference: &InstrumentRef) -> bool {
        match reference {
            InstrumentRef::Account(id) => self.accounts.contains(id),
            InstrumentRef::BankAccount(id) => self.bank_accounts.contains(id),
            InstrumentRef::Wallet(id) => self.wallets.contains(id),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DetectionInput<'a> {
    pub source: Option<InstrumentRef>,
    pub target: Option<InstrumentRef>,
    pub contact_id: Option<&'a str>,
    pub payment_method: Option<PaymentMethod>,
    pub amount: Decimal,
    pub description: Option<&'a str>,
    pub owned: &'a OwnedInstruments,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub kind: TransactionKind,
    pub is_transfer_between_own_accounts: bool,
    pub is_transfer_to_third_party: bool,
    pub is_cash_withdrawal: bool,
    pub is_cash_deposit: bool,
    pub confidence: Confidence,
}

impl Detection {
    /// Detection for a kind chosen by the caller; flags follow the kind.
    pub fn for_kind(kind: TransactionKind, confidence: Confidence) -> Self {
        Self {
            kind,
            is_transfer_between_own_accounts: kind == TransactionKind::TransferOwnAccounts,
            is_transfer_to_third_party: kind == TransactionKind::TransferThirdParty,
            is_cash_withdrawal: kind == TransactionKind::Withdrawal,
            is_cash_deposit: kind == TransactionKind::Deposit,
            confidence,
        }
    }
}

const TRANSFER_KEYWORDS: &[&str] = &["transferencia", "transfer", "transf", "envio"];

const INCOME_KEYWORDS: &[&str] = &[
    "sueldo",
    "salario",
    "salary",
    "bonus",
    "bono",
    "aguinaldo",
    "ingreso",
    "income",
    "cobro",
    "honorarios",
    "freelance",
];

fn mentions_any(description: Option<&str>, keywords: &[&str]) -> bool {
    let Some(description) = description else {
        return false;
    };
    let haystack = format!(" {} ", fold_text(description));
    keywords
        .iter()
        .any(|keyword| haystack.contains(&format!(" {keyword} ")))
}

/// Classifies a request. Rules are tried in a fixed order and the first match
/// wins.
pub fn detect_transaction_type(input: &DetectionInput<'_>) -> Detection {
    let source_owned = input.source.is_some_and(|s| input.owned.contains(&s));
    let target_owned = input.target.is_some_and(|t| input.owned.contains(&t));
    let has_source = input.source.is_some();
    let has_target = input.target.is_some();
    let cash = input.payment_method == Some(PaymentMethod::Cash);

    let (kind, confidence) = if source_owned && target_owned {
        (TransactionKind::TransferOwnAccounts, Confidence::High)
    } else if cash && has_source && !has_target {
        (TransactionKind::Withdrawal, Confidence::High)
    } else if cash && has_target && !has_source {
        (TransactionKind::Deposit, Confidence::High)
    } else if (source_owned && has_target && !target_owned)
        || (has_source && has_target && mentions_any(input.description, TRANSFER_KEYWORDS))
    {
        (TransactionKind::TransferThirdParty, Confidence::High)
    } else if mentions_any(input.description, INCOME_KEYWORDS) {
        (TransactionKind::Income, Confidence::High)
    } else if has_source && !has_target {
        (TransactionKind::Expense, Confidence::Medium)
    } else if !has_source && input.amount > Decimal::ZERO {
        (TransactionKind::Income, Confidence::Medium)
    } else {
        (TransactionKind::Expense, Confidence::Low)
    };

    Detection::for_kind(kind, confidence)
}

#[derive(Clone, Copy, Debug)]
pub struct SuspicionInput<'a> {
    pub amount: Decimal,
    /// Average amount of the principal's previous transactions; zero when
    /// there is no history.
    pub user_average_amount: Decimal,
    /// Creation timestamps of the principal's recent transactions.
    pub recent_transactions: &'a [DateTime<Utc>],
    pub now: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspicionReport {
    pub is_suspicious: bool,
    pub reasons: Vec<String>,
}

impl SuspicionReport {
    pub fn flag_reason(&self) -> Option<String> {
        self.is_suspicious.then(|| self.reasons.join("; "))
    }
}

pub fn detect_suspicious_activity(
    input: &SuspicionInput<'_>,
    config: &SuspicionConfig,
) -> SuspicionReport {
    let mut reasons = Vec::new();

    let multiplier = Decimal::from(config.amount_multiplier);
    if !input.user_average_amount.is_zero()
        && input.amount.abs() > input.user_average_amount.abs() * multiplier
    {
        reasons.push(format!(
            "amount {} exceeds {}x the average of {}",
            input.amount.normalize(),
            config.amount_multiplier,
            input.user_average_amount.round_dp(2).normalize()
        ));
    }

    let window_start = input.now - Duration::hours(24);
    let last_day = input
        .recent_transactions
        .iter()
        .filter(|at| **at > window_start)
        .count();
    if last_day > config.max_daily_transactions {
        reasons.push(format!(
            "{last_day} transactions in the last 24 hours (limit {})",
            config.max_daily_transactions
        ));
    }

    SuspicionReport {
        is_suspicious: !reasons.is_empty(),
        reasons,
    }
}
