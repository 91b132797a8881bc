use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveValue, Condition, DatabaseTransaction, QueryFilter, QuerySelect, SqlErr, prelude::*,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    Confidence, CreateTransactionCmd, Currency, Detection, DetectionInput, EngineError,
    Instrument, InstrumentRef, KeyField, Money, OwnedInstruments, PrincipalSource, ResultEngine,
    StateContext, StateMachine, SuspicionInput, SuspicionReport, Transaction, TransactionKind,
    TransactionState, TransferLeg, detect_category_from_description, detect_suspicious_activity,
    detect_transaction_type,
    idempotency::{create_idempotency_key, leg_key},
    principal::require_principal,
    redact::redacted,
    transaction_metadata, transactions,
    util::normalize_optional_text,
};

use super::super::{
    Engine,
    balances::Direction,
    instruments::{load_instrument, owned_instruments},
    with_tx,
};
use super::find_by_idempotency_key;

const OPERATION: &str = "create_transaction";

/// Rows of a validated request, ready to be written.
struct Draft {
    rows: Vec<Transaction>,
    primary_key: String,
    report: SuspicionReport,
}

enum Plan {
    /// Same request seen before; nothing to write.
    Replay(Transaction),
    Write(Draft),
}

impl Engine {
    /// Records a money movement and books its balance effect.
    ///
    /// The kind and category are detected when not given. Own-account
    /// transfers produce two rows (outflow and inflow legs); the returned row
    /// is the outflow leg, or the only row. Replaying an identical request
    /// returns the stored row without writing anything.
    pub async fn create_transaction(
        &self,
        session: &dyn PrincipalSource,
        cmd: CreateTransactionCmd,
    ) -> ResultEngine<Transaction> {
        let user_id = require_principal(session)?;
        tracing::info!(user_id = %user_id, command = %redacted(&cmd), "create transaction");

        cmd.amount.ensure_transaction_amount(cmd.currency)?;
        if cmd.source.is_some() && cmd.source == cmd.target {
            return Err(EngineError::InvalidInput(
                "source and target must differ".to_string(),
            ));
        }

        let plan = with_tx!(self, |db_tx| {
            self.plan_transaction(&db_tx, &user_id, &cmd).await
        })?;
        let draft = match plan {
            Plan::Replay(existing) => {
                tracing::debug!(
                    user_id = %user_id,
                    transaction_id = %existing.id,
                    "idempotent replay, returning stored transaction"
                );
                return Ok(existing);
            }
            Plan::Write(draft) => draft,
        };

        let written = with_tx!(self, |db_tx| {
            self.write_transaction(&db_tx, &draft).await
        });
        match written {
            Ok(primary) => {
                tracing::info!(
                    user_id = %user_id,
                    transaction_id = %primary.id,
                    kind = primary.kind.as_str(),
                    rows = draft.rows.len(),
                    "transaction created"
                );
                Ok(primary)
            }
            // A concurrent request with the same key committed first.
            Err(EngineError::Database(err)) if is_unique_violation(&err) => {
                let existing = with_tx!(self, |db_tx| {
                    find_by_idempotency_key(&db_tx, &user_id, &draft.primary_key).await
                })?;
                tracing::debug!(user_id = %user_id, "lost idempotent insert race");
                existing.ok_or(EngineError::Database(err))
            }
            Err(err) => Err(err),
        }
    }

    async fn plan_transaction(
        &self,
        db_tx: &DatabaseTransaction,
        user_id: &str,
        cmd: &CreateTransactionCmd,
    ) -> ResultEngine<Plan> {
        let owned = owned_instruments(db_tx, user_id).await?;
        let description = normalize_optional_text(cmd.description.as_deref());
        let contact_id = normalize_optional_text(cmd.contact_id.as_deref());

        let detection = match cmd.kind {
            Some(kind) => Detection::for_kind(kind, Confidence::High),
            None => detect_transaction_type(&DetectionInput {
                source: cmd.source,
                target: cmd.target,
                contact_id: contact_id.as_deref(),
                payment_method: cmd.payment_method,
                amount: cmd.amount.amount(),
                description: description.as_deref(),
                owned: &owned,
            }),
        };
        let kind = detection.kind;
        let category = cmd
            .category
            .or_else(|| {
                description
                    .as_deref()
                    .and_then(detect_category_from_description)
            })
            .unwrap_or_default();

        let (source, target) = normalize_routing(kind, cmd.source, cmd.target);
        validate_routing(kind, source, target, contact_id.as_deref(), &owned)?;

        // Targets outside the caller's instruments are never read.
        let owned_target = target.filter(|t| owned.contains(t));
        let (source_instrument, target_instrument) = tokio::try_join!(
            maybe_load(db_tx, user_id, source),
            maybe_load(db_tx, user_id, owned_target),
        )?;
        for instrument in [source_instrument, target_instrument].into_iter().flatten() {
            ensure_same_currency(&instrument, cmd.currency)?;
        }

        let base_key = create_idempotency_key(
            OPERATION,
            user_id,
            [
                KeyField::from(kind.as_str()),
                KeyField::from(cmd.amount.amount()),
                KeyField::from(cmd.currency.code()),
                KeyField::from(source.map(|r| r.to_string())),
                KeyField::from(target.map(|r| r.to_string())),
                KeyField::from(contact_id.clone()),
                KeyField::from(category.as_str()),
                KeyField::from(cmd.payment_method.map(|m| m.as_str())),
                KeyField::from(description.clone()),
                KeyField::from(cmd.occurred_at.to_rfc3339()),
            ],
            cmd.idempotency_key.as_deref().map(str::trim),
        );
        let primary_key = match kind {
            TransactionKind::TransferOwnAccounts => leg_key(&base_key, TransferLeg::Outflow),
            _ => base_key.clone(),
        };
        if let Some(existing) = find_by_idempotency_key(db_tx, user_id, &primary_key).await? {
            return Ok(Plan::Replay(existing));
        }

        let now = Utc::now();
        let report = self
            .suspicion_report(db_tx, user_id, cmd.currency, cmd.amount, now)
            .await?;

        let mut context = StateContext::new();
        context.insert("created_at".to_string(), json!(now.to_rfc3339()));
        let machine = StateMachine::with_state(TransactionState::Draft, context);

        let base = Transaction {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            kind,
            category,
            amount: cmd.amount,
            currency: cmd.currency,
            description,
            payment_method: cmd.payment_method,
            source,
            target,
            contact_id,
            transfer_leg: None,
            transfer_group_id: None,
            state: machine.state(),
            state_context: machine.context(),
            idempotency_key: base_key.clone(),
            is_transfer_between_own_accounts: detection.is_transfer_between_own_accounts,
            is_transfer_to_third_party: detection.is_transfer_to_third_party,
            is_cash_withdrawal: detection.is_cash_withdrawal,
            is_cash_deposit: detection.is_cash_deposit,
            occurred_at: cmd.occurred_at,
            created_at: now,
            updated_at: now,
        };

        Ok(Plan::Write(Draft {
            rows: split_rows(base, &base_key),
            primary_key,
            report,
        }))
    }

    async fn write_transaction(
        &self,
        db_tx: &DatabaseTransaction,
        draft: &Draft,
    ) -> ResultEngine<Transaction> {
        let flag_reason = draft.report.flag_reason();
        for row in &draft.rows {
            transactions::ActiveModel::from(row).insert(db_tx).await?;
            transaction_metadata::ActiveModel {
                transaction_id: ActiveValue::Set(row.id.to_string()),
                user_id: ActiveValue::Set(row.user_id.clone()),
                is_flagged: ActiveValue::Set(draft.report.is_suspicious),
                flag_reason: ActiveValue::Set(flag_reason.clone()),
                flagged_at: ActiveValue::Set(draft.report.is_suspicious.then_some(row.created_at)),
                reviewed_at: ActiveValue::Set(None),
                created_at: ActiveValue::Set(row.created_at),
            }
            .insert(db_tx)
            .await?;
            self.update_balance(db_tx, row, Direction::Apply).await?;
        }

        let primary = draft
            .rows
            .first()
            .cloned()
            .ok_or_else(|| EngineError::InvalidInput("nothing to record".to_string()))?;
        if draft.report.is_suspicious {
            tracing::warn!(
                user_id = %primary.user_id,
                transaction_id = %primary.id,
                reasons = ?draft.report.reasons,
                "suspicious transaction flagged"
            );
        }
        Ok(primary)
    }

    /// Average amount and last-day activity of the caller, in `currency`.
    ///
    /// Inflow legs are skipped so an own-account transfer counts once.
    async fn suspicion_report(
        &self,
        db_tx: &DatabaseTransaction,
        user_id: &str,
        currency: Currency,
        amount: Money,
        now: DateTime<Utc>,
    ) -> ResultEngine<SuspicionReport> {
        let not_inflow = Condition::any()
            .add(transactions::Column::TransferLeg.is_null())
            .add(transactions::Column::TransferLeg.ne(TransferLeg::Inflow.as_str()));

        let (amounts, recent) = tokio::try_join!(
            transactions::Entity::find()
                .filter(transactions::Column::UserId.eq(user_id.to_string()))
                .filter(transactions::Column::Currency.eq(currency.code()))
                .filter(not_inflow.clone())
                .select_only()
                .column(transactions::Column::Amount)
                .into_tuple::<String>()
                .all(db_tx),
            transactions::Entity::find()
                .filter(transactions::Column::UserId.eq(user_id.to_string()))
                .filter(transactions::Column::CreatedAt.gt(now - Duration::hours(24)))
                .filter(not_inflow)
                .select_only()
                .column(transactions::Column::CreatedAt)
                .into_tuple::<DateTimeUtc>()
                .all(db_tx),
        )?;

        let mut total = Decimal::ZERO;
        for stored in &amounts {
            total = total
                .checked_add(Money::from_storage(stored)?.amount())
                .ok_or_else(|| EngineError::InvalidAmount("history total overflow".to_string()))?;
        }
        let average = if amounts.is_empty() {
            Decimal::ZERO
        } else {
            total
                .checked_div(Decimal::from(amounts.len()))
                .unwrap_or(Decimal::ZERO)
        };

        Ok(detect_suspicious_activity(
            &SuspicionInput {
                amount: amount.amount(),
                user_average_amount: average,
                recent_transactions: &recent,
                now,
            },
            &self.config.suspicion,
        ))
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

async fn maybe_load(
    db_tx: &DatabaseTransaction,
    user_id: &str,
    reference: Option<InstrumentRef>,
) -> ResultEngine<Option<Instrument>> {
    match reference {
        Some(reference) => load_instrument(db_tx, user_id, reference).await.map(Some),
        None => Ok(None),
    }
}

fn ensure_same_currency(instrument: &Instrument, currency: Currency) -> ResultEngine<()> {
    if instrument.currency != currency {
        return Err(EngineError::CurrencyMismatch(format!(
            "{} holds {}, transaction is in {currency}",
            instrument.reference, instrument.currency
        )));
    }
    Ok(())
}

/// Income and deposits name the receiving instrument; callers often pass it
/// as the only instrument, on the source side.
fn normalize_routing(
    kind: TransactionKind,
    source: Option<InstrumentRef>,
    target: Option<InstrumentRef>,
) -> (Option<InstrumentRef>, Option<InstrumentRef>) {
    match (kind, source, target) {
        (TransactionKind::Income | TransactionKind::Deposit, Some(source), None) => {
            (None, Some(source))
        }
        _ => (source, target),
    }
}

fn validate_routing(
    kind: TransactionKind,
    source: Option<InstrumentRef>,
    target: Option<InstrumentRef>,
    contact_id: Option<&str>,
    owned: &OwnedInstruments,
) -> ResultEngine<()> {
    let require_owned = |reference: Option<InstrumentRef>, side: &str| -> ResultEngine<()> {
        let reference = reference.ok_or_else(|| {
            EngineError::InvalidInput(format!("{} requires a {side} instrument", kind.as_str()))
        })?;
        if !owned.contains(&reference) {
            return Err(EngineError::KeyNotFound(format!(
                "{} not exists",
                reference.kind().as_str()
            )));
        }
        Ok(())
    };
    let forbid = |reference: Option<InstrumentRef>, side: &str| -> ResultEngine<()> {
        match reference {
            Some(_) => Err(EngineError::InvalidInput(format!(
                "{} must not have a {side} instrument",
                kind.as_str()
            ))),
            None => Ok(()),
        }
    };

    match kind {
        TransactionKind::Expense | TransactionKind::Withdrawal => {
            require_owned(source, "source")?;
            forbid(target, "target")
        }
        TransactionKind::Income | TransactionKind::Deposit => {
            forbid(source, "source")?;
            require_owned(target, "target")
        }
        TransactionKind::TransferOwnAccounts => {
            require_owned(source, "source")?;
            require_owned(target, "target")
        }
        TransactionKind::TransferThirdParty => {
            require_owned(source, "source")?;
            match target {
                Some(target) if owned.contains(&target) => Err(EngineError::InvalidInput(
                    "third-party transfer targets one of your own instruments".to_string(),
                )),
                None if contact_id.is_none() => Err(EngineError::InvalidInput(
                    "transfer_third_party requires a target instrument or a contact".to_string(),
                )),
                _ => Ok(()),
            }
        }
    }
}

fn split_rows(base: Transaction, base_key: &str) -> Vec<Transaction> {
    match base.kind {
        TransactionKind::TransferOwnAccounts => {
            let group = Some(Uuid::new_v4());
            let outflow = Transaction {
                transfer_leg: Some(TransferLeg::Outflow),
                transfer_group_id: group,
                idempotency_key: leg_key(base_key, TransferLeg::Outflow),
                ..base.clone()
            };
            let inflow = Transaction {
                id: Uuid::new_v4(),
                transfer_leg: Some(TransferLeg::Inflow),
                transfer_group_id: group,
                idempotency_key: leg_key(base_key, TransferLeg::Inflow),
                ..base
            };
            vec![outflow, inflow]
        }
        TransactionKind::TransferThirdParty => vec![Transaction {
            transfer_leg: Some(TransferLeg::Outflow),
            ..base
        }],
        _ => vec![base],
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn owned(account: Uuid, wallet: Uuid) -> OwnedInstruments {
        OwnedInstruments {
            accounts: HashSet::from([account]),
            wallets: HashSet::from([wallet]),
            ..OwnedInstruments::default()
        }
    }

    #[test]
    fn income_given_on_the_source_side_moves_to_the_target() {
        let account = InstrumentRef::Account(Uuid::new_v4());
        assert_eq!(
            normalize_routing(TransactionKind::Income, Some(account), None),
            (None, Some(account))
        );
        assert_eq!(
            normalize_routing(TransactionKind::Expense, Some(account), None),
            (Some(account), None)
        );
    }

    #[test]
    fn routing_rules_per_kind() {
        let (a, w) = (Uuid::new_v4(), Uuid::new_v4());
        let owned = owned(a, w);
        let account = Some(InstrumentRef::Account(a));
        let wallet = Some(InstrumentRef::Wallet(w));
        let foreign = Some(InstrumentRef::Account(Uuid::new_v4()));

        assert!(validate_routing(TransactionKind::Expense, account, None, None, &owned).is_ok());
        assert!(
            validate_routing(TransactionKind::Expense, account, wallet, None, &owned).is_err()
        );
        assert!(matches!(
            validate_routing(TransactionKind::Expense, foreign, None, None, &owned),
            Err(EngineError::KeyNotFound(_))
        ));
        assert!(
            validate_routing(TransactionKind::TransferOwnAccounts, account, wallet, None, &owned)
                .is_ok()
        );
        assert!(
            validate_routing(TransactionKind::TransferThirdParty, account, foreign, None, &owned)
                .is_ok()
        );
        assert!(
            validate_routing(TransactionKind::TransferThirdParty, account, wallet, None, &owned)
                .is_err()
        );
        assert!(
            validate_routing(TransactionKind::TransferThirdParty, account, None, None, &owned)
                .is_err()
        );
        assert!(
            validate_routing(
                TransactionKind::TransferThirdParty,
                account,
                None,
                Some("contact-1"),
                &owned
            )
            .is_ok()
        );
        assert!(validate_routing(TransactionKind::Income, None, None, None, &owned).is_err());
    }
}
