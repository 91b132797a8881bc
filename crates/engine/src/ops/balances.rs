//! Balance propagation.
//!
//! Balances move only together with the ledger rows that justify them, inside
//! the same storage transaction, and every read and write is scoped to the
//! owning principal.

use sea_orm::DatabaseTransaction;

use crate::{EngineError, InstrumentRef, Money, ResultEngine, Transaction, TransferLeg};

use super::{
    Engine,
    instruments::{load_instrument, write_balance},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Direction {
    /// Book the row.
    Apply,
    /// Undo a previous `Apply` of the same row.
    Reverse,
}

/// Signed balance changes implied by one ledger row.
///
/// An outflow leg only touches the source and an inflow leg only the target;
/// a row without a leg debits the source and credits the target.
pub(crate) fn planned_deltas(
    source: Option<InstrumentRef>,
    target: Option<InstrumentRef>,
    amount: Money,
    leg: Option<TransferLeg>,
    direction: Direction,
) -> Vec<(InstrumentRef, Money)> {
    let amount = match direction {
        Direction::Apply => amount,
        Direction::Reverse => -amount,
    };
    let mut deltas = Vec::with_capacity(2);
    if leg != Some(TransferLeg::Inflow)
        && let Some(source) = source
    {
        deltas.push((source, -amount));
    }
    if leg != Some(TransferLeg::Outflow)
        && let Some(target) = target
    {
        deltas.push((target, amount));
    }
    deltas
}

impl Engine {
    /// Applies (or reverses) the balance effect of `tx` for its owner.
    pub(super) async fn update_balance(
        &self,
        db_tx: &DatabaseTransaction,
        tx: &Transaction,
        direction: Direction,
    ) -> ResultEngine<()> {
        let deltas = planned_deltas(
            tx.source,
            tx.target,
            tx.amount,
            tx.transfer_leg,
            direction,
        );
        for (reference, delta) in deltas {
            let instrument = load_instrument(db_tx, &tx.user_id, reference).await?;
            if instrument.currency != tx.currency {
                return Err(EngineError::CurrencyMismatch(format!(
                    "{reference} holds {}, transaction is in {}",
                    instrument.currency, tx.currency
                )));
            }
            let balance = instrument.balance.checked_add(delta).ok_or_else(|| {
                EngineError::InvalidAmount(format!("balance overflow on {reference}"))
            })?;
            write_balance(db_tx, &tx.user_id, reference, balance).await?;
            tracing::debug!(
                transaction_id = %tx.id,
                instrument = %reference,
                delta = %delta,
                balance = %balance,
                "balance updated"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::*;

    fn refs() -> (InstrumentRef, InstrumentRef) {
        (
            InstrumentRef::Account(Uuid::new_v4()),
            InstrumentRef::Wallet(Uuid::new_v4()),
        )
    }

    #[test]
    fn legless_rows_debit_source_and_credit_target() {
        let (source, target) = refs();
        let amount = Money::new(dec!(500));
        assert_eq!(
            planned_deltas(Some(source), Some(target), amount, None, Direction::Apply),
            vec![(source, Money::new(dec!(-500))), (target, amount)]
        );
        assert_eq!(
            planned_deltas(Some(source), None, amount, None, Direction::Apply),
            vec![(source, Money::new(dec!(-500)))]
        );
        assert_eq!(
            planned_deltas(None, Some(target), amount, None, Direction::Apply),
            vec![(target, amount)]
        );
    }

    #[test]
    fn legs_touch_only_their_side() {
        let (source, target) = refs();
        let amount = Money::new(dec!(500));
        assert_eq!(
            planned_deltas(
                Some(source),
                Some(target),
                amount,
                Some(TransferLeg::Outflow),
                Direction::Apply
            ),
            vec![(source, Money::new(dec!(-500)))]
        );
        assert_eq!(
            planned_deltas(
                Some(source),
                Some(target),
                amount,
                Some(TransferLeg::Inflow),
                Direction::Apply
            ),
            vec![(target, amount)]
        );
    }

    #[test]
    fn reverse_is_the_algebraic_inverse() {
        let (source, target) = refs();
        let amount = Money::new(dec!(12.34));
        let applied = planned_deltas(Some(source), Some(target), amount, None, Direction::Apply);
        let reversed =
            planned_deltas(Some(source), Some(target), amount, None, Direction::Reverse);
        for ((a_ref, a), (r_ref, r)) in applied.into_iter().zip(reversed) {
            assert_eq!(a_ref, r_ref);
            assert!((a + r).is_zero());
        }
    }
}
