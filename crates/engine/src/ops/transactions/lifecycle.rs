use chrono::{DateTime, Utc};
use sea_orm::{QueryFilter, prelude::*, sea_query::Expr};
use serde_json::json;
use uuid::Uuid;

use crate::{
    EngineError, PrincipalSource, ResultEngine, StateContext, Transaction, TransactionEvent,
    TransactionState, principal::require_principal, transaction_metadata, transactions,
    util::normalize_optional_text,
};

use super::super::{Engine, balances::Direction, with_tx};
use super::load_group;

/// Generates one public method per lifecycle event.
macro_rules! impl_lifecycle_event {
    ($($(#[$doc:meta])* $name:ident => $event:expr;)+) => {
        impl Engine {
            $(
                $(#[$doc])*
                pub async fn $name(
                    &self,
                    session: &dyn PrincipalSource,
                    transaction_id: Uuid,
                    note: Option<&str>,
                ) -> ResultEngine<Transaction> {
                    self.transition(session, transaction_id, $event, note).await
                }
            )+
        }
    };
}

impl_lifecycle_event! {
    /// `DRAFT → PENDING`.
    submit => TransactionEvent::Submit;
    /// `PENDING → CONFIRMED`.
    confirm => TransactionEvent::Confirm;
    /// `PENDING → FAILED`.
    ///
    /// The balance change booked at creation stays in place; use
    /// [`Engine::delete_transaction`] to reverse it.
    reject => TransactionEvent::Reject;
    /// `DRAFT | PENDING → CANCELLED`.
    ///
    /// The balance change booked at creation stays in place; use
    /// [`Engine::delete_transaction`] to reverse it.
    cancel => TransactionEvent::Cancel;
    /// `CONFIRMED → RECONCILED`.
    reconcile => TransactionEvent::Reconcile;
}

/// Context entries recorded by a transition: when the row entered its new
/// state, the event that moved it and an optional note.
fn transition_patch(
    event: TransactionEvent,
    next: TransactionState,
    at: DateTime<Utc>,
    note: Option<&str>,
) -> StateContext {
    let mut patch = StateContext::new();
    patch.insert(
        format!("{}_at", next.as_str().to_ascii_lowercase()),
        json!(at.to_rfc3339()),
    );
    patch.insert("last_event".to_string(), json!(event.as_str()));
    if let Some(note) = note {
        patch.insert(
            format!("{}_note", event.as_str().to_ascii_lowercase()),
            json!(note),
        );
    }
    patch
}

impl Engine {
    /// Moves a transaction (and the other leg of a split transfer) through
    /// its lifecycle.
    ///
    /// Every row of the group must accept `event`, otherwise nothing changes.
    /// Each update is guarded by the state it was read in, so a concurrent
    /// transition makes this one fail instead of overwriting it.
    pub async fn transition(
        &self,
        session: &dyn PrincipalSource,
        transaction_id: Uuid,
        event: TransactionEvent,
        note: Option<&str>,
    ) -> ResultEngine<Transaction> {
        let user_id = require_principal(session)?;
        let note = normalize_optional_text(note);

        let updated = with_tx!(self, |db_tx| {
            let group = load_group(&db_tx, &user_id, transaction_id).await?;
            if let Some(blocked) = group.iter().find(|tx| !tx.state_machine().can_transition(event))
            {
                return Err(EngineError::InvalidTransition {
                    event,
                    state: blocked.state,
                });
            }

            let now = Utc::now();
            let mut updated = Vec::with_capacity(group.len());
            for tx in group {
                let previous = tx.state;
                let mut machine = tx.state_machine();
                if let Some(next) = previous.next(event) {
                    machine.send(event, Some(transition_patch(event, next, now, note.as_deref())));
                }

                let result = transactions::Entity::update_many()
                    .col_expr(
                        transactions::Column::State,
                        Expr::value(machine.state().as_str()),
                    )
                    .col_expr(
                        transactions::Column::StateMachine,
                        Expr::value(machine.context_blob()),
                    )
                    .col_expr(transactions::Column::UpdatedAt, Expr::value(now))
                    .filter(transactions::Column::Id.eq(tx.id.to_string()))
                    .filter(transactions::Column::UserId.eq(user_id.clone()))
                    .filter(transactions::Column::State.eq(previous.as_str()))
                    .exec(&db_tx)
                    .await?;
                if result.rows_affected == 0 {
                    return Err(EngineError::InvalidTransition {
                        event,
                        state: previous,
                    });
                }

                updated.push(Transaction {
                    state: machine.state(),
                    state_context: machine.context(),
                    updated_at: now,
                    ..tx
                });
            }
            Ok::<_, EngineError>(updated)
        })?;

        let primary = updated
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::KeyNotFound("transaction not exists".to_string()))?;
        tracing::info!(
            user_id = %user_id,
            transaction_id = %primary.id,
            event = %event,
            state = %primary.state,
            "transaction transitioned"
        );
        Ok(primary)
    }

    /// Deletes a never-confirmed transaction, reversing its balance effect.
    ///
    /// Both legs of a split transfer go together. Confirmed and reconciled
    /// rows are permanent.
    pub async fn delete_transaction(
        &self,
        session: &dyn PrincipalSource,
        transaction_id: Uuid,
    ) -> ResultEngine<()> {
        let user_id = require_principal(session)?;

        let removed = with_tx!(self, |db_tx| {
            let group = load_group(&db_tx, &user_id, transaction_id).await?;
            if let Some(kept) = group.iter().find(|tx| tx.state.was_confirmed()) {
                return Err(EngineError::InvalidInput(format!(
                    "a {} transaction cannot be deleted",
                    kept.state
                )));
            }

            for tx in &group {
                self.update_balance(&db_tx, tx, Direction::Reverse).await?;
                transaction_metadata::Entity::delete_many()
                    .filter(transaction_metadata::Column::TransactionId.eq(tx.id.to_string()))
                    .filter(transaction_metadata::Column::UserId.eq(user_id.clone()))
                    .exec(&db_tx)
                    .await?;
                transactions::Entity::delete_many()
                    .filter(transactions::Column::Id.eq(tx.id.to_string()))
                    .filter(transactions::Column::UserId.eq(user_id.clone()))
                    .exec(&db_tx)
                    .await?;
            }
            Ok::<_, EngineError>(group.len())
        })?;

        tracing::info!(
            user_id = %user_id,
            transaction_id = %transaction_id,
            rows = removed,
            "transaction deleted"
        );
        Ok(())
    }
}
