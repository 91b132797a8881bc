use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sea_orm::{Condition, QueryFilter, QueryOrder, QuerySelect, prelude::*};

use crate::{
    EngineError, PrincipalSource, ResultEngine, Transaction, TransactionKind, TransactionState,
    principal::require_principal, transaction_metadata, transactions,
};

use super::super::{Engine, with_tx};
use super::{load_group, load_transaction};

/// Filters for listing transactions.
///
/// `from` is inclusive and `to` is exclusive (`[from, to)`), both in UTC and
/// applied to `occurred_at`.
#[derive(Clone, Debug, Default)]
pub struct TransactionListFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// If present, acts as an allow-list of lifecycle states.
    pub states: Option<Vec<TransactionState>>,
    /// If present, acts as an allow-list of kinds to return.
    pub kinds: Option<Vec<TransactionKind>>,
    /// Only rows whose moderation metadata is flagged.
    pub flagged_only: bool,
}

fn validate_list_filter(filter: &TransactionListFilter) -> ResultEngine<()> {
    if let (Some(from), Some(to)) = (filter.from, filter.to)
        && from >= to
    {
        return Err(EngineError::InvalidInput(
            "invalid range: from must be < to".to_string(),
        ));
    }
    if filter.states.as_ref().is_some_and(|s| s.is_empty()) {
        return Err(EngineError::InvalidInput(
            "states must not be empty".to_string(),
        ));
    }
    if filter.kinds.as_ref().is_some_and(|k| k.is_empty()) {
        return Err(EngineError::InvalidInput(
            "kinds must not be empty".to_string(),
        ));
    }
    Ok(())
}

trait ApplyTxFilters: QueryFilter + Sized {
    fn apply_tx_filters(self, filter: &TransactionListFilter) -> Self;
}

impl<T> ApplyTxFilters for T
where
    T: QueryFilter + Sized,
{
    fn apply_tx_filters(mut self, filter: &TransactionListFilter) -> Self {
        if let Some(from) = filter.from {
            self = self.filter(transactions::Column::OccurredAt.gte(from));
        }
        if let Some(to) = filter.to {
            self = self.filter(transactions::Column::OccurredAt.lt(to));
        }
        if let Some(states) = &filter.states {
            let states: Vec<&str> = states.iter().map(|s| s.as_str()).collect();
            self = self.filter(transactions::Column::State.is_in(states));
        }
        if let Some(kinds) = &filter.kinds {
            let kinds: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
            self = self.filter(transactions::Column::Kind.is_in(kinds));
        }
        if filter.flagged_only {
            self = self.filter(transaction_metadata::Column::IsFlagged.eq(true));
        }
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct TransactionsCursor {
    created_at: DateTime<Utc>,
    transaction_id: String,
}

impl TransactionsCursor {
    fn encode(&self) -> ResultEngine<String> {
        let bytes = serde_json::to_vec(self)
            .map_err(|_| EngineError::InvalidCursor("invalid transactions cursor".to_string()))?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    fn decode(input: &str) -> ResultEngine<Self> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(input.as_bytes())
            .map_err(|_| EngineError::InvalidCursor("invalid transactions cursor".to_string()))?;
        serde_json::from_slice::<Self>(&bytes)
            .map_err(|_| EngineError::InvalidCursor("invalid transactions cursor".to_string()))
    }
}

impl Engine {
    /// Lists the caller's transactions, with cursor-based pagination.
    ///
    /// Pagination is newest → older by `(created_at DESC, transaction_id
    /// DESC)`. Both legs of an own-account transfer are listed.
    pub async fn list_transactions(
        &self,
        session: &dyn PrincipalSource,
        filter: &TransactionListFilter,
        limit: u64,
        cursor: Option<&str>,
    ) -> ResultEngine<(Vec<Transaction>, Option<String>)> {
        let user_id = require_principal(session)?;
        validate_list_filter(filter)?;
        let cursor = cursor.map(TransactionsCursor::decode).transpose()?;

        with_tx!(self, |db_tx| {
            let limit_plus_one = limit.saturating_add(1);
            let mut query = transactions::Entity::find()
                .filter(transactions::Column::UserId.eq(user_id.clone()))
                .order_by_desc(transactions::Column::CreatedAt)
                .order_by_desc(transactions::Column::Id)
                .limit(limit_plus_one);
            if filter.flagged_only {
                query = query.inner_join(transaction_metadata::Entity);
            }

            if let Some(cursor) = &cursor {
                query = query.filter(
                    Condition::any()
                        .add(transactions::Column::CreatedAt.lt(cursor.created_at))
                        .add(
                            Condition::all()
                                .add(transactions::Column::CreatedAt.eq(cursor.created_at))
                                .add(transactions::Column::Id.lt(cursor.transaction_id.clone())),
                        ),
                );
            }
            query = query.apply_tx_filters(filter);

            let rows: Vec<transactions::Model> = query.all(&db_tx).await?;
            let has_more = rows.len() > limit as usize;

            let mut out: Vec<Transaction> = Vec::with_capacity(rows.len().min(limit as usize));
            for tx_model in rows.into_iter().take(limit as usize) {
                out.push(Transaction::try_from(tx_model)?);
            }

            let next_cursor = out.last().map(|tx| TransactionsCursor {
                created_at: tx.created_at,
                transaction_id: tx.id.to_string(),
            });
            let next_cursor = if has_more {
                next_cursor.map(|c| c.encode()).transpose()?
            } else {
                None
            };

            Ok((out, next_cursor))
        })
    }

    /// Returns one of the caller's transactions.
    pub async fn transaction(
        &self,
        session: &dyn PrincipalSource,
        transaction_id: Uuid,
    ) -> ResultEngine<Transaction> {
        let user_id = require_principal(session)?;
        with_tx!(self, |db_tx| {
            load_transaction(&db_tx, &user_id, transaction_id).await
        })
    }

    /// Returns a transaction followed by its sibling legs, if any.
    pub async fn transaction_group(
        &self,
        session: &dyn PrincipalSource,
        transaction_id: Uuid,
    ) -> ResultEngine<Vec<Transaction>> {
        let user_id = require_principal(session)?;
        with_tx!(self, |db_tx| {
            load_group(&db_tx, &user_id, transaction_id).await
        })
    }
}
