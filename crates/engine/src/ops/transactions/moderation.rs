use chrono::Utc;
use sea_orm::{DatabaseTransaction, QueryFilter, prelude::*, sea_query::Expr};
use uuid::Uuid;

use crate::{
    EngineError, PrincipalSource, ResultEngine, TransactionMetadata, principal::require_principal,
    transaction_metadata, util::normalize_optional_text,
};

use super::super::{Engine, with_tx};
use super::load_group;

impl Engine {
    /// Moderation state of one of the caller's transactions.
    pub async fn transaction_metadata(
        &self,
        session: &dyn PrincipalSource,
        transaction_id: Uuid,
    ) -> ResultEngine<TransactionMetadata> {
        let user_id = require_principal(session)?;
        with_tx!(self, |db_tx| {
            load_metadata(&db_tx, &user_id, transaction_id).await
        })
    }

    /// Flags a transaction for review. Split transfers are flagged on both
    /// legs.
    pub async fn flag_transaction(
        &self,
        session: &dyn PrincipalSource,
        transaction_id: Uuid,
        reason: &str,
    ) -> ResultEngine<TransactionMetadata> {
        let user_id = require_principal(session)?;
        let reason = normalize_optional_text(Some(reason)).ok_or_else(|| {
            EngineError::InvalidInput("flag reason must not be empty".to_string())
        })?;

        let now = Utc::now();
        let metadata = with_tx!(self, |db_tx| {
            let ids = group_ids(&db_tx, &user_id, transaction_id).await?;
            transaction_metadata::Entity::update_many()
                .col_expr(transaction_metadata::Column::IsFlagged, Expr::value(true))
                .col_expr(
                    transaction_metadata::Column::FlagReason,
                    Expr::value(reason.clone()),
                )
                .col_expr(transaction_metadata::Column::FlaggedAt, Expr::value(now))
                .filter(transaction_metadata::Column::TransactionId.is_in(ids))
                .filter(transaction_metadata::Column::UserId.eq(user_id.clone()))
                .exec(&db_tx)
                .await?;
            load_metadata(&db_tx, &user_id, transaction_id).await
        })?;

        tracing::warn!(
            user_id = %user_id,
            transaction_id = %transaction_id,
            reason = %reason,
            "transaction flagged for review"
        );
        Ok(metadata)
    }

    /// Marks a flagged transaction as reviewed. `flagged_at` is kept as
    /// history.
    pub async fn clear_flag(
        &self,
        session: &dyn PrincipalSource,
        transaction_id: Uuid,
    ) -> ResultEngine<TransactionMetadata> {
        let user_id = require_principal(session)?;

        let now = Utc::now();
        let metadata = with_tx!(self, |db_tx| {
            let ids = group_ids(&db_tx, &user_id, transaction_id).await?;
            transaction_metadata::Entity::update_many()
                .col_expr(transaction_metadata::Column::IsFlagged, Expr::value(false))
                .col_expr(
                    transaction_metadata::Column::FlagReason,
                    Expr::value(Option::<String>::None),
                )
                .col_expr(transaction_metadata::Column::ReviewedAt, Expr::value(now))
                .filter(transaction_metadata::Column::TransactionId.is_in(ids))
                .filter(transaction_metadata::Column::UserId.eq(user_id.clone()))
                .exec(&db_tx)
                .await?;
            load_metadata(&db_tx, &user_id, transaction_id).await
        })?;

        tracing::info!(
            user_id = %user_id,
            transaction_id = %transaction_id,
            "transaction flag cleared"
        );
        Ok(metadata)
    }
}

async fn group_ids(
    db_tx: &DatabaseTransaction,
    user_id: &str,
    transaction_id: Uuid,
) -> ResultEngine<Vec<String>> {
    let group = load_group(db_tx, user_id, transaction_id).await?;
    Ok(group.iter().map(|tx| tx.id.to_string()).collect())
}

async fn load_metadata(
    db_tx: &DatabaseTransaction,
    user_id: &str,
    transaction_id: Uuid,
) -> ResultEngine<TransactionMetadata> {
    let model = transaction_metadata::Entity::find_by_id(transaction_id.to_string())
        .filter(transaction_metadata::Column::UserId.eq(user_id.to_string()))
        .one(db_tx)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound("transaction not exists".to_string()))?;
    TransactionMetadata::try_from(model)
}
