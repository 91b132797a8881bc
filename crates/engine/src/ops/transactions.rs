use sea_orm::{DatabaseTransaction, QueryFilter, QueryOrder, prelude::*};
use uuid::Uuid;

use crate::{EngineError, ResultEngine, Transaction, transactions};

mod create;
mod lifecycle;
mod list;
mod moderation;

pub use list::TransactionListFilter;

async fn find_by_idempotency_key(
    db_tx: &DatabaseTransaction,
    user_id: &str,
    key: &str,
) -> ResultEngine<Option<Transaction>> {
    transactions::Entity::find()
        .filter(transactions::Column::UserId.eq(user_id.to_string()))
        .filter(transactions::Column::IdempotencyKey.eq(key.to_string()))
        .one(db_tx)
        .await?
        .map(Transaction::try_from)
        .transpose()
}

async fn load_transaction(
    db_tx: &DatabaseTransaction,
    user_id: &str,
    transaction_id: Uuid,
) -> ResultEngine<Transaction> {
    let model = transactions::Entity::find_by_id(transaction_id.to_string())
        .filter(transactions::Column::UserId.eq(user_id.to_string()))
        .one(db_tx)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound("transaction not exists".to_string()))?;
    Transaction::try_from(model)
}

/// Loads `transaction_id` and, for split transfers, its sibling leg.
///
/// The requested row always comes first.
async fn load_group(
    db_tx: &DatabaseTransaction,
    user_id: &str,
    transaction_id: Uuid,
) -> ResultEngine<Vec<Transaction>> {
    let primary = load_transaction(db_tx, user_id, transaction_id).await?;
    let Some(group_id) = primary.transfer_group_id else {
        return Ok(vec![primary]);
    };

    let siblings = transactions::Entity::find()
        .filter(transactions::Column::UserId.eq(user_id.to_string()))
        .filter(transactions::Column::TransferGroupId.eq(group_id.to_string()))
        .filter(transactions::Column::Id.ne(transaction_id.to_string()))
        .order_by_asc(transactions::Column::Id)
        .all(db_tx)
        .await?;

    let mut group = Vec::with_capacity(siblings.len() + 1);
    group.push(primary);
    group.extend(transactions::models_to_transactions(siblings)?);
    Ok(group)
}
