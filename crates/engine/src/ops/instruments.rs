use chrono::Utc;
use sea_orm::{ActiveValue, DatabaseTransaction, QueryFilter, QuerySelect, prelude::*, sea_query::Expr};
use uuid::Uuid;

use crate::{
    EngineError, Instrument, InstrumentRef, Money, NewInstrument, OwnedInstruments,
    PrincipalSource, ResultEngine, accounts, bank_accounts, principal::require_principal,
    util::parse_uuid, wallets,
};

use super::{Engine, normalize_required_name, on_instrument_table, with_tx};

impl Engine {
    /// Opens a cash account, bank account or wallet for the caller.
    pub async fn open_instrument(
        &self,
        session: &dyn PrincipalSource,
        new: NewInstrument,
    ) -> ResultEngine<Instrument> {
        let user_id = require_principal(session)?;
        new.balance().ensure_scale(new.currency())?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let instrument = with_tx!(self, |db_tx| {
            match &new {
                NewInstrument::Account {
                    name,
                    currency,
                    balance,
                } => {
                    let model = accounts::ActiveModel {
                        id: ActiveValue::Set(id.clone()),
                        user_id: ActiveValue::Set(user_id.clone()),
                        name: ActiveValue::Set(normalize_required_name(name, "account")?),
                        balance: ActiveValue::Set(balance.to_storage()),
                        currency: ActiveValue::Set(currency.code().to_string()),
                        created_at: ActiveValue::Set(now),
                        updated_at: ActiveValue::Set(now),
                    }
                    .insert(&db_tx)
                    .await?;
                    Instrument::try_from(model)
                }
                NewInstrument::BankAccount {
                    name,
                    bank,
                    currency,
                    balance,
                } => {
                    let model = bank_accounts::ActiveModel {
                        id: ActiveValue::Set(id.clone()),
                        user_id: ActiveValue::Set(user_id.clone()),
                        name: ActiveValue::Set(normalize_required_name(name, "bank account")?),
                        bank: ActiveValue::Set(bank.as_str().to_string()),
                        balance: ActiveValue::Set(balance.to_storage()),
                        currency: ActiveValue::Set(currency.code().to_string()),
                        created_at: ActiveValue::Set(now),
                        updated_at: ActiveValue::Set(now),
                    }
                    .insert(&db_tx)
                    .await?;
                    Instrument::try_from(model)
                }
                NewInstrument::Wallet {
                    name,
                    provider,
                    currency,
                    balance,
                } => {
                    let model = wallets::ActiveModel {
                        id: ActiveValue::Set(id.clone()),
                        user_id: ActiveValue::Set(user_id.clone()),
                        name: ActiveValue::Set(normalize_required_name(name, "wallet")?),
                        provider: ActiveValue::Set(provider.as_str().to_string()),
                        balance: ActiveValue::Set(balance.to_storage()),
                        currency: ActiveValue::Set(currency.code().to_string()),
                        created_at: ActiveValue::Set(now),
                        updated_at: ActiveValue::Set(now),
                    }
                    .insert(&db_tx)
                    .await?;
                    Instrument::try_from(model)
                }
            }
        })?;

        tracing::info!(
            user_id = %user_id,
            instrument = %instrument.reference,
            currency = %instrument.currency,
            "instrument opened"
        );
        Ok(instrument)
    }

    /// Returns one of the caller's instruments.
    pub async fn instrument(
        &self,
        session: &dyn PrincipalSource,
        reference: InstrumentRef,
    ) -> ResultEngine<Instrument> {
        let user_id = require_principal(session)?;
        with_tx!(self, |db_tx| {
            load_instrument(&db_tx, &user_id, reference).await
        })
    }

    /// Overwrites a balance with a value reported by the outside world
    /// (bank statement, wallet provider). This is the only write to a
    /// balance that does not come from a transaction.
    pub async fn sync_balance(
        &self,
        session: &dyn PrincipalSource,
        reference: InstrumentRef,
        balance: Money,
    ) -> ResultEngine<Instrument> {
        let user_id = require_principal(session)?;
        let synced = with_tx!(self, |db_tx| {
            let current = load_instrument(&db_tx, &user_id, reference).await?;
            balance.ensure_scale(current.currency)?;
            write_balance(&db_tx, &user_id, reference, balance).await?;
            load_instrument(&db_tx, &user_id, reference).await
        })?;

        tracing::info!(
            user_id = %user_id,
            instrument = %reference,
            balance = %synced.balance,
            "instrument balance synced"
        );
        Ok(synced)
    }
}

/// Loads an instrument owned by `user_id`; anything else is not found.
pub(super) async fn load_instrument(
    db_tx: &DatabaseTransaction,
    user_id: &str,
    reference: InstrumentRef,
) -> ResultEngine<Instrument> {
    on_instrument_table!(reference, |table, id| {
        let model = table::Entity::find_by_id(id.to_string())
            .filter(table::Column::UserId.eq(user_id.to_string()))
            .one(db_tx)
            .await?
            .ok_or_else(|| {
                EngineError::KeyNotFound(format!("{} not exists", reference.kind().as_str()))
            })?;
        Instrument::try_from(model)
    })
}

/// Sets the stored balance, scoped to the owner.
pub(super) async fn write_balance(
    db_tx: &DatabaseTransaction,
    user_id: &str,
    reference: InstrumentRef,
    balance: Money,
) -> ResultEngine<()> {
    let now = Utc::now();
    let result = on_instrument_table!(reference, |table, id| {
        table::Entity::update_many()
            .col_expr(table::Column::Balance, Expr::value(balance.to_storage()))
            .col_expr(table::Column::UpdatedAt, Expr::value(now))
            .filter(table::Column::Id.eq(id.to_string()))
            .filter(table::Column::UserId.eq(user_id.to_string()))
            .exec(db_tx)
            .await?
    });
    if result.rows_affected == 0 {
        return Err(EngineError::KeyNotFound(format!(
            "{} not exists",
            reference.kind().as_str()
        )));
    }
    Ok(())
}

/// Ids of every instrument owned by `user_id`, fetched concurrently.
pub(super) async fn owned_instruments(
    db_tx: &DatabaseTransaction,
    user_id: &str,
) -> ResultEngine<OwnedInstruments> {
    let (account_ids, bank_account_ids, wallet_ids) = tokio::try_join!(
        accounts::Entity::find()
            .filter(accounts::Column::UserId.eq(user_id.to_string()))
            .select_only()
            .column(accounts::Column::Id)
            .into_tuple::<String>()
            .all(db_tx),
        bank_accounts::Entity::find()
            .filter(bank_accounts::Column::UserId.eq(user_id.to_string()))
            .select_only()
            .column(bank_accounts::Column::Id)
            .into_tuple::<String>()
            .all(db_tx),
        wallets::Entity::find()
            .filter(wallets::Column::UserId.eq(user_id.to_string()))
            .select_only()
            .column(wallets::Column::Id)
            .into_tuple::<String>()
            .all(db_tx),
    )?;

    Ok(OwnedInstruments {
        accounts: parse_ids(&account_ids, "account")?,
        bank_accounts: parse_ids(&bank_account_ids, "bank_account")?,
        wallets: parse_ids(&wallet_ids, "wallet")?,
    })
}

fn parse_ids(raw: &[String], label: &str) -> ResultEngine<std::collections::HashSet<Uuid>> {
    raw.iter().map(|id| parse_uuid(id, label)).collect()
}
