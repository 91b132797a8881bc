use std::sync::Arc;

use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};

use crate::{BreakerRegistry, CircuitBreaker, EngineConfig, EngineError, ResultEngine};

mod balances;
mod instruments;
mod transactions;

pub use transactions::TransactionListFilter;

/// Name of the breaker guarding storage transactions.
///
/// Only `begin` and `commit` run through it, so it trips on connection and
/// commit failures. A statement failing inside an open transaction surfaces
/// as [`EngineError::Database`] without counting against the breaker.
pub(crate) const DATABASE_BREAKER: &str = "database";

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.begin().await?;
        let result: $crate::ResultEngine<_> = $body;
        match result {
            Ok(value) => {
                $self.commit($tx).await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

/// Expand `$body` once per instrument table, with `$table` aliased to the
/// entity module matching `$reference` and `$id` bound to its id.
macro_rules! on_instrument_table {
    ($reference:expr, |$table:ident, $id:ident| $body:expr) => {
        match $reference {
            $crate::InstrumentRef::Account($id) => {
                use $crate::accounts as $table;
                $body
            }
            $crate::InstrumentRef::BankAccount($id) => {
                use $crate::bank_accounts as $table;
                $body
            }
            $crate::InstrumentRef::Wallet($id) => {
                use $crate::wallets as $table;
                $body
            }
        }
    };
}

pub(crate) use on_instrument_table;

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    config: EngineConfig,
    breakers: Arc<BreakerRegistry>,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registry holding the engine's breakers, including the storage one.
    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    fn database_breaker(&self) -> Arc<CircuitBreaker> {
        self.breakers
            .get_or_create(DATABASE_BREAKER, self.config.database_breaker)
    }

    async fn begin(&self) -> ResultEngine<DatabaseTransaction> {
        let database = &self.database;
        self.database_breaker()
            .execute(|| database.begin())
            .await
            .map_err(EngineError::from)
    }

    async fn commit(&self, db_tx: DatabaseTransaction) -> ResultEngine<()> {
        self.database_breaker()
            .execute(move || db_tx.commit())
            .await
            .map_err(EngineError::from)
    }
}

fn normalize_required_name(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidInput(format!(
            "{label} name must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    config: EngineConfig,
    breakers: Option<Arc<BreakerRegistry>>,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> EngineBuilder {
        self.config = config;
        self
    }

    /// Share a breaker registry with other components. A private one is
    /// created otherwise.
    pub fn breakers(mut self, breakers: Arc<BreakerRegistry>) -> EngineBuilder {
        self.breakers = Some(breakers);
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        let breakers = self.breakers.unwrap_or_default();
        breakers.get_or_create(DATABASE_BREAKER, self.config.database_breaker);
        Ok(Engine {
            database: self.database,
            config: self.config,
            breakers,
        })
    }
}
