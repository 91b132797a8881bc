//! Transaction lifecycle engine.
//!
//! The engine records money movements between a principal's instruments
//! (cash accounts, bank accounts, digital wallets). It guards every
//! transaction with a lifecycle state machine, collapses retried creates
//! through idempotency keys, and keeps instrument balances in step with the
//! ledger inside a single storage transaction.
//!
//! ```no_run
//! # async fn run(db: sea_orm::DatabaseConnection) -> Result<(), engine::EngineError> {
//! use chrono::Utc;
//! use engine::{Currency, Engine, NewInstrument, StaticPrincipal, CreateTransactionCmd};
//!
//! let engine = Engine::builder().database(db).build().await?;
//! let alice = StaticPrincipal::new("alice");
//!
//! let cash = engine
//!     .open_instrument(&alice, NewInstrument::account("Cash", Currency::Ars, "1000".parse()?))
//!     .await?;
//! let tx = engine
//!     .create_transaction(
//!         &alice,
//!         CreateTransactionCmd::new("250".parse()?, Currency::Ars, Utc::now())
//!             .from(cash.reference)
//!             .description("Supermercado"),
//!     )
//!     .await?;
//! engine.submit(&alice, tx.id, None).await?;
//! # Ok(())
//! # }
//! ```

pub use breaker::{
    BreakerConfig, BreakerError, BreakerOpen, BreakerRegistry, BreakerState, BreakerStats,
    CircuitBreaker,
};
pub use categories::{Category, detect_category_from_description};
pub use commands::{CreateTransactionCmd, NewInstrument};
pub use config::{EngineConfig, SuspicionConfig};
pub use currency::Currency;
pub use detector::{
    Confidence, Detection, DetectionInput, OwnedInstruments, SuspicionInput, SuspicionReport,
    detect_suspicious_activity, detect_transaction_type,
};
pub use error::{EngineError, ErrorKind};
pub use idempotency::{KeyField, create_idempotency_key};
pub use instruments::{Bank, Instrument, InstrumentKind, InstrumentRef, WalletProvider};
pub use money::Money;
pub use ops::{Engine, EngineBuilder, TransactionListFilter};
pub use principal::{PrincipalSource, StaticPrincipal};
pub use state_machine::{StateContext, StateMachine, TransactionEvent, TransactionState};
pub use transaction_metadata::TransactionMetadata;
pub use transactions::{PaymentMethod, Transaction, TransactionKind, TransferLeg};

mod accounts;
mod bank_accounts;
pub mod breaker;
mod categories;
mod commands;
mod config;
mod currency;
pub mod detector;
mod error;
pub mod idempotency;
mod instruments;
mod money;
mod ops;
mod principal;
pub mod redact;
pub mod state_machine;
mod transaction_metadata;
mod transactions;
mod util;
mod wallets;

pub type ResultEngine<T> = Result<T, EngineError>;
