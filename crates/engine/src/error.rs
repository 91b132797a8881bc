//! The module contains the error the engine can throw.
//!
//! Every variant belongs to one coarse [`ErrorKind`], which is what callers
//! usually branch on:
//!
//! - [`Unauthorized`] thrown when no principal is authenticated.
//! - [`KeyNotFound`] thrown when a transaction or instrument is absent or owned
//!   by another principal.
//! - [`InvalidTransition`] thrown when a lifecycle event is not accepted by the
//!   current state.
//! - [`CircuitOpen`] thrown when the storage breaker rejected the call without
//!   touching the database.
//!
//!  [`Unauthorized`]: EngineError::Unauthorized
//!  [`KeyNotFound`]: EngineError::KeyNotFound
//!  [`InvalidTransition`]: EngineError::InvalidTransition
//!  [`CircuitOpen`]: EngineError::CircuitOpen
use sea_orm::DbErr;
use thiserror::Error;

use crate::{
    breaker::{BreakerError, BreakerOpen},
    state_machine::{TransactionEvent, TransactionState},
};

/// Coarse error taxonomy shared by every engine operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unauthorized,
    Validation,
    NotFound,
    Database,
    CircuitOpen,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Validation => "VALIDATION",
            Self::NotFound => "NOT_FOUND",
            Self::Database => "DATABASE",
            Self::CircuitOpen => "CIRCUIT_OPEN",
        }
    }
}

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Currency mismatch: {0}")]
    CurrencyMismatch(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("Event {event} is not allowed in state {state}")]
    InvalidTransition {
        event: TransactionEvent,
        state: TransactionState,
    },
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error(transparent)]
    CircuitOpen(BreakerOpen),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::InvalidAmount(_)
            | Self::CurrencyMismatch(_)
            | Self::InvalidInput(_)
            | Self::InvalidCursor(_)
            | Self::InvalidTransition { .. } => ErrorKind::Validation,
            Self::KeyNotFound(_) => ErrorKind::NotFound,
            Self::CircuitOpen(_) => ErrorKind::CircuitOpen,
            Self::Database(_) => ErrorKind::Database,
        }
    }

    /// Short message suitable for direct display.
    ///
    /// Storage and breaker failures never leak driver details.
    pub fn public_message(&self) -> String {
        match self {
            Self::Database(db_err) => {
                tracing::error!("database error: {db_err}");
                "storage is unavailable, please try again".to_string()
            }
            Self::CircuitOpen(_) => "service temporarily unavailable, please retry later".to_string(),
            Self::KeyNotFound(_) => "not found".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<BreakerError<DbErr>> for EngineError {
    fn from(value: BreakerError<DbErr>) -> Self {
        match value {
            BreakerError::Open(open) => Self::CircuitOpen(open),
            BreakerError::Inner(db_err) => Self::Database(db_err),
        }
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unauthorized, Self::Unauthorized) => true,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::CurrencyMismatch(a), Self::CurrencyMismatch(b)) => a == b,
            (Self::InvalidInput(a), Self::InvalidInput(b)) => a == b,
            (Self::InvalidCursor(a), Self::InvalidCursor(b)) => a == b,
            (
                Self::InvalidTransition { event, state },
                Self::InvalidTransition {
                    event: other_event,
                    state: other_state,
                },
            ) => event == other_event && state == other_state,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::CircuitOpen(a), Self::CircuitOpen(b)) => a.resource == b.resource,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
