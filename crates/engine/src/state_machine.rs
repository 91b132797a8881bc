//! Transaction lifecycle.
//!
//! ```text
//!  DRAFT ──SUBMIT──► PENDING ──CONFIRM──► CONFIRMED ──RECONCILE──► RECONCILED
//!    │                 │  │
//!    │                 │  └──REJECT──► FAILED
//!    └──CANCEL──►  CANCELLED ◄──CANCEL──┘
//! ```
//!
//! [`StateMachine`] is pure: it never touches storage and never fails. An
//! event the current state does not accept leaves both state and context
//! untouched, so callers that need to report the refusal check
//! [`StateMachine::can_transition`] first.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{EngineError, ResultEngine};

/// Free-form, timestamped annotations carried alongside the state.
pub type StateContext = Map<String, Value>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    #[default]
    Draft,
    Pending,
    Confirmed,
    Failed,
    Cancelled,
    Reconciled,
}

impl TransactionState {
    pub const ALL: [TransactionState; 6] = [
        Self::Draft,
        Self::Pending,
        Self::Confirmed,
        Self::Failed,
        Self::Cancelled,
        Self::Reconciled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Reconciled => "RECONCILED",
        }
    }

    /// Target state of `event`, or `None` when the event is not accepted.
    pub const fn next(self, event: TransactionEvent) -> Option<TransactionState> {
        match (self, event) {
            (Self::Draft, TransactionEvent::Submit) => Some(Self::Pending),
            (Self::Draft, TransactionEvent::Cancel) => Some(Self::Cancelled),
            (Self::Pending, TransactionEvent::Confirm) => Some(Self::Confirmed),
            (Self::Pending, TransactionEvent::Reject) => Some(Self::Failed),
            (Self::Pending, TransactionEvent::Cancel) => Some(Self::Cancelled),
            (Self::Confirmed, TransactionEvent::Reconcile) => Some(Self::Reconciled),
            _ => None,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled | Self::Reconciled)
    }

    /// Whether a transaction in this state has ever been confirmed.
    pub const fn was_confirmed(self) -> bool {
        matches!(self, Self::Confirmed | Self::Reconciled)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TransactionState {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(Self::Draft),
            "PENDING" => Ok(Self::Pending),
            "CONFIRMED" => Ok(Self::Confirmed),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            "RECONCILED" => Ok(Self::Reconciled),
            other => Err(EngineError::InvalidInput(format!(
                "invalid transaction state: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionEvent {
    Submit,
    Confirm,
    Reject,
    Cancel,
    Reconcile,
}

impl TransactionEvent {
    pub const ALL: [TransactionEvent; 5] = [
        Self::Submit,
        Self::Confirm,
        Self::Reject,
        Self::Cancel,
        Self::Reconcile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submit => "SUBMIT",
            Self::Confirm => "CONFIRM",
            Self::Reject => "REJECT",
            Self::Cancel => "CANCEL",
            Self::Reconcile => "RECONCILE",
        }
    }
}

impl fmt::Display for TransactionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TransactionEvent {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SUBMIT" => Ok(Self::Submit),
            "CONFIRM" => Ok(Self::Confirm),
            "REJECT" => Ok(Self::Reject),
            "CANCEL" => Ok(Self::Cancel),
            "RECONCILE" => Ok(Self::Reconcile),
            other => Err(EngineError::InvalidInput(format!(
                "invalid transaction event: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateMachine {
    state: TransactionState,
    context: StateContext,
}

impl StateMachine {
    /// A fresh machine in `DRAFT` with an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rehydrates a machine from persisted state.
    pub fn with_state(state: TransactionState, context: StateContext) -> Self {
        Self { state, context }
    }

    /// Rehydrates a machine from the persisted state and context blob.
    pub fn restore(state: TransactionState, blob: &str) -> ResultEngine<Self> {
        let context = if blob.trim().is_empty() {
            StateContext::new()
        } else {
            serde_json::from_str(blob).map_err(|_| {
                EngineError::InvalidInput("invalid state machine context".to_string())
            })?
        };
        Ok(Self::with_state(state, context))
    }

    pub fn can_transition(&self, event: TransactionEvent) -> bool {
        self.state.next(event).is_some()
    }

    /// Applies `event`, shallow-merging `patch` into the context.
    ///
    /// Events the current state does not accept are ignored.
    pub fn send(&mut self, event: TransactionEvent, patch: Option<StateContext>) {
        let Some(next) = self.state.next(event) else {
            return;
        };
        self.state = next;
        if let Some(patch) = patch {
            self.context.extend(patch);
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Returns a copy of the context.
    pub fn context(&self) -> StateContext {
        self.context.clone()
    }

    /// Serialized context blob, as persisted next to the state.
    pub fn context_blob(&self) -> String {
        Value::Object(self.context.clone()).to_string()
    }
}
