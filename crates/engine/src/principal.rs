//! Who is calling.
//!
//! The engine never authenticates anyone itself. Every operation receives a
//! [`PrincipalSource`] and scopes all reads and writes to the id it returns.

use std::fmt;

use crate::{EngineError, ResultEngine};

pub trait PrincipalSource: Send + Sync + fmt::Debug {
    /// Id of the authenticated principal, if any.
    fn current_principal(&self) -> Option<String>;
}

/// A fixed principal, for tools and tests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StaticPrincipal(Option<String>);

impl StaticPrincipal {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self(Some(user_id.into()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl PrincipalSource for StaticPrincipal {
    fn current_principal(&self) -> Option<String> {
        self.0.clone()
    }
}

pub(crate) fn require_principal(session: &dyn PrincipalSource) -> ResultEngine<String> {
    session
        .current_principal()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or(EngineError::Unauthorized)
}
