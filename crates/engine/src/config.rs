use serde::{Deserialize, Serialize};

use crate::breaker::BreakerConfig;

/// Tunables of the engine. Every field has a default, so a partial
/// configuration file is enough.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub suspicion: SuspicionConfig,
    /// Breaker guarding every storage transaction.
    pub database_breaker: BreakerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            suspicion: SuspicionConfig::default(),
            database_breaker: BreakerConfig::database(),
        }
    }
}

impl EngineConfig {
    pub fn with_database_breaker(mut self, config: BreakerConfig) -> Self {
        self.database_breaker = config;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspicionConfig {
    /// An amount strictly above `average * amount_multiplier` is suspicious.
    pub amount_multiplier: u32,
    /// More than this many transactions in the trailing 24h is suspicious.
    pub max_daily_transactions: usize,
}

impl Default for SuspicionConfig {
    fn default() -> Self {
        Self {
            amount_multiplier: 5,
            max_daily_transactions: 10,
        }
    }
}
