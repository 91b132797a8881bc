//! Settings of the `fintrack` binary.
//!
//! Read from an optional `settings.toml` in the working directory, then
//! overlaid by `FINTRACK__<SECTION>__<KEY>` environment variables, e.g.
//! `FINTRACK__APP__LEVEL=debug` or
//! `FINTRACK__ENGINE__SUSPICION__AMOUNT_MULTIPLIER=3`.
//!
//! ```toml
//! [app]
//! level = "info"
//!
//! [database]
//! sqlite = "fintrack.db"
//!
//! [engine.database_breaker]
//! failure_threshold = 5
//! success_threshold = 2
//! timeout_ms = 60000
//! ```
use config::{Config, ConfigError, Environment, File};
use engine::EngineConfig;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct App {
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

impl Default for Database {
    fn default() -> Self {
        Self::Sqlite("fintrack.db".to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: App,
    pub database: Database,
    pub engine: EngineConfig,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("settings").required(false))
            .add_source(
                Environment::with_prefix("FINTRACK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}
