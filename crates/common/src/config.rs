//! Application configuration.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Voting engine configuration.
    #[serde(default)]
    pub voting: VotingConfig,
    /// Roster directory configuration.
    #[serde(default)]
    pub roster: RosterConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this instance.
    pub url: String,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Voting engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VotingConfig {
    /// How many times a write conflict on cast/close is retried before it
    /// is surfaced to the caller.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
    /// Delay before the first conflict retry, in milliseconds. Doubles on
    /// each further retry.
    #[serde(default = "default_conflict_retry_delay_ms")]
    pub conflict_retry_delay_ms: u64,
    /// Weight given to roster entries that do not carry one.
    #[serde(default = "default_weight")]
    pub default_weight: f64,
    /// Maximum number of options per vote.
    #[serde(default = "default_max_options")]
    pub max_options: usize,
    /// Maximum vote title length.
    #[serde(default = "default_max_title_length")]
    pub max_title_length: usize,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: default_max_conflict_retries(),
            conflict_retry_delay_ms: default_conflict_retry_delay_ms(),
            default_weight: default_weight(),
            max_options: default_max_options(),
            max_title_length: default_max_title_length(),
        }
    }
}

impl VotingConfig {
    /// Backoff before conflict retry number `retry` (1-based).
    #[must_use]
    pub fn conflict_retry_delay(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        Duration::from_millis(self.conflict_retry_delay_ms.saturating_mul(factor))
    }
}

/// Roster directory configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RosterConfig {
    /// Base URL of the board directory serving voter rosters.
    ///
    /// When unset, votes must be opened with an inline roster.
    #[serde(default)]
    pub directory_url: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_roster_timeout_secs")]
    pub timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

const fn default_max_conflict_retries() -> u32 {
    3
}

const fn default_conflict_retry_delay_ms() -> u64 {
    20
}

const fn default_weight() -> f64 {
    1.0
}

const fn default_max_options() -> usize {
    20
}

const fn default_max_title_length() -> usize {
    256
}

const fn default_roster_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `BOARDVOTE_ENV`)
    /// 3. Environment variables with `BOARDVOTE__` prefix (a `.env` file is honored)
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("BOARDVOTE_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("BOARDVOTE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("BOARDVOTE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
