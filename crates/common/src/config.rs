//! Application configuration.

use chrono::NaiveDate;
use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Membership lifecycle configuration.
    #[serde(default)]
    pub membership: MembershipConfig,
    /// Identity provider boundary configuration.
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Badge evaluator configuration.
    #[serde(default)]
    pub badges: BadgeConfig,
    /// Background worker configuration.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Membership lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MembershipConfig {
    /// Applicants with at least this many followers skip review.
    #[serde(default = "default_auto_approve_followers")]
    pub auto_approve_followers: i32,
    /// Minimum application reason length, in characters.
    #[serde(default = "default_reason_min_chars")]
    pub reason_min_chars: usize,
    /// Maximum application reason length, in characters.
    #[serde(default = "default_reason_max_chars")]
    pub reason_max_chars: usize,
}

/// Identity provider boundary configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityConfig {
    /// Handles granted admin on sign-in (case-insensitive).
    #[serde(default)]
    pub admin_handles: Vec<String>,
}

/// Badge evaluator configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BadgeConfig {
    /// Users created on this date earn the launch-day badge.
    #[serde(default)]
    pub launch_date: Option<NaiveDate>,
    /// Users created before this date earn the beta-tester badge.
    #[serde(default)]
    pub beta_end: Option<NaiveDate>,
}

/// Background worker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Maximum number of concurrently running jobs.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Job channel capacity.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// Attempts before a ranking recompute is given up.
    #[serde(default = "default_ranking_max_attempts")]
    pub ranking_max_attempts: u32,
    /// Seconds between counter reconciliation runs. `0` disables it.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

const fn default_auto_approve_followers() -> i32 {
    500
}

const fn default_reason_min_chars() -> usize {
    20
}

const fn default_reason_max_chars() -> usize {
    200
}

const fn default_max_workers() -> usize {
    4
}

const fn default_queue_size() -> usize {
    1000
}

const fn default_ranking_max_attempts() -> u32 {
    5
}

const fn default_reconcile_interval_secs() -> u64 {
    3600
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            auto_approve_followers: default_auto_approve_followers(),
            reason_min_chars: default_reason_min_chars(),
            reason_max_chars: default_reason_max_chars(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            queue_size: default_queue_size(),
            ranking_max_attempts: default_ranking_max_attempts(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
        }
    }
}

impl IdentityConfig {
    /// Whether the given handle is configured as an admin.
    #[must_use]
    pub fn is_admin_handle(&self, handle: &str) -> bool {
        self.admin_handles
            .iter()
            .any(|h| h.eq_ignore_ascii_case(handle))
    }
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present, into the process environment)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `RANKX_ENV`)
    /// 4. Environment variables with `RANKX_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let env = std::env::var("RANKX_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("RANKX")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("identity.admin_handles")
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
                config::Environment::with_prefix("RANKX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = parse(
            r#"
            [database]
            url = "postgres://localhost/rankx"
            "#,
        );

        assert_eq!(config.database.max_connections, 100);
        assert_eq!(config.membership.auto_approve_followers, 500);
        assert_eq!(config.membership.reason_min_chars, 20);
        assert_eq!(config.membership.reason_max_chars, 200);
        assert_eq!(config.worker.ranking_max_attempts, 5);
        assert!(config.identity.admin_handles.is_empty());
        assert!(config.badges.launch_date.is_none());
        assert!(!config.logging.json);
    }

    #[test]
    fn test_overrides() {
        let config = parse(
            r#"
            [database]
            url = "postgres://localhost/rankx"

            [membership]
            auto_approve_followers = 1000

            [identity]
            admin_handles = ["Founder"]

            [badges]
            launch_date = "2026-02-21"
            beta_end = "2026-03-01"
            "#,
        );

        assert_eq!(config.membership.auto_approve_followers, 1000);
        assert_eq!(config.membership.reason_max_chars, 200);
        assert!(config.identity.is_admin_handle("founder"));
        assert!(!config.identity.is_admin_handle("someone"));
        assert_eq!(
            config.badges.launch_date,
            NaiveDate::from_ymd_opt(2026, 2, 21)
        );
    }

    #[test]
    fn test_missing_database_is_an_error() {
        let result = config::Config::builder()
            .add_source(config::File::from_str("", config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize::<Config>();
        assert!(result.is_err());
    }
}
