//! Worker configuration loading from file and environment variables.

use std::time::Duration;

use authledger_db::{create_pool, Connections, DbRuntimeSettings, PoolError};
use authledger_jobs::RunnerLimits;
use authledger_store::TrackerKind;
use serde::Deserialize;
use thiserror::Error;

/// Longest accepted `accounting.retention_days`, one hundred years.
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// Top-level worker configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// What to record and how.
    #[serde(default)]
    pub accounting: AccountingConfig,

    /// Database connections per role.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Job runner pause thresholds.
    #[serde(default)]
    pub job_runner: JobRunnerConfig,

    /// Background retention task settings.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Whether events are written while handling them or queued for the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingType {
    #[default]
    Synchronous,
    Asynchronous,
}

impl std::str::FromStr for ProcessingType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synchronous" => Ok(Self::Synchronous),
            "asynchronous" => Ok(Self::Asynchronous),
            _ => Err(ConfigError::Invalid(format!(
                "unknown processing type '{s}', expected 'synchronous' or 'asynchronous'"
            ))),
        }
    }
}

/// Accounting behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountingConfig {
    #[serde(default)]
    pub processing_type: ProcessingType,

    /// Attribute whose first value identifies the user.
    #[serde(default = "default_user_id_attribute_name")]
    pub user_id_attribute_name: String,

    /// Tracker that is always fed and that answers read queries.
    #[serde(default = "default_tracker")]
    pub default_tracker: TrackerKind,

    /// Further trackers fed with every event.
    #[serde(default)]
    pub additional_trackers: Vec<TrackerKind>,

    /// Age after which history is deleted, at most [`MAX_RETENTION_DAYS`].
    /// Absent disables retention.
    #[serde(default)]
    pub retention_days: Option<u32>,
}

/// Connection settings for one role.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Database configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfig {
    /// Read/write connection.
    #[serde(default)]
    pub master: ConnectionConfig,

    /// Optional read-only connection, usually a replica.
    #[serde(default)]
    pub slave: Option<ConnectionConfig>,
}

/// Job runner thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct JobRunnerConfig {
    /// Pause a run after this many seconds.
    #[serde(default)]
    pub max_execution_time_secs: Option<u64>,

    /// Pause a run after this many jobs.
    #[serde(default = "default_pause_after_jobs")]
    pub pause_after_jobs: u32,

    /// Time between runs when serving.
    #[serde(default = "default_idle_sleep_ms")]
    pub idle_sleep_ms: u64,
}

/// Background retention task configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Time in seconds between retention sweeps.
    #[serde(default = "default_retention_interval_seconds")]
    pub interval_seconds: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "authledger_jobs=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_user_id_attribute_name() -> String {
    "hrEduPersonPersistentID".to_string()
}

fn default_tracker() -> TrackerKind {
    TrackerKind::Versioned
}

fn default_db_path() -> String {
    "authledger.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    DbRuntimeSettings::default().busy_timeout_ms
}

fn default_pool_max_size() -> u32 {
    DbRuntimeSettings::default().pool_max_size
}

fn default_pause_after_jobs() -> u32 {
    10
}

fn default_idle_sleep_ms() -> u64 {
    1_000
}

fn default_retention_interval_seconds() -> u64 {
    3_600
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            processing_type: ProcessingType::default(),
            user_id_attribute_name: default_user_id_attribute_name(),
            default_tracker: default_tracker(),
            additional_trackers: Vec::new(),
            retention_days: None,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for JobRunnerConfig {
    fn default() -> Self {
        Self {
            max_execution_time_secs: None,
            pause_after_jobs: default_pause_after_jobs(),
            idle_sleep_ms: default_idle_sleep_ms(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_retention_interval_seconds(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AccountingConfig {
    /// The default tracker followed by the additional ones.
    pub fn tracker_kinds(&self) -> Vec<TrackerKind> {
        let mut kinds = vec![self.default_tracker];
        kinds.extend(self.additional_trackers.iter().copied());
        kinds
    }

    /// Retention interval, if retention is enabled.
    pub fn retention(&self) -> Option<chrono::Duration> {
        self.retention_days
            .map(|days| chrono::Duration::days(i64::from(days)))
    }
}

impl ConnectionConfig {
    pub fn runtime_settings(&self) -> DbRuntimeSettings {
        DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
        }
    }
}

impl DatabaseConfig {
    /// Opens the master pool and, when configured, the slave pool.
    ///
    /// # Errors
    ///
    /// Returns `PoolError` if a pool cannot be created.
    pub fn connect(&self) -> Result<Connections, PoolError> {
        let master = create_pool(&self.master.path, self.master.runtime_settings())?;

        match &self.slave {
            Some(slave) => {
                let slave = create_pool(&slave.path, slave.runtime_settings())?;
                Ok(Connections::with_slave(master, slave))
            }
            None => Ok(Connections::new(master)),
        }
    }
}

impl JobRunnerConfig {
    pub fn limits(&self) -> RunnerLimits {
        RunnerLimits {
            max_execution_time: self.max_execution_time_secs.map(Duration::from_secs),
            pause_after_jobs: Some(self.pause_after_jobs),
        }
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range or inconsistent with another value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Checks values that deserialization alone cannot rule out.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.accounting.user_id_attribute_name.trim().is_empty() {
            return invalid("accounting.user_id_attribute_name must not be empty");
        }
        if self
            .accounting
            .additional_trackers
            .contains(&self.accounting.default_tracker)
        {
            return invalid("accounting.additional_trackers must not repeat the default tracker");
        }
        let mut seen = Vec::new();
        for kind in &self.accounting.additional_trackers {
            if seen.contains(kind) {
                return invalid("accounting.additional_trackers contains duplicates");
            }
            seen.push(*kind);
        }
        if let Some(days) = self.accounting.retention_days {
            if days == 0 || days > MAX_RETENTION_DAYS {
                return Err(ConfigError::Invalid(format!(
                    "accounting.retention_days must be between 1 and {MAX_RETENTION_DAYS} when set"
                )));
            }
        }

        for (role, connection) in std::iter::once(("master", &self.database.master))
            .chain(self.database.slave.iter().map(|slave| ("slave", slave)))
        {
            if connection.path.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "database.{role}.path must not be empty"
                )));
            }
            if connection.pool_max_size == 0 {
                return Err(ConfigError::Invalid(format!(
                    "database.{role}.pool_max_size must be at least 1"
                )));
            }
        }

        if self.job_runner.pause_after_jobs == 0 {
            return invalid("job_runner.pause_after_jobs must be at least 1");
        }
        if self.job_runner.max_execution_time_secs == Some(0) {
            return invalid("job_runner.max_execution_time_secs must be at least 1 when set");
        }
        if self.retention.interval_seconds == 0 {
            return invalid("retention.interval_seconds must be at least 1");
        }

        Ok(())
    }
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies environment overrides and validates the result.
///
/// Environment variable overrides:
/// - `AUTHLEDGER_PROCESSING_TYPE` overrides `accounting.processing_type`
/// - `AUTHLEDGER_RETENTION_DAYS` overrides `accounting.retention_days`
/// - `AUTHLEDGER_DB_PATH` overrides `database.master.path`
/// - `AUTHLEDGER_SLAVE_DB_PATH` sets `database.slave.path`
/// - `AUTHLEDGER_LOG_LEVEL` overrides `logging.level`
/// - `AUTHLEDGER_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// or if the resulting configuration is invalid.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    config.validate()?;

    Ok(config)
}

/// Applies `AUTHLEDGER_*` overrides read through `lookup`.
///
/// # Errors
///
/// Returns `ConfigError::Invalid` if an override cannot be parsed.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(processing_type) = lookup("AUTHLEDGER_PROCESSING_TYPE") {
        config.accounting.processing_type = processing_type.parse()?;
    }
    if let Some(days) = lookup("AUTHLEDGER_RETENTION_DAYS") {
        config.accounting.retention_days = Some(days.parse().map_err(|_| {
            ConfigError::Invalid(format!("AUTHLEDGER_RETENTION_DAYS is not a number: '{days}'"))
        })?);
    }
    if let Some(db_path) = lookup("AUTHLEDGER_DB_PATH") {
        config.database.master.path = db_path;
    }
    if let Some(db_path) = lookup("AUTHLEDGER_SLAVE_DB_PATH") {
        config
            .database
            .slave
            .get_or_insert_with(ConnectionConfig::default)
            .path = db_path;
    }
    if let Some(level) = lookup("AUTHLEDGER_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("AUTHLEDGER_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse(toml_text: &str) -> Config {
        toml::from_str(toml_text).expect("config should parse")
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().expect("defaults should validate");

        assert_eq!(config.accounting.processing_type, ProcessingType::Synchronous);
        assert_eq!(config.accounting.user_id_attribute_name, "hrEduPersonPersistentID");
        assert_eq!(config.accounting.tracker_kinds(), vec![TrackerKind::Versioned]);
        assert_eq!(config.accounting.retention(), None);
        assert_eq!(config.job_runner.limits().pause_after_jobs, Some(10));
        assert!(config.database.slave.is_none());
    }

    #[test]
    fn full_file_parses() {
        let config = parse(
            r#"
            [accounting]
            processing_type = "asynchronous"
            user_id_attribute_name = "uid"
            default_tracker = "current"
            additional_trackers = ["versioned"]
            retention_days = 90

            [database.master]
            path = "/var/lib/authledger/master.db"
            busy_timeout_ms = 2000

            [database.slave]
            path = "/var/lib/authledger/replica.db"

            [job_runner]
            max_execution_time_secs = 60
            pause_after_jobs = 500

            [logging]
            level = "debug"
            json = true
            "#,
        );
        config.validate().expect("config should validate");

        assert_eq!(config.accounting.processing_type, ProcessingType::Asynchronous);
        assert_eq!(
            config.accounting.tracker_kinds(),
            vec![TrackerKind::Current, TrackerKind::Versioned]
        );
        assert_eq!(config.accounting.retention(), Some(chrono::Duration::days(90)));
        assert_eq!(config.database.master.busy_timeout_ms, 2000);
        assert_eq!(config.database.master.pool_max_size, 8);
        assert_eq!(
            config.database.slave.as_ref().map(|s| s.path.as_str()),
            Some("/var/lib/authledger/replica.db")
        );
        assert_eq!(
            config.job_runner.limits().max_execution_time,
            Some(Duration::from_secs(60))
        );
        assert!(config.logging.json);
    }

    #[test]
    fn inconsistent_values_are_rejected() {
        for toml_text in [
            "[job_runner]\npause_after_jobs = 0",
            "[accounting]\ndefault_tracker = \"current\"\nadditional_trackers = [\"current\"]",
            "[accounting]\nadditional_trackers = [\"current\", \"current\"]",
            "[accounting]\nretention_days = 0",
            "[accounting]\nretention_days = 4294967295",
            "[accounting]\nuser_id_attribute_name = \"\"",
            "[database.slave]\npath = \"\"",
            "[retention]\ninterval_seconds = 0",
        ] {
            let result = parse(toml_text).validate();
            assert!(
                matches!(result, Err(ConfigError::Invalid(_))),
                "should reject: {toml_text}"
            );
        }
    }

    #[test]
    fn longest_retention_is_accepted_and_yields_a_cutoff() {
        let config = parse(&format!("[accounting]\nretention_days = {MAX_RETENTION_DAYS}"));
        config.validate().expect("upper bound should be valid");

        let retention = config.accounting.retention().expect("retention should be set");
        assert!(authledger_store::retention_cutoff(retention).is_ok());
    }

    #[test]
    fn unknown_enum_values_fail_to_parse() {
        let result: Result<Config, _> = toml::from_str("[accounting]\nprocessing_type = \"batch\"");
        assert!(result.is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("AUTHLEDGER_PROCESSING_TYPE", "asynchronous"),
            ("AUTHLEDGER_RETENTION_DAYS", "30"),
            ("AUTHLEDGER_DB_PATH", "/tmp/master.db"),
            ("AUTHLEDGER_SLAVE_DB_PATH", "/tmp/replica.db"),
            ("AUTHLEDGER_LOG_JSON", "1"),
        ]);
        let mut config = Config::default();

        apply_env_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()))
            .expect("overrides should apply");

        assert_eq!(config.accounting.processing_type, ProcessingType::Asynchronous);
        assert_eq!(config.accounting.retention_days, Some(30));
        assert_eq!(config.database.master.path, "/tmp/master.db");
        assert_eq!(
            config.database.slave.map(|s| s.path),
            Some("/tmp/replica.db".to_string())
        );
        assert!(config.logging.json);
    }

    #[test]
    fn bad_env_override_is_invalid() {
        let mut config = Config::default();
        let result = apply_env_overrides(&mut config, |key| {
            (key == "AUTHLEDGER_RETENTION_DAYS").then(|| "ninety".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str()).expect("missing file is not an error");
        config.validate().expect("config should validate");
    }
}
