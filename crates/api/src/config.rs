use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use vimax_core::batch::DEFAULT_MAX_CONCURRENT_BATCHES;

use crate::engine::service::EngineSettings;

/// Longest accepted cache TTL (100 years).
pub const MAX_CACHE_TTL_DAYS: i64 = 36_500;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var} ('{value}'): {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Upper bound on post-shutdown cleanup, in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    pub database_url: String,
    /// Root of per-job output directories, served under `/videos`.
    pub videos_dir: PathBuf,
    /// Cache-owned artifact storage, served under `/cache`.
    pub cache_dir: PathBuf,
    pub cache_ttl_days: i64,
    /// Period of the background cache sweep; `0` disables it.
    pub cache_sweep_interval_secs: u64,
    pub max_concurrent_batches: usize,
    pub heartbeat_interval_secs: u64,
    /// Command line of the external pipeline program, if any.
    pub pipeline_command: Option<String>,
    pub pipeline_timeout_secs: Option<u64>,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_origins: vec!["http://localhost:3000".to_string()],
            request_timeout_secs: 30,
            shutdown_timeout_secs: 30,
            database_url: "sqlite://vimax.db".to_string(),
            videos_dir: PathBuf::from("videos"),
            cache_dir: PathBuf::from("cache"),
            cache_ttl_days: 7,
            cache_sweep_interval_secs: 3600,
            max_concurrent_batches: DEFAULT_MAX_CONCURRENT_BATCHES,
            heartbeat_interval_secs: 30,
            pipeline_command: None,
            pipeline_timeout_secs: None,
            log_format: LogFormat::Text,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                  |
    /// |-----------------------------|--------------------------|
    /// | `HOST`                      | `0.0.0.0`                |
    /// | `PORT`                      | `3000`                   |
    /// | `CORS_ORIGINS`              | `http://localhost:3000`  |
    /// | `REQUEST_TIMEOUT_SECS`      | `30`                     |
    /// | `SHUTDOWN_TIMEOUT_SECS`     | `30`                     |
    /// | `DATABASE_URL`              | `sqlite://vimax.db`      |
    /// | `VIDEOS_DIR`                | `videos`                 |
    /// | `CACHE_DIR`                 | `cache`                  |
    /// | `CACHE_TTL_DAYS`            | `7`                      |
    /// | `CACHE_SWEEP_INTERVAL_SECS` | `3600`                   |
    /// | `MAX_CONCURRENT_BATCHES`    | `2`                      |
    /// | `HEARTBEAT_INTERVAL_SECS`   | `30`                     |
    /// | `PIPELINE_COMMAND`          | unset                    |
    /// | `PIPELINE_TIMEOUT_SECS`     | unset                    |
    /// | `LOG_FORMAT`                | `text`                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let cors_origins = std::env::var("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.cors_origins);

        let config = Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: parse_var("PORT", defaults.port)?,
            cors_origins,
            request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?,
            shutdown_timeout_secs: parse_var("SHUTDOWN_TIMEOUT_SECS", defaults.shutdown_timeout_secs)?,
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            videos_dir: std::env::var("VIDEOS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.videos_dir),
            cache_dir: std::env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            cache_ttl_days: parse_var("CACHE_TTL_DAYS", defaults.cache_ttl_days)?,
            cache_sweep_interval_secs: parse_var(
                "CACHE_SWEEP_INTERVAL_SECS",
                defaults.cache_sweep_interval_secs,
            )?,
            max_concurrent_batches: parse_var(
                "MAX_CONCURRENT_BATCHES",
                defaults.max_concurrent_batches,
            )?,
            heartbeat_interval_secs: parse_var(
                "HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval_secs,
            )?,
            pipeline_command: std::env::var("PIPELINE_COMMAND")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            pipeline_timeout_secs: parse_optional_var("PIPELINE_TIMEOUT_SECS")?,
            log_format: parse_var("LOG_FORMAT", defaults.log_format)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_ttl_days <= 0 {
            return Err(invalid("CACHE_TTL_DAYS", self.cache_ttl_days, "must be positive"));
        }
        if self.cache_ttl_days > MAX_CACHE_TTL_DAYS {
            return Err(invalid(
                "CACHE_TTL_DAYS",
                self.cache_ttl_days,
                &format!("must be at most {MAX_CACHE_TTL_DAYS}"),
            ));
        }
        if self.max_concurrent_batches == 0 {
            return Err(invalid("MAX_CONCURRENT_BATCHES", 0, "must be at least 1"));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(invalid("HEARTBEAT_INTERVAL_SECS", 0, "must be at least 1"));
        }
        Ok(())
    }

    /// Settings consumed by the generation engine.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            videos_dir: self.videos_dir.clone(),
            cache_dir: self.cache_dir.clone(),
            cache_ttl: chrono::Duration::days(self.cache_ttl_days),
            max_concurrent_batches: self.max_concurrent_batches,
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
        }
    }

    /// `None` when the periodic sweep is disabled.
    pub fn cache_sweep_interval(&self) -> Option<Duration> {
        (self.cache_sweep_interval_secs > 0)
            .then(|| Duration::from_secs(self.cache_sweep_interval_secs))
    }

    pub fn pipeline_timeout(&self) -> Option<Duration> {
        self.pipeline_timeout_secs.map(Duration::from_secs)
    }
}

fn invalid(var: &'static str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_var<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(var, &raw, &e.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_optional_var<T>(var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| invalid(var, &raw, &e.to_string())),
        _ => Ok(None),
    }
}
