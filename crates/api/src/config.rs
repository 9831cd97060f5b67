//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use hierarchy::EngineConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Plain,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" | "text" | "pretty" => Ok(LogFormat::Plain),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `plain` or `json` (default: `plain`)
/// - `DATABASE_URL`: PostgreSQL store when set, in-memory store otherwise
/// - `BULK_CHUNK_SIZE`: items per bulk commit (default: `50`)
/// - `BULK_MAX_ITEMS`: largest bulk payload (default: `1000`)
/// - `SLUG_SUGGESTIONS`: alternatives offered for a taken slug (default: `5`)
/// - `REPAIR_INTERVAL_SECS`: scheduled validate-and-repair, `0` disables it
///   (default: `0`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub bulk_chunk_size: usize,
    pub bulk_max_items: usize,
    pub slug_suggestions: usize,
    pub repair_interval_secs: u64,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: env_or("LOG_FORMAT", defaults.log_format),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            bulk_chunk_size: env_or("BULK_CHUNK_SIZE", defaults.bulk_chunk_size).max(1),
            bulk_max_items: env_or("BULK_MAX_ITEMS", defaults.bulk_max_items).max(1),
            slug_suggestions: env_or("SLUG_SUGGESTIONS", defaults.slug_suggestions),
            repair_interval_secs: env_or("REPAIR_INTERVAL_SECS", defaults.repair_interval_secs),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Engine tuning derived from this configuration.
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            bulk_chunk_size: self.bulk_chunk_size,
            bulk_max_items: self.bulk_max_items,
            slug_suggestions: self.slug_suggestions,
        }
    }

    /// Interval of the scheduled repair task, if enabled.
    pub fn repair_interval(&self) -> Option<Duration> {
        (self.repair_interval_secs > 0).then(|| Duration::from_secs(self.repair_interval_secs))
    }
}

impl Default for Config {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Plain,
            database_url: None,
            bulk_chunk_size: engine.bulk_chunk_size,
            bulk_max_items: engine.bulk_max_items,
            slug_suggestions: engine.slug_suggestions,
            repair_interval_secs: 0,
        }
    }
}
