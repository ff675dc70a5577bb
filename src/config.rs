//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub hotel_api: HotelApiConfig,
    pub tracker: TrackerConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Public hotel API client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HotelApiConfig {
    /// Request timeout in seconds
    pub request_timeout_seconds: u64,
    /// User-Agent header sent with every request
    pub user_agent: String,
}

/// Change-detection pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Default number of queue items leased per cycle
    pub batch_size: u32,
    /// Number of concurrent workers per cycle (kept small to respect
    /// third-party rate limits)
    pub concurrency: usize,
    /// Attempts before a queue item becomes terminal failed
    pub max_attempts: i64,
    /// Seconds after which a processing lease is considered abandoned
    pub lease_timeout_seconds: i64,
    /// Base for the exponential retry backoff, in seconds
    pub backoff_base_seconds: i64,
    /// Delay between items on the same worker, in milliseconds
    pub inter_item_delay_ms: u64,
    /// Trailing window for photo_posted activities, in hours
    pub photo_window_hours: i64,
    /// Run process_queue cycles on an interval inside this process.
    /// Leave disabled when an external cron drives POST /tracker.
    pub scheduler_enabled: bool,
    /// Interval between scheduled cycles in seconds
    pub scheduler_interval_seconds: u64,
}

impl TrackerConfig {
    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.inter_item_delay_ms)
    }

    pub fn lease_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lease_timeout_seconds)
    }

    pub fn photo_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.photo_window_hours)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (HABWATCH_*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.path", "data/habwatch.db")?
            .set_default("hotel_api.request_timeout_seconds", 15)?
            .set_default("hotel_api.user_agent", "habwatch/0.1.0")?
            .set_default("tracker.batch_size", 20)?
            .set_default("tracker.concurrency", 3)?
            .set_default("tracker.max_attempts", 3)?
            .set_default("tracker.lease_timeout_seconds", 300)?
            .set_default("tracker.backoff_base_seconds", 60)?
            .set_default("tracker.inter_item_delay_ms", 500)?
            .set_default("tracker.photo_window_hours", 24)?
            .set_default("tracker.scheduler_enabled", false)?
            .set_default("tracker.scheduler_interval_seconds", 900)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (HABWATCH_*)
            .add_source(
                Environment::with_prefix("HABWATCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        if self.tracker.concurrency == 0 {
            return Err(crate::error::AppError::Config(
                "tracker.concurrency must be greater than 0".to_string(),
            ));
        }

        if self.tracker.batch_size == 0 {
            return Err(crate::error::AppError::Config(
                "tracker.batch_size must be greater than 0".to_string(),
            ));
        }

        if self.tracker.max_attempts <= 0 {
            return Err(crate::error::AppError::Config(
                "tracker.max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.tracker.lease_timeout_seconds <= 0 {
            return Err(crate::error::AppError::Config(
                "tracker.lease_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.tracker.scheduler_enabled && self.tracker.scheduler_interval_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "tracker.scheduler_interval_seconds must be greater than 0 when the scheduler is enabled"
                    .to_string(),
            ));
        }

        Ok(())
    }
}
