use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub hass: HomeAssistantConfig,
    pub entities: EntityConfig,
    pub controller: ControllerSettings,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
}

/// Home Assistant REST API configuration
#[derive(Debug, Clone)]
pub struct HomeAssistantConfig {
    pub base_url: String,
    pub token: String,
}

/// Entity ids the controller reads from and actuates
#[derive(Debug, Clone, PartialEq)]
pub struct EntityConfig {
    pub pump: String,
    pub pool_sensor: String,
    pub return_sensor: String,
    pub weather: String,
    pub sun: String,
    pub uv_sensor: Option<String>,
    pub wind_sensor: Option<String>,
    pub ambient_temp_sensor: Option<String>,
    pub cloud_coverage_sensor: Option<String>,
}

/// Operator-adjustable controller settings.
///
/// Sweep duration, maximum pool temperature and cycle interval may be
/// changed at runtime; every update goes through [`ControllerSettings::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerSettings {
    /// Upper bound on a sweep, in seconds (60-600)
    pub sweep_duration_secs: u64,
    /// Pool temperature at which heating stops, in °C (20-40)
    pub max_pool_temp: f64,
    /// Minutes between periodic cycles (5-120)
    pub cycle_interval_minutes: u64,
    /// Minimum continuous pump run before an OFF is honoured (1-60)
    pub min_run_minutes: u64,
    /// Delay before the first cycle after startup (0-3600)
    pub startup_delay_secs: u64,
}

pub const SWEEP_DURATION_RANGE: (u64, u64) = (60, 600);
pub const MAX_POOL_TEMP_RANGE: (f64, f64) = (20.0, 40.0);
pub const CYCLE_INTERVAL_RANGE: (u64, u64) = (5, 120);
pub const MIN_RUN_RANGE: (u64, u64) = (1, 60);
pub const STARTUP_DELAY_RANGE: (u64, u64) = (0, 3600);

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            sweep_duration_secs: 180,
            max_pool_temp: 32.0,
            cycle_interval_minutes: 10,
            min_run_minutes: 10,
            startup_delay_secs: 10,
        }
    }
}

impl ControllerSettings {
    /// Reject values outside the operator ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "SWEEP_DURATION_SECS",
            self.sweep_duration_secs as f64,
            SWEEP_DURATION_RANGE.0 as f64,
            SWEEP_DURATION_RANGE.1 as f64,
        )?;
        check_range(
            "MAX_POOL_TEMP",
            self.max_pool_temp,
            MAX_POOL_TEMP_RANGE.0,
            MAX_POOL_TEMP_RANGE.1,
        )?;
        check_range(
            "CYCLE_INTERVAL_MINUTES",
            self.cycle_interval_minutes as f64,
            CYCLE_INTERVAL_RANGE.0 as f64,
            CYCLE_INTERVAL_RANGE.1 as f64,
        )?;
        check_range(
            "MIN_RUN_MINUTES",
            self.min_run_minutes as f64,
            MIN_RUN_RANGE.0 as f64,
            MIN_RUN_RANGE.1 as f64,
        )?;
        check_range(
            "STARTUP_DELAY_SECS",
            self.startup_delay_secs as f64,
            STARTUP_DELAY_RANGE.0 as f64,
            STARTUP_DELAY_RANGE.1 as f64,
        )?;
        Ok(())
    }

    /// Re-read settings for a running controller. A changed `.env` file
    /// overrides values already in the process environment.
    pub fn reload() -> Self {
        // Missing .env is fine; the process environment still applies
        let _ = dotenvy::dotenv_override();
        Self::from_env()
    }

    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sweep_duration_secs: parse_env("SWEEP_DURATION_SECS")
                .unwrap_or(defaults.sweep_duration_secs),
            max_pool_temp: parse_env("MAX_POOL_TEMP").unwrap_or(defaults.max_pool_temp),
            cycle_interval_minutes: parse_env("CYCLE_INTERVAL_MINUTES")
                .unwrap_or(defaults.cycle_interval_minutes),
            min_run_minutes: parse_env("MIN_RUN_MINUTES").unwrap_or(defaults.min_run_minutes),
            startup_delay_secs: parse_env("STARTUP_DELAY_SECS")
                .unwrap_or(defaults.startup_delay_secs),
        }
    }
}

fn check_range(name: &str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value.is_nan() || value < min || value > max {
        return Err(ConfigError::OutOfRange {
            name: name.to_string(),
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let hass = HomeAssistantConfig {
            token: required("HASS_TOKEN")?,
            base_url: env::var("HASS_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8123".to_string()),
        };

        let entities = EntityConfig {
            pump: required("PUMP_ENTITY_ID")?,
            pool_sensor: required("POOL_SENSOR_ID")?,
            return_sensor: required("RETURN_SENSOR_ID")?,
            weather: required("WEATHER_ENTITY_ID")?,
            sun: env::var("SUN_ENTITY_ID").unwrap_or_else(|_| "sun.sun".to_string()),
            uv_sensor: optional("UV_SENSOR_ID"),
            wind_sensor: optional("WIND_SENSOR_ID"),
            ambient_temp_sensor: optional("AMBIENT_TEMP_SENSOR_ID"),
            cloud_coverage_sensor: optional("CLOUD_COVERAGE_SENSOR_ID"),
        };

        let controller = ControllerSettings::from_env();
        controller.validate()?;

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/solarpool.db".to_string()),
            ),
            max_connections: parse_env("DATABASE_MAX_CONNECTIONS").unwrap_or(5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: parse_env("REQUEST_TIMEOUT_MS").unwrap_or(10000),
            max_retries: parse_env("MAX_RETRIES").unwrap_or(2),
            retry_delay_ms: parse_env("RETRY_DELAY_MS").unwrap_or(500),
        };

        Ok(Config {
            hass,
            entities,
            controller,
            database,
            logging,
            request,
        })
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10000,
            max_retries: 2,
            retry_delay_ms: 500,
        }
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::Missing {
            name: name.to_string(),
        })
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
