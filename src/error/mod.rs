use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Home Assistant error: {0}")]
    Hass(#[from] HassError),

    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is required")]
    Missing { name: String },

    #[error("{name} = {value} is outside the allowed range {min}..={max}")]
    OutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Corrupt persisted state: {message}")]
    Corrupt { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Sensor read failures. "No data" is never reported as a numeric zero.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SensorError {
    #[error("Entity not found: {entity_id}")]
    NotFound { entity_id: String },

    #[error("Sensor unavailable: {entity_id}")]
    Unavailable { entity_id: String },

    #[error("Unparseable value for {entity_id}: {raw}")]
    Unparseable { entity_id: String, raw: String },

    #[error("Sensor transport failed for {entity_id}: {message}")]
    Transport { entity_id: String, message: String },
}

impl SensorError {
    /// Entity the failure refers to.
    pub fn entity_id(&self) -> &str {
        match self {
            SensorError::NotFound { entity_id }
            | SensorError::Unavailable { entity_id }
            | SensorError::Unparseable { entity_id, .. }
            | SensorError::Transport { entity_id, .. } => entity_id,
        }
    }
}

/// Pump actuator command failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActuatorError {
    #[error("Pump command {command} failed for {entity_id}: {message}")]
    CommandFailed {
        entity_id: String,
        command: String,
        message: String,
    },
}

/// Home Assistant REST errors
#[derive(Debug, Error)]
pub enum HassError {
    #[error("Home Assistant unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for Home Assistant operations
pub type HassResult<T> = Result<T, HassError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Missing {
            name: "HASS_TOKEN".to_string(),
        };
        assert_eq!(err.to_string(), "HASS_TOKEN is required");

        let err = ConfigError::OutOfRange {
            name: "SWEEP_DURATION_SECS".to_string(),
            value: 30.0,
            min: 60.0,
            max: 600.0,
        };
        assert_eq!(
            err.to_string(),
            "SWEEP_DURATION_SECS = 30 is outside the allowed range 60..=600"
        );
    }

    #[test]
    fn test_sensor_error_display() {
        let err = SensorError::Unavailable {
            entity_id: "sensor.pool".to_string(),
        };
        assert_eq!(err.to_string(), "Sensor unavailable: sensor.pool");
        assert_eq!(err.entity_id(), "sensor.pool");

        let err = SensorError::Unparseable {
            entity_id: "sensor.return".to_string(),
            raw: "warm".to_string(),
        };
        assert_eq!(err.to_string(), "Unparseable value for sensor.return: warm");
        assert_eq!(err.entity_id(), "sensor.return");
    }

    #[test]
    fn test_actuator_error_display() {
        let err = ActuatorError::CommandFailed {
            entity_id: "switch.pump".to_string(),
            command: "turn_on".to_string(),
            message: "timeout".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Pump command turn_on failed for switch.pump: timeout"
        );
    }

    #[test]
    fn test_hass_error_display() {
        let err = HassError::Unavailable {
            message: "connection refused".to_string(),
            retries: 2,
        };
        assert_eq!(
            err.to_string(),
            "Home Assistant unavailable: connection refused (retries: 2)"
        );

        let err = HassError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 401 - unauthorized");

        let err = HassError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_storage_error_conversion_to_app_error() {
        let storage_err = StorageError::Corrupt {
            message: "bad json".to_string(),
        };
        let app_err: AppError = storage_err.into();
        assert!(matches!(app_err, AppError::Storage(_)));
    }

    #[test]
    fn test_config_error_conversion_to_app_error() {
        let err: AppError = ConfigError::Missing {
            name: "PUMP_ENTITY_ID".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::Config(_)));
        assert_eq!(err.to_string(), "Configuration error: PUMP_ENTITY_ID is required");
    }
}
