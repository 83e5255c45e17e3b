//! Config environment variable tests
//!
//! These tests verify that Config::from_env() correctly reads required
//! entity ids, applies overrides and rejects out-of-range settings.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use serial_test::serial;
use std::env;

use solarpool_controller::config::{Config, ControllerSettings, LogFormat};
use solarpool_controller::error::ConfigError;

const REQUIRED: [(&str, &str); 5] = [
    ("HASS_TOKEN", "test-token"),
    ("PUMP_ENTITY_ID", "switch.pool_pump"),
    ("POOL_SENSOR_ID", "sensor.pool_temp"),
    ("RETURN_SENSOR_ID", "sensor.solar_return"),
    ("WEATHER_ENTITY_ID", "weather.home"),
];

const OVERRIDES: [&str; 15] = [
    "HASS_BASE_URL",
    "SUN_ENTITY_ID",
    "UV_SENSOR_ID",
    "WIND_SENSOR_ID",
    "SWEEP_DURATION_SECS",
    "MAX_POOL_TEMP",
    "CYCLE_INTERVAL_MINUTES",
    "MIN_RUN_MINUTES",
    "STARTUP_DELAY_SECS",
    "DATABASE_PATH",
    "DATABASE_MAX_CONNECTIONS",
    "LOG_FORMAT",
    "REQUEST_TIMEOUT_MS",
    "MAX_RETRIES",
    "RETRY_DELAY_MS",
];

fn set_required() {
    for (name, value) in REQUIRED {
        env::set_var(name, value);
    }
}

fn clear_all() {
    for (name, _) in REQUIRED {
        env::remove_var(name);
    }
    for name in OVERRIDES {
        env::remove_var(name);
    }
}

#[test]
#[serial]
fn test_config_from_env_loads_successfully() {
    clear_all();
    set_required();

    let config = Config::from_env().expect("config should load");
    assert_eq!(config.hass.token, "test-token");
    assert_eq!(config.hass.base_url, "http://localhost:8123");
    assert_eq!(config.entities.pump, "switch.pool_pump");
    assert_eq!(config.entities.sun, "sun.sun");
    assert_eq!(config.entities.uv_sensor, None);
    assert_eq!(config.controller.cycle_interval_minutes, 10);
    assert_eq!(config.logging.format, LogFormat::Pretty);

    clear_all();
}

#[test]
#[serial]
fn test_config_missing_pump_entity() {
    clear_all();
    set_required();
    env::remove_var("PUMP_ENTITY_ID");

    let result = Config::from_env();
    assert!(matches!(
        result,
        Err(ConfigError::Missing { ref name }) if name == "PUMP_ENTITY_ID"
    ));

    clear_all();
}

#[test]
#[serial]
fn test_config_blank_token_is_missing() {
    clear_all();
    set_required();
    env::set_var("HASS_TOKEN", "   ");

    assert!(matches!(
        Config::from_env(),
        Err(ConfigError::Missing { ref name }) if name == "HASS_TOKEN"
    ));

    clear_all();
}

#[test]
#[serial]
fn test_config_optional_entities() {
    clear_all();
    set_required();
    env::set_var("UV_SENSOR_ID", "sensor.uv");
    env::set_var("WIND_SENSOR_ID", "sensor.wind");
    env::set_var("SUN_ENTITY_ID", "sun.backyard");

    let config = Config::from_env().unwrap();
    assert_eq!(config.entities.uv_sensor.as_deref(), Some("sensor.uv"));
    assert_eq!(config.entities.wind_sensor.as_deref(), Some("sensor.wind"));
    assert_eq!(config.entities.sun, "sun.backyard");

    clear_all();
}

#[test]
#[serial]
fn test_config_controller_overrides() {
    clear_all();
    set_required();
    env::set_var("SWEEP_DURATION_SECS", "240");
    env::set_var("MAX_POOL_TEMP", "30.5");
    env::set_var("CYCLE_INTERVAL_MINUTES", "15");

    let config = Config::from_env().unwrap();
    assert_eq!(config.controller.sweep_duration_secs, 240);
    assert_eq!(config.controller.max_pool_temp, 30.5);
    assert_eq!(config.controller.cycle_interval_minutes, 15);

    clear_all();
}

#[test]
#[serial]
fn test_config_rejects_out_of_range_interval() {
    clear_all();
    set_required();
    env::set_var("CYCLE_INTERVAL_MINUTES", "2");

    assert!(matches!(
        Config::from_env(),
        Err(ConfigError::OutOfRange { ref name, .. }) if name == "CYCLE_INTERVAL_MINUTES"
    ));

    clear_all();
}

#[test]
#[serial]
fn test_config_from_env_custom_database() {
    clear_all();
    set_required();
    env::set_var("DATABASE_PATH", "/custom/path.db");
    env::set_var("DATABASE_MAX_CONNECTIONS", "10");

    let config = Config::from_env().unwrap();
    assert_eq!(config.database.path.to_str().unwrap(), "/custom/path.db");
    assert_eq!(config.database.max_connections, 10);

    clear_all();
}

#[test]
#[serial]
fn test_config_from_env_json_log_format() {
    clear_all();
    set_required();
    env::set_var("LOG_FORMAT", "JSON");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);

    clear_all();
}

#[test]
#[serial]
fn test_config_from_env_custom_request() {
    clear_all();
    set_required();
    env::set_var("REQUEST_TIMEOUT_MS", "60000");
    env::set_var("MAX_RETRIES", "5");
    env::set_var("RETRY_DELAY_MS", "2000");

    let config = Config::from_env().unwrap();
    assert_eq!(config.request.timeout_ms, 60000);
    assert_eq!(config.request.max_retries, 5);
    assert_eq!(config.request.retry_delay_ms, 2000);

    clear_all();
}

#[test]
#[serial]
fn test_config_rejects_absurd_startup_delay() {
    clear_all();
    set_required();
    env::set_var("STARTUP_DELAY_SECS", "99999999999");

    assert!(matches!(
        Config::from_env(),
        Err(ConfigError::OutOfRange { ref name, .. }) if name == "STARTUP_DELAY_SECS"
    ));

    clear_all();
}

#[test]
#[serial]
fn test_controller_settings_reload_sees_new_values() {
    clear_all();
    set_required();
    let initial = Config::from_env().unwrap().controller;
    assert_eq!(initial.max_pool_temp, 32.0);

    env::set_var("MAX_POOL_TEMP", "28.5");
    env::set_var("MIN_RUN_MINUTES", "15");
    let reloaded = ControllerSettings::reload();
    assert_eq!(reloaded.max_pool_temp, 28.5);
    assert_eq!(reloaded.min_run_minutes, 15);
    assert!(reloaded.validate().is_ok());

    clear_all();
}
