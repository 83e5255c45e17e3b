//! Integration tests for the Home Assistant adapter
//!
//! Tests HTTP client behavior using wiremock for request/response mocking.

use serde_json::json;
use wiremock::{
    matchers::{body_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use solarpool_controller::config::{EntityConfig, HomeAssistantConfig, RequestConfig};
use solarpool_controller::error::{ActuatorError, HassError, SensorError};
use solarpool_controller::hass::{
    ActuatorControl, EnvironmentQuery, HomeAssistantClient, PumpState, SensorReader,
};

fn test_entities() -> EntityConfig {
    EntityConfig {
        pump: "switch.pool_pump".to_string(),
        pool_sensor: "sensor.pool_temp".to_string(),
        return_sensor: "sensor.return_temp".to_string(),
        weather: "weather.home".to_string(),
        sun: "sun.sun".to_string(),
        uv_sensor: None,
        wind_sensor: None,
        ambient_temp_sensor: None,
        cloud_coverage_sensor: None,
    }
}

/// Create a test client pointing to mock server
fn create_test_client(base_url: &str, max_retries: u32) -> HomeAssistantClient {
    let config = HomeAssistantConfig {
        base_url: base_url.to_string(),
        token: "test-token".to_string(),
    };

    let request_config = RequestConfig {
        timeout_ms: 5000,
        max_retries,
        retry_delay_ms: 10,
    };

    HomeAssistantClient::new(&config, test_entities(), request_config)
        .expect("Failed to create client")
}

fn entity(entity_id: &str, state: &str) -> serde_json::Value {
    json!({
        "entity_id": entity_id,
        "state": state,
        "attributes": {},
        "last_changed": "2024-06-01T12:00:00+00:00"
    })
}

#[cfg(test)]
mod sensor_tests {
    use super::*;

    #[tokio::test]
    async fn test_read_numeric_sensor() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/states/sensor.pool_temp"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(entity("sensor.pool_temp", "26.4")),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let value = client.read("sensor.pool_temp").await;

        assert_eq!(value, Ok(26.4));
    }

    #[tokio::test]
    async fn test_unavailable_sensor_is_not_zero() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/states/sensor.return_temp"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(entity("sensor.return_temp", "unavailable")),
            )
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let result = client.read("sensor.return_temp").await;

        assert_eq!(
            result,
            Err(SensorError::Unavailable {
                entity_id: "sensor.return_temp".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_garbage_sensor_state() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/states/sensor.pool_temp"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(entity("sensor.pool_temp", "warm-ish")),
            )
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let result = client.read("sensor.pool_temp").await;

        assert!(matches!(result, Err(SensorError::Unparseable { .. })));
    }

    #[tokio::test]
    async fn test_missing_entity_is_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/states/sensor.missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Entity not found."))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 3);
        let result = client.read("sensor.missing").await;

        assert_eq!(
            result,
            Err(SensorError::NotFound {
                entity_id: "sensor.missing".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/states/sensor.pool_temp"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .expect(3)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 2);
        let result = client.get_state("sensor.pool_temp").await;

        match result {
            Err(HassError::Unavailable { retries, .. }) => assert_eq!(retries, 3),
            other => panic!("Expected Unavailable, got {:?}", other),
        }
    }
}

#[cfg(test)]
mod pump_tests {
    use super::*;

    #[tokio::test]
    async fn test_turn_on_calls_switch_service() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/services/switch/turn_on"))
            .and(header("Authorization", "Bearer test-token"))
            .and(body_json(json!({ "entity_id": "switch.pool_pump" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let result = client.set_pump(true).await;

        assert!(result.is_ok(), "turn_on should succeed: {:?}", result.err());
    }

    #[tokio::test]
    async fn test_failed_command_is_reported() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/services/switch/turn_off"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 2);
        let result = client.set_pump(false).await;

        match result {
            Err(ActuatorError::CommandFailed {
                entity_id, command, ..
            }) => {
                assert_eq!(entity_id, "switch.pool_pump");
                assert_eq!(command, "turn_off");
            }
            other => panic!("Expected CommandFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pump_state() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/states/switch.pool_pump"))
            .respond_with(ResponseTemplate::new(200).set_body_json(entity("switch.pool_pump", "on")))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        assert_eq!(client.pump_state().await, PumpState::On);
    }

    #[tokio::test]
    async fn test_pump_state_unknown_when_unreachable() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/states/switch.pool_pump"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        assert_eq!(client.pump_state().await, PumpState::Unknown);
    }
}

#[cfg(test)]
mod environment_tests {
    use super::*;

    #[tokio::test]
    async fn test_sun_position() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/states/sun.sun"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entity_id": "sun.sun",
                "state": "above_horizon",
                "attributes": { "elevation": 42.5, "azimuth": 181.0 }
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let sun = client.sun().await.expect("sun should be reported");

        assert!(sun.above_horizon);
        assert_eq!(sun.elevation, 42.5);
        assert_eq!(sun.azimuth, Some(181.0));
    }

    #[tokio::test]
    async fn test_sun_missing_is_none() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/states/sun.sun"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        assert!(client.sun().await.is_none());
    }

    #[tokio::test]
    async fn test_weather_snapshot() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/states/weather.home"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entity_id": "weather.home",
                "state": "partlycloudy",
                "attributes": {
                    "temperature": 24.0,
                    "wind_speed": 12.5,
                    "uv_index": 6.0,
                    "cloud_coverage": 40
                }
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let weather = client.weather().await.expect("weather should parse");

        assert_eq!(weather.condition, "partlycloudy");
        assert_eq!(weather.temperature, Some(24.0));
        assert_eq!(weather.wind_speed, Some(12.5));
        assert_eq!(weather.uv_index, Some(6.0));
        assert_eq!(weather.cloud_coverage, Some(40.0));
    }

    #[tokio::test]
    async fn test_weather_unavailable() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/states/weather.home"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(entity("weather.home", "unavailable")),
            )
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let result = client.weather().await;

        assert!(matches!(result, Err(SensorError::Unavailable { .. })));
    }
}
