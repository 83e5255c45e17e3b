use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{EntityState, ServiceCall};
use super::{ActuatorControl, EnvironmentQuery, PumpState, SensorReader};
use crate::config::{EntityConfig, HomeAssistantConfig, RequestConfig};
use crate::context::{SunPosition, WeatherSnapshot};
use crate::error::{ActuatorError, HassError, HassResult, SensorError};

/// Client for the Home Assistant REST API
#[derive(Clone)]
pub struct HomeAssistantClient {
    client: Client,
    base_url: String,
    token: String,
    entities: EntityConfig,
    request_config: RequestConfig,
}

impl HomeAssistantClient {
    /// Create a new Home Assistant client
    pub fn new(
        config: &HomeAssistantConfig,
        entities: EntityConfig,
        request_config: RequestConfig,
    ) -> HassResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(HassError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            entities,
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch an entity state, retrying transient failures with exponential backoff.
    ///
    /// Client errors (4xx) are returned immediately.
    pub async fn get_state(&self, entity_id: &str) -> HassResult<EntityState> {
        let url = format!("{}/api/states/{}", self.base_url, entity_id);

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    entity_id,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying Home Assistant request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_get(&url).await {
                Ok(state) => {
                    debug!(
                        entity_id,
                        state = %state.state,
                        latency_ms = start.elapsed().as_millis(),
                        "Entity state fetched"
                    );
                    return Ok(state);
                }
                Err(HassError::Api { status, message }) if status < 500 => {
                    return Err(HassError::Api { status, message });
                }
                Err(e) => {
                    error!(
                        entity_id,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Entity state fetch failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(HassError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Call a service on a single entity. Not retried.
    pub async fn call_service(&self, domain: &str, service: &str, entity_id: &str) -> HassResult<()> {
        let url = format!("{}/api/services/{}/{}", self.base_url, domain, service);

        info!(domain, service, entity_id, "Calling Home Assistant service");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .json(&ServiceCall {
                entity_id: entity_id.to_string(),
            })
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(HassError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        Ok(())
    }

    async fn execute_get(&self, url: &str) -> HassResult<EntityState> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(HassError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| HassError::InvalidResponse {
                message: format!("Failed to parse entity state: {}", e),
            })
    }

    fn map_transport(&self, e: reqwest::Error) -> HassError {
        if e.is_timeout() {
            HassError::Timeout {
                timeout_ms: self.request_config.timeout_ms,
            }
        } else {
            HassError::Http(e)
        }
    }

    async fn sensor_state(&self, entity_id: &str) -> Result<EntityState, SensorError> {
        self.get_state(entity_id)
            .await
            .map_err(|e| match e {
                HassError::Api { status, .. } if status == StatusCode::NOT_FOUND.as_u16() => {
                    SensorError::NotFound {
                        entity_id: entity_id.to_string(),
                    }
                }
                other => SensorError::Transport {
                    entity_id: entity_id.to_string(),
                    message: other.to_string(),
                },
            })
    }
}

/// Service domain of an entity id (`switch.pool_pump` -> `switch`).
fn domain_of(entity_id: &str) -> &str {
    entity_id
        .split_once('.')
        .map(|(domain, _)| domain)
        .unwrap_or("switch")
}

#[async_trait]
impl SensorReader for HomeAssistantClient {
    async fn read(&self, entity_id: &str) -> Result<f64, SensorError> {
        self.sensor_state(entity_id).await?.numeric_state()
    }
}

#[async_trait]
impl ActuatorControl for HomeAssistantClient {
    async fn set_pump(&self, on: bool) -> Result<(), ActuatorError> {
        let pump = &self.entities.pump;
        let service = if on { "turn_on" } else { "turn_off" };
        self.call_service(domain_of(pump), service, pump)
            .await
            .map_err(|e| ActuatorError::CommandFailed {
                entity_id: pump.clone(),
                command: service.to_string(),
                message: e.to_string(),
            })
    }

    async fn pump_state(&self) -> PumpState {
        match self.get_state(&self.entities.pump).await {
            Ok(state) => match state.state.as_str() {
                "on" => PumpState::On,
                "off" => PumpState::Off,
                _ => PumpState::Unknown,
            },
            Err(e) => {
                warn!(entity_id = %self.entities.pump, error = %e, "Pump state unavailable");
                PumpState::Unknown
            }
        }
    }
}

#[async_trait]
impl EnvironmentQuery for HomeAssistantClient {
    async fn sun(&self) -> Option<SunPosition> {
        let state = match self.get_state(&self.entities.sun).await {
            Ok(state) => state,
            Err(e) => {
                warn!(entity_id = %self.entities.sun, error = %e, "Sun entity unavailable");
                return None;
            }
        };
        Some(SunPosition {
            above_horizon: state.state == "above_horizon",
            elevation: state.attribute_f64("elevation").unwrap_or(0.0),
            azimuth: state.attribute_f64("azimuth"),
        })
    }

    async fn weather(&self) -> Result<WeatherSnapshot, SensorError> {
        let state = self.sensor_state(&self.entities.weather).await?;
        if state.state.eq_ignore_ascii_case("unavailable") || state.state.eq_ignore_ascii_case("unknown")
        {
            return Err(SensorError::Unavailable {
                entity_id: state.entity_id,
            });
        }
        Ok(WeatherSnapshot {
            temperature: state.attribute_f64("temperature"),
            wind_speed: state.attribute_f64("wind_speed"),
            uv_index: state.attribute_f64("uv_index"),
            cloud_coverage: state.attribute_f64("cloud_coverage"),
            condition: state.state,
        })
    }
}
