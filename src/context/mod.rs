//! Sensor context gathered once per decision point.
//!
//! Pool and return temperatures plus the weather entity are required; every
//! other field is optional and stays `None` when no source produced a value.
//! UV follows a fallback chain:
//!
//! ```text
//! dedicated sensor -> weather attribute -> 12·sin(elevation)
//!       (cloud penalty applied)            (no penalty, elevation > 0 only)
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::agent::PumpAction;
use crate::config::EntityConfig;
use crate::error::SensorError;
use crate::hass::{EnvironmentQuery, SensorReader};

/// Maximum UV index produced by the elevation estimate.
pub const MAX_ESTIMATED_UV: f64 = 12.0;
/// Floor of the cloud attenuation factor.
pub const MIN_CLOUD_FACTOR: f64 = 0.15;

/// Where the UV value in a [`Context`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UvSource {
    /// Dedicated UV sensor
    Sensor,
    /// Weather entity attribute
    Weather,
    /// Derived from sun elevation
    Estimated,
    /// No source produced a value
    Unavailable,
}

/// Sun position reported by the environment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SunPosition {
    pub above_horizon: bool,
    pub elevation: f64,
    pub azimuth: Option<f64>,
}

/// Weather entity state and the attributes used as fallbacks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub condition: String,
    pub temperature: Option<f64>,
    pub wind_speed: Option<f64>,
    pub uv_index: Option<f64>,
    pub cloud_coverage: Option<f64>,
}

/// One line of the rolling performance summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEntry {
    pub conditions: String,
    pub decision: PumpAction,
    pub expected_gain: f64,
    pub actual_gain: f64,
    pub efficiency_pct: i64,
}

/// Everything the policy sees at a decision point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub pool_temp: f64,
    pub return_temp: f64,
    pub ambient_temp: Option<f64>,
    pub wind_speed: Option<f64>,
    /// UV after cloud attenuation
    pub uv_index: Option<f64>,
    /// UV before cloud attenuation
    pub uv_raw: Option<f64>,
    pub uv_source: UvSource,
    pub cloud_coverage: Option<f64>,
    pub sun_elevation: Option<f64>,
    pub sun_azimuth: Option<f64>,
    pub weather_condition: String,
    #[serde(default)]
    pub performance: Vec<PerformanceEntry>,
}

impl Context {
    /// Minimal context, mostly for tests and simulations.
    pub fn new(pool_temp: f64, return_temp: f64) -> Self {
        Self {
            pool_temp,
            return_temp,
            ambient_temp: None,
            wind_speed: None,
            uv_index: None,
            uv_raw: None,
            uv_source: UvSource::Unavailable,
            cloud_coverage: None,
            sun_elevation: None,
            sun_azimuth: None,
            weather_condition: "unknown".to_string(),
            performance: Vec::new(),
        }
    }

    /// Set UV as if read from a dedicated sensor under a clear sky.
    pub fn with_uv(mut self, uv: f64) -> Self {
        self.uv_index = Some(uv);
        self.uv_raw = Some(uv);
        self.uv_source = UvSource::Sensor;
        self
    }

    pub fn with_wind(mut self, wind: f64) -> Self {
        self.wind_speed = Some(wind);
        self
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.sun_elevation = Some(elevation);
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.weather_condition = condition.into();
        self
    }

    /// Collector return minus pool temperature.
    pub fn delta(&self) -> f64 {
        self.return_temp - self.pool_temp
    }

    /// Copy without the performance summary, for storing in history.
    pub fn snapshot(&self) -> Self {
        Self {
            performance: Vec::new(),
            ..self.clone()
        }
    }
}

/// Resolved UV value with provenance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvReading {
    pub value: Option<f64>,
    pub raw: Option<f64>,
    pub source: UvSource,
}

/// Cloud attenuation factor for a coverage percentage.
pub fn cloud_factor(cloud_coverage: f64) -> f64 {
    let cloud = cloud_coverage.clamp(0.0, 100.0);
    (1.0 - 0.85 * cloud / 100.0).max(MIN_CLOUD_FACTOR)
}

/// UV estimate from sun elevation; `None` at or below the horizon.
pub fn estimate_uv_from_elevation(elevation: f64) -> Option<f64> {
    if elevation <= 0.0 {
        return None;
    }
    Some((MAX_ESTIMATED_UV * elevation.to_radians().sin()).clamp(0.0, MAX_ESTIMATED_UV))
}

/// Walk the UV fallback chain.
pub fn resolve_uv(
    sensor: Option<f64>,
    weather: Option<f64>,
    elevation: Option<f64>,
    cloud_coverage: Option<f64>,
) -> UvReading {
    let measured = sensor
        .map(|v| (v, UvSource::Sensor))
        .or_else(|| weather.map(|v| (v, UvSource::Weather)));

    if let Some((raw, source)) = measured {
        let value = match cloud_coverage {
            Some(cloud) => raw * cloud_factor(cloud),
            None => raw,
        };
        return UvReading {
            value: Some(value),
            raw: Some(raw),
            source,
        };
    }

    match elevation.and_then(estimate_uv_from_elevation) {
        Some(estimate) => UvReading {
            value: Some(estimate),
            raw: Some(estimate),
            source: UvSource::Estimated,
        },
        None => UvReading {
            value: None,
            raw: None,
            source: UvSource::Unavailable,
        },
    }
}

/// Collects a [`Context`] from the sensor and environment collaborators.
#[derive(Clone)]
pub struct ContextGatherer {
    entities: EntityConfig,
    sensors: Arc<dyn SensorReader>,
    environment: Arc<dyn EnvironmentQuery>,
}

impl ContextGatherer {
    pub fn new(
        entities: EntityConfig,
        sensors: Arc<dyn SensorReader>,
        environment: Arc<dyn EnvironmentQuery>,
    ) -> Self {
        Self {
            entities,
            sensors,
            environment,
        }
    }

    /// Current pool temperature.
    pub async fn pool_temp(&self) -> Result<f64, SensorError> {
        self.sensors.read(&self.entities.pool_sensor).await
    }

    /// Current collector return temperature.
    pub async fn return_temp(&self) -> Result<f64, SensorError> {
        self.sensors.read(&self.entities.return_sensor).await
    }

    /// Current sun position, if the environment reports one.
    pub async fn sun(&self) -> Option<SunPosition> {
        self.environment.sun().await
    }

    /// Gather a full context. Any failure of a required source aborts.
    pub async fn gather(&self, performance: Vec<PerformanceEntry>) -> Result<Context, SensorError> {
        let pool_temp = self.pool_temp().await?;
        let return_temp = self.return_temp().await?;
        let weather = self.environment.weather().await?;
        let sun = self.environment.sun().await;

        let ambient_temp = self
            .optional_sensor(self.entities.ambient_temp_sensor.as_deref())
            .await
            .or(weather.temperature);
        let wind_speed = self
            .optional_sensor(self.entities.wind_sensor.as_deref())
            .await
            .or(weather.wind_speed);
        let cloud_coverage = self
            .optional_sensor(self.entities.cloud_coverage_sensor.as_deref())
            .await
            .or(weather.cloud_coverage);
        let uv_sensor = self
            .optional_sensor(self.entities.uv_sensor.as_deref())
            .await;

        let sun_elevation = sun.map(|s| s.elevation);
        let uv = resolve_uv(uv_sensor, weather.uv_index, sun_elevation, cloud_coverage);

        debug!(
            pool_temp,
            return_temp,
            uv = ?uv.value,
            uv_source = ?uv.source,
            wind = ?wind_speed,
            elevation = ?sun_elevation,
            "Context gathered"
        );

        Ok(Context {
            pool_temp,
            return_temp,
            ambient_temp,
            wind_speed,
            uv_index: uv.value,
            uv_raw: uv.raw,
            uv_source: uv.source,
            cloud_coverage,
            sun_elevation,
            sun_azimuth: sun.and_then(|s| s.azimuth),
            weather_condition: weather.condition,
            performance,
        })
    }

    async fn optional_sensor(&self, entity_id: Option<&str>) -> Option<f64> {
        let entity_id = entity_id?;
        match self.sensors.read(entity_id).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(entity_id, error = %e, "Optional sensor unusable, falling back");
                None
            }
        }
    }
}
