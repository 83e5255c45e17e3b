//! Collaborator seams to the home-automation host.
//!
//! The controller only talks to these traits. [`HomeAssistantClient`]
//! implements all of them over the Home Assistant REST API; tests use
//! mocks or in-memory fakes.

mod client;
mod types;

pub use client::HomeAssistantClient;
pub use types::{parse_numeric_state, EntityState, ServiceCall};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::{SunPosition, WeatherSnapshot};
use crate::error::{ActuatorError, SensorError};

/// Live state of the pump as reported by the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PumpState {
    On,
    Off,
    Unknown,
}

impl PumpState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PumpState::On => "on",
            PumpState::Off => "off",
            PumpState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PumpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Numeric sensor access. "No data" is an error, never `0.0`.
#[async_trait]
pub trait SensorReader: Send + Sync {
    async fn read(&self, entity_id: &str) -> Result<f64, SensorError>;
}

/// Pump switch.
#[async_trait]
pub trait ActuatorControl: Send + Sync {
    /// Command the pump on or off.
    async fn set_pump(&self, on: bool) -> Result<(), ActuatorError>;

    /// Live pump state; transport failures collapse to [`PumpState::Unknown`].
    async fn pump_state(&self) -> PumpState;
}

/// Sun and weather information.
#[async_trait]
pub trait EnvironmentQuery: Send + Sync {
    /// Sun position, or `None` when the sun entity is missing.
    async fn sun(&self) -> Option<SunPosition>;

    /// Weather condition plus attribute fallbacks.
    async fn weather(&self) -> Result<WeatherSnapshot, SensorError>;
}
