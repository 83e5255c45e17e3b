//! Structured reasons for decisions and status changes.
//!
//! The controller never builds human text itself. It derives a
//! [`DecisionReason`] or a [`StatusMessage`] and hands it to an
//! [`ExplanationRenderer`]; [`PlainRenderer`] is the built-in English one.

use serde::{Deserialize, Serialize};

use crate::agent::PumpAction;
use crate::context::Context;

/// Longest reasoning text exposed on the status surface.
pub const MAX_REASONING_LEN: usize = 255;

/// Weather conditions treated as overcast when explaining an OFF.
const OVERCAST_CONDITIONS: [&str; 4] = ["cloudy", "rainy", "pouring", "fog"];

/// Why the policy chose what it chose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionReason {
    /// Early episodes, rule-driven
    Warmup,
    /// Exploratory ON
    Exploring,
    /// ON under strong sun, little wind and a wide delta
    OnOptimal { delta: f64, uv: f64, wind: f64 },
    /// ON with at least one weak factor
    OnMarginal { delta: f64, uv: f64, wind: f64 },
    OffLowDelta { delta: f64 },
    OffLowSun { elevation: f64 },
    OffWind { wind: f64 },
    OffLowUv { uv: f64 },
    OffClouds { condition: String },
}

impl DecisionReason {
    /// Pick the dominant reason for a decision taken in `context`.
    pub fn derive(action: PumpAction, context: &Context, is_exploratory: bool, is_warmup: bool) -> Self {
        let delta = context.delta();
        let uv = context.uv_index.unwrap_or(0.0);
        let wind = context.wind_speed.unwrap_or(0.0);
        let elevation = context.sun_elevation.unwrap_or(0.0);

        if is_warmup {
            return DecisionReason::Warmup;
        }
        if is_exploratory && action == PumpAction::On {
            return DecisionReason::Exploring;
        }
        if action == PumpAction::On {
            return if uv >= 6.0 && wind < 15.0 && delta >= 4.0 {
                DecisionReason::OnOptimal { delta, uv, wind }
            } else {
                DecisionReason::OnMarginal { delta, uv, wind }
            };
        }

        // OFF: most significant factor first
        if delta < 2.0 {
            DecisionReason::OffLowDelta { delta }
        } else if elevation < 10.0 {
            DecisionReason::OffLowSun { elevation }
        } else if wind > 25.0 {
            DecisionReason::OffWind { wind }
        } else if uv < 3.0 {
            DecisionReason::OffLowUv { uv }
        } else if OVERCAST_CONDITIONS.contains(&context.weather_condition.as_str()) {
            DecisionReason::OffClouds {
                condition: context.weather_condition.clone(),
            }
        } else if wind > 15.0 {
            DecisionReason::OffWind { wind }
        } else {
            DecisionReason::OffLowDelta { delta }
        }
    }
}

/// Phase-level status notices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusMessage {
    Initializing,
    WaitingForStartup,
    SweepStarting,
    SweepForced,
    MeasuringSensors,
    SensorError { entity_id: String },
    ConsultingPolicy,
    /// Thermal floor vetoed an ON
    SafetyOverride { delta: f64 },
    /// Appended to the decision text when short-cycle protection kept the pump on
    ShortCycleProtection { run_minutes: f64 },
    SunBelowHorizon,
    SunTooLow { elevation: f64 },
    MaxTempReached { temp: f64, max_temp: f64 },
    HeatingComplete,
    Disabled,
    PumpCommandFailed { message: String },
    SettingsRejected { message: String },
    Shutdown,
}

/// Turns structured reasons into display text.
pub trait ExplanationRenderer: Send + Sync {
    fn render(&self, reason: &DecisionReason) -> String;
    fn status(&self, message: &StatusMessage) -> String;
}

/// English renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainRenderer;

impl ExplanationRenderer for PlainRenderer {
    fn render(&self, reason: &DecisionReason) -> String {
        match reason {
            DecisionReason::Warmup => {
                "Learning phase: following conservative rules while gathering experience".to_string()
            }
            DecisionReason::Exploring => {
                "Exploring: trying a different run length to learn from the outcome".to_string()
            }
            DecisionReason::OnOptimal { delta, uv, .. } => format!(
                "Heating: strong sun (UV {:.1}) and collector {:.1}°C above pool",
                uv, delta
            ),
            DecisionReason::OnMarginal { delta, .. } => format!(
                "Heating: marginal conditions, collector {:.1}°C above pool",
                delta
            ),
            DecisionReason::OffLowDelta { delta } => format!(
                "Not heating: collector only {:.1}°C above pool",
                delta
            ),
            DecisionReason::OffLowSun { elevation } => {
                format!("Not heating: sun too low ({:.0}°)", elevation)
            }
            DecisionReason::OffWind { wind } => {
                format!("Not heating: wind {:.0} km/h cools the collector", wind)
            }
            DecisionReason::OffLowUv { uv } => format!("Not heating: UV too low ({:.1})", uv),
            DecisionReason::OffClouds { condition } => {
                format!("Not heating: overcast ({})", condition)
            }
        }
    }

    fn status(&self, message: &StatusMessage) -> String {
        match message {
            StatusMessage::Initializing => "Starting up".to_string(),
            StatusMessage::WaitingForStartup => "Waiting for sensors to settle".to_string(),
            StatusMessage::SweepStarting => "Sweeping collector to read return temperature".to_string(),
            StatusMessage::SweepForced => "Forced cycle: sweeping collector".to_string(),
            StatusMessage::MeasuringSensors => "Measuring sensors".to_string(),
            StatusMessage::SensorError { entity_id } => {
                format!("Sensor error: {} unavailable", entity_id)
            }
            StatusMessage::ConsultingPolicy => "Consulting policy".to_string(),
            StatusMessage::SafetyOverride { delta } => format!(
                "Safety override: delta {:.1}°C below minimum, pump stays off",
                delta
            ),
            StatusMessage::ShortCycleProtection { run_minutes } => {
                format!("(protecting pump: {:.0} min run)", run_minutes)
            }
            StatusMessage::SunBelowHorizon => "Sun below horizon".to_string(),
            StatusMessage::SunTooLow { elevation } => {
                format!("Sun too low ({:.1}°)", elevation)
            }
            StatusMessage::MaxTempReached { temp, max_temp } => format!(
                "Pool at {:.1}°C, maximum {:.1}°C reached",
                temp, max_temp
            ),
            StatusMessage::HeatingComplete => "Heating cycle complete".to_string(),
            StatusMessage::Disabled => "Controller disabled".to_string(),
            StatusMessage::PumpCommandFailed { message } => {
                format!("Pump command failed: {}", message)
            }
            StatusMessage::SettingsRejected { message } => {
                format!("Settings rejected: {}", message)
            }
            StatusMessage::Shutdown => "Stopped".to_string(),
        }
    }
}

/// Cap reasoning text at [`MAX_REASONING_LEN`] characters.
pub fn cap_reasoning(text: &str) -> String {
    if text.chars().count() <= MAX_REASONING_LEN {
        return text.to_string();
    }
    let mut capped: String = text.chars().take(MAX_REASONING_LEN - 3).collect();
    capped.push_str("...");
    capped
}
