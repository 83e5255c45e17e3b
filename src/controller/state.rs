//! Controller phase and the status surface exposed to operators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::history::DailyYield;
use crate::agent::LearningPhase;
use crate::explain::cap_reasoning;

/// Phase of the control cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for the next tick
    Idle,
    /// Pump pre-run until the return temperature settles
    Sweeping,
    /// Gathering sensor context
    Measuring,
    /// Policy and safety guard running
    Consulting,
    /// Pump running for a decided duration
    Heating,
    /// Pool at or above its maximum temperature
    Cooldown,
    /// Pump command failed
    Error,
}

impl Phase {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Sweeping => "sweeping",
            Phase::Measuring => "measuring",
            Phase::Consulting => "consulting",
            Phase::Heating => "heating",
            Phase::Cooldown => "cooldown",
            Phase::Error => "error",
        }
    }

    /// Whether a cycle is mid-flight and a new tick must not interleave.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Phase::Sweeping | Phase::Measuring | Phase::Consulting)
    }

    /// Whether the pump may be running under this controller's command.
    pub fn drives_pump(&self) -> bool {
        matches!(self, Phase::Sweeping | Phase::Heating)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(Phase::Idle),
            "sweeping" => Ok(Phase::Sweeping),
            "measuring" => Ok(Phase::Measuring),
            "consulting" => Ok(Phase::Consulting),
            "heating" => Ok(Phase::Heating),
            "cooldown" => Ok(Phase::Cooldown),
            "error" => Ok(Phase::Error),
            _ => Err(format!("Unknown phase: {}", s)),
        }
    }
}

/// Mutable controller state. Owned and mutated only by the cycle controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    pub phase: Phase,
    reasoning: String,
    pub expected_gain: f64,
    pub last_reward: Option<f64>,
    pub next_cycle_time: Option<DateTime<Utc>>,
    /// This controller turned the pump on and has not turned it off since
    pub owns_pump: bool,
    /// Start of the current owned pump run
    pub pump_on_since: Option<DateTime<Utc>>,
    /// A heating run is in progress
    pub pump_is_heating: bool,
    pub heating_started: Option<DateTime<Utc>>,
    pub heating_duration_minutes: u32,
    pub enabled: bool,
}

impl ControllerState {
    pub fn new(reasoning: &str) -> Self {
        Self {
            phase: Phase::Idle,
            reasoning: cap_reasoning(reasoning),
            expected_gain: 0.0,
            last_reward: None,
            next_cycle_time: None,
            owns_pump: false,
            pump_on_since: None,
            pump_is_heating: false,
            heating_started: None,
            heating_duration_minutes: 0,
            enabled: true,
        }
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Replace the reasoning text, capped.
    pub fn set_reasoning(&mut self, reasoning: &str) {
        self.reasoning = cap_reasoning(reasoning);
    }

    /// Minutes the pump has been running under this controller's ownership.
    pub fn owned_run_minutes(&self, now: DateTime<Utc>) -> Option<f64> {
        if !self.owns_pump {
            return None;
        }
        self.pump_on_since
            .map(|since| (now - since).num_milliseconds() as f64 / 60_000.0)
    }
}

/// Snapshot for status displays and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub phase: Phase,
    pub reasoning: String,
    pub expected_gain: f64,
    pub last_reward: Option<f64>,
    pub next_cycle_time: Option<DateTime<Utc>>,
    pub episode_count: u64,
    /// Rounded to 3 decimals
    pub exploration_rate: f64,
    pub learning_phase: LearningPhase,
    pub enabled: bool,
    pub owns_pump: bool,
    pub pump_is_heating: bool,
    pub daily_yield: DailyYield,
}
