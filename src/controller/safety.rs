//! Hard safety rules applied between the policy and the actuator.
//!
//! 1. Short-cycle protection keeps an owned pump running until it has
//!    completed its minimum run.
//! 2. The thermal floor vetoes any ON when the measured delta is below
//!    [`MIN_USABLE_DELTA`]. It runs second and can veto rule 1.
//!
//! Neither rule is learned and neither is subject to exploration.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agent::PumpAction;

/// Smallest measured delta (°C) worth running the pump for.
pub const MIN_USABLE_DELTA: f64 = 2.0;
/// Minutes added to the remaining minimum run.
pub const SHORT_CYCLE_MARGIN_MINUTES: u32 = 2;

/// A rule that changed the policy's proposal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum SafetyOverride {
    ShortCycle { run_minutes: f64, extended_minutes: u32 },
    ThermalFloor { delta: f64 },
}

/// Final action after the safety rules.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardedAction {
    pub action: PumpAction,
    pub duration_minutes: u32,
    pub overrides: Vec<SafetyOverride>,
}

impl GuardedAction {
    pub fn was_overridden(&self) -> bool {
        !self.overrides.is_empty()
    }

    pub fn thermal_floor_applied(&self) -> bool {
        self.overrides
            .iter()
            .any(|o| matches!(o, SafetyOverride::ThermalFloor { .. }))
    }
}

/// Stateless guard parameterised by the minimum run time.
#[derive(Debug, Clone, Copy)]
pub struct SafetyGuard {
    min_run_minutes: f64,
}

impl SafetyGuard {
    pub fn new(min_run_minutes: u64) -> Self {
        Self {
            min_run_minutes: min_run_minutes as f64,
        }
    }

    /// Apply both rules.
    ///
    /// `owned_run_minutes` is the continuous run time of a pump this
    /// controller turned on; `None` when it does not own a running pump.
    pub fn apply(
        &self,
        action: PumpAction,
        duration_minutes: u32,
        actual_delta: f64,
        owned_run_minutes: Option<f64>,
    ) -> GuardedAction {
        let mut guarded = GuardedAction {
            action,
            duration_minutes,
            overrides: Vec::new(),
        };

        if guarded.action == PumpAction::Off {
            if let Some(run_minutes) = owned_run_minutes.filter(|m| *m < self.min_run_minutes) {
                let remaining = self.min_run_minutes - run_minutes;
                let extended_minutes = remaining as u32 + SHORT_CYCLE_MARGIN_MINUTES;
                info!(
                    run_minutes,
                    extended_minutes, "Short-cycle protection: keeping pump on"
                );
                guarded.action = PumpAction::On;
                guarded.duration_minutes = extended_minutes;
                guarded.overrides.push(SafetyOverride::ShortCycle {
                    run_minutes,
                    extended_minutes,
                });
            }
        }

        if guarded.action == PumpAction::On && actual_delta < MIN_USABLE_DELTA {
            warn!(delta = actual_delta, "ON proposed below thermal floor, forcing OFF");
            guarded.action = PumpAction::Off;
            guarded.duration_minutes = 0;
            guarded.overrides.push(SafetyOverride::ThermalFloor {
                delta: actual_delta,
            });
        }

        guarded
    }
}
