//! Scalar reward for a resolved decision.

use super::policy::round2;

/// Energy cost charged per hour of pump run, in reward units.
pub const DEFAULT_PUMP_COST_PER_HOUR: f64 = 0.05;

/// Reward for an OFF decision that was not followed by meaningful passive gain.
const OFF_CORRECT: f64 = 0.1;
/// Penalty for an OFF decision during which the pool still gained heat.
const OFF_MISSED: f64 = -0.5;
/// Passive gain at which an OFF counts as a missed opportunity.
const OFF_MISSED_GAIN: f64 = 0.5;
/// Bonus for a strong gain achieved in under an hour.
const FAST_GAIN_BONUS: f64 = 0.5;

/// Reward for observing `actual_gain` °C after running `duration_minutes`.
///
/// Uses [`DEFAULT_PUMP_COST_PER_HOUR`]; see [`calculate_reward_with_cost`].
pub fn calculate_reward(actual_gain: f64, duration_minutes: u32) -> f64 {
    calculate_reward_with_cost(actual_gain, duration_minutes, DEFAULT_PUMP_COST_PER_HOUR)
}

/// Reward with an explicit pump cost. Rounded to 2 decimals.
pub fn calculate_reward_with_cost(
    actual_gain: f64,
    duration_minutes: u32,
    pump_cost_per_hour: f64,
) -> f64 {
    if duration_minutes == 0 {
        return if actual_gain < OFF_MISSED_GAIN {
            OFF_CORRECT
        } else {
            OFF_MISSED
        };
    }

    let hours = duration_minutes as f64 / 60.0;
    let mut reward = actual_gain - pump_cost_per_hour * hours;
    if actual_gain > 1.0 && hours < 1.0 {
        reward += FAST_GAIN_BONUS;
    }
    round2(reward)
}
