//! Tabular Q-learning policy for the circulation pump.
//!
//! # Action selection
//!
//! ```text
//! episode < 10         -> deterministic warm-up rule (table ignored)
//! otherwise            -> epsilon-greedy over the 144×5 value table
//! ```
//!
//! The epsilon schedule is 1.0 for the first 10 episodes, decays linearly
//! from 0.3 to 0.05 between episodes 10 and 50, and stays at 0.05 after.
//!
//! # Learning
//!
//! A decision leaves a pending `(state, action)` pair. The matching
//! [`PolicyAgent::update`] applies
//! `Q ← Q + α·(reward + γ·max Q(next) − Q)` to that cell, bumps the episode
//! count and clears the pending pair. Pending pairs are never persisted.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::discretizer::{Discretizer, StateIndex, NUM_STATES};
use crate::context::Context;

/// Pump-on durations per action index, in minutes. Index 0 is OFF.
pub const ACTION_DURATIONS: [u32; 5] = [0, 20, 40, 60, 90];
/// Number of discrete actions.
pub const NUM_ACTIONS: usize = ACTION_DURATIONS.len();

/// Learning rate.
pub const ALPHA: f64 = 0.1;
/// Discount factor.
pub const GAMMA: f64 = 0.9;

/// Episodes governed by the deterministic warm-up rule.
pub const BOOTSTRAP_EPISODES: u64 = 10;
/// Episodes over which exploration decays.
pub const WARMUP_EPISODES: u64 = 50;
/// Exploration rate at the start of the decay.
pub const INITIAL_EXPLORATION: f64 = 0.3;
/// Exploration floor.
pub const MIN_EXPLORATION: f64 = 0.05;

/// Upper bound of the random values used to seed a fresh table.
const SEED_VALUE_MAX: f64 = 0.01;

/// Binary pump command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PumpAction {
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "OFF")]
    Off,
}

impl PumpAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PumpAction::On => "ON",
            PumpAction::Off => "OFF",
        }
    }
}

impl std::fmt::Display for PumpAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PumpAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ON" => Ok(PumpAction::On),
            "OFF" => Ok(PumpAction::Off),
            _ => Err(format!("Unknown pump action: {}", s)),
        }
    }
}

/// Coarse stage of the learning process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningPhase {
    /// Warm-up rule in charge
    Bootstrap,
    /// Exploration decaying
    Training,
    /// Exploration at its floor
    Production,
}

impl LearningPhase {
    pub fn for_episode(episode_count: u64) -> Self {
        if episode_count < BOOTSTRAP_EPISODES {
            LearningPhase::Bootstrap
        } else if episode_count < WARMUP_EPISODES {
            LearningPhase::Training
        } else {
            LearningPhase::Production
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LearningPhase::Bootstrap => "bootstrap",
            LearningPhase::Training => "training",
            LearningPhase::Production => "production",
        }
    }
}

impl std::fmt::Display for LearningPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A policy decision before safety overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: PumpAction,
    pub action_index: usize,
    pub duration_minutes: u32,
    pub expected_gain: f64,
    pub is_exploratory: bool,
    pub is_warmup: bool,
    pub state_index: StateIndex,
}

/// Result of a Bellman update, for logging and inspection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedUpdate {
    pub state: StateIndex,
    pub action_index: usize,
    pub reward: f64,
    pub old_value: f64,
    pub new_value: f64,
}

/// Persisted form of the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub value_table: Vec<Vec<f64>>,
    pub episode_count: u64,
}

/// Table shape rejected on restore.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeMismatch {
    pub rows: usize,
    pub bad_row: Option<(usize, usize)>,
}

impl std::fmt::Display for ShapeMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.bad_row {
            Some((row, len)) => write!(
                f,
                "row {} has {} columns, expected {}",
                row, len, NUM_ACTIONS
            ),
            None => write!(f, "{} rows, expected {}", self.rows, NUM_STATES),
        }
    }
}

// ============================================================================
// Value Table
// ============================================================================

/// Fixed-shape 144×5 action-value table.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueTable {
    rows: Vec<[f64; NUM_ACTIONS]>,
}

impl ValueTable {
    /// Fresh table of small random values (never all zero, to break ties).
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let rows = (0..NUM_STATES)
            .map(|_| {
                let mut row = [0.0; NUM_ACTIONS];
                for cell in row.iter_mut() {
                    *cell = rng.gen_range(0.0..SEED_VALUE_MAX);
                }
                row
            })
            .collect();
        Self { rows }
    }

    /// Validate an externally supplied table.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, ShapeMismatch> {
        if rows.len() != NUM_STATES {
            return Err(ShapeMismatch {
                rows: rows.len(),
                bad_row: None,
            });
        }
        let mut table = Vec::with_capacity(NUM_STATES);
        for (i, row) in rows.iter().enumerate() {
            let fixed: [f64; NUM_ACTIONS] =
                row.as_slice().try_into().map_err(|_| ShapeMismatch {
                    rows: rows.len(),
                    bad_row: Some((i, row.len())),
                })?;
            table.push(fixed);
        }
        Ok(Self { rows: table })
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.rows.iter().map(|r| r.to_vec()).collect()
    }

    pub fn row(&self, state: StateIndex) -> &[f64; NUM_ACTIONS] {
        &self.rows[state.get()]
    }

    pub fn get(&self, state: StateIndex, action_index: usize) -> f64 {
        self.rows[state.get()][action_index]
    }

    pub fn set(&mut self, state: StateIndex, action_index: usize, value: f64) {
        self.rows[state.get()][action_index] = value;
    }

    /// Highest value in a row.
    pub fn max_value(&self, state: StateIndex) -> f64 {
        self.row(state)
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Greedy action; ties go to the lowest index (OFF first).
    pub fn best_action(&self, state: StateIndex) -> usize {
        let row = self.row(state);
        let mut best = 0;
        for (i, &value) in row.iter().enumerate().skip(1) {
            if value > row[best] {
                best = i;
            }
        }
        best
    }
}

// ============================================================================
// Schedule & Estimates
// ============================================================================

/// Exploration rate for a given episode count.
pub fn exploration_rate(episode_count: u64) -> f64 {
    if episode_count < BOOTSTRAP_EPISODES {
        1.0
    } else if episode_count < WARMUP_EPISODES {
        let progress = (episode_count - BOOTSTRAP_EPISODES) as f64
            / (WARMUP_EPISODES - BOOTSTRAP_EPISODES) as f64;
        INITIAL_EXPLORATION * (1.0 - progress) + MIN_EXPLORATION * progress
    } else {
        MIN_EXPLORATION
    }
}

/// Single Bellman correction.
pub fn bellman_update(old_value: f64, reward: f64, max_next: f64) -> f64 {
    old_value + ALPHA * (reward + GAMMA * max_next - old_value)
}

/// Closed-form gain estimate in °C for running the pump `duration_minutes`.
pub fn estimate_gain(context: &Context, duration_minutes: u32) -> f64 {
    if duration_minutes == 0 {
        return 0.0;
    }
    let uv = context.uv_index.unwrap_or(0.0);
    let delta = context.delta();
    let efficiency = ((uv / 10.0).min(1.0) * (delta / 5.0).min(1.0)).clamp(0.05, 1.0);
    let base_gain_per_hour = 1.0;
    round2(efficiency * base_gain_per_hour * (duration_minutes as f64 / 60.0))
}

/// Conservative rule used while the table carries no signal.
pub fn warmup_action(context: &Context) -> usize {
    let delta = context.delta();
    let uv = context.uv_index.unwrap_or(0.0);
    let wind = context.wind_speed.unwrap_or(0.0);

    if delta < 4.0 || uv < 5.0 || wind > 25.0 {
        return 0;
    }
    if delta > 6.0 && uv > 7.0 && wind < 15.0 {
        4
    } else if delta > 5.0 && uv > 6.0 {
        3
    } else {
        2
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// Policy Agent
// ============================================================================

/// Epsilon-greedy Q-learning agent over the discretized context.
#[derive(Debug, Clone)]
pub struct PolicyAgent {
    table: ValueTable,
    episode_count: u64,
    pending: Option<(StateIndex, usize)>,
    rng: ChaCha8Rng,
}

impl PolicyAgent {
    /// Fresh agent with a random-small table.
    pub fn new() -> Self {
        Self::with_rng(ChaCha8Rng::from_entropy())
    }

    /// Fresh agent driven by the given generator.
    pub fn with_rng(mut rng: ChaCha8Rng) -> Self {
        Self {
            table: ValueTable::random(&mut rng),
            episode_count: 0,
            pending: None,
            rng,
        }
    }

    /// Restore from persisted fields. A table of the wrong shape is
    /// replaced with a fresh one; the episode count is kept.
    pub fn restore(value_table: Option<&[Vec<f64>]>, episode_count: u64, rng: ChaCha8Rng) -> Self {
        let mut agent = Self::with_rng(rng);
        agent.episode_count = episode_count;
        if let Some(rows) = value_table {
            match ValueTable::from_rows(rows) {
                Ok(table) => agent.table = table,
                Err(mismatch) => {
                    warn!(%mismatch, "Persisted value table has wrong shape, reinitializing");
                }
            }
        }
        info!(
            episodes = agent.episode_count,
            phase = %agent.learning_phase(),
            exploration = agent.exploration_rate(),
            "Policy agent initialized"
        );
        agent
    }

    /// Choose an action for the context and remember it as pending.
    pub fn get_action(&mut self, context: &Context) -> Decision {
        let state = Discretizer::discretize(context);

        let (action_index, is_exploratory) = if self.episode_count < BOOTSTRAP_EPISODES {
            (warmup_action(context), false)
        } else {
            let epsilon = self.exploration_rate();
            if self.rng.gen::<f64>() < epsilon {
                let action = self.rng.gen_range(0..NUM_ACTIONS);
                debug!(epsilon, action, "Exploring");
                (action, true)
            } else {
                let action = self.table.best_action(state);
                debug!(
                    state = state.get(),
                    action,
                    value = self.table.get(state, action),
                    "Exploiting"
                );
                (action, false)
            }
        };

        self.pending = Some((state, action_index));

        let duration_minutes = ACTION_DURATIONS[action_index];
        Decision {
            action: if action_index == 0 {
                PumpAction::Off
            } else {
                PumpAction::On
            },
            action_index,
            duration_minutes,
            expected_gain: estimate_gain(context, duration_minutes),
            is_exploratory,
            is_warmup: self.is_warmup(),
            state_index: state,
        }
    }

    /// Score the pending decision. Returns `None` (and logs) when nothing is pending.
    pub fn update(&mut self, reward: f64, next_context: Option<&Context>) -> Option<AppliedUpdate> {
        let Some((state, action_index)) = self.pending.take() else {
            warn!(reward, "No pending decision to update, skipping");
            return None;
        };

        let max_next = next_context
            .map(|ctx| self.table.max_value(Discretizer::discretize(ctx)))
            .unwrap_or(0.0);

        let old_value = self.table.get(state, action_index);
        let new_value = bellman_update(old_value, reward, max_next);
        self.table.set(state, action_index, new_value);
        self.episode_count += 1;

        info!(
            state = state.get(),
            action = action_index,
            reward,
            old_value,
            new_value,
            episodes = self.episode_count,
            "Policy updated"
        );

        Some(AppliedUpdate {
            state,
            action_index,
            reward,
            old_value,
            new_value,
        })
    }

    pub fn episode_count(&self) -> u64 {
        self.episode_count
    }

    pub fn is_warmup(&self) -> bool {
        self.episode_count < WARMUP_EPISODES
    }

    pub fn exploration_rate(&self) -> f64 {
        exploration_rate(self.episode_count)
    }

    pub fn learning_phase(&self) -> LearningPhase {
        LearningPhase::for_episode(self.episode_count)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn value_table(&self) -> &ValueTable {
        &self.table
    }

    /// Persistable fields; the pending pair is deliberately absent.
    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            value_table: self.table.to_rows(),
            episode_count: self.episode_count,
        }
    }
}

impl Default for PolicyAgent {
    fn default() -> Self {
        Self::new()
    }
}
