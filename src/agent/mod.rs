//! Learning agent: context discretization, epsilon-greedy policy and reward.

pub mod discretizer;
pub mod policy;
pub mod reward;

pub use discretizer::{Discretizer, StateIndex, NUM_STATES};
pub use policy::{
    estimate_gain, exploration_rate, warmup_action, AgentSnapshot, AppliedUpdate, Decision,
    LearningPhase, PolicyAgent, PumpAction, ValueTable, ACTION_DURATIONS, NUM_ACTIONS,
};
pub use reward::{calculate_reward, calculate_reward_with_cost, DEFAULT_PUMP_COST_PER_HOUR};
