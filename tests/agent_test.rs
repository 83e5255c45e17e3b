//! Integration tests for the learning agent
//!
//! Exercises the policy through its public API: decision scenarios,
//! the warm-up to production progression and convergence on a fixed
//! reward signal.

use pretty_assertions::assert_eq;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use solarpool_controller::agent::{
    calculate_reward, exploration_rate, Discretizer, LearningPhase, PolicyAgent, PumpAction,
    ACTION_DURATIONS, NUM_STATES,
};
use solarpool_controller::context::Context;

fn context(pool: f64, ret: f64, uv: f64, wind: f64, elevation: f64) -> Context {
    Context::new(pool, ret)
        .with_uv(uv)
        .with_wind(wind)
        .with_elevation(elevation)
}

fn seeded(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

#[cfg(test)]
mod scenario_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ideal_conditions_heat_for_ninety_minutes() {
        let mut agent = PolicyAgent::with_rng(seeded(1));
        let decision = agent.get_action(&context(25.0, 33.0, 9.0, 8.0, 65.0));

        assert_eq!(decision.action, PumpAction::On);
        assert_eq!(decision.duration_minutes, 90);
        assert!(decision.is_warmup);
        assert!(!decision.is_exploratory);
    }

    #[test]
    fn test_insufficient_delta_is_off() {
        let mut agent = PolicyAgent::with_rng(seeded(2));
        let decision = agent.get_action(&context(25.0, 26.5, 6.0, 10.0, 45.0));

        assert_eq!(decision.action, PumpAction::Off);
        assert_eq!(decision.duration_minutes, 0);
        assert_eq!(decision.expected_gain, 0.0);
    }

    #[test]
    fn test_low_uv_in_warmup_is_off() {
        let mut agent = PolicyAgent::with_rng(seeded(3));
        let decision = agent.get_action(&context(24.0, 27.0, 4.0, 35.0, 30.0));

        assert_eq!(decision.action, PumpAction::Off);
    }

    #[test]
    fn test_warmup_is_deterministic_across_seeds() {
        let ctx = context(22.0, 27.5, 6.5, 12.0, 40.0);
        let first = PolicyAgent::with_rng(seeded(10)).get_action(&ctx);
        let second = PolicyAgent::with_rng(seeded(99)).get_action(&ctx);

        assert_eq!(first, second);
        assert_eq!(first.duration_minutes, 60);
    }
}

#[cfg(test)]
mod learning_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_phase_progression_over_episodes() {
        let mut agent = PolicyAgent::with_rng(seeded(4));
        let ctx = context(25.0, 31.0, 7.0, 10.0, 50.0);

        let mut phases = Vec::new();
        for episode in 0..60 {
            if episode == 0 || episode == 10 || episode == 50 {
                phases.push(agent.learning_phase());
            }
            agent.get_action(&ctx);
            agent.update(calculate_reward(0.4, 40), None).unwrap();
        }

        assert_eq!(
            phases,
            vec![
                LearningPhase::Bootstrap,
                LearningPhase::Training,
                LearningPhase::Production
            ]
        );
        assert_eq!(agent.episode_count(), 60);
        assert_eq!(agent.exploration_rate(), 0.05);
        assert!(!agent.is_warmup());
    }

    #[test]
    fn test_exploration_decays_linearly() {
        let samples: Vec<f64> = [0, 9, 10, 30, 50, 500]
            .iter()
            .map(|&e| (exploration_rate(e) * 1000.0).round() / 1000.0)
            .collect();

        assert_eq!(samples, vec![1.0, 1.0, 0.3, 0.175, 0.05, 0.05]);
    }

    #[test]
    fn test_converges_on_best_duration() {
        let mut agent = PolicyAgent::restore(None, 50, seeded(5));
        let ctx = context(25.0, 30.0, 7.0, 10.0, 50.0);
        let state = Discretizer::discretize(&ctx);

        for _ in 0..300 {
            let decision = agent.get_action(&ctx);
            let reward = if decision.duration_minutes == 60 { 1.0 } else { -0.2 };
            agent.update(reward, None).unwrap();
        }

        let table = agent.value_table();
        assert_eq!(ACTION_DURATIONS[table.best_action(state)], 60);
        assert!(table.get(state, 3) > 0.9);
    }

    #[test]
    fn test_restore_keeps_learned_values() {
        let mut agent = PolicyAgent::restore(None, 50, seeded(6));
        let ctx = context(25.0, 30.0, 7.0, 10.0, 50.0);
        for _ in 0..20 {
            agent.get_action(&ctx);
            agent.update(0.5, None).unwrap();
        }

        let snapshot = agent.snapshot();
        let restored = PolicyAgent::restore(
            Some(snapshot.value_table.as_slice()),
            snapshot.episode_count,
            seeded(7),
        );

        assert_eq!(restored.episode_count(), 70);
        assert_eq!(restored.value_table(), agent.value_table());
        assert!(!restored.has_pending());
    }

    #[test]
    fn test_every_context_maps_into_table() {
        let deltas = [-5.0, 0.0, 1.9, 2.0, 4.5, 6.0, 30.0];
        let uvs = [0.0, 2.9, 3.0, 6.0, 9.0, 14.0];
        let winds = [0.0, 14.9, 15.0, 30.0, 120.0];
        let elevations = [-10.0, 0.0, 20.0, 45.0, 90.0];

        for &delta in &deltas {
            for &uv in &uvs {
                for &wind in &winds {
                    for &elevation in &elevations {
                        let ctx = context(25.0, 25.0 + delta, uv, wind, elevation);
                        assert!(Discretizer::discretize(&ctx).get() < NUM_STATES);
                    }
                }
            }
        }
    }
}
