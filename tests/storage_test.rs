//! Integration tests for SQLite storage layer
//!
//! Tests persistence of agent state and cycle history using in-memory and
//! on-disk SQLite databases.

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use tokio_test::assert_ok;

use solarpool_controller::agent::{PumpAction, NUM_ACTIONS, NUM_STATES};
use solarpool_controller::config::DatabaseConfig;
use solarpool_controller::context::Context;
use solarpool_controller::controller::CycleRecord;
use solarpool_controller::storage::{PersistedState, Persistence, SqliteStorage};

/// Create an in-memory storage instance for testing
async fn create_test_storage() -> SqliteStorage {
    SqliteStorage::new_in_memory()
        .await
        .expect("Failed to create in-memory storage")
}

fn test_table() -> Vec<Vec<f64>> {
    (0..NUM_STATES)
        .map(|s| (0..NUM_ACTIONS).map(|a| (s * NUM_ACTIONS + a) as f64 / 1000.0).collect())
        .collect()
}

fn test_record(seq: u64, pool_temp: f64, decision: PumpAction) -> CycleRecord {
    let context = Context::new(pool_temp, pool_temp + 6.0)
        .with_uv(7.5)
        .with_wind(8.0)
        .with_elevation(48.0)
        .with_condition("sunny");
    let duration = if decision == PumpAction::On { 40 } else { 0 };
    CycleRecord::new(
        seq,
        Utc::now() - Duration::minutes(10 * (20 - seq as i64)),
        &context,
        decision,
        0.6,
        duration,
        seq % 2 == 0,
    )
}

#[cfg(test)]
mod agent_state_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_load_empty_database() {
        let storage = create_test_storage().await;

        let state = assert_ok!(storage.load().await);

        assert_eq!(state, PersistedState::default());
    }

    #[tokio::test]
    async fn test_save_and_load_value_table() {
        let storage = create_test_storage().await;
        let state = PersistedState {
            value_table: Some(test_table()),
            episode_count: 37,
            history: Vec::new(),
            enabled: true,
        };

        assert_ok!(storage.save(&state).await);
        let loaded = assert_ok!(storage.load().await);

        assert_eq!(loaded.episode_count, 37);
        assert_eq!(loaded.value_table, Some(test_table()));
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_state() {
        let storage = create_test_storage().await;

        let first = PersistedState {
            value_table: Some(test_table()),
            episode_count: 3,
            history: vec![test_record(1, 25.0, PumpAction::On)],
            enabled: true,
        };
        assert_ok!(storage.save(&first).await);

        let second = PersistedState {
            value_table: Some(test_table()),
            episode_count: 4,
            history: vec![test_record(2, 25.5, PumpAction::Off)],
            enabled: true,
        };
        assert_ok!(storage.save(&second).await);

        let loaded = assert_ok!(storage.load().await);
        assert_eq!(loaded.episode_count, 4);
        assert_eq!(loaded.history.len(), 1);
        assert_eq!(loaded.history[0].cycle_seq, 2);
    }

    #[tokio::test]
    async fn test_reset_learning_keeps_history() {
        let storage = create_test_storage().await;
        let state = PersistedState {
            value_table: Some(test_table()),
            episode_count: 60,
            history: vec![test_record(1, 25.0, PumpAction::On)],
            enabled: true,
        };
        assert_ok!(storage.save(&state).await);

        let removed = assert_ok!(storage.reset_learning().await);
        assert!(removed);

        let loaded = assert_ok!(storage.load().await);
        assert_eq!(loaded.value_table, None);
        assert_eq!(loaded.episode_count, 0);
        assert_eq!(loaded.history.len(), 1);

        let removed_again = assert_ok!(storage.reset_learning().await);
        assert!(!removed_again);
    }

    #[tokio::test]
    async fn test_enabled_flag_survives_reset_learning() {
        let storage = create_test_storage().await;
        let state = PersistedState {
            value_table: Some(test_table()),
            episode_count: 5,
            history: Vec::new(),
            enabled: false,
        };
        assert_ok!(storage.save(&state).await);

        let loaded = assert_ok!(storage.load().await);
        assert!(!loaded.enabled);

        assert_ok!(storage.reset_learning().await);
        let loaded = assert_ok!(storage.load().await);
        assert!(!loaded.enabled);
        assert_eq!(loaded.episode_count, 0);
    }

    #[tokio::test]
    async fn test_malformed_value_table_is_ignored() {
        let storage = create_test_storage().await;

        sqlx::query(
            "INSERT INTO agent_state (id, value_table, episode_count, updated_at) VALUES (1, ?, ?, ?)",
        )
        .bind("{not json")
        .bind(12_i64)
        .bind(Utc::now().to_rfc3339())
        .execute(storage.pool())
        .await
        .unwrap();

        let loaded = assert_ok!(storage.load().await);
        assert_eq!(loaded.value_table, None);
        assert_eq!(loaded.episode_count, 12);
    }
}

#[cfg(test)]
mod history_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_history_roundtrip_preserves_records() {
        let storage = create_test_storage().await;
        let mut resolved = test_record(1, 25.0, PumpAction::On);
        resolved.actual_gain = Some(0.42);
        let pending = test_record(2, 25.42, PumpAction::Off);

        let state = PersistedState {
            value_table: None,
            episode_count: 1,
            history: vec![resolved.clone(), pending.clone()],
            enabled: true,
        };
        assert_ok!(storage.save(&state).await);

        let loaded = assert_ok!(storage.load().await);
        assert_eq!(loaded.history.len(), 2);
        assert_eq!(loaded.history[0].id, resolved.id);
        assert_eq!(loaded.history[0].actual_gain, Some(0.42));
        assert_eq!(loaded.history[0].decision, PumpAction::On);
        assert_eq!(loaded.history[0].heating_duration_minutes, 40);
        assert_eq!(loaded.history[0].context_snapshot.uv_index, Some(7.5));
        assert_eq!(loaded.history[1].id, pending.id);
        assert_eq!(loaded.history[1].actual_gain, None);
        assert!(loaded.history[1].is_exploratory);
    }

    #[tokio::test]
    async fn test_recent_history_newest_first() {
        let storage = create_test_storage().await;
        let history: Vec<CycleRecord> = (1..=6)
            .map(|seq| test_record(seq, 25.0, PumpAction::On))
            .collect();
        let state = PersistedState {
            value_table: None,
            episode_count: 0,
            history,
            enabled: true,
        };
        assert_ok!(storage.save(&state).await);

        let recent = assert_ok!(storage.recent_history(3).await);
        let seqs: Vec<u64> = recent.iter().map(|r| r.cycle_seq).collect();
        assert_eq!(seqs, vec![6, 5, 4]);
    }

    #[tokio::test]
    async fn test_corrupt_history_row_is_skipped() {
        let storage = create_test_storage().await;
        let good = test_record(1, 25.0, PumpAction::On);
        let state = PersistedState {
            value_table: None,
            episode_count: 0,
            history: vec![good.clone()],
            enabled: true,
        };
        assert_ok!(storage.save(&state).await);

        sqlx::query(
            r#"
            INSERT INTO cycle_history (
                id, cycle_seq, timestamp, context_snapshot, decision, expected_gain,
                pool_temp_at_decision, heating_duration_minutes, is_exploratory, actual_gain
            )
            VALUES ('bad-id', 2, 'yesterday', '{}', 'ON', 0.5, 25.0, 20, 0, NULL)
            "#,
        )
        .execute(storage.pool())
        .await
        .unwrap();

        let loaded = assert_ok!(storage.load().await);
        assert_eq!(loaded.history.len(), 1);
        assert_eq!(loaded.history[0].id, good.id);
    }
}

#[cfg(test)]
mod file_database_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested").join("solarpool.db"),
            max_connections: 2,
        };

        {
            let storage = assert_ok!(SqliteStorage::new(&config).await);
            let state = PersistedState {
                value_table: Some(test_table()),
                episode_count: 9,
                history: vec![test_record(4, 27.0, PumpAction::On)],
                enabled: true,
            };
            assert_ok!(storage.save(&state).await);
            storage.pool().close().await;
        }

        let storage = assert_ok!(SqliteStorage::new(&config).await);
        let loaded = assert_ok!(storage.load().await);
        assert_eq!(loaded.episode_count, 9);
        assert_eq!(loaded.value_table, Some(test_table()));
        assert_eq!(loaded.history[0].cycle_seq, 4);
    }
}
