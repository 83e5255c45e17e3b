use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{PersistedState, Persistence};
use crate::agent::PumpAction;
use crate::config::DatabaseConfig;
use crate::context::Context;
use crate::controller::CycleRecord;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed persistence
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if needed) the database at the configured path
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// In-memory database on a single pinned connection, for tests
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        // Every connection gets its own memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Most recent records, newest first
    pub async fn recent_history(&self, limit: u32) -> StorageResult<Vec<CycleRecord>> {
        let rows: Vec<CycleRecordRow> = sqlx::query_as(
            r#"
            SELECT id, cycle_seq, timestamp, context_snapshot, decision, expected_gain,
                   pool_temp_at_decision, heating_duration_minutes, is_exploratory, actual_gain
            FROM cycle_history
            ORDER BY cycle_seq DESC, timestamp DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(decode_record).collect())
    }

    /// Forget the value table and episode count; history is kept
    pub async fn reset_learning(&self) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM agent_state")
            .execute(&self.pool)
            .await?;
        let removed = result.rows_affected() > 0;
        info!(removed, "Learning state reset");
        Ok(removed)
    }
}

#[async_trait]
impl Persistence for SqliteStorage {
    async fn load(&self) -> StorageResult<PersistedState> {
        let agent: Option<AgentStateRow> = sqlx::query_as(
            r#"
            SELECT value_table, episode_count, updated_at
            FROM agent_state
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let rows: Vec<CycleRecordRow> = sqlx::query_as(
            r#"
            SELECT id, cycle_seq, timestamp, context_snapshot, decision, expected_gain,
                   pool_temp_at_decision, heating_duration_minutes, is_exploratory, actual_gain
            FROM cycle_history
            ORDER BY cycle_seq ASC, timestamp ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let history: Vec<CycleRecord> = rows.into_iter().filter_map(decode_record).collect();

        let enabled: Option<bool> =
            sqlx::query_scalar("SELECT enabled FROM controller_flags WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        let enabled = enabled.unwrap_or(true);

        let (value_table, episode_count) = match agent {
            Some(row) => {
                debug!(updated_at = %row.updated_at, "Loaded agent state");
                let table = row.value_table.as_deref().and_then(|raw| {
                    serde_json::from_str::<Vec<Vec<f64>>>(raw)
                        .map_err(|e| warn!(error = %e, "Stored value table is not valid JSON, ignoring"))
                        .ok()
                });
                (table, row.episode_count.max(0) as u64)
            }
            None => (None, 0),
        };

        info!(
            episode_count,
            has_table = value_table.is_some(),
            history = history.len(),
            enabled,
            "Persisted state loaded"
        );

        Ok(PersistedState {
            value_table,
            episode_count,
            history,
            enabled,
        })
    }

    async fn save(&self, state: &PersistedState) -> StorageResult<()> {
        let value_table = state
            .value_table
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO agent_state (id, value_table, episode_count, updated_at)
            VALUES (1, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                value_table = excluded.value_table,
                episode_count = excluded.episode_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&value_table)
        .bind(state.episode_count as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO controller_flags (id, enabled, updated_at)
            VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                enabled = excluded.enabled,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(state.enabled)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM cycle_history")
            .execute(&mut *tx)
            .await?;

        for record in &state.history {
            let context = serde_json::to_string(&record.context_snapshot)?;
            sqlx::query(
                r#"
                INSERT INTO cycle_history (
                    id, cycle_seq, timestamp, context_snapshot, decision, expected_gain,
                    pool_temp_at_decision, heating_duration_minutes, is_exploratory, actual_gain
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(record.id.to_string())
            .bind(record.cycle_seq as i64)
            .bind(record.timestamp.to_rfc3339())
            .bind(&context)
            .bind(record.decision.as_str())
            .bind(record.expected_gain)
            .bind(record.pool_temp_at_decision)
            .bind(record.heating_duration_minutes as i64)
            .bind(record.is_exploratory)
            .bind(record.actual_gain)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            episode_count = state.episode_count,
            history = state.history.len(),
            enabled = state.enabled,
            "Persisted state saved"
        );
        Ok(())
    }
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct AgentStateRow {
    value_table: Option<String>,
    episode_count: i64,
    updated_at: String,
}

#[derive(sqlx::FromRow)]
struct CycleRecordRow {
    id: String,
    cycle_seq: i64,
    timestamp: String,
    context_snapshot: String,
    decision: String,
    expected_gain: f64,
    pool_temp_at_decision: f64,
    heating_duration_minutes: i64,
    is_exploratory: bool,
    actual_gain: Option<f64>,
}

impl TryFrom<CycleRecordRow> for CycleRecord {
    type Error = StorageError;

    fn try_from(row: CycleRecordRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, detail: String| StorageError::Corrupt {
            message: format!("cycle {} {}: {}", row.id, what, detail),
        };

        let id = Uuid::parse_str(&row.id).map_err(|e| corrupt("id", e.to_string()))?;
        let timestamp = DateTime::parse_from_rfc3339(&row.timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| corrupt("timestamp", e.to_string()))?;
        let context_snapshot: Context = serde_json::from_str(&row.context_snapshot)
            .map_err(|e| corrupt("context", e.to_string()))?;
        let decision = PumpAction::from_str(&row.decision).map_err(|e| corrupt("decision", e))?;

        Ok(CycleRecord {
            id,
            cycle_seq: row.cycle_seq.max(0) as u64,
            timestamp,
            context_snapshot,
            decision,
            expected_gain: row.expected_gain,
            pool_temp_at_decision: row.pool_temp_at_decision,
            heating_duration_minutes: row.heating_duration_minutes.max(0) as u32,
            is_exploratory: row.is_exploratory,
            actual_gain: row.actual_gain,
        })
    }
}

/// Decode a row, skipping (and logging) corrupt ones.
fn decode_record(row: CycleRecordRow) -> Option<CycleRecord> {
    CycleRecord::try_from(row)
        .map_err(|e| warn!(error = %e, "Skipping unreadable history row"))
        .ok()
}
