//! Persistence of the learned policy and the cycle history.
//!
//! The controller only sees the [`Persistence`] trait. [`SqliteStorage`]
//! is the production implementation.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::controller::CycleRecord;
use crate::error::StorageResult;

/// Everything that survives a restart.
///
/// The agent's pending decision is intentionally not part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Raw value table; validated by the agent on restore
    pub value_table: Option<Vec<Vec<f64>>>,
    pub episode_count: u64,
    /// Oldest first
    pub history: Vec<CycleRecord>,
    /// Master switch position
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            value_table: None,
            episode_count: 0,
            history: Vec::new(),
            enabled: default_enabled(),
        }
    }
}

/// Storage seam for agent state and history.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Load saved state; an empty store yields [`PersistedState::default`].
    async fn load(&self) -> StorageResult<PersistedState>;

    /// Replace saved state.
    async fn save(&self, state: &PersistedState) -> StorageResult<()>;
}
