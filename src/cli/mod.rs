//! Command-line interface.
//!
//! `run` (the default) starts the controller loop. The other commands only
//! read or reset the persisted learning state and never touch the pump.

use clap::{Parser, Subcommand};

use crate::agent::{exploration_rate, LearningPhase};
use crate::controller::HistoryStore;
use crate::storage::{Persistence, SqliteStorage};

/// Autonomous solar pool pump controller.
#[derive(Parser, Debug, Clone)]
#[command(name = "solarpool-controller", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Selected command, `run` when none was given.
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Run the controller loop
    ///
    /// While running, SIGHUP reloads the controller settings from the
    /// environment and `.env`, SIGUSR1 forces a cycle and SIGUSR2 toggles
    /// the enable switch. Status changes are logged.
    Run,

    /// Show persisted learning state
    Status,

    /// Show recent cycle decisions
    History {
        /// Maximum number of cycles to show
        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// Forget the learned value table and episode count
    ResetLearning,
}

/// Result of CLI command execution.
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Execute an offline command against the database.
pub async fn execute_command(command: Commands, storage: &SqliteStorage) -> CliResult {
    match command {
        Commands::Run => CliResult::error("run is handled by the binary entry point"),
        Commands::Status => execute_status(storage).await,
        Commands::History { limit } => execute_history(storage, limit).await,
        Commands::ResetLearning => execute_reset(storage).await,
    }
}

async fn execute_status(storage: &SqliteStorage) -> CliResult {
    let state = match storage.load().await {
        Ok(state) => state,
        Err(e) => return CliResult::error(format!("Failed to load state: {}", e)),
    };

    let episodes = state.episode_count;
    let phase = LearningPhase::for_episode(episodes);
    let history = HistoryStore::from_records(state.history);

    let mut output = String::new();
    output.push_str("\nSolar Pool Controller\n");
    output.push_str("═════════════════════════════════════════\n\n");
    output.push_str(&format!(
        "Enabled:          {}\n",
        if state.enabled { "yes" } else { "no" }
    ));
    output.push_str(&format!("Episodes:         {}\n", episodes));
    output.push_str(&format!("Learning phase:   {}\n", phase.as_str()));
    output.push_str(&format!(
        "Exploration rate: {:.3}\n",
        exploration_rate(episodes)
    ));
    output.push_str(&format!(
        "Value table:      {}\n",
        if state.value_table.is_some() {
            "stored"
        } else {
            "not yet learned"
        }
    ));
    output.push_str(&format!("History records:  {}\n", history.len()));

    let summary = history.performance_summary();
    if !summary.is_empty() {
        output.push_str("\nRecent performance\n");
        for entry in summary {
            output.push_str(&format!(
                "  {:<3} expected {:>5.2}°C  actual {:>5.2}°C  {:>4}%  ({})\n",
                entry.decision.as_str(),
                entry.expected_gain,
                entry.actual_gain,
                entry.efficiency_pct,
                entry.conditions
            ));
        }
    }

    CliResult::success(output)
}

async fn execute_history(storage: &SqliteStorage, limit: u32) -> CliResult {
    let records = match storage.recent_history(limit).await {
        Ok(records) => records,
        Err(e) => return CliResult::error(format!("Failed to load history: {}", e)),
    };

    if records.is_empty() {
        return CliResult::success("No cycles recorded yet");
    }

    let mut output = String::new();
    output.push_str(&format!("\nLast {} cycles (newest first)\n", records.len()));
    output.push_str("═════════════════════════════════════════\n");
    for record in records {
        let actual = record
            .actual_gain
            .map(|g| format!("{:+.2}°C", g))
            .unwrap_or_else(|| "pending".to_string());
        output.push_str(&format!(
            "#{:<5} {}  {:<3} {:>3} min  pool {:.1}°C  expected {:+.2}°C  actual {}{}\n",
            record.cycle_seq,
            record.timestamp.format("%Y-%m-%d %H:%M"),
            record.decision.as_str(),
            record.heating_duration_minutes,
            record.pool_temp_at_decision,
            record.expected_gain,
            actual,
            if record.is_exploratory { "  [explore]" } else { "" }
        ));
    }

    CliResult::success(output)
}

async fn execute_reset(storage: &SqliteStorage) -> CliResult {
    match storage.reset_learning().await {
        Ok(true) => CliResult::success("Learning state reset; the next run starts from scratch"),
        Ok(false) => CliResult::success("No learning state stored"),
        Err(e) => CliResult::error(format!("Failed to reset learning state: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_run() {
        let cli = Cli::parse_from(["solarpool-controller"]);
        assert_eq!(cli.command(), Commands::Run);
    }

    #[test]
    fn test_history_limit() {
        let cli = Cli::parse_from(["solarpool-controller", "history", "--limit", "3"]);
        assert_eq!(cli.command(), Commands::History { limit: 3 });

        let cli = Cli::parse_from(["solarpool-controller", "history"]);
        assert_eq!(cli.command(), Commands::History { limit: 10 });
    }

    #[test]
    fn test_reset_learning_subcommand() {
        let cli = Cli::parse_from(["solarpool-controller", "reset-learning"]);
        assert_eq!(cli.command(), Commands::ResetLearning);
    }

    #[tokio::test]
    async fn test_status_on_empty_database() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        let result = execute_command(Commands::Status, &storage).await;
        assert_eq!(result.exit_code, 0);
        assert!(result.message.contains("Episodes:         0"));
        assert!(result.message.contains("bootstrap"));
        assert!(result.message.contains("Enabled:          yes"));
    }

    #[tokio::test]
    async fn test_history_on_empty_database() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        let result = execute_command(Commands::History { limit: 5 }, &storage).await;
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.message, "No cycles recorded yet");
    }
}
