//! Pump control: the cycle state machine and everything it leans on.
//!
//! - [`cycle`]: [`CycleController`], phases and pump ownership
//! - [`safety`]: short-cycle protection and the thermal floor
//! - [`sweep`]: return-temperature stabilisation
//! - [`history`]: bounded decision history and daily yield
//! - [`scheduler`]: cancellable timers
//! - [`runner`]: tokio event loop and operator commands
//! - [`operator`]: Unix signal ingress and status logging

pub mod cycle;
pub mod history;
pub mod operator;
pub mod runner;
pub mod safety;
pub mod scheduler;
pub mod state;
pub mod sweep;

pub use cycle::{Collaborators, CycleController, MIN_SUN_ELEVATION};
pub use history::{CycleRecord, DailyYield, HistoryStore, ResolvedCycle, HISTORY_CAPACITY};
pub use operator::{dispatch, status_changed, OperatorSignal};
pub use runner::{ControlCommand, ControllerHandle, Runner};
pub use safety::{GuardedAction, SafetyGuard, SafetyOverride};
pub use scheduler::{ScheduledEvent, Scheduler, TimerId};
pub use state::{ControllerState, ControllerStatus, Phase};
pub use sweep::{StabilityMonitor, SweepVerdict};
