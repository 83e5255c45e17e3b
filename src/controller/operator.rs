//! Operator ingress for a running controller.
//!
//! Unix signals map onto [`ControlCommand`]s:
//!
//! | Signal    | Effect                                                   |
//! |-----------|----------------------------------------------------------|
//! | `SIGHUP`  | reload controller settings from the environment / `.env` |
//! | `SIGUSR1` | force a cycle now                                        |
//! | `SIGUSR2` | toggle the master enable switch                          |
//!
//! Published status changes are logged at `info`.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::runner::{ControlCommand, ControllerHandle};
use super::state::ControllerStatus;
use crate::config::ControllerSettings;

/// Operator actions reachable from outside the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorSignal {
    Reload,
    Force,
    ToggleEnabled,
}

impl OperatorSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorSignal::Reload => "reload",
            OperatorSignal::Force => "force",
            OperatorSignal::ToggleEnabled => "toggle_enabled",
        }
    }

    /// Command for this signal given the live status.
    pub fn command(self, status: &ControllerStatus) -> ControlCommand {
        match self {
            OperatorSignal::Reload => ControlCommand::UpdateSettings(ControllerSettings::reload()),
            OperatorSignal::Force => ControlCommand::Force,
            OperatorSignal::ToggleEnabled => ControlCommand::SetEnabled(!status.enabled),
        }
    }
}

/// Translate a signal and queue it. Returns `false` once the runner has stopped.
pub async fn dispatch(handle: &ControllerHandle, signal: OperatorSignal) -> bool {
    let command = signal.command(&handle.status());
    info!(signal = signal.as_str(), ?command, "Operator signal received");
    handle.send(command).await
}

/// Listen for `SIGHUP`, `SIGUSR1` and `SIGUSR2` until the runner stops.
#[cfg(unix)]
pub fn spawn_signal_listener(handle: ControllerHandle) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut user1 = signal(SignalKind::user_defined1())?;
    let mut user2 = signal(SignalKind::user_defined2())?;

    Ok(tokio::spawn(async move {
        loop {
            let operator = tokio::select! {
                Some(()) = hangup.recv() => OperatorSignal::Reload,
                Some(()) = user1.recv() => OperatorSignal::Force,
                Some(()) = user2.recv() => OperatorSignal::ToggleEnabled,
                else => break,
            };
            if !dispatch(&handle, operator).await {
                debug!("Controller stopped, signal listener exiting");
                break;
            }
        }
    }))
}

/// Whether `next` differs from `prev` in a way worth reporting.
pub fn status_changed(prev: &ControllerStatus, next: &ControllerStatus) -> bool {
    prev.phase != next.phase
        || prev.reasoning != next.reasoning
        || prev.enabled != next.enabled
        || prev.episode_count != next.episode_count
}

/// Log every reportable status change until the runner drops its sender.
pub fn spawn_status_logger(mut status: watch::Receiver<ControllerStatus>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last = status.borrow_and_update().clone();
        log_status(&last);
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            if status_changed(&last, &current) {
                log_status(&current);
            }
            last = current;
        }
    })
}

fn log_status(status: &ControllerStatus) {
    info!(
        phase = %status.phase,
        reasoning = %status.reasoning,
        enabled = status.enabled,
        owns_pump = status.owns_pump,
        heating = status.pump_is_heating,
        expected_gain = status.expected_gain,
        last_reward = ?status.last_reward,
        next_cycle = ?status.next_cycle_time,
        episodes = status.episode_count,
        exploration_rate = status.exploration_rate,
        learning_phase = status.learning_phase.as_str(),
        daily_gain = status.daily_yield.gain_celsius,
        daily_minutes = status.daily_yield.heating_minutes,
        "Controller status"
    );
}
