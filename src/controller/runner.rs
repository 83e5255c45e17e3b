//! Async driver around [`CycleController`].
//!
//! The controller itself is synchronous with respect to time: it is told
//! "now" and reacts. The runner owns it, sleeps until the next armed timer,
//! forwards operator commands and publishes status after every step.

use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::cycle::CycleController;
use super::state::ControllerStatus;
use crate::config::ControllerSettings;

/// Longest sleep when no timer is armed.
const IDLE_POLL: StdDuration = StdDuration::from_secs(60);
/// Queued operator commands.
const COMMAND_BUFFER: usize = 16;

/// Operator commands accepted while running.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Force,
    SetEnabled(bool),
    UpdateSettings(ControllerSettings),
    Shutdown,
}

/// Cloneable handle for sending commands and watching status.
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<ControlCommand>,
    status: watch::Receiver<ControllerStatus>,
}

impl ControllerHandle {
    /// Queue a command. Returns `false` once the runner has stopped.
    pub async fn send(&self, command: ControlCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Latest published status.
    pub fn status(&self) -> ControllerStatus {
        self.status.borrow().clone()
    }

    /// Receiver for status changes.
    pub fn subscribe(&self) -> watch::Receiver<ControllerStatus> {
        self.status.clone()
    }
}

/// Owns the controller and its event loop.
pub struct Runner {
    controller: CycleController,
    commands: mpsc::Receiver<ControlCommand>,
    status: watch::Sender<ControllerStatus>,
}

impl Runner {
    pub fn new(controller: CycleController) -> (Self, ControllerHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (status_tx, status_rx) = watch::channel(controller.status(Utc::now()));
        let runner = Self {
            controller,
            commands: command_rx,
            status: status_tx,
        };
        let handle = ControllerHandle {
            commands: command_tx,
            status: status_rx,
        };
        (runner, handle)
    }

    /// Run until a shutdown command, Ctrl-C, or every handle is dropped.
    pub async fn run(mut self) -> CycleController {
        self.controller.start(Utc::now());
        self.publish();
        info!("Controller loop running");

        loop {
            let sleep_for = match self.controller.next_due() {
                Some(due) => (due - Utc::now()).to_std().unwrap_or(StdDuration::ZERO),
                None => IDLE_POLL,
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {
                    let fired = self.controller.run_due(Utc::now()).await;
                    if fired > 0 {
                        debug!(fired, "Timers processed");
                    }
                }
                command = self.commands.recv() => {
                    match command {
                        Some(ControlCommand::Shutdown) | None => {
                            info!("Shutdown requested");
                            break;
                        }
                        Some(command) => self.apply(command).await,
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl-C");
                    break;
                }
            }

            self.publish();
        }

        self.controller.shutdown(Utc::now()).await;
        self.publish();
        self.controller
    }

    async fn apply(&mut self, command: ControlCommand) {
        let now = Utc::now();
        match command {
            ControlCommand::Force => self.controller.force(now).await,
            ControlCommand::SetEnabled(enabled) => self.controller.set_enabled(enabled, now).await,
            ControlCommand::UpdateSettings(settings) => {
                if let Err(e) = self.controller.update_settings(settings, now).await {
                    warn!(error = %e, "Settings update rejected");
                }
            }
            ControlCommand::Shutdown => {}
        }
    }

    fn publish(&self) {
        self.status.send_replace(self.controller.status(Utc::now()));
    }
}
