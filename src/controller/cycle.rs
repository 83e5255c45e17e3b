//! The control-cycle state machine.
//!
//! ```text
//!            tick / force
//!  IDLE ───────────────────► prerequisites ──fail──► IDLE | COOLDOWN (pump off)
//!   ▲                              │ ok
//!   │                              ▼
//!   │          pump already heating? ──yes──┐
//!   │                              │ no     │
//!   │                              ▼        │
//!   │                         SWEEPING      │   stable or timeout
//!   │                              │────────┤
//!   │                              ▼        ▼
//!   │                           MEASURING ──sensor fault──► IDLE (pump off)
//!   │                              │
//!   │                              ▼
//!   │                          CONSULTING ── policy + safety guard
//!   │                         OFF │    │ ON
//!   └─────────────────────────────┘    ▼
//!   └──────── heating timer ◄───── HEATING
//! ```
//!
//! All work happens inside [`CycleController`] methods driven by scheduler
//! events or operator commands, one at a time. Every phase entry cancels the
//! sweep and heating timers of the previous phase before new ones are armed.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, error, info, warn};

use super::history::{CycleRecord, DailyYield, HistoryStore};
use super::safety::{SafetyGuard, SafetyOverride};
use super::scheduler::{ScheduledEvent, Scheduler, TimerId};
use super::state::{ControllerState, ControllerStatus, Phase};
use super::sweep::{StabilityMonitor, SweepVerdict, CHECK_INTERVAL_SECS, FIRST_CHECK_SECS};
use crate::agent::{calculate_reward, PolicyAgent, PumpAction};
use crate::config::ControllerSettings;
use crate::context::ContextGatherer;
use crate::error::{ActuatorError, ConfigError};
use crate::explain::{DecisionReason, ExplanationRenderer, StatusMessage};
use crate::hass::{ActuatorControl, PumpState};
use crate::storage::{PersistedState, Persistence};

/// Minimum sun elevation (°) for a non-forced cycle.
pub const MIN_SUN_ELEVATION: f64 = 5.0;

/// External collaborators the controller drives.
#[derive(Clone)]
pub struct Collaborators {
    pub gatherer: ContextGatherer,
    pub actuator: Arc<dyn ActuatorControl>,
    pub persistence: Arc<dyn Persistence>,
    pub renderer: Arc<dyn ExplanationRenderer>,
}

/// Timer-driven pump controller with an embedded learning agent.
pub struct CycleController {
    settings: ControllerSettings,
    state: ControllerState,
    agent: PolicyAgent,
    history: HistoryStore,
    daily_yield: DailyYield,
    guard: SafetyGuard,
    scheduler: Scheduler,
    tick_timer: Option<TimerId>,
    sweep_timer: Option<TimerId>,
    heating_timer: Option<TimerId>,
    sweep: Option<StabilityMonitor>,
    cycle_seq: u64,
    deps: Collaborators,
}

impl CycleController {
    /// Build a controller from persisted state. Always starts in IDLE.
    pub fn new(
        deps: Collaborators,
        settings: ControllerSettings,
        persisted: PersistedState,
        now: DateTime<Utc>,
    ) -> Self {
        Self::with_rng(deps, settings, persisted, ChaCha8Rng::from_entropy(), now)
    }

    /// Same as [`CycleController::new`] with an explicit random source.
    pub fn with_rng(
        deps: Collaborators,
        settings: ControllerSettings,
        persisted: PersistedState,
        rng: ChaCha8Rng,
        now: DateTime<Utc>,
    ) -> Self {
        let agent = PolicyAgent::restore(
            persisted.value_table.as_deref(),
            persisted.episode_count,
            rng,
        );
        let history = HistoryStore::from_records(persisted.history);
        let cycle_seq = history.next_cycle_seq().saturating_sub(1);
        let initial = deps.renderer.status(&StatusMessage::Initializing);
        let mut state = ControllerState::new(&initial);
        state.enabled = persisted.enabled;

        Self {
            guard: SafetyGuard::new(settings.min_run_minutes),
            settings,
            state,
            agent,
            history,
            daily_yield: DailyYield::new(now),
            scheduler: Scheduler::new(),
            tick_timer: None,
            sweep_timer: None,
            heating_timer: None,
            sweep: None,
            cycle_seq,
            deps,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Arm the periodic tick and the post-startup settle delay.
    pub fn start(&mut self, now: DateTime<Utc>) {
        let waiting = self.deps.renderer.status(&StatusMessage::WaitingForStartup);
        self.state.phase = Phase::Idle;
        self.state.set_reasoning(&waiting);
        self.arm_tick(now);
        self.scheduler.schedule(
            now + Duration::seconds(self.settings.startup_delay_secs as i64),
            ScheduledEvent::StartupSettle,
        );
        info!(
            delay_secs = self.settings.startup_delay_secs,
            interval_minutes = self.settings.cycle_interval_minutes,
            "Controller started, first cycle after settle delay"
        );
        if !self.state.enabled {
            info!("Controller restored disabled, periodic cycles skipped until enabled");
        }
    }

    /// Cancel every timer and release the pump if a sweep or heating run was
    /// active, or if an earlier release failed and the pump is still owned.
    pub async fn shutdown(&mut self, now: DateTime<Utc>) {
        let release = self.state.phase.drives_pump() || self.state.owns_pump;
        self.scheduler.clear();
        self.tick_timer = None;
        self.sweep_timer = None;
        self.heating_timer = None;
        self.sweep = None;

        if release {
            if let Err(e) = self.command_pump(false, now).await {
                error!(error = %e, "Failed to stop pump on shutdown");
            }
        }
        self.state.pump_is_heating = false;
        let text = self.deps.renderer.status(&StatusMessage::Shutdown);
        self.transition(Phase::Idle, &text);
        self.persist().await;
        info!("Controller stopped");
    }

    // ========================================================================
    // Event Dispatch
    // ========================================================================

    /// Earliest armed timer.
    pub fn next_due(&mut self) -> Option<DateTime<Utc>> {
        self.scheduler.next_due()
    }

    /// Deliver every event due at or before `now`, in order. Returns how many fired.
    pub async fn run_due(&mut self, now: DateTime<Utc>) -> usize {
        let mut fired = 0;
        while let Some((id, event)) = self.scheduler.pop_due(now) {
            self.handle_event(id, event, now).await;
            fired += 1;
        }
        fired
    }

    async fn handle_event(&mut self, id: TimerId, event: ScheduledEvent, now: DateTime<Utc>) {
        debug!(?event, phase = %self.state.phase, "Timer fired");
        match event {
            ScheduledEvent::Tick => {
                if self.tick_timer == Some(id) {
                    self.tick_timer = None;
                }
                self.arm_tick(now);
                self.start_cycle(now, false).await;
            }
            ScheduledEvent::StartupSettle => self.start_cycle(now, false).await,
            ScheduledEvent::SweepCheck => {
                if self.sweep_timer == Some(id) {
                    self.sweep_timer = None;
                }
                self.check_sweep(now).await;
            }
            ScheduledEvent::HeatingComplete => {
                if self.heating_timer == Some(id) {
                    self.heating_timer = None;
                }
                self.complete_heating(now).await;
            }
        }
    }

    // ========================================================================
    // Operator Commands
    // ========================================================================

    /// Run a cycle now, bypassing the enable switch and prerequisites.
    pub async fn force(&mut self, now: DateTime<Utc>) {
        info!("Forced cycle requested");
        self.start_cycle(now, true).await;
    }

    /// Master switch. Disabling releases the pump; enabling runs a cycle.
    pub async fn set_enabled(&mut self, enabled: bool, now: DateTime<Utc>) {
        if self.state.enabled == enabled {
            return;
        }
        self.state.enabled = enabled;
        info!(enabled, "Controller enable switch changed");
        self.persist().await;
        if enabled {
            self.start_cycle(now, false).await;
        } else {
            let text = self.deps.renderer.status(&StatusMessage::Disabled);
            self.settle(Phase::Idle, &text, now).await;
        }
    }

    /// Apply new operator settings and re-arm the periodic tick.
    ///
    /// Invalid settings are rejected: the previous ones stay active and the
    /// controller settles to IDLE with the pump released.
    pub async fn update_settings(
        &mut self,
        settings: ControllerSettings,
        now: DateTime<Utc>,
    ) -> Result<(), ConfigError> {
        if let Err(e) = settings.validate() {
            error!(error = %e, "Rejected controller settings");
            let text = self.deps.renderer.status(&StatusMessage::SettingsRejected {
                message: e.to_string(),
            });
            self.settle(Phase::Idle, &text, now).await;
            return Err(e);
        }

        info!(
            sweep_secs = settings.sweep_duration_secs,
            max_pool_temp = settings.max_pool_temp,
            interval_minutes = settings.cycle_interval_minutes,
            "Controller settings updated"
        );
        self.guard = SafetyGuard::new(settings.min_run_minutes);
        self.settings = settings;
        self.arm_tick(now);
        Ok(())
    }

    // ========================================================================
    // Cycle Pipeline
    // ========================================================================

    async fn start_cycle(&mut self, now: DateTime<Utc>, force: bool) {
        if !force && !self.state.enabled {
            debug!("Controller disabled, skipping cycle");
            return;
        }
        if self.state.phase.is_in_flight() {
            info!(phase = %self.state.phase, "Cycle already in progress, ignoring trigger");
            return;
        }

        self.cycle_seq += 1;
        debug!(cycle = self.cycle_seq, force, "Starting cycle");

        let pool_temp = match self.deps.gatherer.pool_temp().await {
            Ok(temp) => {
                self.resolve_prior(now, temp).await;
                Some(temp)
            }
            Err(e) => {
                warn!(error = %e, "Pool temperature unavailable at cycle start");
                None
            }
        };

        if !force && !self.check_prerequisites(pool_temp, now).await {
            return;
        }

        if self.state.pump_is_heating {
            info!("Pump already heating, skipping sweep for an instant re-consult");
            self.measure_and_consult(now).await;
        } else {
            self.begin_sweep(now, force).await;
        }
    }

    async fn check_prerequisites(&mut self, pool_temp: Option<f64>, now: DateTime<Utc>) -> bool {
        if let Some(sun) = self.deps.gatherer.sun().await {
            if !sun.above_horizon {
                let text = self.deps.renderer.status(&StatusMessage::SunBelowHorizon);
                self.settle(Phase::Idle, &text, now).await;
                return false;
            }
            if sun.elevation < MIN_SUN_ELEVATION {
                let text = self.deps.renderer.status(&StatusMessage::SunTooLow {
                    elevation: sun.elevation,
                });
                self.settle(Phase::Idle, &text, now).await;
                return false;
            }
        }

        if let Some(temp) = pool_temp {
            if temp >= self.settings.max_pool_temp {
                let text = self.deps.renderer.status(&StatusMessage::MaxTempReached {
                    temp,
                    max_temp: self.settings.max_pool_temp,
                });
                self.settle(Phase::Cooldown, &text, now).await;
                return false;
            }
        }

        true
    }

    async fn begin_sweep(&mut self, now: DateTime<Utc>, force: bool) {
        let message = if force {
            StatusMessage::SweepForced
        } else {
            StatusMessage::SweepStarting
        };
        let text = self.deps.renderer.status(&message);
        self.transition(Phase::Sweeping, &text);

        if let Err(e) = self.command_pump(true, now).await {
            self.fail(&e);
            return;
        }

        self.sweep = Some(StabilityMonitor::new(now, self.settings.sweep_duration_secs));
        self.sweep_timer = Some(self.scheduler.schedule(
            now + Duration::seconds(FIRST_CHECK_SECS),
            ScheduledEvent::SweepCheck,
        ));
    }

    async fn check_sweep(&mut self, now: DateTime<Utc>) {
        if self.state.phase != Phase::Sweeping {
            return;
        }

        let reading = match self.deps.gatherer.return_temp().await {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(error = %e, "Return temperature unavailable during sweep");
                None
            }
        };

        let verdict = match self.sweep.as_mut() {
            Some(monitor) => monitor.observe(now, reading),
            None => SweepVerdict::TimedOut {
                range: None,
                readings: 0,
            },
        };

        if verdict.is_done() {
            self.sweep = None;
            self.measure_and_consult(now).await;
        } else {
            self.sweep_timer = Some(self.scheduler.schedule(
                now + Duration::seconds(CHECK_INTERVAL_SECS),
                ScheduledEvent::SweepCheck,
            ));
        }
    }

    async fn measure_and_consult(&mut self, now: DateTime<Utc>) {
        let text = self.deps.renderer.status(&StatusMessage::MeasuringSensors);
        self.transition(Phase::Measuring, &text);

        let mut context = match self
            .deps
            .gatherer
            .gather(self.history.performance_summary())
            .await
        {
            Ok(context) => context,
            Err(e) => {
                warn!(error = %e, "Sensor fault, aborting cycle");
                let text = self.deps.renderer.status(&StatusMessage::SensorError {
                    entity_id: e.entity_id().to_string(),
                });
                self.settle(Phase::Idle, &text, now).await;
                return;
            }
        };

        if self.resolve_prior(now, context.pool_temp).await {
            context.performance = self.history.performance_summary();
        }

        let text = self.deps.renderer.status(&StatusMessage::ConsultingPolicy);
        self.transition(Phase::Consulting, &text);

        let decision = self.agent.get_action(&context);
        let reason = DecisionReason::derive(
            decision.action,
            &context,
            decision.is_exploratory,
            decision.is_warmup,
        );
        let mut reasoning = self.deps.renderer.render(&reason);
        self.state.expected_gain = decision.expected_gain;

        info!(
            action = %decision.action,
            duration_minutes = decision.duration_minutes,
            expected_gain = decision.expected_gain,
            state = decision.state_index.get(),
            exploratory = decision.is_exploratory,
            warmup = decision.is_warmup,
            "Policy decision"
        );

        let guarded = self.guard.apply(
            decision.action,
            decision.duration_minutes,
            context.delta(),
            self.state.owned_run_minutes(now),
        );
        for applied in &guarded.overrides {
            match *applied {
                SafetyOverride::ShortCycle { run_minutes, .. } => {
                    let note = self
                        .deps
                        .renderer
                        .status(&StatusMessage::ShortCycleProtection { run_minutes });
                    reasoning = format!("{} {}", reasoning, note);
                }
                SafetyOverride::ThermalFloor { delta } => {
                    reasoning = self
                        .deps
                        .renderer
                        .status(&StatusMessage::SafetyOverride { delta });
                }
            }
        }

        let record = CycleRecord::new(
            self.cycle_seq,
            now,
            &context,
            guarded.action,
            decision.expected_gain,
            guarded.duration_minutes,
            decision.is_exploratory,
        );

        match guarded.action {
            PumpAction::On => self.start_heating(now, guarded.duration_minutes, &reasoning).await,
            PumpAction::Off => self.settle(Phase::Idle, &reasoning, now).await,
        }

        self.history.append(record);
        self.persist().await;
    }

    async fn start_heating(&mut self, now: DateTime<Utc>, minutes: u32, reasoning: &str) {
        self.transition(Phase::Heating, reasoning);

        if let Err(e) = self.command_pump(true, now).await {
            self.state.pump_is_heating = false;
            self.fail(&e);
            return;
        }

        self.state.pump_is_heating = true;
        self.state.heating_started = Some(now);
        self.state.heating_duration_minutes = minutes;
        self.heating_timer = Some(self.scheduler.schedule(
            now + Duration::minutes(minutes as i64),
            ScheduledEvent::HeatingComplete,
        ));
        info!(
            minutes,
            expected_gain = self.state.expected_gain,
            "Heating started"
        );
    }

    async fn complete_heating(&mut self, now: DateTime<Utc>) {
        if self.state.phase != Phase::Heating {
            return;
        }
        info!(
            minutes = self.state.heating_duration_minutes,
            "Heating duration complete, stopping pump"
        );
        let text = self.deps.renderer.status(&StatusMessage::HeatingComplete);
        self.settle(Phase::Idle, &text, now).await;
    }

    // ========================================================================
    // Feedback
    // ========================================================================

    /// Score the newest record if it belongs to an earlier cycle. Returns
    /// whether a record was resolved.
    async fn resolve_prior(&mut self, now: DateTime<Utc>, pool_temp: f64) -> bool {
        let Some(resolved) = self.history.resolve_prior(self.cycle_seq, pool_temp) else {
            return false;
        };

        let reward = calculate_reward(resolved.actual_gain, resolved.heating_duration_minutes);
        self.agent.update(reward, None);
        self.state.last_reward = Some(reward);
        self.daily_yield.record(now, &resolved);

        info!(
            decision = %resolved.decision,
            expected_gain = resolved.expected_gain,
            actual_gain = resolved.actual_gain,
            duration_minutes = resolved.heating_duration_minutes,
            reward,
            "Cycle resolved"
        );

        self.persist().await;
        true
    }

    async fn persist(&self) {
        let snapshot = self.agent.snapshot();
        let state = PersistedState {
            value_table: Some(snapshot.value_table),
            episode_count: snapshot.episode_count,
            history: self.history.to_vec(),
            enabled: self.state.enabled,
        };
        if let Err(e) = self.deps.persistence.save(&state).await {
            error!(error = %e, "Failed to persist controller state");
        }
    }

    // ========================================================================
    // Phase & Pump Helpers
    // ========================================================================

    /// Enter `phase`, cancelling the sweep and heating timers of the previous one.
    fn transition(&mut self, phase: Phase, reasoning: &str) {
        self.scheduler.cancel_slot(&mut self.sweep_timer);
        self.scheduler.cancel_slot(&mut self.heating_timer);

        let from = self.state.phase;
        self.state.phase = phase;
        self.state.set_reasoning(reasoning);
        info!(
            from = %from,
            to = %phase,
            reasoning = %self.state.reasoning(),
            "Phase transition"
        );
    }

    /// Enter a resting phase with the pump released.
    async fn settle(&mut self, phase: Phase, reasoning: &str, now: DateTime<Utc>) {
        self.transition(phase, reasoning);
        self.sweep = None;
        self.state.pump_is_heating = false;
        if let Err(e) = self.command_pump(false, now).await {
            error!(error = %e, "Failed to release pump");
        }
    }

    fn fail(&mut self, e: &ActuatorError) {
        error!(error = %e, "Pump command failed");
        let text = self.deps.renderer.status(&StatusMessage::PumpCommandFailed {
            message: e.to_string(),
        });
        self.transition(Phase::Error, &text);
        self.sweep = None;
    }

    /// Switch the pump, honouring ownership.
    ///
    /// ON never claims a pump that is already running under someone else's
    /// control. OFF only touches a pump this controller turned on. A failed
    /// command leaves ownership unchanged.
    async fn command_pump(&mut self, on: bool, now: DateTime<Utc>) -> Result<(), ActuatorError> {
        if on {
            if self.state.owns_pump {
                return Ok(());
            }
            if self.deps.actuator.pump_state().await == PumpState::On {
                info!("Pump already running under external control, not claiming it");
                return Ok(());
            }
            self.deps.actuator.set_pump(true).await?;
            self.state.owns_pump = true;
            self.state.pump_on_since.get_or_insert(now);
            info!("Pump turned on");
        } else {
            if !self.state.owns_pump {
                debug!("Pump not owned, leaving it as is");
                return Ok(());
            }
            self.deps.actuator.set_pump(false).await?;
            self.state.owns_pump = false;
            self.state.pump_on_since = None;
            info!("Pump turned off");
        }
        Ok(())
    }

    fn arm_tick(&mut self, now: DateTime<Utc>) {
        self.scheduler.cancel_slot(&mut self.tick_timer);
        let due = now + Duration::minutes(self.settings.cycle_interval_minutes as i64);
        self.tick_timer = Some(self.scheduler.schedule(due, ScheduledEvent::Tick));
        self.state.next_cycle_time = Some(due);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn agent(&self) -> &PolicyAgent {
        &self.agent
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn cycle_seq(&self) -> u64 {
        self.cycle_seq
    }

    /// Number of armed timers, the periodic tick included.
    pub fn armed_timers(&self) -> usize {
        self.scheduler.len()
    }

    pub fn status(&self, now: DateTime<Utc>) -> ControllerStatus {
        let mut daily_yield = self.daily_yield.clone();
        daily_yield.roll_over(now);
        ControllerStatus {
            phase: self.state.phase,
            reasoning: self.state.reasoning().to_string(),
            expected_gain: self.state.expected_gain,
            last_reward: self.state.last_reward,
            next_cycle_time: self.state.next_cycle_time,
            episode_count: self.agent.episode_count(),
            exploration_rate: (self.agent.exploration_rate() * 1000.0).round() / 1000.0,
            learning_phase: self.agent.learning_phase(),
            enabled: self.state.enabled,
            owns_pump: self.state.owns_pump,
            pump_is_heating: self.state.pump_is_heating,
            daily_yield,
        }
    }
}
