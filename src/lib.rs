//! # SolarPool Controller
//!
//! Autonomous controller for a solar pool heating loop. A timer-driven
//! cycle state machine decides when and for how long the circulation pump
//! runs through the roof collector, guided by a tabular Q-learning policy
//! that learns from the pool temperature gain each decision produced.
//!
//! ## Architecture
//!
//! ```text
//!  Home Assistant (REST) ◄──► hass adapter ──► ContextGatherer ──► Context
//!                                  ▲                                 │
//!                                  │ pump on/off                     ▼
//!                            CycleController ◄──── PolicyAgent (Q-table)
//!                                  │
//!                                  ▼
//!                          SQLite (agent state + history)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use solarpool_controller::config::Config;
//! use solarpool_controller::context::ContextGatherer;
//! use solarpool_controller::controller::{Collaborators, CycleController, Runner};
//! use solarpool_controller::explain::PlainRenderer;
//! use solarpool_controller::hass::HomeAssistantClient;
//! use solarpool_controller::storage::{Persistence, SqliteStorage};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let storage = Arc::new(SqliteStorage::new(&config.database).await?);
//!     let hass = Arc::new(HomeAssistantClient::new(
//!         &config.hass,
//!         config.entities.clone(),
//!         config.request.clone(),
//!     )?);
//!     let deps = Collaborators {
//!         gatherer: ContextGatherer::new(config.entities.clone(), hass.clone(), hass.clone()),
//!         actuator: hass,
//!         persistence: storage.clone(),
//!         renderer: Arc::new(PlainRenderer),
//!     };
//!     let persisted = storage.load().await?;
//!     let controller = CycleController::new(deps, config.controller, persisted, chrono::Utc::now());
//!     let (runner, _handle) = Runner::new(controller);
//!     runner.run().await;
//!     Ok(())
//! }
//! ```

/// Q-learning policy: state discretisation, value table and reward.
pub mod agent;
/// Command-line interface.
pub mod cli;
/// Configuration loaded from the environment.
pub mod config;
/// Sensor context and its gathering.
pub mod context;
/// Cycle state machine, safety guard, history and event loop.
pub mod controller;
/// Error types and result aliases.
pub mod error;
/// Structured decision reasons and their rendering.
pub mod explain;
/// Home Assistant adapter and the collaborator traits.
pub mod hass;
/// SQLite persistence of agent state and history.
pub mod storage;

pub use config::Config;
pub use controller::{ControlCommand, ControllerStatus, CycleController, Phase};
pub use error::{AppError, AppResult};
