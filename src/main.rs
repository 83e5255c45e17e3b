use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use solarpool_controller::{
    cli::{execute_command, Cli, Commands},
    config::{Config, LogFormat},
    context::ContextGatherer,
    controller::{operator, Collaborators, CycleController, Runner},
    error::AppResult,
    explain::PlainRenderer,
    hass::HomeAssistantClient,
    storage::{Persistence, SqliteStorage},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    // Initialize storage
    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            Arc::new(s)
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    match cli.command() {
        Commands::Run => Ok(run(config, storage).await?),
        command => {
            let result = execute_command(command, &storage).await;
            if result.exit_code == 0 {
                println!("{}", result.message);
            } else {
                eprintln!("{}", result.message);
            }
            std::process::exit(result.exit_code);
        }
    }
}

async fn run(config: Config, storage: Arc<SqliteStorage>) -> AppResult<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "SolarPool controller starting..."
    );

    // Initialize Home Assistant client
    let hass = match HomeAssistantClient::new(
        &config.hass,
        config.entities.clone(),
        config.request.clone(),
    ) {
        Ok(c) => {
            info!(base_url = %config.hass.base_url, "Home Assistant client initialized");
            Arc::new(c)
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize Home Assistant client");
            return Err(e.into());
        }
    };

    let persisted = match storage.load().await {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Failed to load persisted state");
            return Err(e.into());
        }
    };

    let deps = Collaborators {
        gatherer: ContextGatherer::new(config.entities.clone(), hass.clone(), hass.clone()),
        actuator: hass,
        persistence: storage,
        renderer: Arc::new(PlainRenderer),
    };
    let controller = CycleController::new(deps, config.controller, persisted, Utc::now());
    let (runner, handle) = Runner::new(controller);

    let status_logger = operator::spawn_status_logger(handle.subscribe());
    #[cfg(unix)]
    let signals = match operator::spawn_signal_listener(handle.clone()) {
        Ok(task) => {
            info!("Operator signals: SIGHUP reload settings, SIGUSR1 force cycle, SIGUSR2 toggle enable");
            Some(task)
        }
        Err(e) => {
            warn!(error = %e, "Failed to install signal handlers, operator signals disabled");
            None
        }
    };
    #[cfg(not(unix))]
    let signals: Option<tokio::task::JoinHandle<()>> = None;

    info!(pump = %config.entities.pump, "Controller ready");
    let controller = runner.run().await;

    if let Some(task) = signals {
        task.abort();
    }
    drop(handle);
    if let Err(e) = status_logger.await {
        warn!(error = %e, "Status logger ended abnormally");
    }

    info!(
        episodes = controller.agent().episode_count(),
        "Controller shutdown complete"
    );
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
