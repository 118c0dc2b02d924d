//! Command executor for dispatching CLI commands

use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use super::parser::Commands;
use crate::config::Settings;
use crate::error::{AppError, AppResult};
use crate::monitor::HealthStatus;
use crate::state::AppState;

/// Execute a command with loaded and validated settings.
pub async fn execute_command(command: Commands, settings: Settings) -> AppResult<()> {
    match command {
        Commands::Run {
            maintenance_interval,
        } => run(&settings, Duration::from_secs(maintenance_interval)).await,
        Commands::Health => health(&settings).await,
        Commands::Stats => stats(&settings).await,
        Commands::CheckConfig => check_config(&settings),
    }
}

async fn run(settings: &Settings, maintenance_interval: Duration) -> AppResult<()> {
    let state = AppState::init(settings).await?;
    info!(
        name = %settings.application.name,
        version = %settings.application.version,
        "tiercache running, press Ctrl-C to stop"
    );

    let mut ticker = tokio::time::interval(maintenance_interval);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!(error = %e, "Failed to listen for Ctrl-C, shutting down");
                }
                break;
            }
            _ = ticker.tick() => maintenance(&state).await,
        }
    }

    info!("Shutting down");
    state.close().await;
    Ok(())
}

async fn maintenance(state: &AppState) {
    match state.cache.purge_expired().await {
        Ok(0) => {}
        Ok(purged) => info!(purged, "Expired cache entries purged"),
        Err(e) => warn!(error = %e, "Cache purge failed"),
    }
    if !state.cache.check_health().await {
        warn!(cold_state = ?state.cache.cold_state(), "Cold store unreachable");
    }
}

async fn health(settings: &Settings) -> AppResult<()> {
    let state = AppState::init(settings).await?;
    let report = state.monitor.health().await;
    print_json(&report)?;
    state.close().await;

    match report.status {
        HealthStatus::Healthy => Ok(()),
        HealthStatus::Unhealthy => Err(AppError::Validation {
            field: "cache.cold".to_string(),
            reason: "cold store unreachable".to_string(),
        }),
    }
}

async fn stats(settings: &Settings) -> AppResult<()> {
    let state = AppState::init(settings).await?;
    print_json(&state.monitor.snapshot().await)?;
    state.close().await;
    Ok(())
}

fn check_config(settings: &Settings) -> AppResult<()> {
    settings.validate()?;
    println!(
        "Configuration is valid: {} queue(s), cold tier {}",
        settings.queues.len(),
        if settings.cache.cold.enabled {
            format!("{:?}", settings.cache.cold.backend).to_lowercase()
        } else {
            "disabled".to_string()
        }
    );
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(anyhow::Error::from)?;
    println!("{}", json);
    Ok(())
}
