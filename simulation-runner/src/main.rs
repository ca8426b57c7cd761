use anyhow::{Context, Result};
use serde_json::Value;
use simulation_runner::{DriverRegistry, SimulationEngine};
use std::sync::Arc;
use tracing::info;
use turnsim::arbitrator::build_arbitrator;
use turnsim::config::{load_config, RunSettings, SimulationConfig};
use turnsim::SqliteTurnLog;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "turnsim=info,simulation_runner=info".into()),
        )
        .init();

    info!("turnsim starting...");

    // Read process settings from environment
    let settings = RunSettings::from_env();

    let config = match &settings.config_path {
        Some(path) => load_config(&path.to_string_lossy())?,
        None => SimulationConfig::default(),
    };

    info!(
        config = ?settings.config_path,
        world = %settings.world_path.display(),
        steps = settings.steps,
        database = %config.database.path.display(),
        arbitrator = ?config.arbitrator.kind,
        "Configuration loaded"
    );

    let log = Arc::new(
        SqliteTurnLog::new(&config.database.path).context("Failed to initialize turn log")?,
    );
    let arbitrator = build_arbitrator(&config)?;

    let mut engine = SimulationEngine::new(
        log,
        arbitrator,
        DriverRegistry::new(&config),
        config.engine.clone(),
    );

    let simulation_id = match settings.simulation_id {
        Some(id) => {
            engine.attach_simulation(&id)?;
            id
        }
        None => {
            let contents = std::fs::read_to_string(&settings.world_path).with_context(|| {
                format!("Failed to read world file {}", settings.world_path.display())
            })?;
            let document: Value = serde_json::from_str(&contents).with_context(|| {
                format!("Failed to parse world file {}", settings.world_path.display())
            })?;
            engine.initialize_simulation(document)?
        }
    };

    info!(simulation_id = %simulation_id, steps = settings.steps, "Running simulation");

    for _ in 0..settings.steps {
        let result = engine.run_turn().await?;
        info!(
            turn_id = result.turn_id,
            narrative = %result.narrative,
            "Turn narrative"
        );
    }

    info!(
        simulation_id = %simulation_id,
        database = %config.database.path.display(),
        "Simulation finished"
    );

    Ok(())
}
