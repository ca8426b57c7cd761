//! Simulation engine - advances one simulation a turn at a time.
//!
//! The turn log is the only authority for current state: every turn starts
//! by reading the latest persisted snapshot and deriving the next turn id
//! from the log, so numbering survives restarts and nothing is cached
//! between turns.

use crate::registry::{DriverKind, DriverRegistry};
use crate::Driver;
use anyhow::{anyhow, Context, Result};
use futures::future::join_all;
use futures::FutureExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use turnsim::config::EngineConfig;
use turnsim::model::TurnMode;
use turnsim::turnlog::TurnInputs;
use turnsim::{AgentAction, Arbitrator, EntityKind, TurnLog, TurnResult, WorldState};
use uuid::Uuid;

/// Narrative of the synthetic turn 0.
pub const INIT_NARRATIVE: &str = "Simulation start";

/// Event tag of the synthetic turn 0.
pub const INIT_EVENT: &str = "init";

/// Engine precondition failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// `run_turn` before `initialize_simulation` or `attach_simulation`
    NotInitialized,
    /// Simulation exists in the engine but the log has no turns for it
    MissingState(String),
    /// `attach_simulation` with an id the log does not know
    UnknownSimulation(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::NotInitialized => write!(f, "Simulation not initialized"),
            EngineError::MissingState(id) => {
                write!(f, "No persisted state for simulation {}", id)
            }
            EngineError::UnknownSimulation(id) => write!(f, "Unknown simulation {}", id),
        }
    }
}

impl std::error::Error for EngineError {}

/// Orchestrates turns for one simulation.
///
/// # Responsibilities
/// - Create or resume a simulation in the turn log
/// - Own one driver per agent entity
/// - Run turns: load state, collect actions, arbitrate, append, feedback
pub struct SimulationEngine {
    log: Arc<dyn TurnLog>,
    arbitrator: Arc<dyn Arbitrator>,
    registry: DriverRegistry,
    settings: EngineConfig,
    /// Keyed by agent id
    drivers: BTreeMap<String, Box<dyn Driver>>,
    simulation_id: Option<String>,
}

impl SimulationEngine {
    pub fn new(
        log: Arc<dyn TurnLog>,
        arbitrator: Arc<dyn Arbitrator>,
        registry: DriverRegistry,
        settings: EngineConfig,
    ) -> Self {
        Self {
            log,
            arbitrator,
            registry,
            settings,
            drivers: BTreeMap::new(),
            simulation_id: None,
        }
    }

    pub fn simulation_id(&self) -> Option<&str> {
        self.simulation_id.as_deref()
    }

    /// Agent ids that currently have a driver, in ascending order.
    pub fn driver_ids(&self) -> Vec<&str> {
        self.drivers.keys().map(String::as_str).collect()
    }

    /// Starts a new simulation from a world document.
    ///
    /// Persists the document and a turn-0 snapshot before any driver exists,
    /// then builds drivers for the agents that declare one.
    ///
    /// # Returns
    /// The new simulation id
    pub fn initialize_simulation(&mut self, config: Value) -> Result<String> {
        let state = WorldState::from_value(config.clone()).context("Invalid world document")?;
        let simulation_id = Uuid::new_v4().to_string();

        self.log
            .create_simulation(&simulation_id, &config)
            .context("Failed to record simulation")?;

        let init = TurnResult {
            turn_id: 0,
            simulation_id: simulation_id.clone(),
            narrative: INIT_NARRATIVE.to_string(),
            changes: Vec::new(),
            events: vec![INIT_EVENT.to_string()],
            world_state: state.clone(),
        };
        self.log
            .save_turn(&init, &TurnInputs::new())
            .context("Failed to persist initial state")?;

        self.setup_drivers(&state);
        self.simulation_id = Some(simulation_id.clone());

        info!(
            simulation_id = %simulation_id,
            room_id = %state.room_id,
            entities = state.entities.len(),
            drivers = self.drivers.len(),
            "Simulation initialized"
        );
        Ok(simulation_id)
    }

    /// Resumes a persisted simulation from its latest snapshot.
    pub fn attach_simulation(&mut self, simulation_id: &str) -> Result<()> {
        let state = self
            .log
            .load_last_state(simulation_id)?
            .ok_or_else(|| EngineError::UnknownSimulation(simulation_id.to_string()))?;

        let next_turn_id = self.log.next_turn_id(simulation_id)?;

        self.setup_drivers(&state);
        self.simulation_id = Some(simulation_id.to_string());

        info!(
            simulation_id = %simulation_id,
            next_turn_id = next_turn_id,
            drivers = self.drivers.len(),
            "Simulation resumed"
        );
        Ok(())
    }

    /// Installs (or replaces) the driver for one agent.
    pub fn set_driver(
        &mut self,
        agent_id: &str,
        driver: Box<dyn Driver>,
    ) -> Option<Box<dyn Driver>> {
        self.drivers.insert(agent_id.to_string(), driver)
    }

    fn setup_drivers(&mut self, state: &WorldState) {
        self.drivers.clear();

        if state.turn_mode == TurnMode::Sequential {
            warn!(
                room_id = %state.room_id,
                "Sequential turn mode requested, resolving turns simultaneously"
            );
        }

        for entity in &state.entities {
            if entity.kind != EntityKind::Agent {
                continue;
            }
            let Some(kind_name) = entity.driver.as_deref() else {
                continue;
            };

            let kind = match kind_name.parse::<DriverKind>() {
                Ok(kind) => kind,
                Err(e) => {
                    warn!(agent_id = %entity.id, error = %e, "Agent left without a driver");
                    continue;
                }
            };

            match self.registry.build(kind, &entity.id) {
                Ok(driver) => {
                    debug!(agent_id = %entity.id, kind = %driver.kind(), "Driver created");
                    self.drivers.insert(entity.id.clone(), driver);
                }
                Err(e) => {
                    error!(agent_id = %entity.id, error = %e, "Failed to create driver");
                }
            }
        }
    }

    /// Runs one turn and returns its persisted result.
    ///
    /// Driver failures, panics included, never fail the turn; only
    /// precondition violations and turn log errors do.
    pub async fn run_turn(&mut self) -> Result<TurnResult> {
        let simulation_id = self
            .simulation_id
            .clone()
            .ok_or(EngineError::NotInitialized)?;

        let state = self
            .log
            .load_last_state(&simulation_id)?
            .ok_or_else(|| EngineError::MissingState(simulation_id.clone()))?;
        let turn_id = self.log.next_turn_id(&simulation_id)?;

        debug!(simulation_id = %simulation_id, turn_id = turn_id, "Processing turn");

        let actions = self.collect_actions(&state).await;

        let result = self
            .arbitrator
            .resolve_turn(&state, &actions, turn_id, &simulation_id)
            .await;

        let inputs: TurnInputs = actions
            .into_iter()
            .map(|action| (action.agent_id.clone(), action))
            .collect();
        self.log
            .save_turn(&result, &inputs)
            .with_context(|| format!("Failed to persist turn {}", turn_id))?;

        self.deliver_feedback(&result).await;

        info!(
            simulation_id = %simulation_id,
            turn_id = turn_id,
            arbitrator = %self.arbitrator.name(),
            events = ?result.events,
            "Turn completed"
        );
        Ok(result)
    }

    /// Runs `steps` turns back to back.
    pub async fn run_steps(&mut self, steps: u64) -> Result<Vec<TurnResult>> {
        let mut results = Vec::new();
        for _ in 0..steps {
            results.push(self.run_turn().await?);
        }
        Ok(results)
    }

    async fn collect_actions(&mut self, state: &WorldState) -> Vec<AgentAction> {
        let limit = self
            .settings
            .enforce_agent_timeout
            .then(|| Duration::from_secs(state.agent_timeout_seconds));

        let pending = self.drivers.iter_mut().map(|(agent_id, driver)| async move {
            let act = async {
                match limit {
                    Some(limit) => match timeout(limit, driver.get_action(state)).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(anyhow!("No action within {}s", limit.as_secs())),
                    },
                    None => driver.get_action(state).await,
                }
            };
            let outcome = match AssertUnwindSafe(act).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => Err(anyhow!("Driver panicked: {}", panic_message(&*panic))),
            };
            (agent_id, outcome)
        });

        let mut actions = Vec::new();
        for (agent_id, outcome) in join_all(pending).await {
            match outcome {
                Ok(action) if action.agent_id == *agent_id => actions.push(action),
                Ok(action) => warn!(
                    agent_id = %agent_id,
                    claimed_agent_id = %action.agent_id,
                    "Discarding action submitted for another agent"
                ),
                Err(e) => error!(agent_id = %agent_id, error = %e, "Driver failed to act"),
            }
        }
        actions
    }

    async fn deliver_feedback(&mut self, result: &TurnResult) {
        let pending = self
            .drivers
            .iter_mut()
            .map(|(agent_id, driver)| async move {
                let outcome = AssertUnwindSafe(driver.receive_feedback(result))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(anyhow!("Driver panicked: {}", panic_message(&*panic)))
                    });
                (agent_id, outcome)
            });

        for (agent_id, outcome) in join_all(pending).await {
            if let Err(e) = outcome {
                error!(agent_id = %agent_id, error = %e, "Driver failed to take feedback");
            }
        }
    }
}

/// Text of a caught panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests;
