//! Append-only turn log.
//!
//! The log is the single source of truth for "current state": the engine
//! reads the latest snapshot back before every turn and derives the next
//! turn id from it. Nothing is ever updated or deleted once written.
//!
//! # Tables
//!
//! - `simulations` - id, config document, created-at, status
//! - `turn_logs` - one row per (turn id, simulation id): inputs, decision, state
//! - `events` - event tag index for lookups by tag

use crate::model::{AgentAction, TurnResult, WorldChange, WorldState};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

mod store;

pub use store::SqliteTurnLog;

/// Status recorded for a freshly created simulation.
pub const STATUS_RUNNING: &str = "running";

/// Status recorded for every appended turn.
pub const STATUS_COMPLETED: &str = "completed";

/// Action inputs of one turn, keyed by agent id.
pub type TurnInputs = BTreeMap<String, AgentAction>;

/// Storage contract required by the simulation engine.
///
/// Each call is atomic and durable once it returns `Ok`.
pub trait TurnLog: Send + Sync {
    /// Records a new simulation with status `running`.
    fn create_simulation(&self, simulation_id: &str, config: &Value) -> Result<()>;

    /// World snapshot of the highest recorded turn, or `None` if the
    /// simulation has no turns.
    fn load_last_state(&self, simulation_id: &str) -> Result<Option<WorldState>>;

    /// One plus the highest recorded turn id (0 for an empty simulation).
    fn next_turn_id(&self, simulation_id: &str) -> Result<u64>;

    /// Appends one turn and indexes its event tags.
    fn save_turn(&self, result: &TurnResult, inputs: &TurnInputs) -> Result<()>;
}

/// Narrative and changes as stored in the `referee_decision` column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub narrative: String,
    pub changes: Vec<WorldChange>,
}

/// One stored turn row.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnRecord {
    pub turn_id: u64,
    pub simulation_id: String,
    pub inputs: TurnInputs,
    pub decision: Decision,
    pub world_state: WorldState,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// One stored simulation row.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationRecord {
    pub id: String,
    pub config: Value,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
