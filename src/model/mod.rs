use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

mod apply;
mod validation;

pub use apply::apply_changes;
pub use validation::ModelError;

/// First-class action types understood by the built-in arbitrator.
/// Any other string passes through to arbitration untyped.
pub mod action_types {
    pub const TAKE: &str = "TAKE";
    pub const TALK: &str = "TALK";
    pub const WAIT: &str = "WAIT";
}

/// Attribute key holding the list of item ids an agent carries.
pub const INVENTORY_ATTRIBUTE: &str = "inventory";

/// Closed set of entity kinds. Unknown kinds fail deserialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Agent,
    Item,
    Object,
}

/// Entity is one participant or object in the simulated room.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique within a WorldState (e.g., "alice", "sword")
    pub id: String,

    /// Display name used in narrative
    pub name: String,

    #[serde(rename = "type")]
    pub kind: EntityKind,

    /// Free-form semantic tags (e.g., "edible", "movable")
    #[serde(default)]
    pub tags: Vec<String>,

    /// Dynamic values (health, weight, inventory, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,

    /// Driver kind for agents (e.g., "mock_ai", "human")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
}

/// Ambient properties of the room.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_light_level")]
    pub light_level: f64,

    #[serde(default)]
    pub description: String,
}

fn default_temperature() -> f64 {
    22.0
}

fn default_light_level() -> f64 {
    100.0
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            light_level: default_light_level(),
            description: String::new(),
        }
    }
}

/// How proposed actions are ordered within a turn.
///
/// The engine always resolves turns simultaneously; `Sequential` is accepted
/// for compatibility with existing world documents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnMode {
    #[default]
    Sequential,
    Simultaneous,
}

/// Complete, self-contained snapshot of the world at one point in time.
///
/// Never mutated after construction: every turn produces a new value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub room_id: String,

    #[serde(default)]
    pub turn_mode: TurnMode,

    /// Per-agent action deadline in seconds (advisory unless the engine enforces it)
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout_seconds: u64,

    pub environment: Environment,

    /// Ordered; ids are unique
    pub entities: Vec<Entity>,
}

fn default_agent_timeout() -> u64 {
    60
}

impl WorldState {
    /// Parses and validates a world document.
    pub fn from_value(value: Value) -> Result<Self, ModelError> {
        let state: WorldState = serde_json::from_value(value)
            .map_err(|e| ModelError::InvalidDocument(e.to_string()))?;
        state.validate()?;
        Ok(state)
    }

    /// Parses and validates a world document from JSON text.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let state: WorldState = serde_json::from_str(json)
            .map_err(|e| ModelError::InvalidDocument(e.to_string()))?;
        state.validate()?;
        Ok(state)
    }

    /// Checks invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ModelError> {
        validation::validate_world(self)
    }

    /// Looks up an entity by id.
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }
}

/// One proposed action from one agent for one turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    pub agent_id: String,

    /// Open vocabulary; see [`action_types`]
    pub action_type: String,

    #[serde(default)]
    pub target_id: Option<String>,

    /// Type-specific parameters (message, reason, ...)
    #[serde(default)]
    pub payload: BTreeMap<String, Value>,
}

impl AgentAction {
    pub fn new(agent_id: impl Into<String>, action_type: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            action_type: action_type.into(),
            target_id: None,
            payload: BTreeMap::new(),
        }
    }

    pub fn take(agent_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        let mut action = Self::new(agent_id, action_types::TAKE);
        action.target_id = Some(target_id.into());
        action
    }

    pub fn talk(agent_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(agent_id, action_types::TALK).with_payload("message", message.into())
    }

    pub fn wait(agent_id: impl Into<String>) -> Self {
        Self::new(agent_id, action_types::WAIT)
    }

    /// WAIT carrying a diagnostic reason in the payload.
    pub fn wait_because(agent_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::wait(agent_id).with_payload("reason", reason.into())
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_payload(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

/// One atomic mutation between two world states.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldChange {
    pub action: ChangeAction,

    pub entity_id: String,

    /// Attribute touched by an UPDATE ("attributes" replaces the whole map)
    #[serde(default)]
    pub attribute: Option<String>,

    /// Recorded for audit only, never applied
    #[serde(default)]
    pub value_previous: Option<Value>,

    /// New value for UPDATE, full entity for CREATE
    #[serde(default)]
    pub value_new: Option<Value>,
}

impl WorldChange {
    pub fn delete(entity_id: impl Into<String>) -> Self {
        Self {
            action: ChangeAction::Delete,
            entity_id: entity_id.into(),
            attribute: None,
            value_previous: None,
            value_new: None,
        }
    }

    pub fn update(
        entity_id: impl Into<String>,
        attribute: impl Into<String>,
        previous: Value,
        new: Value,
    ) -> Self {
        Self {
            action: ChangeAction::Update,
            entity_id: entity_id.into(),
            attribute: Some(attribute.into()),
            value_previous: Some(previous),
            value_new: Some(new),
        }
    }

    pub fn create(entity: &Entity) -> Self {
        Self {
            action: ChangeAction::Create,
            entity_id: entity.id.clone(),
            attribute: None,
            value_previous: None,
            value_new: serde_json::to_value(entity).ok(),
        }
    }
}

/// Outcome of one turn. Append-only once persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    /// 0 is the initialization snapshot
    pub turn_id: u64,

    pub simulation_id: String,

    pub narrative: String,

    /// Applied in order
    #[serde(default)]
    pub changes: Vec<WorldChange>,

    /// Semantic tags, e.g. "conflict_occurred"
    #[serde(default)]
    pub events: Vec<String>,

    /// Snapshot after applying `changes`
    pub world_state: WorldState,
}
