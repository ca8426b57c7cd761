//! Static replay of canned actions from a per-agent JSON file.
//!
//! File format (`<responses_dir>/<agent_id>.json`):
//!
//! ```json
//! {
//!   "1": {"action_type": "TAKE", "target_id": "sword"},
//!   "2": {"action_type": "TALK", "payload": {"message": "Mine now."}},
//!   "default": {"action_type": "WAIT"}
//! }
//! ```
//!
//! Keys are 1-based call counts, not turn ids. The driver only knows how
//! many times it has been asked, so a replay lines up with turns only when it
//! is called exactly once per turn.

use crate::Driver;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};
use turnsim::model::action_types;
use turnsim::{AgentAction, TurnResult, WorldState};

/// Key consulted when no entry exists for the current call count.
pub const DEFAULT_KEY: &str = "default";

/// One canned action; the agent id always comes from the driver.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplayEntry {
    #[serde(default = "default_action_type")]
    pub action_type: String,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub payload: BTreeMap<String, Value>,
}

fn default_action_type() -> String {
    action_types::WAIT.to_string()
}

pub struct ReplayDriver {
    agent_id: String,
    responses: BTreeMap<String, ReplayEntry>,
    calls: u64,
}

impl ReplayDriver {
    pub fn new(agent_id: impl Into<String>, responses: BTreeMap<String, ReplayEntry>) -> Self {
        Self {
            agent_id: agent_id.into(),
            responses,
            calls: 0,
        }
    }

    /// Loads `<dir>/<agent_id>.json`.
    ///
    /// A missing file is not an error: the driver starts with no entries and
    /// answers every call with `WAIT`. An unreadable or malformed file is.
    pub fn from_dir(agent_id: &str, dir: &Path) -> Result<Self> {
        let path = dir.join(format!("{}.json", agent_id));

        if !path.exists() {
            warn!(
                agent_id = %agent_id,
                path = %path.display(),
                "Replay file not found, agent will wait every turn"
            );
            return Ok(Self::new(agent_id, BTreeMap::new()));
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read replay file {}", path.display()))?;
        let responses: BTreeMap<String, ReplayEntry> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse replay file {}", path.display()))?;

        info!(
            agent_id = %agent_id,
            entries = responses.len(),
            "Replay file loaded"
        );
        Ok(Self::new(agent_id, responses))
    }

    fn next_action(&mut self) -> AgentAction {
        self.calls += 1;
        let key = self.calls.to_string();

        let Some(entry) = self
            .responses
            .get(&key)
            .or_else(|| self.responses.get(DEFAULT_KEY))
        else {
            return AgentAction::wait_because(&self.agent_id, "No scripted action");
        };

        debug!(agent_id = %self.agent_id, call = self.calls, "Replaying action");
        AgentAction {
            agent_id: self.agent_id.clone(),
            action_type: entry.action_type.clone(),
            target_id: entry.target_id.clone(),
            payload: entry.payload.clone(),
        }
    }
}

#[async_trait]
impl Driver for ReplayDriver {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn kind(&self) -> &str {
        "replay"
    }

    async fn get_action(&mut self, _state: &WorldState) -> Result<AgentAction> {
        Ok(self.next_action())
    }

    async fn receive_feedback(&mut self, _result: &TurnResult) -> Result<()> {
        Ok(())
    }
}
