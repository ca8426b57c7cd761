use crate::Driver;
use anyhow::Result;
use async_trait::async_trait;
use turnsim::{AgentAction, TurnResult, WorldState};

/// Placeholder for an agent backed by an external reasoning model.
///
/// Carries the agent id and model identifier a real implementation needs,
/// but always waits for now.
pub struct ReasoningDriver {
    agent_id: String,
    model: String,
}

impl ReasoningDriver {
    pub fn new(agent_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl Driver for ReasoningDriver {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn kind(&self) -> &str {
        "reasoning"
    }

    async fn get_action(&mut self, _state: &WorldState) -> Result<AgentAction> {
        Ok(AgentAction::wait_because(
            &self.agent_id,
            format!("Awaiting reasoning integration ({})", self.model),
        ))
    }

    async fn receive_feedback(&mut self, _result: &TurnResult) -> Result<()> {
        Ok(())
    }
}
