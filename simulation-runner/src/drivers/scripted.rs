use crate::Driver;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use turnsim::{AgentAction, TurnResult, WorldState};

/// Plays back a fixed sequence of actions, one per turn, then waits forever.
pub struct ScriptedDriver {
    agent_id: String,
    script: VecDeque<AgentAction>,
}

impl ScriptedDriver {
    pub fn new(agent_id: impl Into<String>, script: Vec<AgentAction>) -> Self {
        Self {
            agent_id: agent_id.into(),
            script: script.into(),
        }
    }

    /// Actions not yet played.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn kind(&self) -> &str {
        "scripted"
    }

    async fn get_action(&mut self, _state: &WorldState) -> Result<AgentAction> {
        Ok(self
            .script
            .pop_front()
            .unwrap_or_else(|| AgentAction::wait(&self.agent_id)))
    }

    async fn receive_feedback(&mut self, _result: &TurnResult) -> Result<()> {
        Ok(())
    }
}
