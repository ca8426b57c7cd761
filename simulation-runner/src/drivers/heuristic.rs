//! Rule-of-thumb driver used for unattended runs and tests.

use crate::Driver;
use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;
use turnsim::model::Entity;
use turnsim::{AgentAction, EntityKind, TurnResult, WorldState};

/// Picks a visible item at random, then either grabs it or complains about it.
///
/// With no items in view the agent waits. The outcome depends only on the
/// state and the random source, so a seeded or mock RNG makes it
/// reproducible.
pub struct HeuristicDriver<R = StdRng> {
    agent_id: String,
    rng: R,
}

impl HeuristicDriver<StdRng> {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self::with_rng(agent_id, StdRng::from_entropy())
    }

    pub fn with_seed(agent_id: impl Into<String>, seed: u64) -> Self {
        Self::with_rng(agent_id, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> HeuristicDriver<R> {
    pub fn with_rng(agent_id: impl Into<String>, rng: R) -> Self {
        Self {
            agent_id: agent_id.into(),
            rng,
        }
    }

    fn decide(&mut self, state: &WorldState) -> AgentAction {
        let items: Vec<&Entity> = state
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::Item)
            .collect();

        let Some(target) = items.choose(&mut self.rng) else {
            return AgentAction::wait_because(&self.agent_id, "Bored...");
        };

        if self.rng.gen::<f64>() < 0.5 {
            AgentAction::take(&self.agent_id, &target.id).with_payload("reason", "It's mine!")
        } else {
            AgentAction::talk(&self.agent_id, format!("Hey! That {} is mine!", target.name))
                .with_target(&target.id)
        }
    }
}

#[async_trait]
impl<R: Rng + Send> Driver for HeuristicDriver<R> {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn kind(&self) -> &str {
        "heuristic"
    }

    async fn get_action(&mut self, state: &WorldState) -> Result<AgentAction> {
        let action = self.decide(state);
        debug!(
            agent_id = %self.agent_id,
            action_type = %action.action_type,
            target_id = ?action.target_id,
            "Heuristic decision"
        );
        Ok(action)
    }

    async fn receive_feedback(&mut self, _result: &TurnResult) -> Result<()> {
        Ok(())
    }
}
