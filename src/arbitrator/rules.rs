use super::Arbitrator;
use crate::model::{
    action_types, apply_changes, AgentAction, Entity, EntityKind, TurnResult, WorldChange,
    WorldState, INVENTORY_ATTRIBUTE,
};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::debug;

/// Event tag emitted when several agents TAKE the same target.
pub const CONFLICT_EVENT: &str = "conflict_occurred";

/// Deterministic rule engine for TAKE/TALK/WAIT.
///
/// Contested TAKEs are settled by a uniform draw from `rng`; inject a seeded
/// or mock generator to make turns reproducible.
pub struct RuleArbitrator<R = StdRng> {
    rng: Mutex<R>,
}

impl RuleArbitrator<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
}

impl Default for RuleArbitrator<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RngCore> RuleArbitrator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    /// Synchronous core of [`Arbitrator::resolve_turn`].
    pub fn resolve(
        &self,
        state: &WorldState,
        actions: &[AgentAction],
        turn_id: u64,
        simulation_id: &str,
    ) -> TurnResult {
        let mut turn = TurnBuilder::new(state);

        // Narrate TALK/WAIT, group TAKE requests by target (first-seen order)
        let mut take_requests: Vec<(&str, Vec<&str>)> = Vec::new();
        for action in actions {
            match action.action_type.as_str() {
                action_types::TALK => {
                    let message = action
                        .payload
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("...");
                    turn.narrative.push(format!(
                        "{} shouts: \"{}\"",
                        display_name(state, &action.agent_id),
                        message
                    ));
                }
                action_types::WAIT => {
                    turn.narrative.push(format!(
                        "{} looks around nervously.",
                        display_name(state, &action.agent_id)
                    ));
                }
                action_types::TAKE => {
                    let Some(target) = action.target_id.as_deref() else {
                        debug!(agent_id = %action.agent_id, "TAKE without target, ignoring");
                        continue;
                    };
                    match take_requests.iter_mut().find(|(t, _)| *t == target) {
                        Some((_, requesters)) => {
                            if !requesters.contains(&action.agent_id.as_str()) {
                                requesters.push(&action.agent_id);
                            }
                        }
                        None => take_requests.push((target, vec![action.agent_id.as_str()])),
                    }
                }
                other => {
                    debug!(agent_id = %action.agent_id, action_type = %other, "No rule for action type");
                }
            }
        }

        for (target, requesters) in take_requests {
            // Missing targets are skipped silently
            let Some(item) = state.entity(target) else {
                debug!(target_id = %target, "TAKE target does not exist");
                continue;
            };
            // Agents are never deleted, so every agent id keeps resolving to
            // an agent entity whose driver the engine still polls
            if item.kind == EntityKind::Agent {
                debug!(target_id = %target, "TAKE target is an agent");
                continue;
            }

            if requesters.len() == 1 {
                turn.take_success(requesters[0], item);
                continue;
            }

            let winner = {
                let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                match requesters.choose(&mut *rng) {
                    Some(winner) => *winner,
                    None => continue,
                }
            };
            let winner_name = display_name(state, winner);
            let loser_names: Vec<&str> = requesters
                .iter()
                .filter(|id| **id != winner)
                .map(|id| display_name(state, id))
                .collect();

            turn.narrative.push(format!(
                "CONFLICT! {} and {} fight over the {}.",
                loser_names.join(", "),
                winner_name,
                item.name
            ));
            turn.narrative
                .push(format!("{} shoves the others aside and grabs it!", winner_name));
            turn.events.push(CONFLICT_EVENT.to_string());
            turn.take_success(winner, item);
        }

        turn.finish(turn_id, simulation_id)
    }
}

#[async_trait]
impl<R: RngCore + Send> Arbitrator for RuleArbitrator<R> {
    fn name(&self) -> &str {
        "rules"
    }

    async fn resolve_turn(
        &self,
        state: &WorldState,
        actions: &[AgentAction],
        turn_id: u64,
        simulation_id: &str,
    ) -> TurnResult {
        self.resolve(state, actions, turn_id, simulation_id)
    }
}

/// Accumulates one turn's output.
struct TurnBuilder<'a> {
    state: &'a WorldState,
    changes: Vec<WorldChange>,
    events: Vec<String>,
    narrative: Vec<String>,
    /// Attribute maps of agents already updated this turn
    working_attributes: HashMap<&'a str, BTreeMap<String, Value>>,
}

impl<'a> TurnBuilder<'a> {
    fn new(state: &'a WorldState) -> Self {
        Self {
            state,
            changes: Vec::new(),
            events: Vec::new(),
            narrative: Vec::new(),
            working_attributes: HashMap::new(),
        }
    }

    fn take_success(&mut self, agent_id: &'a str, item: &Entity) {
        let state = self.state;
        self.changes.push(WorldChange::delete(&item.id));

        if let Some(agent) = state.entity(agent_id) {
            let previous = self
                .working_attributes
                .get(agent_id)
                .cloned()
                .unwrap_or_else(|| agent.attributes.clone());

            let mut next = previous.clone();
            let inventory = next
                .entry(INVENTORY_ATTRIBUTE.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            match inventory {
                Value::Array(items) => items.push(Value::String(item.id.clone())),
                other => *other = Value::Array(vec![Value::String(item.id.clone())]),
            }

            self.changes.push(WorldChange::update(
                agent_id,
                "attributes",
                attributes_value(&previous),
                attributes_value(&next),
            ));
            self.working_attributes.insert(agent_id, next);
        }

        self.narrative.push(format!(
            "{} successfully takes the {}.",
            display_name(state, agent_id),
            item.name
        ));
        self.events.push(format!("{}_took_{}", agent_id, item.id));
    }

    fn finish(self, turn_id: u64, simulation_id: &str) -> TurnResult {
        let world_state = apply_changes(self.state, &self.changes);
        TurnResult {
            turn_id,
            simulation_id: simulation_id.to_string(),
            narrative: self.narrative.join(" "),
            changes: self.changes,
            events: self.events,
            world_state,
        }
    }
}

fn attributes_value(attributes: &BTreeMap<String, Value>) -> Value {
    Value::Object(
        attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Map<String, Value>>(),
    )
}

/// Entity name for narrative, falling back to the raw id.
fn display_name<'s>(state: &'s WorldState, id: &'s str) -> &'s str {
    state.entity(id).map(|e| e.name.as_str()).unwrap_or(id)
}
