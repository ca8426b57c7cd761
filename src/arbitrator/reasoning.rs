use super::Arbitrator;
use crate::model::{AgentAction, TurnResult, WorldState};
use crate::reasoning::{CompletionRequest, TextService};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Narrative of the turn produced when the reasoning service misbehaves.
pub const DEGRADED_NARRATIVE: &str = "Reality broke (the arbiter failed to answer).";

/// Event tag of a degraded turn.
pub const ERROR_EVENT: &str = "error_ai";

const REASONING_PROMPT: &str = r#"
You are the Arbiter (physics engine) of a turn-based sandbox simulation.
Decide coldly what happens, based on logic and on entity attributes.

RESOLUTION RULES:
1. "TALK": decide whether the message changes the listener's state of mind.
2. "TAKE": on conflict, the agent with the highest relevant attribute (strength, speed, hunger) wins, otherwise chance decides.
3. CONSEQUENCES: be strict. An agent that does not hold an object cannot use it.

NARRATIVE RULES:
- Be CONCISE and OBJECTIVE, like a police report or a game log.
- Two or three sentences at most.
- Describe the physical ACTION and its RESULT.
- No metaphors, no drama, no mind reading. Describe what is visible from outside.

Your output is a step-by-step analysis of what happens.
"#;

const FORMATTING_PROMPT: &str = r#"
You are a JSON data formatter.
Your task:
1. Extract the exact CHANGES (CREATE/UPDATE/DELETE) from the reasoning.
2. Write a ONE sentence summary for the "narrative" field.
3. Return valid JSON matching the TurnResult schema.

Schema:
{
  "narrative": "One sentence summary.",
  "changes": [
    {
      "action": "UPDATE" | "CREATE" | "DELETE",
      "entity_id": "string",
      "attribute": "string (optional)",
      "value_previous": "any (optional)",
      "value_new": "any (optional)"
    }
  ],
  "events": ["string (tags, e.g. 'conflict_resolved')"],
  "world_state": { ... complete updated WorldState object ... }
}

IMPORTANT:
- `changes` is a LIST OF OBJECTS, never strings. Use [] when nothing changes.
- Return the COMPLETE `world_state`.
- Reply with the JSON only.
"#;

/// Arbitrator that delegates judgment to an external text service.
///
/// Each turn costs two sequential requests: free-text reasoning, then a
/// formatting pass that must yield a TurnResult-shaped JSON document.
/// Any failure along the way degrades to [`degraded_result`] so the
/// simulation still advances by exactly one turn.
pub struct ReasoningArbitrator {
    service: Arc<dyn TextService>,
    reasoning_model: String,
    formatting_model: String,
}

impl ReasoningArbitrator {
    pub fn new(
        service: Arc<dyn TextService>,
        reasoning_model: String,
        formatting_model: String,
    ) -> Self {
        Self {
            service,
            reasoning_model,
            formatting_model,
        }
    }

    /// Runs the reasoning and formatting calls, returning the raw formatted reply.
    async fn consult(
        &self,
        state: &WorldState,
        actions: &[AgentAction],
        turn_id: u64,
    ) -> Result<String> {
        let context = build_context(state, actions)?;

        info!(turn_id = turn_id, model = %self.reasoning_model, "Reasoning about turn");
        let reasoning = self
            .service
            .complete(CompletionRequest {
                model: self.reasoning_model.clone(),
                system: REASONING_PROMPT.to_string(),
                user: context.clone(),
                json_object: false,
            })
            .await
            .context("Reasoning request failed")?;
        debug!(turn_id = turn_id, reasoning = %reasoning, "Reasoning received");

        info!(turn_id = turn_id, model = %self.formatting_model, "Formatting turn result");
        self.service
            .complete(CompletionRequest {
                model: self.formatting_model.clone(),
                system: FORMATTING_PROMPT.to_string(),
                user: format!(
                    "TURN CONTEXT:\n{}\n\nYOUR REASONING:\n{}\n\nProduce the valid JSON now.",
                    context, reasoning
                ),
                json_object: true,
            })
            .await
            .context("Formatting request failed")
    }
}

#[async_trait]
impl Arbitrator for ReasoningArbitrator {
    fn name(&self) -> &str {
        "reasoning"
    }

    async fn resolve_turn(
        &self,
        state: &WorldState,
        actions: &[AgentAction],
        turn_id: u64,
        simulation_id: &str,
    ) -> TurnResult {
        let reply = match self.consult(state, actions, turn_id).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(turn_id = turn_id, error = %e, "Reasoning service failed");
                return degraded_result(state, turn_id, simulation_id);
            }
        };

        match parse_formatted_reply(&reply, state, turn_id, simulation_id) {
            Ok(result) => result,
            Err(e) => {
                error!(turn_id = turn_id, error = %e, reply = %reply, "Unusable formatted reply");
                degraded_result(state, turn_id, simulation_id)
            }
        }
    }
}

/// Serializes the pre-turn state and proposed actions for both requests.
fn build_context(state: &WorldState, actions: &[AgentAction]) -> Result<String> {
    let state_json =
        serde_json::to_string_pretty(state).context("Failed to serialize world state")?;

    let mut lines = Vec::with_capacity(actions.len());
    for action in actions {
        let target = action
            .target_id
            .as_deref()
            .map(|t| format!(" on {}", t))
            .unwrap_or_default();
        let payload = if action.payload.is_empty() {
            String::new()
        } else {
            format!(" ({})", serde_json::to_string(&action.payload)?)
        };
        lines.push(format!(
            "- Agent {} attempts {}{}{}",
            action.agent_id, action.action_type, target, payload
        ));
    }
    if lines.is_empty() {
        lines.push("- (no actions)".to_string());
    }

    Ok(format!(
        "\nCURRENT WORLD STATE:\n{}\n\nPROPOSED ACTIONS:\n{}\n",
        state_json,
        lines.join("\n")
    ))
}

/// Removes markdown code fences the service may wrap around its JSON.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// Parses the formatting reply into a TurnResult.
///
/// `turn_id` and `simulation_id` always overwrite whatever the document
/// carried. A document without `world_state` keeps the input state.
pub fn parse_formatted_reply(
    raw: &str,
    state: &WorldState,
    turn_id: u64,
    simulation_id: &str,
) -> Result<TurnResult> {
    let cleaned = strip_code_fences(raw);
    let mut document: Value =
        serde_json::from_str(&cleaned).context("Formatted reply is not valid JSON")?;

    let object = document
        .as_object_mut()
        .ok_or_else(|| anyhow!("Formatted reply is not a JSON object"))?;
    object.insert("turn_id".to_string(), json!(turn_id));
    object.insert("simulation_id".to_string(), json!(simulation_id));
    if !object.contains_key("world_state") {
        warn!(turn_id = turn_id, "Formatted reply has no world_state, keeping input state");
        object.insert(
            "world_state".to_string(),
            serde_json::to_value(state).context("Failed to serialize world state")?,
        );
    }

    let result: TurnResult = serde_json::from_value(document)
        .context("Formatted reply does not match the turn result shape")?;
    result
        .world_state
        .validate()
        .context("Formatted reply carries an invalid world state")?;

    Ok(result)
}

/// Valid but empty turn used when arbitration cannot be trusted.
pub fn degraded_result(state: &WorldState, turn_id: u64, simulation_id: &str) -> TurnResult {
    TurnResult {
        turn_id,
        simulation_id: simulation_id.to_string(),
        narrative: DEGRADED_NARRATIVE.to_string(),
        changes: Vec::new(),
        events: vec![ERROR_EVENT.to_string()],
        world_state: state.clone(),
    }
}
