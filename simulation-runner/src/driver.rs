use anyhow::Result;
use async_trait::async_trait;
use turnsim::{AgentAction, TurnResult, WorldState};

/// Decision strategy for one agent entity.
///
/// The engine owns one driver per agent and calls it once per turn. Drivers
/// keep whatever private memory they need between turns; the world itself is
/// only ever seen through the snapshot passed to `get_action`.
///
/// # Lifecycle
/// 1. Engine calls `get_action(state)` on every driver concurrently
/// 2. Engine arbitrates the collected actions and appends the turn
/// 3. Engine calls `receive_feedback(result)` on every driver concurrently
///
/// # Failure
/// An `Err` from either call is logged by the engine and never aborts the
/// turn; a failed `get_action` just means no action from this agent.
#[async_trait]
pub trait Driver: Send {
    /// Id of the agent entity this driver acts for.
    fn agent_id(&self) -> &str;

    /// Short variant name used in logs (e.g., "heuristic").
    fn kind(&self) -> &str;

    /// Proposes exactly one action for the upcoming turn.
    ///
    /// May suspend for as long as it needs (console input, network calls).
    async fn get_action(&mut self, state: &WorldState) -> Result<AgentAction>;

    /// Observes the outcome of the turn that was just appended.
    async fn receive_feedback(&mut self, result: &TurnResult) -> Result<()>;
}
