//! Turn arbitration: proposed actions in, next world state out.
//!
//! # Variants
//!
//! - [`RuleArbitrator`] - deterministic in-process rules (given its random source)
//! - [`ReasoningArbitrator`] - two sequential calls to an external [`TextService`]
//!
//! The engine only sees the [`Arbitrator`] trait and cannot tell which
//! variant backs it. Both always produce a valid [`TurnResult`]; there is no
//! error path out of `resolve_turn`.

use crate::config::{ArbitratorKind, SimulationConfig};
use crate::model::{AgentAction, TurnResult, WorldState};
use crate::reasoning::{HttpTextService, TextService};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

mod reasoning;
mod rules;

pub use reasoning::{
    degraded_result, parse_formatted_reply, strip_code_fences, ReasoningArbitrator,
    DEGRADED_NARRATIVE, ERROR_EVENT,
};
pub use rules::{RuleArbitrator, CONFLICT_EVENT};

/// Policy that resolves one turn's proposed actions.
#[async_trait]
pub trait Arbitrator: Send + Sync {
    /// Short identifier for logging (e.g., "rules").
    fn name(&self) -> &str;

    /// Resolves `actions` against `state`.
    ///
    /// `turn_id` and `simulation_id` are engine-owned and are copied onto the
    /// result unchanged.
    async fn resolve_turn(
        &self,
        state: &WorldState,
        actions: &[AgentAction],
        turn_id: u64,
        simulation_id: &str,
    ) -> TurnResult;
}

/// Builds the arbitrator selected by configuration.
///
/// The reasoning variant reads its API key from the environment variable
/// named by `reasoning.api_key_env`; a missing key is an error.
pub fn build_arbitrator(config: &SimulationConfig) -> Result<Arc<dyn Arbitrator>> {
    match config.arbitrator.kind {
        ArbitratorKind::Rules => {
            let arbitrator = match config.arbitrator.seed {
                Some(seed) => RuleArbitrator::with_seed(seed),
                None => RuleArbitrator::new(),
            };
            info!(seed = ?config.arbitrator.seed, "Using rule arbitrator");
            Ok(Arc::new(arbitrator))
        }
        ArbitratorKind::Reasoning => {
            let reasoning = &config.reasoning;
            let api_key = std::env::var(&reasoning.api_key_env).with_context(|| {
                format!(
                    "{} is required for the reasoning arbitrator",
                    reasoning.api_key_env
                )
            })?;
            let service: Arc<dyn TextService> =
                Arc::new(HttpTextService::new(api_key, reasoning.api_url.clone()));
            info!(
                api_url = %reasoning.api_url,
                reasoning_model = %reasoning.reasoning_model,
                formatting_model = %reasoning.formatting_model,
                "Using reasoning arbitrator"
            );
            Ok(Arc::new(ReasoningArbitrator::new(
                service,
                reasoning.reasoning_model.clone(),
                reasoning.formatting_model.clone(),
            )))
        }
    }
}
