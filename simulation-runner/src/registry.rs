//! Driver registry - maps world-document driver kinds to built-in drivers.
//!
//! The set of kinds is closed: an unknown kind string is reported to the
//! caller, which logs it and leaves the agent without a driver.

use crate::drivers::{
    Console, HeuristicDriver, InteractiveDriver, ReasoningDriver, ReplayDriver, ScriptedDriver,
};
use crate::Driver;
use anyhow::Result;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use turnsim::config::{AgentsConfig, SimulationConfig};

/// Built-in driver variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    /// `mock_ai`
    Heuristic,
    /// `scripted`
    Scripted,
    /// `api`
    Reasoning,
    /// `human`
    Interactive,
    /// `static`
    Replay,
}

impl DriverKind {
    /// Identifier used in world documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::Heuristic => "mock_ai",
            DriverKind::Scripted => "scripted",
            DriverKind::Reasoning => "api",
            DriverKind::Interactive => "human",
            DriverKind::Replay => "static",
        }
    }
}

/// Driver kind string outside the built-in set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDriverKind(pub String);

impl fmt::Display for UnknownDriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown driver kind: {}", self.0)
    }
}

impl std::error::Error for UnknownDriverKind {}

impl FromStr for DriverKind {
    type Err = UnknownDriverKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mock_ai" => Ok(DriverKind::Heuristic),
            "scripted" => Ok(DriverKind::Scripted),
            "api" => Ok(DriverKind::Reasoning),
            "human" => Ok(DriverKind::Interactive),
            "static" => Ok(DriverKind::Replay),
            other => Err(UnknownDriverKind(other.to_string())),
        }
    }
}

/// Builds drivers for agent entities.
pub struct DriverRegistry {
    responses_dir: PathBuf,
    seed: Option<u64>,
    agents: AgentsConfig,
    /// Shared by every interactive driver; stdio unless replaced
    console: Option<Arc<Console>>,
}

impl DriverRegistry {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            responses_dir: config.drivers.responses_dir.clone(),
            seed: config.drivers.seed,
            agents: config.agents.clone(),
            console: None,
        }
    }

    /// Uses `console` for interactive drivers instead of stdin/stdout.
    pub fn with_console(mut self, console: Arc<Console>) -> Self {
        self.console = Some(console);
        self
    }

    /// Creates the driver of `kind` for `agent_id`.
    ///
    /// Only the replay variant can fail (unreadable or malformed file).
    pub fn build(&mut self, kind: DriverKind, agent_id: &str) -> Result<Box<dyn Driver>> {
        let driver: Box<dyn Driver> = match kind {
            DriverKind::Heuristic => match self.seed {
                Some(seed) => Box::new(HeuristicDriver::with_seed(
                    agent_id,
                    agent_seed(seed, agent_id),
                )),
                None => Box::new(HeuristicDriver::new(agent_id)),
            },
            DriverKind::Scripted => Box::new(ScriptedDriver::new(agent_id, Vec::new())),
            DriverKind::Reasoning => Box::new(ReasoningDriver::new(
                agent_id,
                self.agents.model_for(agent_id),
            )),
            DriverKind::Interactive => {
                let console = self
                    .console
                    .get_or_insert_with(|| Arc::new(Console::stdio()));
                Box::new(InteractiveDriver::new(agent_id, Arc::clone(console)))
            }
            DriverKind::Replay => Box::new(ReplayDriver::from_dir(agent_id, &self.responses_dir)?),
        };
        Ok(driver)
    }
}

/// Per-agent seed so agents sharing a base seed still diverge.
fn agent_seed(seed: u64, agent_id: &str) -> u64 {
    agent_id
        .bytes()
        .fold(seed, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)))
}
