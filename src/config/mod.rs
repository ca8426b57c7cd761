pub mod runtime;
pub use runtime::RunSettings;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Complete simulation configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub arbitrator: ArbitratorConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub drivers: DriversConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Turn log location
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("simulation.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArbitratorKind {
    #[default]
    Rules,
    Reasoning,
}

/// Arbitrator selection
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArbitratorConfig {
    #[serde(default)]
    pub kind: ArbitratorKind,
    /// Seed for conflict resolution (rules only); random when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

/// External text service used by the reasoning arbitrator
#[derive(Debug, Clone, Deserialize)]
pub struct ReasoningConfig {
    /// OpenAI-compatible API root
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Model for the free-text reasoning call
    #[serde(default = "default_reasoning_model")]
    pub reasoning_model: String,
    /// Model for the JSON formatting call
    #[serde(default = "default_formatting_model")]
    pub formatting_model: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_api_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_reasoning_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_formatting_model() -> String {
    "llama-3.1-8b-instant".to_string()
}

fn default_api_key_env() -> String {
    "TURNSIM_API_KEY".to_string()
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            reasoning_model: default_reasoning_model(),
            formatting_model: default_formatting_model(),
            api_key_env: default_api_key_env(),
        }
    }
}

/// Models for reasoning-backed agents
#[derive(Debug, Clone, Deserialize)]
pub struct AgentsConfig {
    #[serde(default = "default_agent_model")]
    pub default_model: String,
    /// Per-agent overrides (agent id -> model)
    #[serde(default)]
    pub models: HashMap<String, String>,
}

fn default_agent_model() -> String {
    "llama-3.1-8b-instant".to_string()
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            default_model: default_agent_model(),
            models: HashMap::new(),
        }
    }
}

impl AgentsConfig {
    /// Model for one agent, falling back to the default.
    pub fn model_for(&self, agent_id: &str) -> &str {
        self.models
            .get(agent_id)
            .map(String::as_str)
            .unwrap_or(&self.default_model)
    }
}

/// Built-in driver settings
#[derive(Debug, Clone, Deserialize)]
pub struct DriversConfig {
    /// Directory holding `<agent_id>.json` replay files
    #[serde(default = "default_responses_dir")]
    pub responses_dir: PathBuf,
    /// Base seed for heuristic drivers; random when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_responses_dir() -> PathBuf {
    PathBuf::from("responses")
}

impl Default for DriversConfig {
    fn default() -> Self {
        Self {
            responses_dir: default_responses_dir(),
            seed: None,
        }
    }
}

/// Turn loop settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    /// Bound each get_action call by the state's agent_timeout_seconds
    #[serde(default)]
    pub enforce_agent_timeout: bool,
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<SimulationConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: SimulationConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {}", path))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimulationConfig::default();
        assert_eq!(config.database.path, PathBuf::from("simulation.db"));
        assert_eq!(config.arbitrator.kind, ArbitratorKind::Rules);
        assert_eq!(config.arbitrator.seed, None);
        assert_eq!(config.reasoning.api_key_env, "TURNSIM_API_KEY");
        assert_eq!(config.drivers.responses_dir, PathBuf::from("responses"));
        assert!(!config.engine.enforce_agent_timeout);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [database]
            path = "/tmp/sim.db"

            [arbitrator]
            kind = "reasoning"
            seed = 42

            [reasoning]
            api_url = "http://localhost:8080/v1"
            reasoning_model = "big"
            formatting_model = "small"
            api_key_env = "MY_KEY"

            [agents]
            default_model = "npc"
            models = { alice = "smart" }

            [drivers]
            responses_dir = "replays"
            seed = 7

            [engine]
            enforce_agent_timeout = true
        "#;

        let config: SimulationConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/tmp/sim.db"));
        assert_eq!(config.arbitrator.kind, ArbitratorKind::Reasoning);
        assert_eq!(config.arbitrator.seed, Some(42));
        assert_eq!(config.reasoning.api_url, "http://localhost:8080/v1");
        assert_eq!(config.reasoning.formatting_model, "small");
        assert_eq!(config.agents.model_for("alice"), "smart");
        assert_eq!(config.agents.model_for("bob"), "npc");
        assert_eq!(config.drivers.seed, Some(7));
        assert!(config.engine.enforce_agent_timeout);
    }

    #[test]
    fn test_partial_config() {
        // Missing sections use defaults
        let toml = r#"
            [arbitrator]
            seed = 3
        "#;

        let config: SimulationConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.arbitrator.kind, ArbitratorKind::Rules);
        assert_eq!(config.arbitrator.seed, Some(3));
        assert_eq!(config.reasoning.reasoning_model, "llama-3.3-70b-versatile");
        assert_eq!(config.agents.model_for("anyone"), "llama-3.1-8b-instant");
    }

    #[test]
    fn test_unknown_arbitrator_kind_rejected() {
        let toml = r#"
            [arbitrator]
            kind = "oracle"
        "#;

        assert!(toml::from_str::<SimulationConfig>(toml).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turnsim.toml");
        std::fs::write(&path, "[engine]\nenforce_agent_timeout = true\n").unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert!(config.engine.enforce_agent_timeout);

        assert!(load_config("/nonexistent/turnsim.toml").is_err());
    }
}
