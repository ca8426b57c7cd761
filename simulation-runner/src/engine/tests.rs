use super::*;
use crate::drivers::ScriptedDriver;
use anyhow::bail;
use async_trait::async_trait;
use rand::rngs::mock::StepRng;
use serde_json::json;
use std::sync::Mutex;
use turnsim::arbitrator::{RuleArbitrator, CONFLICT_EVENT};
use turnsim::config::SimulationConfig;
use turnsim::SqliteTurnLog;

fn world_doc() -> Value {
    json!({
        "room_id": "cellar",
        "turn_mode": "simultaneous",
        "agent_timeout_seconds": 5,
        "environment": {"description": "Damp and dark"},
        "entities": [
            {"id": "A", "name": "Ana", "type": "agent", "driver": "scripted"},
            {"id": "B", "name": "Bruno", "type": "agent", "driver": "scripted"},
            {"id": "C", "name": "Carla", "type": "agent", "driver": "mock_ai"},
            {"id": "D", "name": "Dario", "type": "agent", "driver": "telepathy"},
            {"id": "E", "name": "Elsa", "type": "agent"},
            {"id": "sword", "name": "Sword", "type": "item", "driver": "mock_ai"}
        ]
    })
}

fn engine_with(settings: EngineConfig) -> (SimulationEngine, Arc<SqliteTurnLog>) {
    let log = Arc::new(SqliteTurnLog::new(":memory:").unwrap());
    let arbitrator = Arc::new(RuleArbitrator::with_rng(StepRng::new(0, 0)));
    let mut config = SimulationConfig::default();
    config.drivers.seed = Some(3);
    let engine = SimulationEngine::new(
        log.clone(),
        arbitrator,
        DriverRegistry::new(&config),
        settings,
    );
    (engine, log)
}

fn engine() -> (SimulationEngine, Arc<SqliteTurnLog>) {
    engine_with(EngineConfig::default())
}

/// Always fails to act.
struct BrokenDriver {
    agent_id: String,
}

#[async_trait]
impl Driver for BrokenDriver {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn kind(&self) -> &str {
        "broken"
    }

    async fn get_action(&mut self, _state: &WorldState) -> Result<AgentAction> {
        bail!("driver crashed")
    }

    async fn receive_feedback(&mut self, _result: &TurnResult) -> Result<()> {
        bail!("still crashed")
    }
}

/// Panics instead of returning.
struct PanickingDriver {
    agent_id: String,
}

#[async_trait]
impl Driver for PanickingDriver {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn kind(&self) -> &str {
        "panicking"
    }

    async fn get_action(&mut self, _state: &WorldState) -> Result<AgentAction> {
        panic!("lost its mind")
    }

    async fn receive_feedback(&mut self, _result: &TurnResult) -> Result<()> {
        panic!("{} ignores the news", self.agent_id)
    }
}

/// Sleeps before waiting; records feedback turn ids.
struct SlowDriver {
    agent_id: String,
    delay: Duration,
    seen: Arc<Mutex<Vec<u64>>>,
}

#[async_trait]
impl Driver for SlowDriver {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn kind(&self) -> &str {
        "slow"
    }

    async fn get_action(&mut self, _state: &WorldState) -> Result<AgentAction> {
        tokio::time::sleep(self.delay).await;
        Ok(AgentAction::wait(&self.agent_id))
    }

    async fn receive_feedback(&mut self, result: &TurnResult) -> Result<()> {
        self.seen.lock().unwrap().push(result.turn_id);
        Ok(())
    }
}

fn scripted(agent_id: &str, script: Vec<AgentAction>) -> Box<dyn Driver> {
    Box::new(ScriptedDriver::new(agent_id, script))
}

#[tokio::test]
async fn test_run_turn_requires_simulation() {
    let (mut engine, _log) = engine();

    let err = engine.run_turn().await.unwrap_err();
    assert_eq!(
        err.downcast_ref::<EngineError>(),
        Some(&EngineError::NotInitialized)
    );
    assert!(engine.simulation_id().is_none());
}

#[test]
fn test_initialize_persists_turn_zero() {
    let (mut engine, log) = engine();

    let sim_id = engine.initialize_simulation(world_doc()).unwrap();
    assert_eq!(engine.simulation_id(), Some(sim_id.as_str()));

    let record = log.simulation(&sim_id).unwrap().unwrap();
    assert_eq!(record.config, world_doc());
    assert_eq!(record.status, "running");

    let turn = log.load_turn(&sim_id, 0).unwrap().unwrap();
    assert_eq!(turn.decision.narrative, INIT_NARRATIVE);
    assert!(turn.decision.changes.is_empty());
    assert!(turn.inputs.is_empty());
    assert_eq!(log.turns_with_event(&sim_id, INIT_EVENT).unwrap(), vec![0]);
    assert_eq!(
        turn.world_state,
        WorldState::from_value(world_doc()).unwrap()
    );
}

#[test]
fn test_drivers_built_for_known_kinds_only() {
    let (mut engine, _log) = engine();
    engine.initialize_simulation(world_doc()).unwrap();

    // D has an unknown kind, E none, and items never get drivers
    assert_eq!(engine.driver_ids(), vec!["A", "B", "C"]);
}

#[test]
fn test_invalid_world_document_rejected() {
    let (mut engine, _log) = engine();
    let mut doc = world_doc();
    doc["turn_mode"] = json!("chaotic");

    assert!(engine.initialize_simulation(doc).is_err());
    assert!(engine.simulation_id().is_none());
}

#[tokio::test]
async fn test_contested_take() {
    let (mut engine, log) = engine();
    let sim_id = engine.initialize_simulation(world_doc()).unwrap();
    engine.set_driver("A", scripted("A", vec![AgentAction::take("A", "sword")]));
    engine.set_driver("B", scripted("B", vec![AgentAction::take("B", "sword")]));
    engine.set_driver("C", scripted("C", vec![]));

    let result = engine.run_turn().await.unwrap();

    assert_eq!(result.turn_id, 1);
    assert_eq!(result.simulation_id, sim_id);
    assert_eq!(result.events, vec![CONFLICT_EVENT, "A_took_sword"]);
    assert!(result.narrative.contains("Bruno"));
    assert!(result.world_state.entity("sword").is_none());
    assert_eq!(
        result.world_state.entity("A").unwrap().attributes["inventory"],
        json!(["sword"])
    );

    // Persisted state is what the next turn will read
    assert_eq!(
        log.load_last_state(&sim_id).unwrap(),
        Some(result.world_state.clone())
    );

    let stored = log.load_turn(&sim_id, 1).unwrap().unwrap();
    assert_eq!(stored.inputs.len(), 3);
    assert_eq!(stored.inputs["A"], AgentAction::take("A", "sword"));
    assert_eq!(stored.inputs["C"], AgentAction::wait("C"));
    assert_eq!(stored.decision.changes, result.changes);
}

#[tokio::test]
async fn test_failing_driver_does_not_abort_turn() {
    let (mut engine, log) = engine();
    let sim_id = engine.initialize_simulation(world_doc()).unwrap();
    engine.set_driver("A", scripted("A", vec![AgentAction::take("A", "sword")]));
    engine.set_driver("B", scripted("B", vec![]));
    engine.set_driver(
        "C",
        Box::new(BrokenDriver {
            agent_id: "C".to_string(),
        }),
    );

    let result = engine.run_turn().await.unwrap();
    assert_eq!(result.events, vec!["A_took_sword"]);

    let stored = log.load_turn(&sim_id, 1).unwrap().unwrap();
    assert!(stored.inputs.contains_key("A"));
    assert!(stored.inputs.contains_key("B"));
    assert!(!stored.inputs.contains_key("C"));
}

#[tokio::test]
async fn test_panicking_driver_does_not_abort_turn() {
    let (mut engine, log) = engine();
    let sim_id = engine.initialize_simulation(world_doc()).unwrap();
    engine.set_driver("A", scripted("A", vec![AgentAction::take("A", "sword")]));
    engine.set_driver("B", scripted("B", vec![]));
    engine.set_driver(
        "C",
        Box::new(PanickingDriver {
            agent_id: "C".to_string(),
        }),
    );

    let result = engine.run_turn().await.unwrap();
    assert_eq!(result.turn_id, 1);
    assert_eq!(result.events, vec!["A_took_sword"]);

    let stored = log.load_turn(&sim_id, 1).unwrap().unwrap();
    assert!(stored.inputs.contains_key("A"));
    assert!(!stored.inputs.contains_key("C"));

    // Panicking feedback does not stop the next turn either
    let next = engine.run_turn().await.unwrap();
    assert_eq!(next.turn_id, 2);
    assert_eq!(log.turn_ids(&sim_id).unwrap(), vec![0, 1, 2]);
}

#[test]
fn test_panic_message_payloads() {
    assert_eq!(panic_message(&"static text"), "static text");
    assert_eq!(panic_message(&"owned".to_string()), "owned");
    assert_eq!(panic_message(&42u32), "non-string panic payload");
}

#[tokio::test]
async fn test_action_for_another_agent_discarded() {
    let (mut engine, log) = engine();
    let sim_id = engine.initialize_simulation(world_doc()).unwrap();
    // B's driver tries to act as A
    engine.set_driver("A", scripted("A", vec![]));
    engine.set_driver("B", scripted("B", vec![AgentAction::take("A", "sword")]));
    engine.set_driver("C", scripted("C", vec![]));

    let result = engine.run_turn().await.unwrap();
    assert!(result.changes.is_empty());
    assert!(result.world_state.entity("sword").is_some());

    let stored = log.load_turn(&sim_id, 1).unwrap().unwrap();
    assert_eq!(stored.inputs["A"], AgentAction::wait("A"));
    assert!(!stored.inputs.contains_key("B"));
}

#[tokio::test]
async fn test_feedback_reaches_every_driver() {
    let (mut engine, _log) = engine();
    engine.initialize_simulation(world_doc()).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    engine.set_driver(
        "A",
        Box::new(SlowDriver {
            agent_id: "A".to_string(),
            delay: Duration::from_millis(5),
            seen: Arc::clone(&seen),
        }),
    );
    // Feedback failure is logged, not raised
    engine.set_driver(
        "B",
        Box::new(BrokenDriver {
            agent_id: "B".to_string(),
        }),
    );

    engine.run_steps(2).await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn test_timeout_enforced_when_enabled() {
    let (mut engine, log) = engine_with(EngineConfig {
        enforce_agent_timeout: true,
    });
    let mut doc = world_doc();
    doc["agent_timeout_seconds"] = json!(0);
    let sim_id = engine.initialize_simulation(doc).unwrap();

    engine.set_driver(
        "A",
        Box::new(SlowDriver {
            agent_id: "A".to_string(),
            delay: Duration::from_secs(30),
            seen: Arc::new(Mutex::new(Vec::new())),
        }),
    );
    engine.set_driver("B", scripted("B", vec![AgentAction::take("B", "sword")]));
    engine.set_driver("C", scripted("C", vec![]));

    let result = engine.run_turn().await.unwrap();
    assert_eq!(result.events, vec!["B_took_sword"]);

    let stored = log.load_turn(&sim_id, 1).unwrap().unwrap();
    assert!(!stored.inputs.contains_key("A"));
    assert!(stored.inputs.contains_key("B"));
}

#[tokio::test]
async fn test_timeout_ignored_by_default() {
    let (mut engine, log) = engine();
    let mut doc = world_doc();
    doc["agent_timeout_seconds"] = json!(0);
    let sim_id = engine.initialize_simulation(doc).unwrap();

    engine.set_driver(
        "A",
        Box::new(SlowDriver {
            agent_id: "A".to_string(),
            delay: Duration::from_millis(20),
            seen: Arc::new(Mutex::new(Vec::new())),
        }),
    );

    engine.run_turn().await.unwrap();
    let stored = log.load_turn(&sim_id, 1).unwrap().unwrap();
    assert_eq!(stored.inputs["A"], AgentAction::wait("A"));
}

#[tokio::test]
async fn test_run_steps_numbers_contiguously() {
    let (mut engine, log) = engine();
    let sim_id = engine.initialize_simulation(world_doc()).unwrap();

    let results = engine.run_steps(4).await.unwrap();
    let ids: Vec<u64> = results.iter().map(|r| r.turn_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert_eq!(log.turn_ids(&sim_id).unwrap(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_attach_resumes_numbering() {
    let (mut first, log) = engine();
    let sim_id = first.initialize_simulation(world_doc()).unwrap();
    first.set_driver("A", scripted("A", vec![AgentAction::take("A", "sword")]));
    first.run_turn().await.unwrap();

    let mut second = SimulationEngine::new(
        log.clone(),
        Arc::new(RuleArbitrator::with_seed(1)),
        DriverRegistry::new(&SimulationConfig::default()),
        EngineConfig::default(),
    );
    second.attach_simulation(&sim_id).unwrap();
    assert_eq!(second.driver_ids(), vec!["A", "B", "C"]);

    let result = second.run_turn().await.unwrap();
    assert_eq!(result.turn_id, 2);
    // The sword taken in turn 1 stays gone
    assert!(result.world_state.entity("sword").is_none());
}

#[test]
fn test_attach_unknown_simulation() {
    let (mut engine, _log) = engine();

    let err = engine.attach_simulation("missing").unwrap_err();
    assert_eq!(
        err.downcast_ref::<EngineError>(),
        Some(&EngineError::UnknownSimulation("missing".to_string()))
    );
    assert!(engine.simulation_id().is_none());
}

#[test]
fn test_set_driver_replaces() {
    let (mut engine, _log) = engine();
    engine.initialize_simulation(world_doc()).unwrap();

    let previous = engine.set_driver("A", scripted("A", vec![]));
    assert_eq!(previous.map(|d| d.kind().to_string()), Some("scripted".to_string()));
    assert!(engine.set_driver("Z", scripted("Z", vec![])).is_none());
    assert_eq!(engine.driver_ids(), vec!["A", "B", "C", "Z"]);
}
