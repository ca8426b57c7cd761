//! Turn loop and agent drivers for turnsim.
//!
//! This crate owns everything that runs a simulation: the [`Driver`]
//! interface every agent strategy implements, the built-in driver variants,
//! the closed registry that maps a world document's driver kind strings to
//! those variants, and the [`SimulationEngine`] that advances the world one
//! turn at a time.
//!
//! # Architecture
//!
//! ```text
//!          Turn log (latest state)
//!                 ↓
//! ┌─────────────────────────────────────────┐
//! │       Simulation engine                  │
//! │  - Fan out get_action to all drivers     │
//! │  - Arbitrate the collected actions       │
//! │  - Append the result                     │
//! │  - Fan out feedback                      │
//! └─────────────────────────────────────────┘
//!        ↓                 ↑
//!   Drivers (one per agent entity)
//! ```
//!
//! # Writing a Driver
//!
//! ```no_run
//! use anyhow::Result;
//! use async_trait::async_trait;
//! use simulation_runner::Driver;
//! use turnsim::{AgentAction, TurnResult, WorldState};
//!
//! struct Idle {
//!     agent_id: String,
//! }
//!
//! #[async_trait]
//! impl Driver for Idle {
//!     fn agent_id(&self) -> &str {
//!         &self.agent_id
//!     }
//!
//!     fn kind(&self) -> &str {
//!         "idle"
//!     }
//!
//!     async fn get_action(&mut self, _state: &WorldState) -> Result<AgentAction> {
//!         Ok(AgentAction::wait(&self.agent_id))
//!     }
//!
//!     async fn receive_feedback(&mut self, _result: &TurnResult) -> Result<()> {
//!         Ok(())
//!     }
//! }
//! ```

mod driver;
pub mod drivers;
pub mod engine;
pub mod registry;

pub use driver::Driver;
pub use engine::{EngineError, SimulationEngine};
pub use registry::{DriverKind, DriverRegistry};
