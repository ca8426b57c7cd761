// World state, actions and change application
pub mod model;

// Turn resolution policies
pub mod arbitrator;

// External text-completion service
pub mod reasoning;

// Append-only persistence of simulations and turns
pub mod turnlog;

// TOML and environment configuration
pub mod config;

// Re-export commonly used types
pub use arbitrator::Arbitrator;
pub use model::{AgentAction, Entity, EntityKind, TurnResult, WorldChange, WorldState};
pub use turnlog::{SqliteTurnLog, TurnLog};
