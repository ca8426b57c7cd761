//! Built-in driver variants.

pub mod heuristic;
pub mod interactive;
pub mod reasoning;
pub mod replay;
pub mod scripted;

pub use heuristic::HeuristicDriver;
pub use interactive::{parse_command, Console, InteractiveDriver};
pub use reasoning::ReasoningDriver;
pub use replay::{ReplayDriver, ReplayEntry};
pub use scripted::ScriptedDriver;
