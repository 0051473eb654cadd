//! drover: drive a fleet of AI CLI agents as external processes.
//!
//! Each registered agent is bound to a working directory and one of two
//! CLI contracts. [`Fleet::send`] spawns the agent's CLI for a single
//! message, interprets its output stream and resolves a
//! [`RequestOutcome`].

pub mod agent;
pub mod config;
pub mod error;
pub mod fleet;
pub mod log;
pub mod orchestration;

pub use agent::{AgentConfig, AgentState, CliVariant, SessionMode, TaskRef};
pub use config::FleetConfig;
pub use error::{Error, Result};
pub use fleet::Fleet;
pub use orchestration::{FailureReason, RequestOutcome};
