//! Process orchestration for the drover agent fleet.
//!
//! This module spawns one external CLI process per request, routes its
//! output through a variant-specific interpreter and resolves a single
//! [`RequestOutcome`] per send, enforcing a per-agent timeout and at most
//! one in-flight process per agent.

mod command;
mod interpreter;
mod orchestrator;
mod plain_text;
mod process;
mod registry;
mod stream_json;

pub use command::{build_args, build_command};
pub use interpreter::{
    for_variant, FailureReason, InterpreterEvent, OutputInterpreter, RequestOutcome, StreamOrigin,
};
pub use orchestrator::Orchestrator;
pub use plain_text::PlainTextInterpreter;
pub use process::{terminate, KILL_GRACE};
pub use registry::AgentRegistry;
pub use stream_json::StreamJsonInterpreter;
