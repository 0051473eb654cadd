//! Output interpretation shared by all CLI variants.
//!
//! An interpreter receives stdout/stderr text chunks as they arrive and
//! turns them into a single [`RequestOutcome`] once the process exits.
//! Both variants resolve in the same order: parsed result, raw stdout,
//! stderr, then a generic exit-code failure.

use serde::Serialize;
use thiserror::Error;

use crate::agent::CliVariant;

use super::plain_text::PlainTextInterpreter;
use super::stream_json::StreamJsonInterpreter;

/// Which pipe a chunk was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOrigin {
    Stdout,
    Stderr,
}

/// A chunk of process output tagged with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterEvent {
    pub origin: StreamOrigin,
    pub text: String,
}

impl InterpreterEvent {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            origin: StreamOrigin::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            origin: StreamOrigin::Stderr,
            text: text.into(),
        }
    }
}

/// Why a send did not produce a result.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("no such agent: {0}")]
    NoSuchAgent(String),

    #[error("agent is busy: {0}")]
    AgentBusy(String),

    #[error("failed to launch: {0}")]
    LaunchFailure(String),

    #[error("{0}")]
    ProcessFailure(String),

    #[error("exit code {0}")]
    ProcessFailureUnknown(i32),

    #[error("agent terminated")]
    Terminated,
}

/// Terminal result of exactly one send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum RequestOutcome {
    Success(String),
    Failure(FailureReason),
    Timeout,
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RequestOutcome::Success(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            RequestOutcome::Success(text) => Some(text),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            RequestOutcome::Failure(reason) => Some(reason),
            _ => None,
        }
    }
}

impl std::fmt::Display for RequestOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestOutcome::Success(text) => write!(f, "{}", text),
            RequestOutcome::Failure(reason) => write!(f, "failure: {}", reason),
            RequestOutcome::Timeout => write!(f, "timeout"),
        }
    }
}

/// Incremental parser for one request's output.
pub trait OutputInterpreter: Send {
    /// Feed a chunk in arrival order. Stdout chunks from one process are
    /// delivered in pipe order; stderr is unordered relative to stdout.
    fn consume_chunk(&mut self, text: &str, origin: StreamOrigin);

    /// The logical result derived so far, if any.
    fn result(&self) -> Option<String>;

    /// Raw stdout accumulated so far.
    fn stdout(&self) -> &str;

    /// Session identifier reported by the process, if the variant has one.
    fn session_id(&self) -> Option<&str> {
        None
    }

    /// Resolve the request after the process exited with `exit_code`.
    fn finalize(&mut self, exit_code: i32) -> RequestOutcome;

    fn consume(&mut self, event: &InterpreterEvent) {
        self.consume_chunk(&event.text, event.origin);
    }
}

/// Build the interpreter matching a CLI variant.
pub fn for_variant(variant: CliVariant) -> Box<dyn OutputInterpreter> {
    match variant {
        CliVariant::StreamJson => Box::new(StreamJsonInterpreter::new()),
        CliVariant::PlainText => Box::new(PlainTextInterpreter::new()),
    }
}

/// Shared tail of the finalize order once no parsed result exists.
pub(crate) fn resolve_fallback(exit_code: i32, stdout: &str, stderr: &str) -> RequestOutcome {
    let stdout = stdout.trim();
    if exit_code == 0 && !stdout.is_empty() {
        return RequestOutcome::Success(stdout.to_string());
    }
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return RequestOutcome::Failure(FailureReason::ProcessFailure(stderr.to_string()));
    }
    if exit_code == 0 {
        return RequestOutcome::Success(String::new());
    }
    RequestOutcome::Failure(FailureReason::ProcessFailureUnknown(exit_code))
}
