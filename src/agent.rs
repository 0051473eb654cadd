//! Agent configuration and per-agent runtime state.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::orchestration::RequestOutcome;
use crate::{Error, Result};

/// Default per-request timeout (5 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// The external CLI contract an agent is driven through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CliVariant {
    /// Newline-delimited JSON records on stdout; a `result` record carries the answer.
    StreamJson,
    /// Unstructured text on stdout; the whole trimmed stdout is the answer.
    PlainText,
}

impl CliVariant {
    /// Binary used when the agent has no `command` override.
    pub fn default_binary(&self) -> &'static str {
        match self {
            CliVariant::StreamJson => "claude",
            CliVariant::PlainText => "codex",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CliVariant::StreamJson => "stream-json",
            CliVariant::PlainText => "plain-text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    /// Resume the previous CLI session on each send, when one is known.
    Persistent,
    #[default]
    PerTask,
}

/// Immutable agent description supplied at registration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    pub variant: CliVariant,
    pub working_dir: PathBuf,
    pub env: HashMap<String, String>,
    pub session_mode: SessionMode,
    pub timeout: Duration,
    /// Program plus leading arguments replacing the variant's default binary.
    pub command: Option<Vec<String>>,
}

impl AgentConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        variant: CliVariant,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            variant,
            working_dir: working_dir.into(),
            env: HashMap::new(),
            session_mode: SessionMode::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            command: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_session_mode(mut self, mode: SessionMode) -> Self {
        self.session_mode = mode;
        self
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(command.into_iter().map(Into::into).collect());
        self
    }

    /// The program to launch, honoring the `command` override.
    pub fn program(&self) -> &str {
        self.command
            .as_ref()
            .and_then(|c| c.first())
            .map(|s| s.as_str())
            .unwrap_or_else(|| self.variant.default_binary())
    }

    /// Whether the program resolves to an executable on PATH.
    pub fn is_available(&self) -> bool {
        which::which(self.program()).is_ok()
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::Validation("agent id must not be empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(Error::Validation(format!(
                "agent {}: name must not be empty",
                self.id
            )));
        }
        if self.working_dir.as_os_str().is_empty() {
            return Err(Error::Validation(format!(
                "agent {}: working_dir must not be empty",
                self.id
            )));
        }
        if self.timeout.is_zero() {
            return Err(Error::Validation(format!(
                "agent {}: timeout must be positive",
                self.id
            )));
        }
        if let Some(command) = &self.command {
            if command.first().map_or(true, |p| p.trim().is_empty()) {
                return Err(Error::Validation(format!(
                    "agent {}: command must name a program",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

/// Reference to the task a dispatcher assigned alongside a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    pub id: String,
    pub title: String,
}

impl TaskRef {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// Mutable per-agent record, owned by the registry.
#[derive(Debug, Clone, Serialize)]
pub struct AgentState {
    pub id: String,
    pub config: AgentConfig,
    pub running: bool,
    /// Number of the in-flight request, issued by the registry.
    pub request: Option<u64>,
    /// Stdout of the current or most recent request.
    pub output: String,
    pub last_activity: DateTime<Utc>,
    pub current_task: Option<TaskRef>,
    /// Session reported by the CLI, reused by persistent agents.
    pub session_id: Option<String>,
    pub last_outcome: Option<RequestOutcome>,
}

impl AgentState {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            id: config.id.clone(),
            config,
            running: false,
            request: None,
            output: String::new(),
            last_activity: Utc::now(),
            current_task: None,
            session_id: None,
            last_outcome: None,
        }
    }
}
