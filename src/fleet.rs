//! Agent lifecycle facade.
//!
//! `Fleet` is what callers hold: task dispatchers, the CLI and tests. It
//! is a thin, cloneable handle over a shared [`Orchestrator`].

use std::sync::Arc;

use crate::agent::{AgentConfig, AgentState, TaskRef};
use crate::config::FleetConfig;
use crate::orchestration::{Orchestrator, RequestOutcome};
use crate::{dlog, Result};

#[derive(Debug, Clone, Default)]
pub struct Fleet {
    orchestrator: Arc<Orchestrator>,
}

impl Fleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_orchestrator(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Build a fleet with every agent from a validated config registered.
    pub fn from_config(config: &FleetConfig) -> Result<Self> {
        let fleet = Self::new();
        for agent in config.agent_configs()? {
            fleet.register_agent(agent)?;
        }
        dlog!("Fleet ready with {} agents", fleet.agent_ids().len());
        Ok(fleet)
    }

    /// Validate and register an agent. Fails on a duplicate id.
    pub fn register_agent(&self, config: AgentConfig) -> Result<()> {
        self.orchestrator.register(config)
    }

    pub async fn send(&self, id: &str, message: &str) -> RequestOutcome {
        self.orchestrator.send(id, message).await
    }

    /// Send a message on behalf of a dispatched task. The task shows up as
    /// `current_task` in the agent's state until the request resolves.
    pub async fn send_task(&self, id: &str, task: TaskRef, message: &str) -> RequestOutcome {
        self.orchestrator.send_task(id, Some(task), message).await
    }

    pub fn is_alive(&self, id: &str) -> bool {
        self.orchestrator.contains(id)
    }

    pub fn get_state(&self, id: &str) -> Option<AgentState> {
        self.orchestrator.state(id)
    }

    pub fn agent_ids(&self) -> Vec<String> {
        self.orchestrator.ids()
    }

    /// Kill any in-flight process, then forget the agent. Idempotent.
    pub fn terminate(&self, id: &str) {
        self.orchestrator.kill(id);
        self.orchestrator.remove(id);
    }

    pub fn terminate_all(&self) {
        self.orchestrator.kill_all();
        self.orchestrator.remove_all();
    }
}
