//! Agent registry: one [`AgentState`] per agent identifier.
//!
//! The registry is plain data. The orchestrator wraps it in a mutex and
//! is the only writer of the `running` flag, through [`AgentRegistry::begin_request`]
//! and [`AgentRegistry::finish_request`].
//!
//! Every request gets a number that is unique for the registry's lifetime.
//! Updates carry that number and are dropped once it no longer matches the
//! agent's in-flight request, so a send that outlives its agent (removed,
//! then registered again under the same id) cannot touch the new agent.

use std::collections::HashMap;

use chrono::Utc;

use crate::agent::{AgentConfig, AgentState, TaskRef};
use crate::{Error, Result};

use super::interpreter::{FailureReason, RequestOutcome};

#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, AgentState>,
    next_request: u64,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new agent. Registering an existing id is an error.
    pub fn register(&mut self, config: AgentConfig) -> Result<()> {
        if self.agents.contains_key(&config.id) {
            return Err(Error::DuplicateAgent(config.id));
        }
        self.agents
            .insert(config.id.clone(), AgentState::new(config));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&AgentState> {
        self.agents.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    /// Remove an agent. Removing an unknown id is a no-op.
    pub fn remove(&mut self, id: &str) -> Option<AgentState> {
        self.agents.remove(id)
    }

    pub fn remove_all(&mut self) {
        self.agents.clear();
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.agents.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Mark an agent running for a new request.
    ///
    /// Returns the state snapshot the request should run with, or the
    /// failure that ends the request before anything is spawned.
    pub fn begin_request(
        &mut self,
        id: &str,
        task: Option<TaskRef>,
    ) -> std::result::Result<AgentState, FailureReason> {
        let state = self
            .agents
            .get_mut(id)
            .ok_or_else(|| FailureReason::NoSuchAgent(id.to_string()))?;

        if state.running {
            return Err(FailureReason::AgentBusy(id.to_string()));
        }

        self.next_request += 1;
        state.running = true;
        state.request = Some(self.next_request);
        state.output.clear();
        state.last_activity = Utc::now();
        state.current_task = task;
        Ok(state.clone())
    }

    /// Whether `request` is still the in-flight request of agent `id`.
    pub fn is_current(&self, id: &str, request: u64) -> bool {
        self.agents
            .get(id)
            .is_some_and(|state| state.request == Some(request))
    }

    fn current_mut(&mut self, id: &str, request: u64) -> Option<&mut AgentState> {
        self.agents
            .get_mut(id)
            .filter(|state| state.request == Some(request))
    }

    /// Record activity on an in-flight request.
    pub fn touch(&mut self, id: &str, request: u64) {
        if let Some(state) = self.current_mut(id, request) {
            state.last_activity = Utc::now();
        }
    }

    /// Clear the running flag and store what the request produced.
    ///
    /// A no-op when the agent was removed while the request was in flight,
    /// even if an agent with the same id has been registered since.
    pub fn finish_request(
        &mut self,
        id: &str,
        request: u64,
        output: String,
        outcome: &RequestOutcome,
        session_id: Option<String>,
    ) {
        let Some(state) = self.current_mut(id, request) else {
            return;
        };
        state.running = false;
        state.request = None;
        state.last_activity = Utc::now();
        state.output = output;
        state.current_task = None;
        state.last_outcome = Some(outcome.clone());
        if session_id.is_some() {
            state.session_id = session_id;
        }
    }
}
