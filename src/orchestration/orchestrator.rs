//! Process orchestrator: one external process per send, at most one per agent.
//!
//! A send is a single future that races four things in a biased
//! `select!`: the watchdog deadline, a kill request, output chunks and
//! process exit. The deadline is polled first, so a timeout wins over an
//! exit that becomes ready in the same wakeup, and the future returns
//! exactly one [`RequestOutcome`].

use std::collections::HashMap;
use std::pin::pin;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentConfig, AgentState, TaskRef};
use crate::{dlog, dlog_debug, dlog_error, dlog_warn, Result};

use super::command::{build_args, build_command};
use super::interpreter::{
    for_variant, FailureReason, InterpreterEvent, OutputInterpreter, RequestOutcome, StreamOrigin,
};
use super::process::{forward_pipe, kill_stragglers, terminate, KILL_GRACE};
use super::registry::AgentRegistry;

/// How long to keep reading after exit when a grandchild holds a pipe open.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Kill switch of the send currently running for an agent.
#[derive(Debug)]
struct Inflight {
    request: u64,
    cancel: CancellationToken,
}

enum Step {
    Deadline,
    Cancelled,
    Event(Option<InterpreterEvent>),
    Exited(std::io::Result<std::process::ExitStatus>),
}

/// Owns the agent registry and runs sends against it.
///
/// Meant to be shared behind an `Arc`; all methods take `&self`.
#[derive(Debug, Default)]
pub struct Orchestrator {
    registry: Mutex<AgentRegistry>,
    inflight: Mutex<HashMap<String, Inflight>>,
    kill_grace: Option<Duration>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override how long a terminated process gets before SIGKILL.
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = Some(grace);
        self
    }

    fn registry(&self) -> MutexGuard<'_, AgentRegistry> {
        // A panic while holding the lock cannot leave the map half-written.
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn inflight(&self) -> MutexGuard<'_, HashMap<String, Inflight>> {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, config: AgentConfig) -> Result<()> {
        config.validate()?;
        let id = config.id.clone();
        self.registry().register(config)?;
        dlog!(agent: &id, "Registered");
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.registry().contains(id)
    }

    pub fn state(&self, id: &str) -> Option<AgentState> {
        self.registry().get(id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.registry().ids()
    }

    pub fn remove(&self, id: &str) {
        if self.registry().remove(id).is_some() {
            dlog!(agent: id, "Removed");
        }
    }

    pub fn remove_all(&self) {
        self.registry().remove_all();
    }

    /// Kill the in-flight process of an agent, if any. The pending send
    /// resolves with [`FailureReason::Terminated`].
    pub fn kill(&self, id: &str) -> bool {
        match self.inflight().get(id) {
            Some(inflight) => {
                dlog_warn!(agent: id, "Killing in-flight request #{}", inflight.request);
                inflight.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn kill_all(&self) {
        for inflight in self.inflight().values() {
            inflight.cancel.cancel();
        }
    }

    pub async fn send(&self, id: &str, message: &str) -> RequestOutcome {
        self.send_task(id, None, message).await
    }

    /// Send `message` to an agent and wait for its outcome.
    pub async fn send_task(&self, id: &str, task: Option<TaskRef>, message: &str) -> RequestOutcome {
        // Deadline starts before the lock and spawn, so they count against it.
        let started = tokio::time::Instant::now();

        let cancel = CancellationToken::new();
        let (snapshot, request) = {
            let mut registry = self.registry();
            let snapshot = match registry.begin_request(id, task) {
                Ok(snapshot) => snapshot,
                Err(reason) => {
                    dlog_warn!(agent: id, "Send rejected: {}", reason);
                    return RequestOutcome::Failure(reason);
                }
            };
            let Some(request) = snapshot.request else {
                return RequestOutcome::Failure(FailureReason::NoSuchAgent(id.to_string()));
            };
            // Lock order is registry, then inflight.
            self.inflight().insert(
                id.to_string(),
                Inflight {
                    request,
                    cancel: cancel.clone(),
                },
            );
            (snapshot, request)
        };
        if !self.registry().is_current(id, request) {
            // Removed after begin_request, before kill could see the token.
            cancel.cancel();
        }

        let deadline = started + snapshot.config.timeout;
        let mut interp = for_variant(snapshot.config.variant);
        let outcome = self
            .run_process(&snapshot, request, message, deadline, &cancel, interp.as_mut())
            .await;

        {
            let mut inflight = self.inflight();
            if inflight.get(id).is_some_and(|i| i.request == request) {
                inflight.remove(id);
            }
        }
        self.registry().finish_request(
            id,
            request,
            interp.stdout().to_string(),
            &outcome,
            interp.session_id().map(String::from),
        );

        match &outcome {
            RequestOutcome::Success(_) => dlog!(agent: id, "Request #{} succeeded", request),
            RequestOutcome::Failure(reason) => {
                dlog_error!(agent: id, "Request #{} failed: {}", request, reason)
            }
            RequestOutcome::Timeout => dlog_warn!(
                agent: id,
                "Request #{} timed out after {:?}",
                request,
                snapshot.config.timeout
            ),
        }
        outcome
    }

    async fn run_process(
        &self,
        state: &AgentState,
        request: u64,
        message: &str,
        deadline: tokio::time::Instant,
        cancel: &CancellationToken,
        interp: &mut dyn OutputInterpreter,
    ) -> RequestOutcome {
        dlog_debug!(
            agent: &state.id,
            "Spawning in {}: {:?}",
            state.config.working_dir.display(),
            build_args(state, message)
        );

        let mut child = match build_command(state, message).spawn() {
            Ok(child) => child,
            Err(e) => {
                return RequestOutcome::Failure(FailureReason::LaunchFailure(format!(
                    "{}: {}",
                    state.config.program(),
                    e
                )));
            }
        };
        let pid = child.id();
        dlog!(agent: &state.id, "Spawned pid {:?}", pid);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let readers = spawn_readers(&mut child, tx);

        let mut deadline_sleep = pin!(tokio::time::sleep_until(deadline));
        let mut streams_open = true;
        let mut exit_status = None;

        let outcome = loop {
            let step = tokio::select! {
                biased;
                _ = &mut deadline_sleep => Step::Deadline,
                _ = cancel.cancelled() => Step::Cancelled,
                event = rx.recv(), if streams_open => Step::Event(event),
                status = child.wait(), if exit_status.is_none() => Step::Exited(status),
            };

            match step {
                Step::Deadline => {
                    terminate(&mut child, self.kill_grace()).await;
                    break RequestOutcome::Timeout;
                }
                Step::Cancelled => {
                    terminate(&mut child, self.kill_grace()).await;
                    break RequestOutcome::Failure(FailureReason::Terminated);
                }
                Step::Event(Some(event)) => {
                    self.registry().touch(&state.id, request);
                    interp.consume(&event);
                }
                Step::Event(None) => streams_open = false,
                Step::Exited(Ok(status)) => {
                    dlog!(agent: &state.id, "Exited with {}", status);
                    exit_status = Some(status.code().unwrap_or(-1));
                }
                Step::Exited(Err(e)) => {
                    dlog_error!(agent: &state.id, "Waiting for exit failed: {}", e);
                    exit_status = Some(-1);
                }
            }

            if let Some(code) = exit_status {
                if streams_open && !drain(&mut rx, interp).await {
                    if let Some(pid) = pid {
                        kill_stragglers(pid);
                    }
                }
                break interp.finalize(code);
            }
        };

        for reader in readers {
            reader.abort();
        }
        outcome
    }

    fn kill_grace(&self) -> Duration {
        self.kill_grace.unwrap_or(KILL_GRACE)
    }
}

fn spawn_readers(
    child: &mut Child,
    tx: mpsc::UnboundedSender<InterpreterEvent>,
) -> Vec<JoinHandle<()>> {
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(forward_pipe(
            stdout,
            StreamOrigin::Stdout,
            tx.clone(),
        )));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(forward_pipe(stderr, StreamOrigin::Stderr, tx)));
    }
    readers
}

/// Consume whatever the pipes still deliver after exit, for at most
/// [`DRAIN_GRACE`]. Returns false if the pipes were still open.
async fn drain(
    rx: &mut mpsc::UnboundedReceiver<InterpreterEvent>,
    interp: &mut dyn OutputInterpreter,
) -> bool {
    let drained = timeout(DRAIN_GRACE, async {
        while let Some(event) = rx.recv().await {
            interp.consume(&event);
        }
    })
    .await;
    if drained.is_err() {
        dlog_debug!("Pipes still open {:?} after exit, giving up", DRAIN_GRACE);
        return false;
    }
    true
}
