//! Sandbox orchestration state machine.
//!
//! The [`Orchestrator`] owns the sandbox handle and drives every attempt
//! through mount, install, run and readiness:
//!
//! ```text
//! Idle -> Booting -> Ready -> Running -> ServerReady
//!                              |   ^
//!                              v   |  (user restarts)
//!                             Failed
//! ```
//!
//! Each transition writes to the [`TerminalSink`] before the matching status
//! is published, so a display surface never sees a status without the line
//! explaining it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::provider::TreeProvider;
use crate::runtime::{
    ProcessHandle, SandboxHandle, SandboxRuntime, ServerEndpoint, ServerReadySubscription,
};
use crate::status::{StatusProjection, StatusPublisher};
use crate::terminal::{LineCategory, TerminalSink};

/// Dependency installation command.
pub const INSTALL_COMMAND: (&str, &[&str]) = ("npm", &["install"]);

/// Development server command.
pub const RUN_COMMAND: (&str, &[&str]) = ("npm", &["run", "dev"]);

/// How a `start` call ended once control returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "outcome")]
pub enum AttemptOutcome {
    /// The dev server was spawned; readiness arrives asynchronously.
    Launched { attempt: u64 },
    /// The attempt failed; the message is also in the status and terminal.
    Failed { attempt: u64, message: String },
}

impl AttemptOutcome {
    pub fn attempt(&self) -> u64 {
        match self {
            AttemptOutcome::Launched { attempt } | AttemptOutcome::Failed { attempt, .. } => {
                *attempt
            }
        }
    }

    pub fn is_launched(&self) -> bool {
        matches!(self, AttemptOutcome::Launched { .. })
    }
}

/// Everything guarded by the attempt lock. All calls against the sandbox
/// handle happen while this is held.
#[derive(Default)]
struct AttemptSlot {
    handle: Option<Arc<dyn SandboxHandle>>,
    /// Id of the newest attempt; readiness for any other id is stale.
    current: u64,
    /// Processes still owned by the current attempt.
    processes: Vec<Box<dyn ProcessHandle>>,
    /// Readiness listener and output forwarders of the current attempt.
    tasks: Vec<JoinHandle<()>>,
}

impl AttemptSlot {
    /// Unsubscribes listeners and kills processes of the current attempt.
    async fn retire(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
            // Wait so a forwarder mid-write cannot land after the next clear.
            let _ = task.await;
        }

        for mut process in self.processes.drain(..) {
            if let Err(e) = process.kill().await {
                tracing::warn!(
                    attempt = self.current,
                    command = %process.command(),
                    error = %e,
                    "failed to stop process from previous attempt"
                );
            }
        }
    }
}

/// State shared with background listener tasks.
struct Shared {
    terminal: Arc<TerminalSink>,
    status: StatusPublisher,
    preview: watch::Sender<Option<ServerEndpoint>>,
    slot: Mutex<AttemptSlot>,
}

/// Drives the boot → mount → install → run → ready lifecycle.
pub struct Orchestrator<R: SandboxRuntime> {
    runtime: R,
    provider: Box<dyn TreeProvider>,
    shared: Arc<Shared>,
}

impl<R: SandboxRuntime> Orchestrator<R> {
    /// Creates an orchestrator writing progress to `terminal`.
    pub fn new(runtime: R, provider: Box<dyn TreeProvider>, terminal: Arc<TerminalSink>) -> Self {
        let (preview, _) = watch::channel(None);
        Self {
            runtime,
            provider,
            shared: Arc::new(Shared {
                terminal,
                status: StatusPublisher::new(),
                preview,
                slot: Mutex::new(AttemptSlot::default()),
            }),
        }
    }

    /// Latest published status.
    pub fn status(&self) -> StatusProjection {
        self.shared.status.current()
    }

    /// Observes every status transition.
    pub fn subscribe_status(&self) -> watch::Receiver<StatusProjection> {
        self.shared.status.subscribe()
    }

    /// Observes the endpoint routed to the preview surface.
    pub fn preview(&self) -> watch::Receiver<Option<ServerEndpoint>> {
        self.shared.preview.subscribe()
    }

    pub fn terminal(&self) -> &Arc<TerminalSink> {
        &self.shared.terminal
    }

    /// Boots the sandbox runtime.
    ///
    /// A runtime reporting an already-live instance counts as success and the
    /// live instance is reused. Any other failure is written to the terminal,
    /// published as the status error, and returned.
    pub async fn boot(&self) -> Result<()> {
        let mut slot = self.shared.slot.lock().await;
        if slot.handle.is_some() {
            self.shared.status.mark_initialized();
            return Ok(());
        }

        tracing::info!(runtime = self.runtime.name(), "booting sandbox runtime");

        match self.runtime.boot().await {
            Ok(handle) => {
                slot.handle = Some(handle);
                self.shared.status.mark_initialized();
                tracing::info!(runtime = self.runtime.name(), "sandbox booted");
                Ok(())
            }
            Err(e) if e.is_already_booted() => {
                slot.handle = self.runtime.live_instance();
                self.shared.status.mark_initialized();
                tracing::info!(
                    runtime = self.runtime.name(),
                    reused = slot.handle.is_some(),
                    "sandbox already booted, reusing live instance"
                );
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(error = %message, "sandbox boot failed");
                self.shared
                    .terminal
                    .error(format!("Initialization Error: {}", message));
                self.shared.status.boot_failed(message);
                Err(e)
            }
        }
    }

    /// Starts a new attempt.
    ///
    /// Rejected with [`Error::NotInitialized`] before boot and with
    /// [`Error::AttemptInProgress`] while an attempt is loading; a rejected
    /// call changes neither transcript nor status. Failures inside the
    /// attempt are reported through terminal and status and returned as
    /// [`AttemptOutcome::Failed`].
    pub async fn start(&self) -> Result<AttemptOutcome> {
        check_can_start(&self.shared.status.current())?;

        let mut slot = self.shared.slot.lock().await;
        // Another start may have begun while we waited for the lock.
        check_can_start(&self.shared.status.current())?;

        slot.retire().await;
        slot.current += 1;
        let attempt = slot.current;

        self.shared.status.begin_attempt();
        self.shared.preview.send_replace(None);
        self.shared.terminal.clear();
        tracing::info!(attempt, "starting attempt");

        match self.run_attempt(&mut slot, attempt).await {
            Ok(()) => {
                tracing::info!(attempt, "development server launched, waiting for readiness");
                Ok(AttemptOutcome::Launched { attempt })
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(attempt, error = %message, "attempt failed");
                self.shared.terminal.error(format!("Error: {}", message));
                self.shared.status.fail(message.clone());
                Ok(AttemptOutcome::Failed { attempt, message })
            }
        }
    }

    /// Waits until no attempt is loading and returns that status.
    ///
    /// There is no timeout: if the dev server never announces readiness this
    /// waits until the orchestrator is dropped.
    pub async fn wait_until_settled(&self) -> Result<StatusProjection> {
        let mut rx = self.shared.status.subscribe();
        let status = rx
            .wait_for(|s| !s.loading)
            .await
            .map_err(|_| Error::Process("status channel closed".to_string()))?;
        Ok(status.clone())
    }

    /// Stops the current attempt's processes and listeners.
    pub async fn shutdown(&self) {
        let mut slot = self.shared.slot.lock().await;
        tracing::info!(attempt = slot.current, "shutting down sandbox processes");
        slot.retire().await;
    }

    async fn run_attempt(&self, slot: &mut AttemptSlot, attempt: u64) -> Result<()> {
        let terminal = &self.shared.terminal;

        terminal.info("Initializing sandbox...");
        let handle = slot
            .handle
            .clone()
            .ok_or_else(|| Error::Boot("sandbox not initialized".to_string()))?;

        terminal.info("Fetching project files...");
        let tree = self.provider.get().await.map_err(|e| match e {
            Error::FileProvider(_) => e,
            other => Error::FileProvider(other.to_string()),
        })?;
        tracing::debug!(
            attempt,
            provider = self.provider.name(),
            files = tree.file_count(),
            "fetched project tree"
        );

        handle.mount(&tree).await.map_err(|e| match e {
            Error::Mount(_) => e,
            other => Error::Mount(other.to_string()),
        })?;
        terminal.success("Project files mounted");

        terminal.info("Installing dependencies...");
        let (program, args) = INSTALL_COMMAND;
        let mut install = handle
            .spawn(program, &to_args(args))
            .await
            .map_err(|e| Error::InstallSpawn(e.to_string()))?;
        self.forward_output(slot, install.as_mut());

        let code = install.exit().await?;
        tracing::info!(attempt, code, "dependency installation finished");
        if code != 0 {
            return Err(Error::InstallFailure { code });
        }
        terminal.success("Dependencies installed");

        // Subscribe before spawning so an early announcement is not missed.
        let subscription = handle.server_ready();

        terminal.info("Starting development server...");
        let (program, args) = RUN_COMMAND;
        let mut dev = handle
            .spawn(program, &to_args(args))
            .await
            .map_err(|e| Error::RunSpawn(e.to_string()))?;
        self.forward_output(slot, dev.as_mut());
        slot.processes.push(dev);

        let listener = self.listen_for_ready(attempt, subscription);
        slot.tasks.push(listener);
        Ok(())
    }

    fn forward_output(&self, slot: &mut AttemptSlot, process: &mut dyn ProcessHandle) {
        if let Some(rx) = process.take_output() {
            let terminal = Arc::clone(&self.shared.terminal);
            slot.tasks.push(tokio::spawn(forward_lines(rx, terminal)));
        }
    }

    /// One-shot readiness listener for `attempt`.
    fn listen_for_ready(
        &self,
        attempt: u64,
        mut subscription: ServerReadySubscription,
    ) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);

        tokio::spawn(async move {
            let Some(endpoint) = subscription.recv().await else {
                tracing::debug!(attempt, "readiness events closed before server was ready");
                return;
            };
            drop(subscription);

            let slot = shared.slot.lock().await;
            if slot.current != attempt {
                tracing::debug!(attempt, current = slot.current, "ignoring stale readiness event");
                return;
            }

            shared
                .terminal
                .success(format!("Server ready at {}", endpoint.url));
            shared.status.server_ready();
            tracing::info!(attempt, port = endpoint.port, url = %endpoint.url, "server ready");
            shared.preview.send_replace(Some(endpoint));
        })
    }
}

fn check_can_start(status: &StatusProjection) -> Result<()> {
    if !status.initialized {
        return Err(Error::NotInitialized);
    }
    if status.loading {
        return Err(Error::AttemptInProgress);
    }
    Ok(())
}

fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

async fn forward_lines(mut rx: mpsc::Receiver<String>, terminal: Arc<TerminalSink>) {
    while let Some(line) = rx.recv().await {
        terminal.write(line, LineCategory::Default);
    }
}
