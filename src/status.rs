//! Observable status record published after every orchestrator transition.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Status consumed by display surfaces.
///
/// `loading` and `server_ready` are never both true. `error` is set only by a
/// failure and cleared when the next attempt begins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusProjection {
    pub initialized: bool,
    pub loading: bool,
    pub server_ready: bool,
    pub error: Option<String>,
}

/// Coarse lifecycle phase derived from a [`StatusProjection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Not booted yet, or boot failed.
    Idle,
    /// Booted, no attempt running.
    Ready,
    /// An attempt is loading.
    Running,
    /// The dev server is reachable.
    ServerReady,
    /// The last attempt failed.
    Failed,
}

impl StatusProjection {
    /// Whether a new attempt may be started.
    pub fn can_start(&self) -> bool {
        self.initialized && !self.loading
    }

    pub fn phase(&self) -> Phase {
        if self.loading {
            Phase::Running
        } else if self.server_ready {
            Phase::ServerReady
        } else if self.error.is_some() {
            if self.initialized {
                Phase::Failed
            } else {
                Phase::Idle
            }
        } else if self.initialized {
            Phase::Ready
        } else {
            Phase::Idle
        }
    }
}

/// Owner of the status watch channel. Only the orchestrator mutates status,
/// and only through these transitions.
#[derive(Debug)]
pub struct StatusPublisher {
    tx: watch::Sender<StatusProjection>,
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusPublisher {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(StatusProjection::default());
        Self { tx }
    }

    /// Returns a receiver that observes every published status.
    pub fn subscribe(&self) -> watch::Receiver<StatusProjection> {
        self.tx.subscribe()
    }

    /// Snapshot of the latest status.
    pub fn current(&self) -> StatusProjection {
        self.tx.borrow().clone()
    }

    /// Boot completed, or an instance was already live.
    pub fn mark_initialized(&self) {
        self.update(|s| s.initialized = true);
    }

    /// Boot failed for a reason other than a live instance.
    pub fn boot_failed(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| {
            s.initialized = false;
            s.error = Some(message);
        });
    }

    /// A new attempt is entering the running state.
    pub fn begin_attempt(&self) {
        self.update(|s| {
            s.loading = true;
            s.server_ready = false;
            s.error = None;
        });
    }

    /// The current attempt failed.
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| {
            s.loading = false;
            s.error = Some(message);
        });
    }

    /// The dev server of the current attempt became reachable.
    pub fn server_ready(&self) {
        self.update(|s| {
            s.server_ready = true;
            s.loading = false;
        });
    }

    fn update(&self, f: impl FnOnce(&mut StatusProjection)) {
        self.tx.send_modify(|status| {
            f(status);
            debug_assert!(
                !(status.loading && status.server_ready),
                "loading and server_ready must be exclusive"
            );
        });
        tracing::debug!(status = ?*self.tx.borrow(), "status published");
    }
}
