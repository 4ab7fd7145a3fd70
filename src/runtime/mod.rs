//! Sandbox runtime contract.
//!
//! The runtime is an opaque capability provider: it boots one sandbox per
//! process, mounts file trees into it, spawns processes inside it, and
//! announces when a process starts serving on a port. [`LocalRuntime`] is the
//! bundled implementation backed by a private directory and host processes.

mod local;

pub use local::{detect_local_url, LocalRuntime, LocalSandbox};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use crate::error::Result;
use crate::tree::VirtualFileTree;

/// Where a sandboxed server can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerEndpoint {
    pub port: u16,
    pub url: String,
}

impl ServerEndpoint {
    pub fn new(port: u16, url: impl Into<String>) -> Self {
        Self {
            port,
            url: url.into(),
        }
    }
}

/// Boots the process-wide sandbox instance.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Boots the sandbox.
    ///
    /// Fails with [`Error::AlreadyBooted`](crate::Error::AlreadyBooted) when
    /// an instance is already live in this process.
    async fn boot(&self) -> Result<Arc<dyn SandboxHandle>>;

    /// Returns the instance booted earlier in this process, if any.
    fn live_instance(&self) -> Option<Arc<dyn SandboxHandle>>;

    /// Returns the name of this runtime.
    fn name(&self) -> &str;
}

/// A booted sandbox.
#[async_trait]
pub trait SandboxHandle: Send + Sync {
    /// Writes the tree into the sandbox filesystem.
    async fn mount(&self, tree: &VirtualFileTree) -> Result<()>;

    /// Starts `command` with `args` inside the sandbox.
    async fn spawn(&self, command: &str, args: &[String]) -> Result<Box<dyn ProcessHandle>>;

    /// Subscribes to the next readiness events. Dropping the subscription
    /// unsubscribes.
    fn server_ready(&self) -> ServerReadySubscription;
}

/// A process running inside the sandbox.
#[async_trait]
pub trait ProcessHandle: Send {
    /// The command line this process was started with.
    fn command(&self) -> &str;

    /// Takes the stream of output lines. Returns `None` if already taken or
    /// the runtime does not capture output.
    fn take_output(&mut self) -> Option<mpsc::Receiver<String>>;

    /// Waits for the process to exit and returns its exit code. Repeated
    /// calls return the same code.
    async fn exit(&mut self) -> Result<i32>;

    /// Terminates the process. A process that already exited is not an error.
    async fn kill(&mut self) -> Result<()>;
}

/// Receiving end of readiness events.
#[derive(Debug)]
pub struct ServerReadySubscription {
    rx: broadcast::Receiver<ServerEndpoint>,
}

impl ServerReadySubscription {
    pub fn new(rx: broadcast::Receiver<ServerEndpoint>) -> Self {
        Self { rx }
    }

    /// Waits for the next readiness event. Returns `None` once the sandbox
    /// stops publishing.
    pub async fn recv(&mut self) -> Option<ServerEndpoint> {
        loop {
            match self.rx.recv().await {
                Ok(endpoint) => return Some(endpoint),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "readiness subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Publishing side of readiness events, shared by runtime implementations.
#[derive(Debug, Clone)]
pub struct ServerReadyNotifier {
    tx: broadcast::Sender<ServerEndpoint>,
}

impl Default for ServerReadyNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerReadyNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    pub fn subscribe(&self) -> ServerReadySubscription {
        ServerReadySubscription::new(self.tx.subscribe())
    }

    /// Publishes an event; returns how many subscribers received it.
    pub fn notify(&self, endpoint: ServerEndpoint) -> usize {
        self.tx.send(endpoint).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
