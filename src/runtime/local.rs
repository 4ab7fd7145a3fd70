//! Local directory-backed sandbox runtime.
//!
//! The sandbox is a private directory under a base directory. Processes run
//! on the host with the sandbox root as their working directory, and
//! readiness is detected by watching their output for a local URL.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::tree::{FileNode, VirtualFileTree};

use super::{
    ProcessHandle, SandboxHandle, SandboxRuntime, ServerEndpoint, ServerReadyNotifier,
    ServerReadySubscription,
};

/// Process-wide singleton instance.
static LIVE: Mutex<Option<Arc<LocalSandbox>>> = Mutex::new(None);

const OUTPUT_BUFFER: usize = 256;

const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1"];

fn live() -> MutexGuard<'static, Option<Arc<LocalSandbox>>> {
    LIVE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runtime that boots a [`LocalSandbox`] under `base_dir`.
#[derive(Debug, Clone)]
pub struct LocalRuntime {
    base_dir: PathBuf,
}

impl LocalRuntime {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Tears down the live instance, removing its directory.
    ///
    /// Returns false if no instance was live.
    pub async fn release() -> Result<bool> {
        let Some(sandbox) = live().take() else {
            return Ok(false);
        };

        tracing::info!(sandbox = %sandbox.id, root = ?sandbox.root, "releasing sandbox");
        match tokio::fs::remove_dir_all(&sandbox.root).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SandboxRuntime for LocalRuntime {
    async fn boot(&self) -> Result<Arc<dyn SandboxHandle>> {
        if live().is_some() {
            return Err(Error::AlreadyBooted);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let root = self.base_dir.join(format!("sandbox-{}", id));
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            Error::Boot(format!(
                "failed to create sandbox root {}: {}",
                root.display(),
                e
            ))
        })?;

        let sandbox = Arc::new(LocalSandbox {
            id,
            root,
            ready: ServerReadyNotifier::new(),
        });

        // Another boot may have won the race while the directory was created.
        let claimed = {
            let mut slot = live();
            if slot.is_some() {
                false
            } else {
                *slot = Some(Arc::clone(&sandbox));
                true
            }
        };
        if !claimed {
            let _ = tokio::fs::remove_dir_all(&sandbox.root).await;
            return Err(Error::AlreadyBooted);
        }

        tracing::info!(sandbox = %sandbox.id, root = ?sandbox.root, "booted local sandbox");
        Ok(sandbox)
    }

    fn live_instance(&self) -> Option<Arc<dyn SandboxHandle>> {
        live()
            .as_ref()
            .map(|sandbox| Arc::clone(sandbox) as Arc<dyn SandboxHandle>)
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// A sandbox rooted at a private directory.
#[derive(Debug)]
pub struct LocalSandbox {
    id: String,
    root: PathBuf,
    ready: ServerReadyNotifier,
}

impl LocalSandbox {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Directory the tree is mounted into and processes run in.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl SandboxHandle for LocalSandbox {
    async fn mount(&self, tree: &VirtualFileTree) -> Result<()> {
        tree.validate().map_err(|e| Error::Mount(e.to_string()))?;

        materialize(&self.root, tree)
            .await
            .map_err(|e| Error::Mount(format!("{}: {}", self.root.display(), e)))?;

        tracing::info!(
            sandbox = %self.id,
            files = tree.file_count(),
            "mounted project tree"
        );
        Ok(())
    }

    async fn spawn(&self, command: &str, args: &[String]) -> Result<Box<dyn ProcessHandle>> {
        let label = std::iter::once(command)
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");

        let mut cmd = Command::new(command);
        cmd.args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so kill reaches forked servers too.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Process(format!("failed to spawn '{}': {}", label, e)))?;
        let pid = child.id();

        let (tx, rx) = mpsc::channel(OUTPUT_BUFFER);
        let announced = Arc::new(AtomicBool::new(false));

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_lines(
                stdout,
                tx.clone(),
                self.ready.clone(),
                Arc::clone(&announced),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_lines(stderr, tx, self.ready.clone(), announced));
        }

        tracing::info!(
            sandbox = %self.id,
            command = %label,
            pid = ?child.id(),
            "spawned sandbox process"
        );

        Ok(Box::new(LocalProcess {
            command: label,
            child,
            pid,
            output: Some(rx),
            exit_code: None,
        }))
    }

    fn server_ready(&self) -> ServerReadySubscription {
        self.ready.subscribe()
    }
}

async fn materialize(root: &Path, tree: &VirtualFileTree) -> std::io::Result<()> {
    let mut pending = vec![(root.to_path_buf(), tree)];

    while let Some((dir, tree)) = pending.pop() {
        tokio::fs::create_dir_all(&dir).await?;
        for (name, node) in tree.entries() {
            let path = dir.join(name);
            match node {
                FileNode::File { contents } => tokio::fs::write(&path, contents).await?,
                FileNode::Directory(sub) => pending.push((path, sub)),
            }
        }
    }

    Ok(())
}

/// Forwards output lines and announces the first local URL seen.
async fn pump_lines<R>(
    reader: R,
    tx: mpsc::Sender<String>,
    ready: ServerReadyNotifier,
    announced: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !announced.load(Ordering::SeqCst) {
                    if let Some(endpoint) = detect_local_url(&line) {
                        if !announced.swap(true, Ordering::SeqCst) {
                            let subscribers = ready.notify(endpoint.clone());
                            tracing::info!(
                                url = %endpoint.url,
                                port = endpoint.port,
                                subscribers,
                                "sandbox server ready"
                            );
                        }
                    }
                }
                // Keep draining the pipe even when nobody reads the output.
                if tx.try_send(line).is_err() {
                    tracing::trace!("dropped process output line");
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "error reading process output");
                break;
            }
        }
    }
}

struct LocalProcess {
    command: String,
    child: Child,
    /// Also the process group id on unix.
    pid: Option<u32>,
    output: Option<mpsc::Receiver<String>>,
    exit_code: Option<i32>,
}

impl LocalProcess {
    /// Sends SIGKILL to every process in the group led by this process.
    #[cfg(unix)]
    fn kill_group(&self) -> Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.pid else {
            return Ok(());
        };
        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(Error::Process(format!(
                "failed to kill process group of '{}': {}",
                self.command, e
            ))),
        }
    }
}

impl Drop for LocalProcess {
    fn drop(&mut self) {
        #[cfg(unix)]
        if self.exit_code.is_none() {
            if let Err(e) = self.kill_group() {
                tracing::warn!(error = %e, "failed to stop dropped sandbox process");
            }
        }
    }
}

#[async_trait]
impl ProcessHandle for LocalProcess {
    fn command(&self) -> &str {
        &self.command
    }

    fn take_output(&mut self) -> Option<mpsc::Receiver<String>> {
        self.output.take()
    }

    async fn exit(&mut self) -> Result<i32> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }

        let status = self.child.wait().await.map_err(|e| {
            Error::Process(format!("failed to wait for '{}': {}", self.command, e))
        })?;
        // Killed by a signal: no exit code.
        let code = status.code().unwrap_or(-1);
        self.exit_code = Some(code);

        tracing::debug!(command = %self.command, code, "sandbox process exited");
        Ok(code)
    }

    async fn kill(&mut self) -> Result<()> {
        // Children may outlive the group leader, so the group is signalled
        // even when the direct child already exited.
        #[cfg(unix)]
        self.kill_group()?;

        if self.exit_code.is_some() {
            return Ok(());
        }
        if let Ok(Some(status)) = self.child.try_wait() {
            self.exit_code = Some(status.code().unwrap_or(-1));
            return Ok(());
        }

        #[cfg(not(unix))]
        self.child
            .kill()
            .await
            .map_err(|e| Error::Process(format!("failed to kill '{}': {}", self.command, e)))?;
        let status = self.child.wait().await?;
        self.exit_code = Some(status.code().unwrap_or(-1));

        tracing::info!(command = %self.command, "killed sandbox process");
        Ok(())
    }
}

/// Finds a local server URL (`http://localhost:<port>` or
/// `http://127.0.0.1:<port>`) in a line of process output.
pub fn detect_local_url(line: &str) -> Option<ServerEndpoint> {
    let plain = strip_ansi(line);

    for host in LOCAL_HOSTS {
        let prefix = format!("http://{}:", host);
        let Some(start) = plain.find(&prefix) else {
            continue;
        };
        let digits: String = plain[start + prefix.len()..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if let Ok(port) = digits.parse::<u16>() {
            if port != 0 {
                return Some(ServerEndpoint::new(port, format!("http://{}:{}", host, port)));
            }
        }
    }

    None
}

/// Removes CSI escape sequences (colors, bold) from a line.
fn strip_ansi(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\x1b' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'[') {
            chars.next();
            for c in chars.by_ref() {
                if ('@'..='~').contains(&c) {
                    break;
                }
            }
        }
    }

    out
}
