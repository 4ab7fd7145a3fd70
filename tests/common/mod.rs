//! Scripted sandbox runtime shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use launchpad::{
    Error, LineCategory, ProcessHandle, Result, SandboxHandle, SandboxRuntime, ServerEndpoint,
    ServerReadyNotifier, ServerReadySubscription, TerminalLine, TreeProvider, VirtualFileTree,
};

/// How [`FakeRuntime::boot`] behaves.
#[derive(Debug, Clone)]
pub enum BootBehavior {
    /// Boots once; later boots report an already-live instance.
    Succeed,
    /// Fails with a plain boot error carrying this message.
    FailWith(String),
}

/// Runtime whose single sandbox is scripted by the test.
#[derive(Clone)]
pub struct FakeRuntime {
    behavior: BootBehavior,
    booted: Arc<AtomicBool>,
    sandbox: Arc<FakeSandbox>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::with_behavior(BootBehavior::Succeed)
    }

    pub fn with_behavior(behavior: BootBehavior) -> Self {
        Self {
            behavior,
            booted: Arc::new(AtomicBool::new(false)),
            sandbox: Arc::new(FakeSandbox::default()),
        }
    }

    pub fn sandbox(&self) -> Arc<FakeSandbox> {
        Arc::clone(&self.sandbox)
    }
}

#[async_trait]
impl SandboxRuntime for FakeRuntime {
    async fn boot(&self) -> Result<Arc<dyn SandboxHandle>> {
        match &self.behavior {
            BootBehavior::FailWith(message) => Err(Error::Boot(message.clone())),
            BootBehavior::Succeed => {
                if self.booted.swap(true, Ordering::SeqCst) {
                    Err(Error::AlreadyBooted)
                } else {
                    Ok(self.sandbox())
                }
            }
        }
    }

    fn live_instance(&self) -> Option<Arc<dyn SandboxHandle>> {
        if self.booted.load(Ordering::SeqCst) {
            Some(self.sandbox())
        } else {
            None
        }
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Sandbox that records calls and lets tests script process behavior.
#[derive(Default)]
pub struct FakeSandbox {
    calls: Mutex<Vec<String>>,
    mount_error: Mutex<Option<String>>,
    run_spawn_error: Mutex<Option<String>>,
    install_exit: Mutex<i32>,
    install_output: Mutex<Vec<String>>,
    install_gate: Mutex<Option<Arc<Notify>>>,
    mounted: Mutex<Vec<VirtualFileTree>>,
    subscriptions: AtomicUsize,
    killed: Arc<Mutex<Vec<String>>>,
    ready: ServerReadyNotifier,
}

impl FakeSandbox {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn spawned(&self, command_line: &str) -> bool {
        self.calls()
            .iter()
            .any(|c| c == &format!("spawn {}", command_line))
    }

    pub fn mounted(&self) -> Vec<VirtualFileTree> {
        self.mounted.lock().unwrap().clone()
    }

    pub fn fail_mount(&self, message: &str) {
        *self.mount_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_run_spawn(&self, message: &str) {
        *self.run_spawn_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn set_install_exit(&self, code: i32) {
        *self.install_exit.lock().unwrap() = code;
    }

    pub fn set_install_output(&self, lines: &[&str]) {
        *self.install_output.lock().unwrap() = lines.iter().map(|l| l.to_string()).collect();
    }

    /// Makes the next install wait until the returned gate is notified.
    pub fn gate_install(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.install_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Times `server_ready` was called.
    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    /// Subscriptions currently alive.
    pub fn live_subscribers(&self) -> usize {
        self.ready.subscriber_count()
    }

    /// Command lines of processes that were killed.
    pub fn killed(&self) -> Vec<String> {
        self.killed.lock().unwrap().clone()
    }

    /// Announces a listening server; returns how many subscribers saw it.
    pub fn fire_ready(&self, port: u16, url: &str) -> usize {
        self.ready.notify(ServerEndpoint::new(port, url))
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl SandboxHandle for FakeSandbox {
    async fn mount(&self, tree: &VirtualFileTree) -> Result<()> {
        self.record("mount".to_string());
        if let Some(message) = self.mount_error.lock().unwrap().clone() {
            return Err(Error::Mount(message));
        }
        self.mounted.lock().unwrap().push(tree.clone());
        Ok(())
    }

    async fn spawn(&self, command: &str, args: &[String]) -> Result<Box<dyn ProcessHandle>> {
        let command_line = format!("{} {}", command, args.join(" "));
        self.record(format!("spawn {}", command_line));

        let is_install = args.first().map(String::as_str) == Some("install");
        if !is_install {
            if let Some(message) = self.run_spawn_error.lock().unwrap().clone() {
                return Err(Error::Process(message));
            }
        }

        let (exit_code, lines, gate) = if is_install {
            (
                *self.install_exit.lock().unwrap(),
                self.install_output.lock().unwrap().clone(),
                self.install_gate.lock().unwrap().take(),
            )
        } else {
            (0, Vec::new(), None)
        };

        let (tx, rx) = mpsc::channel(lines.len().max(1));
        for line in lines {
            let _ = tx.try_send(line);
        }

        Ok(Box::new(FakeProcess {
            command: command_line,
            exit_code,
            gate,
            output: Some(rx),
            killed: Arc::clone(&self.killed),
        }))
    }

    fn server_ready(&self) -> ServerReadySubscription {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        self.record("subscribe".to_string());
        self.ready.subscribe()
    }
}

struct FakeProcess {
    command: String,
    exit_code: i32,
    gate: Option<Arc<Notify>>,
    output: Option<mpsc::Receiver<String>>,
    killed: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ProcessHandle for FakeProcess {
    fn command(&self) -> &str {
        &self.command
    }

    fn take_output(&mut self) -> Option<mpsc::Receiver<String>> {
        self.output.take()
    }

    async fn exit(&mut self) -> Result<i32> {
        if let Some(gate) = self.gate.take() {
            gate.notified().await;
        }
        Ok(self.exit_code)
    }

    async fn kill(&mut self) -> Result<()> {
        self.killed.lock().unwrap().push(self.command.clone());
        Ok(())
    }
}

/// Provider that always fails.
pub struct FailingProvider;

#[async_trait]
impl TreeProvider for FailingProvider {
    async fn get(&self) -> Result<VirtualFileTree> {
        Err(Error::FileProvider("backend unavailable".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// The two-file project used by the readiness scenario.
pub fn two_file_tree() -> VirtualFileTree {
    VirtualFileTree::new()
        .with_file("package.json", r#"{"name":"demo","scripts":{"dev":"vite"}}"#)
        .with_file("index.html", "<!DOCTYPE html><html></html>")
}

pub fn texts(lines: &[TerminalLine]) -> Vec<String> {
    lines.iter().map(|l| l.text.clone()).collect()
}

pub fn lines_in(lines: &[TerminalLine], category: LineCategory) -> Vec<String> {
    lines
        .iter()
        .filter(|l| l.category == category)
        .map(|l| l.text.clone())
        .collect()
}

/// Polls `condition` until it holds or a second passes.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
