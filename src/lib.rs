//! Sandbox Launchpad - one-click development sandbox orchestration.
//!
//! This library boots an isolated sandbox, mounts a virtual project tree into
//! it, installs dependencies, launches a development server, and reports every
//! step through an observable status record and a terminal transcript.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod provider;
pub mod runtime;
pub mod status;
pub mod terminal;
pub mod tree;

pub use config::{LaunchpadConfig, Validate, ValidationResult};
pub use error::{Error, Result, ALREADY_BOOTED_MESSAGE};
pub use orchestrator::{AttemptOutcome, Orchestrator, INSTALL_COMMAND, RUN_COMMAND};
pub use provider::{JsonFileProvider, StaticTreeProvider, TemplateProvider, TreeProvider};
pub use runtime::{
    LocalRuntime, ProcessHandle, SandboxHandle, SandboxRuntime, ServerEndpoint,
    ServerReadyNotifier, ServerReadySubscription,
};
pub use status::{Phase, StatusProjection, StatusPublisher};
pub use terminal::{LineCategory, TerminalEvent, TerminalLine, TerminalSink};
pub use tree::{FileNode, VirtualFileTree};
