//! Error types for the sandbox launchpad.

use thiserror::Error;

/// Message some runtimes report when a second boot is attempted while the
/// singleton instance is still live.
pub const ALREADY_BOOTED_MESSAGE: &str = "Only a single WebContainer instance can be booted";

/// Top-level error type for sandbox orchestration.
#[derive(Error, Debug)]
pub enum Error {
    /// Booting the sandbox runtime failed.
    #[error("{0}")]
    Boot(String),

    /// A sandbox instance is already live in this process.
    #[error("{}", ALREADY_BOOTED_MESSAGE)]
    AlreadyBooted,

    /// The virtual file tree could not be produced.
    #[error("failed to load project files: {0}")]
    FileProvider(String),

    /// Writing the tree into the sandbox failed.
    #[error("failed to mount project files: {0}")]
    Mount(String),

    /// The install process could not be started.
    #[error("failed to start dependency installation: {0}")]
    InstallSpawn(String),

    /// Dependency installation exited non-zero.
    #[error("Dependency installation failed (exit code {code})")]
    InstallFailure { code: i32 },

    /// The dev-server process could not be started.
    #[error("failed to start development server: {0}")]
    RunSpawn(String),

    /// `start` was invoked before the sandbox finished booting.
    #[error("sandbox is not initialized")]
    NotInitialized,

    /// `start` was invoked while another attempt is still loading.
    #[error("an attempt is already in progress")]
    AttemptInProgress,

    /// A spawned process could not be awaited or signalled.
    #[error("process error: {0}")]
    Process(String),

    /// IO error during sandbox operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed tree document.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true for the duplicate-boot condition, whether reported as
    /// [`Error::AlreadyBooted`] or as a plain boot failure carrying the
    /// runtime's message.
    pub fn is_already_booted(&self) -> bool {
        match self {
            Error::AlreadyBooted => true,
            Error::Boot(msg) => msg == ALREADY_BOOTED_MESSAGE,
            _ => false,
        }
    }

    /// Returns true for errors that reject a `start` call without touching
    /// the transcript or status.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::NotInitialized | Error::AttemptInProgress)
    }
}

/// Result type alias for launchpad operations.
pub type Result<T> = std::result::Result<T, Error>;
