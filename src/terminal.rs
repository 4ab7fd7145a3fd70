//! Append-only terminal transcript with categorized styling.
//!
//! Writes before [`TerminalSink::attach`] are dropped so callers never have
//! to check whether a display surface exists yet.

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Terminator appended to every rendered line.
pub const LINE_END: &str = "\r\n\x1b[0m";

const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Display category of a terminal line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LineCategory {
    #[default]
    Default,
    Error,
    Success,
    Info,
}

impl LineCategory {
    /// ANSI color prefix for this category.
    pub fn ansi_prefix(self) -> &'static str {
        match self {
            LineCategory::Default => "\x1b[37m",
            LineCategory::Error => "\x1b[31m",
            LineCategory::Success => "\x1b[32m",
            LineCategory::Info => "\x1b[34m",
        }
    }
}

/// One line of the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalLine {
    pub text: String,
    pub category: LineCategory,
}

impl TerminalLine {
    /// Renders the line with its styling prefix and reset suffix.
    pub fn render(&self) -> String {
        format!("{}{}{}", self.category.ansi_prefix(), self.text, LINE_END)
    }
}

/// Change notification for live display surfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    Line(TerminalLine),
    Cleared,
}

#[derive(Debug, Default)]
struct SinkState {
    attached: bool,
    lines: Vec<TerminalLine>,
}

/// Append-only, styleable output stream.
#[derive(Debug)]
pub struct TerminalSink {
    state: Mutex<SinkState>,
    events: broadcast::Sender<TerminalEvent>,
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalSink {
    /// Creates a detached sink.
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Creates a detached sink whose live event channel buffers `capacity`
    /// events per slow subscriber.
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            state: Mutex::new(SinkState::default()),
            events,
        }
    }

    /// Attaches the sink to a display surface; writes are recorded from now on.
    pub fn attach(&self) {
        self.lock().attached = true;
    }

    pub fn is_attached(&self) -> bool {
        self.lock().attached
    }

    /// Appends one line. No-op while detached.
    pub fn write(&self, message: impl Into<String>, category: LineCategory) {
        let mut state = self.lock();
        if !state.attached {
            return;
        }

        let line = TerminalLine {
            text: message.into(),
            category,
        };
        state.lines.push(line.clone());
        // No subscribers is fine; the transcript is the source of truth.
        let _ = self.events.send(TerminalEvent::Line(line));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.write(message, LineCategory::Info);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.write(message, LineCategory::Success);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.write(message, LineCategory::Error);
    }

    /// Removes all prior lines.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.lines.clear();
        let _ = self.events.send(TerminalEvent::Cleared);
    }

    /// Snapshot of the current transcript.
    pub fn transcript(&self) -> Vec<TerminalLine> {
        self.lock().lines.clone()
    }

    /// Returns true if any line has the given category.
    pub fn has_category(&self, category: LineCategory) -> bool {
        self.lock().lines.iter().any(|l| l.category == category)
    }

    /// Subscribes to live line/clear events.
    pub fn subscribe(&self) -> broadcast::Receiver<TerminalEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
