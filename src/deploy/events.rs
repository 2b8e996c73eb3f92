//! Event vocabulary shared between step execution and rendering
//!
//! The worker side of a run emits [`ProgressEvent`] and [`LogEvent`] values
//! through an [`EventSink`]; the renderer consumes them on the other side of
//! the channel boundary and rebuilds its own view of step state. Dropping
//! the sink closes both channels, which is the signal for consumers to
//! drain whatever is buffered and then wait for the completion event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::diagnose::Diagnostic;

/// Lifecycle state of a single provisioning step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Complete,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Terminal states are never left once entered
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Skipped)
    }
}

/// A step as declared by a provider, before execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    pub description: String,
}

impl StepSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// One unit of provisioning work, tracked through its lifecycle
#[derive(Debug, Clone)]
pub struct Step {
    pub spec: StepSpec,
    pub status: StepStatus,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
    pub fraction_complete: f64,
}

impl Step {
    pub fn new(spec: StepSpec) -> Self {
        Self {
            spec,
            status: StepStatus::Pending,
            started_at: None,
            finished_at: None,
            fraction_complete: 0.0,
        }
    }

    pub fn start(&mut self) {
        if self.status == StepStatus::Pending {
            self.status = StepStatus::Running;
            self.started_at = Some(Instant::now());
        }
    }

    /// Idempotent: completing an already-complete step is a no-op, and a
    /// terminal status is never reverted.
    pub fn complete(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = StepStatus::Complete;
        self.fraction_complete = 1.0;
        self.finished_at = Some(Instant::now());
    }

    pub fn fail(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = StepStatus::Failed;
        self.finished_at = Some(Instant::now());
    }

    /// Time spent in the Running state so far (or total once finished)
    pub fn elapsed(&self) -> Option<Duration> {
        let start = self.started_at?;
        Some(match self.finished_at {
            Some(end) => end.duration_since(start),
            None => start.elapsed(),
        })
    }
}

/// Fine-grained progress reported by a running step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub step_index: usize,
    pub fraction_complete: f64,
    pub message: Option<String>,
}

/// Severity of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
    Debug,
}

/// A log line emitted during a run, tagged with the time of emission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEvent {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    pub fn debug(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Debug, message)
    }
}

/// Terminal outcome of one orchestrated run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub success: bool,
    pub message: String,
    pub dashboard_url: Option<String>,
}

/// Completion signal sent to the renderer after all events have drained
#[derive(Debug, Clone)]
pub enum Completion {
    Success { message: String },
    Failure { diagnostic: Diagnostic },
}

/// Input to the renderer loop: forwarded events plus the completion signal
#[derive(Debug, Clone)]
pub enum RenderEvent {
    Progress(ProgressEvent),
    Log(LogEvent),
    Done(Completion),
}

pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;
pub type LogReceiver = mpsc::UnboundedReceiver<LogEvent>;

/// The emission interface handed to running steps
///
/// Channels are unbounded so the completion flush can never drop trailing
/// events. Send failures mean the receiving side is gone (the user quit the
/// UI); events are discarded silently in that case since there is nobody
/// left to render them.
#[derive(Debug, Clone)]
pub struct EventSink {
    progress: mpsc::UnboundedSender<ProgressEvent>,
    log: mpsc::UnboundedSender<LogEvent>,
}

impl EventSink {
    /// Create a sink plus the paired receivers
    pub fn channel() -> (Self, ProgressReceiver, LogReceiver) {
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (log_tx, log_rx) = mpsc::unbounded_channel();
        (
            Self {
                progress: progress_tx,
                log: log_tx,
            },
            progress_rx,
            log_rx,
        )
    }

    pub fn emit_progress(&self, event: ProgressEvent) {
        let _ = self.progress.send(event);
    }

    /// Convenience for a step reporting its completion fraction
    pub fn progress(&self, step_index: usize, fraction_complete: f64) {
        self.emit_progress(ProgressEvent {
            step_index,
            fraction_complete: fraction_complete.clamp(0.0, 1.0),
            message: None,
        });
    }

    pub fn emit_log(&self, event: LogEvent) {
        let _ = self.log.send(event);
    }

    pub fn log_info(&self, message: impl Into<String>) {
        self.emit_log(LogEvent::info(message));
    }

    pub fn log_success(&self, message: impl Into<String>) {
        self.emit_log(LogEvent::success(message));
    }

    pub fn log_warning(&self, message: impl Into<String>) {
        self.emit_log(LogEvent::warning(message));
    }

    pub fn log_error(&self, message: impl Into<String>) {
        self.emit_log(LogEvent::error(message));
    }

    pub fn log_debug(&self, message: impl Into<String>) {
        self.emit_log(LogEvent::debug(message));
    }
}
