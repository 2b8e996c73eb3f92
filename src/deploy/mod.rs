//! Provider-agnostic deployment orchestration core
//!
//! A deployment run executes one linear step sequence against a backend
//! [`Provider`], streaming progress and log events to a concurrently
//! running terminal renderer. The pieces:
//!
//! - [`events`] - the shared event vocabulary and the channel-backed sink
//! - [`diagnose`] - classification of backend error text into diagnostics
//! - [`executor`] - the fail-fast step sequencing engine
//! - [`provider`] - the backend contract and run context
//! - [`renderer`] - the terminal UI loop
//! - [`orchestrator`] - the bridge between worker and UI paths
//! - [`teardown`] - retrying, best-effort resource deletion
//! - [`interaction`] - prompts and message display

pub mod diagnose;
pub mod events;
pub mod executor;
pub mod interaction;
pub mod orchestrator;
pub mod provider;
pub mod renderer;
pub mod teardown;

pub use diagnose::{classify, classify_text, Diagnostic};
pub use events::{
    Completion, EventSink, LogEvent, LogLevel, ProgressEvent, RenderEvent, RunResult, Step,
    StepSpec, StepStatus,
};
pub use executor::{StepFailure, StepProgress, StepSequence};
pub use interaction::{AssumeYesInteraction, DefaultUserInteraction, UserInteraction};
pub use orchestrator::Orchestrator;
pub use provider::{CancelHandle, CancelToken, Provider, RunContext};
pub use renderer::{ProgressRenderer, RendererOutcome};
pub use teardown::{
    confirm_destroy, confirm_reset, report_to_error, ResourcePlan, RetryPolicy,
    TeardownCoordinator, TeardownReport,
};
