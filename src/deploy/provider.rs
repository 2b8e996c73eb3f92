//! The backend provider contract
//!
//! Any backend that can declare an ordered step list and execute it against
//! an [`EventSink`] can be orchestrated unmodified: a cloud VM API, an SSH
//! target, a local container stack.

use async_trait::async_trait;
use tokio::sync::watch;

use super::events::{EventSink, StepSpec};
use crate::config::Config;

/// Cooperative cancellation signal threaded into a run
///
/// The handle side lives with the orchestrator; providers hold the token
/// and check it at poll boundaries. Cancellation is advisory: an in-flight
/// subprocess call finishes its current await before the token is observed.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelToken {
    /// Create a token plus the handle that can trip it
    pub fn new() -> (CancelHandle, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelToken { rx })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                // Handle dropped without cancelling: never resolves
                std::future::pending::<()>().await;
            }
        }
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Everything a provider needs for one run besides the event sinks
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: Config,
    pub cancel: CancelToken,
}

impl RunContext {
    pub fn new(config: Config, cancel: CancelToken) -> Self {
        Self { config, cancel }
    }
}

/// A backend-specific implementation of the step-execution contract
///
/// Invariant: `execute` must perform exactly the steps `declare_steps`
/// returned, in the same order and under the same names. The
/// [`StepSequence`](super::executor::StepSequence) enforces this at
/// runtime; a divergence is an internal fault, not a user error.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier, also the key for error classification
    fn name(&self) -> &str;

    /// The ordered step list for a deployment on this backend
    fn declare_steps(&self) -> Vec<StepSpec>;

    /// Run the declared steps, reporting through the sink
    ///
    /// May block on network I/O, external processes, and
    /// eventual-consistency polling; individual operations carry their own
    /// timeouts. Implementations should check `ctx.cancel` in polling
    /// loops and return early when tripped.
    async fn execute(&self, ctx: &RunContext, sink: &EventSink) -> anyhow::Result<()>;
}
