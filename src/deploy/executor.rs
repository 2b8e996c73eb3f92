//! Step sequencing engine
//!
//! A provider executes its declared steps through a [`StepSequence`], which
//! owns all step state for the run: it marks transitions, emits progress
//! and log events through the sink, classifies failures, and aborts the
//! remainder of the sequence on the first hard failure. It also enforces
//! the declaration contract: steps must be executed in the exact order and
//! under the exact names the provider declared, or the renderer's view
//! would silently desynchronize from reality.

use std::future::Future;

use super::diagnose::{classify, Diagnostic};
use super::events::{EventSink, ProgressEvent, Step, StepSpec, StepStatus};
use crate::error::{CapstanError, ErrorCode};

/// Error wrapper carrying the classified failure out of a step sequence
///
/// Providers bubble this through `anyhow`; the orchestrator downcasts it
/// back out to recover the [`Diagnostic`] for rendering.
#[derive(Debug, Clone)]
pub struct StepFailure {
    pub diagnostic: Diagnostic,
    pub step_name: String,
}

impl std::fmt::Display for StepFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "step '{}' failed: {}", self.step_name, self.diagnostic)
    }
}

impl std::error::Error for StepFailure {}

/// Progress handle passed to a step's work function
#[derive(Clone)]
pub struct StepProgress {
    sink: EventSink,
    index: usize,
}

impl StepProgress {
    /// Report how far along the step is, in [0, 1]
    pub fn report(&self, fraction_complete: f64) {
        self.sink.progress(self.index, fraction_complete);
    }

    /// Report progress together with a status message
    pub fn update(&self, fraction_complete: f64, message: impl Into<String>) {
        self.sink.emit_progress(ProgressEvent {
            step_index: self.index,
            fraction_complete: fraction_complete.clamp(0.0, 1.0),
            message: Some(message.into()),
        });
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// Ordered, fail-fast executor for a provider's declared steps
pub struct StepSequence {
    provider: String,
    steps: Vec<Step>,
    sink: EventSink,
    cursor: usize,
    failure: Option<StepFailure>,
}

impl StepSequence {
    pub fn new(provider: &str, specs: Vec<StepSpec>, sink: EventSink) -> Self {
        Self {
            provider: provider.to_string(),
            steps: specs.into_iter().map(Step::new).collect(),
            sink,
            cursor: 0,
            failure: None,
        }
    }

    /// Execute the next declared step
    ///
    /// `name` must match the declaration at the current position. The work
    /// function receives a [`StepProgress`] handle for fine-grained
    /// reporting during long operations (e.g. polling a server until it
    /// reaches a running state).
    pub async fn run<F, Fut>(&mut self, name: &str, work: F) -> anyhow::Result<()>
    where
        F: FnOnce(StepProgress) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        if let Some(failure) = &self.failure {
            // A failed sequence never executes further steps
            return Err(CapstanError::provision_with_code(
                ErrorCode::PROVISION_SEQUENCE_ABORTED,
                format!(
                    "sequence already failed at step '{}', refusing to run '{}'",
                    failure.step_name, name
                ),
                Some(self.provider.clone()),
            )
            .into());
        }

        let index = self.cursor;
        let declared = match self.steps.get(index) {
            Some(step) if step.spec.name == name => step.spec.clone(),
            other => {
                let declared_name = other.map(|s| s.spec.name.clone());
                tracing::error!(
                    provider = %self.provider,
                    executed = %name,
                    declared = ?declared_name,
                    index,
                    "provider executed a step it did not declare"
                );
                return Err(CapstanError::provision_with_code(
                    ErrorCode::PROVISION_CONTRACT_VIOLATION,
                    match declared_name {
                        Some(expected) => format!(
                            "step {} executed as '{}' but was declared as '{}'",
                            index, name, expected
                        ),
                        None => format!(
                            "step '{}' executed beyond the {} declared steps",
                            name,
                            self.steps.len()
                        ),
                    },
                    Some(self.provider.clone()),
                )
                .into());
            }
        };

        self.steps[index].start();
        self.cursor += 1;
        self.sink.log_info(format!("Starting: {}", declared.description));
        self.sink.progress(index, 0.0);

        let progress = StepProgress {
            sink: self.sink.clone(),
            index,
        };

        match work(progress).await {
            Ok(()) => {
                // A step may have already reported fraction 1.0; marking
                // complete twice is a no-op.
                self.steps[index].complete();
                self.sink.progress(index, 1.0);
                self.sink.log_success(format!("{} complete", declared.name));
                Ok(())
            }
            Err(err) => {
                self.steps[index].fail();
                let diagnostic = classify(&self.provider, &declared.name, Some(&err));
                self.sink.log_error(diagnostic.message.clone());
                if let Some(suggestion) = &diagnostic.suggestion {
                    self.sink.log_info(format!("Suggestion: {}", suggestion));
                }
                let failure = StepFailure {
                    diagnostic,
                    step_name: declared.name.clone(),
                };
                self.failure = Some(failure.clone());
                Err(failure.into())
            }
        }
    }

    /// Verify every declared step was executed
    ///
    /// Called by providers after their last step. A sequence that failed
    /// part-way is exempt: the abort left the remaining steps Pending by
    /// design.
    pub fn finish(self) -> anyhow::Result<()> {
        if self.failure.is_none() && self.cursor < self.steps.len() {
            let missing: Vec<_> = self.steps[self.cursor..]
                .iter()
                .map(|s| s.spec.name.clone())
                .collect();
            tracing::error!(
                provider = %self.provider,
                ?missing,
                "provider declared steps it never executed"
            );
            return Err(CapstanError::provision_with_code(
                ErrorCode::PROVISION_CONTRACT_VIOLATION,
                format!("declared steps never executed: {}", missing.join(", ")),
                Some(self.provider),
            )
            .into());
        }
        Ok(())
    }

    pub fn status(&self, index: usize) -> Option<StepStatus> {
        self.steps.get(index).map(|s| s.status)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}
