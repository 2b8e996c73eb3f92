//! Deployment orchestration
//!
//! Wires a provider's step execution (worker task) to the progress
//! renderer (calling task) across the channel boundary. The orchestrator
//! guarantees a strict causal flush: the completion signal reaches the
//! renderer only after every event the run emitted has been forwarded,
//! which the Queue-Close idiom gives for free: the worker drops its sink
//! when `execute` returns, the forwarders drain the closed channels to
//! exhaustion, and only then is `Done` sent.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use super::diagnose::{classify, Diagnostic};
use super::events::{Completion, EventSink, RenderEvent, RunResult};
use super::executor::StepFailure;
use super::provider::{CancelToken, Provider, RunContext};
use super::renderer::{ProgressRenderer, RendererOutcome};
use crate::config::Config;
use crate::error::{CapstanError, ErrorCode};

type InterruptFuture = BoxFuture<'static, ()>;

pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    config: Config,
    hidden_ui: bool,
    interrupt: Option<InterruptFuture>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn Provider>, config: Config) -> Self {
        Self {
            provider,
            config,
            hidden_ui: false,
            interrupt: None,
        }
    }

    /// Suppress terminal drawing (tests, JSON output mode)
    pub fn with_hidden_ui(mut self) -> Self {
        self.hidden_ui = true;
        self
    }

    /// Replace the default Ctrl-C interrupt trigger
    pub fn with_interrupt<F>(mut self, interrupt: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.interrupt = Some(Box::pin(interrupt));
        self
    }

    /// Run the full deployment and resolve its terminal outcome
    ///
    /// Returns the successful [`RunResult`], or an error distinguishing
    /// user cancellation ([`CapstanError::Interrupted`]) from execution
    /// failure from internal orchestration faults.
    pub async fn deploy(self) -> Result<RunResult, CapstanError> {
        let provider_name = self.provider.name().to_string();
        let steps = self.provider.declare_steps();
        tracing::info!(provider = %provider_name, steps = steps.len(), "starting deployment");

        let (sink, mut progress_rx, mut log_rx) = EventSink::channel();
        let (cancel_handle, cancel_token) = CancelToken::new();
        let (render_tx, render_rx) = mpsc::unbounded_channel();

        // Worker path: the provider executes its steps. Moving the sink in
        // closes both event channels the moment execute returns.
        let worker = {
            let provider = Arc::clone(&self.provider);
            let ctx = RunContext::new(self.config.clone(), cancel_token);
            tokio::spawn(async move {
                let result = provider.execute(&ctx, &sink).await;
                drop(sink);
                result
            })
        };

        // Forwarders: per-channel order is preserved; progress and log may
        // interleave arbitrarily, which the two-region UI tolerates.
        let progress_forwarder = {
            let tx = render_tx.clone();
            tokio::spawn(async move {
                while let Some(event) = progress_rx.recv().await {
                    if tx.send(RenderEvent::Progress(event)).is_err() {
                        break;
                    }
                }
            })
        };
        let log_forwarder = {
            let tx = render_tx.clone();
            tokio::spawn(async move {
                while let Some(event) = log_rx.recv().await {
                    if tx.send(RenderEvent::Log(event)).is_err() {
                        break;
                    }
                }
            })
        };

        // Driver: resolve the worker, wait for the flush, then signal done.
        let driver_provider = provider_name.clone();
        let driver = tokio::spawn(async move {
            let result = match worker.await {
                Ok(result) => result,
                Err(join_error) => Err(anyhow::anyhow!(
                    "provider execution panicked: {join_error}"
                )),
            };

            let _ = progress_forwarder.await;
            let _ = log_forwarder.await;

            let completion = match &result {
                Ok(()) => Completion::Success {
                    message: "Deployment complete".to_string(),
                },
                Err(err) => Completion::Failure {
                    diagnostic: diagnostic_for(&driver_provider, err),
                },
            };
            let _ = render_tx.send(RenderEvent::Done(completion));
            result
        });

        // UI path: the renderer owns the terminal until it exits.
        let renderer = if self.hidden_ui {
            ProgressRenderer::hidden(&steps)
        } else {
            ProgressRenderer::new(&steps)
        };
        let interrupt = self
            .interrupt
            .unwrap_or_else(|| Box::pin(async {
                let _ = tokio::signal::ctrl_c().await;
            }));
        let outcome = renderer.run(render_rx, interrupt).await;

        match outcome {
            RendererOutcome::Completed {
                completion,
                dashboard_url,
            } => {
                // The Done signal was sent, so the driver has resolved
                let result = driver
                    .await
                    .map_err(|e| CapstanError::other(format!("orchestration fault: {e}")))?;
                match completion {
                    Completion::Success { message } => {
                        tracing::info!(provider = %provider_name, "deployment succeeded");
                        Ok(RunResult {
                            success: true,
                            message,
                            dashboard_url,
                        })
                    }
                    Completion::Failure { diagnostic } => {
                        Err(provision_error(&provider_name, diagnostic, &result))
                    }
                }
            }
            RendererOutcome::Interrupted => {
                // The user quit the UI. Ask the worker to stop at its next
                // poll boundary, but do not wait for it: the outcome the
                // user saw is "interrupted", and that is what we report.
                cancel_handle.cancel();
                tracing::warn!(
                    provider = %provider_name,
                    "deployment interrupted; worker asked to cancel"
                );
                Err(CapstanError::Interrupted)
            }
        }
    }
}

/// Recover the step's Diagnostic from the worker error, or classify the
/// raw error when the failure happened outside any step
fn diagnostic_for(provider: &str, err: &anyhow::Error) -> Diagnostic {
    if let Some(failure) = err.downcast_ref::<StepFailure>() {
        failure.diagnostic.clone()
    } else {
        classify(provider, "deploy", Some(err))
    }
}

fn provision_error(
    provider: &str,
    diagnostic: Diagnostic,
    result: &anyhow::Result<()>,
) -> CapstanError {
    let code = if result
        .as_ref()
        .err()
        .and_then(|e| e.downcast_ref::<CapstanError>())
        .is_some_and(|e| e.code() == ErrorCode::PROVISION_CONTRACT_VIOLATION)
    {
        ErrorCode::PROVISION_CONTRACT_VIOLATION
    } else {
        ErrorCode::PROVISION_STEP_FAILED
    };

    // Callers recover the full Diagnostic by downcasting the error source
    let failure = StepFailure {
        step_name: diagnostic.operation.clone(),
        diagnostic: diagnostic.clone(),
    };
    CapstanError::provision_with_code(
        code,
        diagnostic.message,
        Some(provider.to_string()),
    )
    .with_step(failure.step_name.clone())
    .with_source(failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::events::StepSpec;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProvider {
        fail_at: Option<usize>,
        executed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "ssh"
        }

        fn declare_steps(&self) -> Vec<StepSpec> {
            vec![
                StepSpec::new("probe", "Probe the target"),
                StepSpec::new("install", "Install the platform"),
                StepSpec::new("start", "Start the platform"),
            ]
        }

        async fn execute(&self, _ctx: &RunContext, sink: &EventSink) -> anyhow::Result<()> {
            use crate::deploy::executor::StepSequence;
            let mut seq = StepSequence::new(self.name(), self.declare_steps(), sink.clone());
            let executed = Arc::clone(&self.executed);
            let fail_at = self.fail_at;

            for (index, name) in ["probe", "install", "start"].iter().enumerate() {
                let executed = Arc::clone(&executed);
                seq.run(name, move |_| async move {
                    executed.fetch_add(1, Ordering::SeqCst);
                    if fail_at == Some(index) {
                        anyhow::bail!("Permission denied, please try again.");
                    }
                    Ok(())
                })
                .await?;
            }
            sink.log_success("Dashboard available at https://10.0.0.5");
            seq.finish()
        }
    }

    #[tokio::test]
    async fn test_successful_run_extracts_dashboard_url() {
        let provider = Arc::new(ScriptedProvider {
            fail_at: None,
            executed: Arc::new(AtomicUsize::new(0)),
        });
        let result = Orchestrator::new(provider, Config::default())
            .with_hidden_ui()
            .with_interrupt(std::future::pending())
            .deploy()
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.dashboard_url.as_deref(), Some("https://10.0.0.5"));
    }

    #[tokio::test]
    async fn test_failed_step_aborts_and_reports_diagnostic() {
        let executed = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(ScriptedProvider {
            fail_at: Some(1),
            executed: Arc::clone(&executed),
        });
        let err = Orchestrator::new(provider, Config::default())
            .with_hidden_ui()
            .with_interrupt(std::future::pending())
            .deploy()
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::PROVISION_STEP_FAILED);
        assert!(err.user_message().contains("'install'"));
        // Step 3 never executed
        assert_eq!(executed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_interrupt_yields_distinct_outcome() {
        struct StallingProvider;

        #[async_trait]
        impl Provider for StallingProvider {
            fn name(&self) -> &str {
                "local"
            }

            fn declare_steps(&self) -> Vec<StepSpec> {
                vec![StepSpec::new("wait", "Wait forever")]
            }

            async fn execute(&self, ctx: &RunContext, _sink: &EventSink) -> anyhow::Result<()> {
                ctx.cancel.cancelled().await;
                anyhow::bail!("cancelled")
            }
        }

        let err = Orchestrator::new(Arc::new(StallingProvider), Config::default())
            .with_hidden_ui()
            .with_interrupt(async {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            })
            .deploy()
            .await
            .unwrap_err();

        assert!(err.is_interrupted());
        assert_eq!(err.exit_code(), 130);
    }
}
