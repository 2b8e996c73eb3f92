//! End-to-end orchestration scenarios against scripted providers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use capstan::config::Config;
use capstan::deploy::executor::{StepFailure, StepSequence};
use capstan::deploy::{
    EventSink, Orchestrator, Provider, RunContext, StepSpec,
};
use capstan::error::{CapstanError, ErrorCode};

/// Three-step provider whose middle step fails with a cloud-shaped
/// permission error; the third step counts executions
struct PermissionDeniedProvider {
    step3_runs: Arc<AtomicUsize>,
}

#[async_trait]
impl Provider for PermissionDeniedProvider {
    fn name(&self) -> &str {
        "digitalocean"
    }

    fn declare_steps(&self) -> Vec<StepSpec> {
        vec![
            StepSpec::new("create-network", "Create the private network"),
            StepSpec::new("create-server", "Create the server"),
            StepSpec::new("install-platform", "Install the platform"),
        ]
    }

    async fn execute(&self, _ctx: &RunContext, sink: &EventSink) -> anyhow::Result<()> {
        let mut seq = StepSequence::new(self.name(), self.declare_steps(), sink.clone());
        seq.run("create-network", |_| async { Ok(()) }).await?;
        seq.run("create-server", |_| async {
            anyhow::bail!("POST https://api.digitalocean.com/v2/droplets: 401 Unable to authenticate you")
        })
        .await?;
        let counter = Arc::clone(&self.step3_runs);
        seq.run("install-platform", move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await?;
        seq.finish()
    }
}

#[tokio::test]
async fn test_matched_failure_reports_code_and_suggestion() {
    let step3_runs = Arc::new(AtomicUsize::new(0));
    let provider = Arc::new(PermissionDeniedProvider {
        step3_runs: Arc::clone(&step3_runs),
    });

    let err = Orchestrator::new(provider, Config::default())
        .with_hidden_ui()
        .with_interrupt(std::future::pending())
        .deploy()
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::PROVISION_STEP_FAILED);
    assert!(err.user_message().contains("'create-server'"));

    let failure = std::error::Error::source(&err)
        .and_then(|s| s.downcast_ref::<StepFailure>())
        .expect("diagnostic recoverable from the error source");
    assert_eq!(failure.diagnostic.code, "unauthorized");
    assert!(!failure.diagnostic.suggestion.as_deref().unwrap().is_empty());

    // Step 3 never executed
    assert_eq!(step3_runs.load(Ordering::SeqCst), 0);
}

/// Two-step provider whose trailing log line carries the dashboard address
struct UrlProvider;

#[async_trait]
impl Provider for UrlProvider {
    fn name(&self) -> &str {
        "ssh"
    }

    fn declare_steps(&self) -> Vec<StepSpec> {
        vec![
            StepSpec::new("install", "Install the platform"),
            StepSpec::new("start", "Start the platform"),
        ]
    }

    async fn execute(&self, _ctx: &RunContext, sink: &EventSink) -> anyhow::Result<()> {
        let mut seq = StepSequence::new(self.name(), self.declare_steps(), sink.clone());
        seq.run("install", |_| async { Ok(()) }).await?;
        seq.run("start", |_| async { Ok(()) }).await?;
        sink.log_success("Platform ready at https://10.0.0.5");
        seq.finish()
    }
}

#[tokio::test]
async fn test_success_extracts_dashboard_url_from_trailing_logs() {
    let result = Orchestrator::new(Arc::new(UrlProvider), Config::default())
        .with_hidden_ui()
        .with_interrupt(std::future::pending())
        .deploy()
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.dashboard_url.as_deref(), Some("https://10.0.0.5"));
}

/// Provider that blocks until cancelled, as a long network call would
struct BlockingProvider;

#[async_trait]
impl Provider for BlockingProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn declare_steps(&self) -> Vec<StepSpec> {
        vec![StepSpec::new("wait", "Wait for the backend")]
    }

    async fn execute(&self, ctx: &RunContext, sink: &EventSink) -> anyhow::Result<()> {
        let mut seq = StepSequence::new(self.name(), self.declare_steps(), sink.clone());
        let cancel = ctx.cancel.clone();
        seq.run("wait", move |_| async move {
            cancel.cancelled().await;
            anyhow::bail!("cancelled")
        })
        .await?;
        seq.finish()
    }
}

#[tokio::test]
async fn test_interrupt_mid_run_is_not_a_failure() {
    let err = Orchestrator::new(Arc::new(BlockingProvider), Config::default())
        .with_hidden_ui()
        .with_interrupt(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
        })
        .deploy()
        .await
        .unwrap_err();

    assert!(err.is_interrupted());
    assert_eq!(err.exit_code(), 130);
    // No diagnostic and no failure language for a user interrupt
    assert!(std::error::Error::source(&err).is_none());
    assert!(!err.user_message().to_lowercase().contains("fail"));
}

/// Provider that executes a step under a name it never declared
struct LyingProvider;

#[async_trait]
impl Provider for LyingProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn declare_steps(&self) -> Vec<StepSpec> {
        vec![StepSpec::new("declared", "The declared step")]
    }

    async fn execute(&self, _ctx: &RunContext, sink: &EventSink) -> anyhow::Result<()> {
        let mut seq = StepSequence::new(self.name(), self.declare_steps(), sink.clone());
        seq.run("undeclared", |_| async { Ok(()) }).await?;
        seq.finish()
    }
}

#[tokio::test]
async fn test_step_contract_violation_is_fatal() {
    let err = Orchestrator::new(Arc::new(LyingProvider), Config::default())
        .with_hidden_ui()
        .with_interrupt(std::future::pending())
        .deploy()
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::PROVISION_CONTRACT_VIOLATION);
}

/// Log events keep their emission order across the channel boundary
#[tokio::test]
async fn test_log_order_preserved_end_to_end() {
    let (sink, _progress_rx, mut log_rx) = EventSink::channel();

    let worker = tokio::spawn(async move {
        for i in 0..100 {
            sink.log_info(format!("event {i}"));
        }
        drop(sink);
    });

    let mut received = Vec::new();
    while let Some(event) = log_rx.recv().await {
        received.push(event.message);
    }
    worker.await.unwrap();

    let expected: Vec<String> = (0..100).map(|i| format!("event {i}")).collect();
    assert_eq!(received, expected);
}

/// The full-progress edge case: a step reporting 1.0 before returning is
/// not double-completed and the run still succeeds
struct EagerProgressProvider;

#[async_trait]
impl Provider for EagerProgressProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn declare_steps(&self) -> Vec<StepSpec> {
        vec![StepSpec::new("copy", "Copy the bundle")]
    }

    async fn execute(&self, _ctx: &RunContext, sink: &EventSink) -> anyhow::Result<()> {
        let mut seq = StepSequence::new(self.name(), self.declare_steps(), sink.clone());
        seq.run("copy", |progress| async move {
            progress.report(0.5);
            progress.report(1.0);
            Ok(())
        })
        .await?;
        sink.log_success("done, see http://192.168.1.10:3000");
        seq.finish()
    }
}

#[tokio::test]
async fn test_eager_full_progress_still_succeeds() {
    let result = Orchestrator::new(Arc::new(EagerProgressProvider), Config::default())
        .with_hidden_ui()
        .with_interrupt(std::future::pending())
        .deploy()
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(
        result.dashboard_url.as_deref(),
        Some("http://192.168.1.10:3000")
    );
}

/// A CapstanError produced anywhere still classifies: errors raised before
/// the first step (e.g. missing configuration) surface cleanly
struct PrecheckProvider;

#[async_trait]
impl Provider for PrecheckProvider {
    fn name(&self) -> &str {
        "ssh"
    }

    fn declare_steps(&self) -> Vec<StepSpec> {
        vec![StepSpec::new("never", "Never runs")]
    }

    async fn execute(&self, _ctx: &RunContext, _sink: &EventSink) -> anyhow::Result<()> {
        Err(CapstanError::config("no ssh host configured").into())
    }
}

#[tokio::test]
async fn test_failure_outside_any_step_still_yields_diagnostic() {
    let err = Orchestrator::new(Arc::new(PrecheckProvider), Config::default())
        .with_hidden_ui()
        .with_interrupt(std::future::pending())
        .deploy()
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::PROVISION_STEP_FAILED);
    let failure = std::error::Error::source(&err)
        .and_then(|s| s.downcast_ref::<StepFailure>())
        .unwrap();
    assert!(!failure.diagnostic.message.is_empty());
}
