//! Local Docker Compose backend
//!
//! Deploys the platform as a compose stack on the operator's own machine.
//! All docker interaction goes through the subprocess layer so the
//! provider is fully testable against a scripted runner.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::config::LocalConfig;
use crate::deploy::events::{EventSink, StepSpec};
use crate::deploy::executor::StepSequence;
use crate::deploy::provider::{Provider, RunContext};
use crate::subprocess::{ProcessCommand, ProcessCommandBuilder, SubprocessManager};

const DOCKER_TIMEOUT: Duration = Duration::from_secs(30);
const COMPOSE_UP_TIMEOUT: Duration = Duration::from_secs(600);

pub struct LocalComposeProvider {
    subprocess: SubprocessManager,
}

impl LocalComposeProvider {
    pub fn new(subprocess: SubprocessManager) -> Self {
        Self { subprocess }
    }

    fn compose_command(local: &LocalConfig, project: &str, args: &[&str]) -> ProcessCommand {
        let mut builder = ProcessCommandBuilder::new("docker")
            .arg("compose")
            .arg("-f")
            .arg(&local.compose_file.to_string_lossy())
            .arg("-p")
            .arg(project);
        for profile in &local.profiles {
            builder = builder.arg("--profile").arg(profile);
        }
        builder.args(args).timeout(COMPOSE_UP_TIMEOUT).build()
    }
}

/// Count (running, total) services in `docker compose ps --format json`
/// output, which is one JSON object per line
fn parse_compose_ps(stdout: &str) -> (usize, usize) {
    let mut running = 0;
    let mut total = 0;
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };
        total += 1;
        if value.get("State").and_then(|s| s.as_str()) == Some("running") {
            running += 1;
        }
    }
    (running, total)
}

#[async_trait]
impl Provider for LocalComposeProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn declare_steps(&self) -> Vec<StepSpec> {
        vec![
            StepSpec::new("verify-docker", "Checking the Docker daemon"),
            StepSpec::new("start-stack", "Starting the platform stack"),
            StepSpec::new("wait-ready", "Waiting for services to become healthy"),
        ]
    }

    async fn execute(&self, ctx: &RunContext, sink: &EventSink) -> anyhow::Result<()> {
        let runner = self.subprocess.runner();
        let runner = &runner;
        let local = &ctx.config.local;
        let platform = &ctx.config.platform;
        let project = platform.project_name.as_str();
        let mut seq = StepSequence::new(self.name(), self.declare_steps(), sink.clone());

        seq.run("verify-docker", |_| async move {
            let command = ProcessCommandBuilder::new("docker")
                .args(["info", "--format", "{{.ServerVersion}}"])
                .timeout(DOCKER_TIMEOUT)
                .build();
            let output = runner.run(command).await?;
            if !output.success() {
                anyhow::bail!("{}", output.error_text());
            }
            sink.log_debug(format!("docker server {}", output.stdout.trim()));
            Ok(())
        })
        .await?;

        seq.run("start-stack", |_| async move {
            let command = Self::compose_command(local, project, &["up", "-d"]);
            let mut stream = runner.run_streaming(command).await?;

            // Compose narrates container lifecycle on stderr; relay it so
            // the user sees pulls and container starts live
            let mut recent = Vec::new();
            while let Some(line) = stream.lines.recv().await {
                if recent.len() == 20 {
                    recent.remove(0);
                }
                recent.push(line.line.clone());
                sink.log_debug(line.line);
            }

            let status = stream.status.await?;
            if !status.success() {
                anyhow::bail!("{}", recent.join("\n"));
            }
            Ok(())
        })
        .await?;

        seq.run("wait-ready", |progress| async move {
            let deadline = Instant::now() + platform.poll_timeout;
            loop {
                if ctx.cancel.is_cancelled() {
                    anyhow::bail!("cancelled while waiting for the stack");
                }

                let command = Self::compose_command(local, project, &["ps", "--format", "json"]);
                let output = runner.run(command).await?;
                let (running, total) = parse_compose_ps(&output.stdout);

                if total > 0 {
                    progress.update(
                        running as f64 / total as f64,
                        format!("{running}/{total} services running"),
                    );
                    if running == total {
                        return Ok(());
                    }
                }

                if Instant::now() >= deadline {
                    anyhow::bail!(
                        "stack did not become healthy within {:?} ({running}/{total} services running)",
                        platform.poll_timeout
                    );
                }
                tokio::time::sleep(platform.poll_interval).await;
            }
        })
        .await?;

        sink.log_success(format!(
            "Dashboard available at http://localhost:{}",
            platform.dashboard_port
        ));
        seq.finish()
    }
}
