//! Bare-metal SSH backend
//!
//! Provisions the platform onto an already-running host over ssh/scp: no
//! agent is installed on the target, every operation is a remote shell
//! command. The install step is idempotent, so re-running a deployment
//! against a half-configured host converges instead of failing.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::config::SshConfig;
use crate::deploy::events::{EventSink, StepSpec};
use crate::deploy::executor::StepSequence;
use crate::deploy::provider::{Provider, RunContext};
use crate::subprocess::{ProcessCommand, ProcessCommandBuilder, SubprocessManager};

const SSH_TIMEOUT: Duration = Duration::from_secs(30);
const INSTALL_TIMEOUT: Duration = Duration::from_secs(900);

/// Remote directory holding the platform bundle
pub(crate) const REMOTE_DIR: &str = "capstan";

pub struct SshProvider {
    subprocess: SubprocessManager,
}

impl SshProvider {
    pub fn new(subprocess: SubprocessManager) -> Self {
        Self { subprocess }
    }

    pub(crate) fn ssh_command(ssh: &SshConfig, remote: &str, timeout: Duration) -> ProcessCommand {
        let mut builder = ProcessCommandBuilder::new("ssh")
            .arg("-p")
            .arg(&ssh.port.to_string())
            .args(["-o", "BatchMode=yes", "-o", "StrictHostKeyChecking=accept-new"]);
        if let Some(identity) = &ssh.identity_file {
            builder = builder.arg("-i").arg(&identity.to_string_lossy());
        }
        builder
            .arg(&format!("{}@{}", ssh.user, ssh.host))
            .arg(remote)
            .timeout(timeout)
            .build()
    }

    fn scp_command(ssh: &SshConfig, local_path: &str, remote_path: &str) -> ProcessCommand {
        let mut builder = ProcessCommandBuilder::new("scp")
            .arg("-P")
            .arg(&ssh.port.to_string())
            .args(["-o", "BatchMode=yes"]);
        if let Some(identity) = &ssh.identity_file {
            builder = builder.arg("-i").arg(&identity.to_string_lossy());
        }
        builder
            .arg(local_path)
            .arg(&format!("{}@{}:{}", ssh.user, ssh.host, remote_path))
            .timeout(SSH_TIMEOUT)
            .build()
    }
}

#[async_trait]
impl Provider for SshProvider {
    fn name(&self) -> &str {
        "ssh"
    }

    fn declare_steps(&self) -> Vec<StepSpec> {
        vec![
            StepSpec::new("probe-target", "Checking SSH connectivity"),
            StepSpec::new("install-engine", "Installing the container engine"),
            StepSpec::new("upload-bundle", "Uploading the platform bundle"),
            StepSpec::new("start-platform", "Starting the platform"),
            StepSpec::new("wait-ready", "Waiting for the dashboard to respond"),
        ]
    }

    async fn execute(&self, ctx: &RunContext, sink: &EventSink) -> anyhow::Result<()> {
        let runner = self.subprocess.runner();
        let runner = &runner;
        let ssh = &ctx.config.ssh;
        let platform = &ctx.config.platform;
        let local = &ctx.config.local;
        let mut seq = StepSequence::new(self.name(), self.declare_steps(), sink.clone());

        if ssh.host.is_empty() {
            anyhow::bail!("no ssh host configured; set ssh.host in capstan.toml");
        }

        seq.run("probe-target", |_| async move {
            let command = Self::ssh_command(ssh, "uname -a", SSH_TIMEOUT);
            let output = runner.run(command).await?;
            if !output.success() {
                anyhow::bail!("{}", output.error_text());
            }
            sink.log_debug(format!("target: {}", output.stdout.trim()));
            Ok(())
        })
        .await?;

        seq.run("install-engine", |progress| async move {
            // `sh -c` guard keeps this idempotent on hosts that already
            // have docker
            let install = "command -v docker >/dev/null 2>&1 || curl -fsSL https://get.docker.com | sh";
            let command = Self::ssh_command(ssh, install, INSTALL_TIMEOUT);
            let mut stream = runner.run_streaming(command).await?;

            let mut recent = Vec::new();
            let mut lines_seen = 0u32;
            while let Some(line) = stream.lines.recv().await {
                if recent.len() == 20 {
                    recent.remove(0);
                }
                recent.push(line.line.clone());
                sink.log_debug(line.line);
                // The installer has no progress output; approximate from
                // line count so the bar is not frozen for minutes
                lines_seen += 1;
                progress.report((f64::from(lines_seen) / 120.0).min(0.95));
            }

            let status = stream.status.await?;
            if !status.success() {
                anyhow::bail!("{}", recent.join("\n"));
            }
            Ok(())
        })
        .await?;

        seq.run("upload-bundle", |_| async move {
            let mkdir = shell_words::join(["mkdir", "-p", REMOTE_DIR]);
            let output = runner.run(Self::ssh_command(ssh, &mkdir, SSH_TIMEOUT)).await?;
            if !output.success() {
                anyhow::bail!("{}", output.error_text());
            }

            let compose_file = local.compose_file.to_string_lossy();
            let remote_path = format!("{REMOTE_DIR}/docker-compose.yml");
            let output = runner
                .run(Self::scp_command(ssh, &compose_file, &remote_path))
                .await?;
            if !output.success() {
                anyhow::bail!("{}", output.error_text());
            }
            Ok(())
        })
        .await?;

        seq.run("start-platform", |_| async move {
            let up = format!(
                "cd {REMOTE_DIR} && docker compose -p {} up -d",
                shell_words::quote(&platform.project_name)
            );
            let command = Self::ssh_command(ssh, &up, INSTALL_TIMEOUT);
            let mut stream = runner.run_streaming(command).await?;

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
            let started = Instant::now();
            let health = format!(
                "curl -fsS -o /dev/null http://localhost:{}/",
                platform.dashboard_port
            );
            loop {
                if ctx.cancel.is_cancelled() {
                    anyhow::bail!("cancelled while waiting for the dashboard");
                }

                let output = runner
                    .run(Self::ssh_command(ssh, &health, SSH_TIMEOUT))
                    .await?;
                if output.success() {
                    return Ok(());
                }

                if Instant::now() >= deadline {
                    anyhow::bail!(
                        "dashboard did not respond within {:?}",
                        platform.poll_timeout
                    );
                }
                progress.report(
                    (started.elapsed().as_secs_f64() / platform.poll_timeout.as_secs_f64())
                        .min(0.95),
                );
                tokio::time::sleep(platform.poll_interval).await;
            }
        })
        .await?;

        sink.log_success(format!(
            "Dashboard available at http://{}:{}",
            ssh.host, platform.dashboard_port
        ));
        seq.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::deploy::provider::CancelToken;

    fn context() -> RunContext {
        let (_handle, token) = CancelToken::new();
        let mut config = Config::default();
        config.ssh.host = "203.0.113.7".to_string();
        config.platform.poll_interval = Duration::from_millis(1);
        config.platform.poll_timeout = Duration::from_millis(50);
        RunContext::new(config, token)
    }

    #[test]
    fn test_ssh_command_shape() {
        let mut ssh = SshConfig::default();
        ssh.host = "203.0.113.7".to_string();
        ssh.port = 2222;
        ssh.identity_file = Some("/home/op/.ssh/id_ed25519".into());

        let command = SshProvider::ssh_command(&ssh, "uname -a", SSH_TIMEOUT);
        assert_eq!(command.program, "ssh");
        assert!(command.args.contains(&"2222".to_string()));
        assert!(command.args.contains(&"-i".to_string()));
        assert!(command.args.contains(&"root@203.0.113.7".to_string()));
        assert_eq!(command.args.last().unwrap(), "uname -a");
    }

    #[tokio::test]
    async fn test_deploy_happy_path() {
        let (subprocess, mut mock) = SubprocessManager::mock();
        mock.expect_command("ssh").returns_stdout("ok").finish();
        mock.expect_command("scp").finish();

        let provider = SshProvider::new(subprocess);
        let (sink, _progress_rx, mut log_rx) = EventSink::channel();
        provider.execute(&context(), &sink).await.unwrap();
        drop(sink);

        let mut saw_url = false;
        while let Some(event) = log_rx.recv().await {
            if event.message.contains("http://203.0.113.7:3000") {
                saw_url = true;
            }
        }
        assert!(saw_url);
    }

    #[tokio::test]
    async fn test_probe_failure_classified_as_unreachable() {
        let (subprocess, mut mock) = SubprocessManager::mock();
        mock.expect_command("ssh")
            .returns_stderr("ssh: connect to host 203.0.113.7 port 22: Connection refused")
            .returns_exit_code(255)
            .finish();

        let provider = SshProvider::new(subprocess);
        let (sink, _progress_rx, _log_rx) = EventSink::channel();
        let err = provider.execute(&context(), &sink).await.unwrap_err();

        let failure = err
            .downcast_ref::<crate::deploy::executor::StepFailure>()
            .unwrap();
        assert_eq!(failure.step_name, "probe-target");
        assert_eq!(failure.diagnostic.code, "unreachable");
    }

    #[tokio::test]
    async fn test_missing_host_fails_before_any_step() {
        let (subprocess, _mock) = SubprocessManager::mock();
        let provider = SshProvider::new(subprocess);
        let (sink, _progress_rx, _log_rx) = EventSink::channel();

        let (_handle, token) = CancelToken::new();
        let ctx = RunContext::new(Config::default(), token);
        let err = provider.execute(&ctx, &sink).await.unwrap_err();
        assert!(err.to_string().contains("no ssh host configured"));
    }
}
