//! Backend provider implementations and registry
//!
//! The cloud VM backend is intentionally absent here: its step bodies are
//! single API request/response calls owned by the operator's tooling of
//! choice, and anything satisfying the [`Provider`] contract plugs in
//! unmodified. The `digitalocean` classifier table in
//! [`crate::deploy::diagnose`] is the shared vocabulary such a backend
//! reports through.

pub mod local;
pub mod ssh;

pub use local::LocalComposeProvider;
pub use ssh::SshProvider;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::deploy::provider::Provider;
use crate::deploy::teardown::ResourcePlan;
use crate::error::{CapstanError, ErrorCode};
use crate::subprocess::{ProcessCommandBuilder, SubprocessManager};

/// Provider names accepted by the CLI
pub const AVAILABLE: &[&str] = &["local", "ssh"];

/// Look up a provider implementation by name
pub fn create(
    name: &str,
    subprocess: SubprocessManager,
) -> Result<Arc<dyn Provider>, CapstanError> {
    match name {
        "local" => Ok(Arc::new(LocalComposeProvider::new(subprocess))),
        "ssh" => Ok(Arc::new(SshProvider::new(subprocess))),
        other => Err(CapstanError::config_with_code(
            ErrorCode::CONFIG_UNKNOWN_PROVIDER,
            format!(
                "unknown provider '{}', expected one of: {}",
                other,
                AVAILABLE.join(", ")
            ),
        )),
    }
}

const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(120);

/// The ordered deletion plan for `capstan destroy` on a backend
///
/// Order matters: children before parents, so the parent deletion has a
/// chance of finding an empty resource by the time its retries run out.
pub fn destroy_plans(
    provider: &str,
    config: &Config,
    subprocess: &SubprocessManager,
) -> Result<Vec<ResourcePlan>, CapstanError> {
    match provider {
        "local" => Ok(local_destroy_plans(config, subprocess)),
        "ssh" => Ok(ssh_destroy_plans(config, subprocess)),
        other => Err(CapstanError::config_with_code(
            ErrorCode::CONFIG_UNKNOWN_PROVIDER,
            format!("no teardown plan for provider '{other}'"),
        )),
    }
}

/// `capstan reset` additionally removes the parent grouping (the compose
/// project's data volumes locally, the install directory over ssh)
pub fn reset_plans(
    provider: &str,
    config: &Config,
    subprocess: &SubprocessManager,
) -> Result<Vec<ResourcePlan>, CapstanError> {
    let mut plans = destroy_plans(provider, config, subprocess)?;
    match provider {
        "local" => {
            plans.push(compose_plan(
                "data volumes",
                config,
                subprocess,
                &["down", "--volumes", "--remove-orphans"],
            ));
        }
        "ssh" => {
            plans.push(ssh_plan(
                "install directory",
                config,
                subprocess,
                &format!("rm -rf {}", ssh::REMOTE_DIR),
            ));
        }
        _ => unreachable!("destroy_plans already validated the name"),
    }
    Ok(plans)
}

fn local_destroy_plans(config: &Config, subprocess: &SubprocessManager) -> Vec<ResourcePlan> {
    vec![compose_plan(
        "application stack",
        config,
        subprocess,
        &["down", "--remove-orphans"],
    )]
}

fn ssh_destroy_plans(config: &Config, subprocess: &SubprocessManager) -> Vec<ResourcePlan> {
    vec![ssh_plan(
        "platform service",
        config,
        subprocess,
        &format!("cd {} && docker compose down --remove-orphans", ssh::REMOTE_DIR),
    )]
}

fn compose_plan(
    kind: &str,
    config: &Config,
    subprocess: &SubprocessManager,
    args: &[&str],
) -> ResourcePlan {
    let runner = subprocess.runner();
    let compose_file = config.local.compose_file.to_string_lossy().into_owned();
    let project = config.platform.project_name.clone();
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();

    ResourcePlan::new(kind, move || {
        let runner = Arc::clone(&runner);
        let compose_file = compose_file.clone();
        let project = project.clone();
        let args = args.clone();
        async move {
            let command = ProcessCommandBuilder::new("docker")
                .arg("compose")
                .arg("-f")
                .arg(&compose_file)
                .arg("-p")
                .arg(&project)
                .args(&args)
                .timeout(TEARDOWN_TIMEOUT)
                .build();
            let output = runner.run(command).await?;
            if !output.success() {
                anyhow::bail!("{}", output.error_text());
            }
            Ok(())
        }
    })
}

fn ssh_plan(
    kind: &str,
    config: &Config,
    subprocess: &SubprocessManager,
    remote: &str,
) -> ResourcePlan {
    let runner = subprocess.runner();
    let ssh = config.ssh.clone();
    let remote = remote.to_string();

    ResourcePlan::new(kind, move || {
        let runner = Arc::clone(&runner);
        let ssh = ssh.clone();
        let remote = remote.clone();
        async move {
            let command = SshProvider::ssh_command(&ssh, &remote, TEARDOWN_TIMEOUT);
            let output = runner.run(command).await?;
            if !output.success() {
                anyhow::bail!("{}", output.error_text());
            }
            Ok(())
        }
    })
}
