//! Configuration for capstan deployments
//!
//! Settings are persisted as TOML in the platform config directory and can
//! be overridden per-invocation through `CAPSTAN_*` environment variables.
//! The loaded [`Config`] value is threaded through constructors explicitly;
//! nothing in this crate reads configuration through a global.

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the capstan configuration directory
pub fn config_dir() -> Result<PathBuf> {
    ProjectDirs::from("com", "capstan", "capstan")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| anyhow!("Could not determine home directory"))
}

/// Default path of the capstan settings file
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("capstan.toml"))
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub digitalocean: CloudConfig,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub local: LocalConfig,
}

/// Settings for the platform being deployed, independent of backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Name used for created resources (droplets, compose projects, ...)
    pub project_name: String,
    /// Port the platform dashboard listens on once installed
    pub dashboard_port: u16,
    /// How long provisioning steps may poll before reporting failure
    #[serde(with = "humantime_serde")]
    pub poll_timeout: Duration,
    /// Delay between readiness polls
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            project_name: "capstan".to_string(),
            dashboard_port: 3000,
            poll_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Cloud VM backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    pub region: String,
    pub size: String,
    pub image: String,
    /// API token is read from the environment, never persisted
    #[serde(skip)]
    pub api_token: Option<String>,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            region: "nyc3".to_string(),
            size: "s-2vcpu-4gb".to_string(),
            image: "ubuntu-24-04-x64".to_string(),
            api_token: None,
        }
    }
}

impl CloudConfig {
    pub fn has_credentials(&self) -> bool {
        self.api_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Bare-metal SSH target settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub identity_file: Option<PathBuf>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            user: "root".to_string(),
            identity_file: None,
        }
    }
}

/// Local Docker Compose backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    pub compose_file: PathBuf,
    /// Extra `--profile` flags passed to compose
    #[serde(default)]
    pub profiles: Vec<String>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            compose_file: PathBuf::from("docker-compose.yml"),
            profiles: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to
    /// defaults when no file exists yet
    pub fn load() -> Result<Self> {
        let path = default_config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config at {}", path.display()))?
        } else {
            Self::default()
        };
        config.merge_env_vars();
        Ok(config)
    }

    /// Persist configuration to the default location
    pub fn save(&self) -> Result<()> {
        let path = default_config_path()?;
        self.save_to(&path)
    }

    /// Persist configuration to an explicit path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }

    /// Apply `CAPSTAN_*` environment overrides on top of file values
    pub fn merge_env_vars(&mut self) {
        if let Ok(token) = std::env::var("CAPSTAN_DO_TOKEN") {
            self.digitalocean.api_token = Some(token);
        } else if let Ok(token) = std::env::var("DIGITALOCEAN_TOKEN") {
            self.digitalocean.api_token = Some(token);
        }

        if let Ok(region) = std::env::var("CAPSTAN_DO_REGION") {
            self.digitalocean.region = region;
        }

        if let Ok(host) = std::env::var("CAPSTAN_SSH_HOST") {
            self.ssh.host = host;
        }

        if let Ok(user) = std::env::var("CAPSTAN_SSH_USER") {
            self.ssh.user = user;
        }

        if let Ok(port) = std::env::var("CAPSTAN_SSH_PORT") {
            if let Ok(value) = port.parse::<u16>() {
                self.ssh.port = value;
            }
        }

        if let Ok(name) = std::env::var("CAPSTAN_PROJECT_NAME") {
            self.platform.project_name = name;
        }
    }
}
