use std::fmt::Display;
use thiserror::Error;

pub mod codes;

pub use codes::{describe_error_code, ErrorCode};

/// The unified error type for the entire Capstan application
#[derive(Error, Debug)]
pub enum CapstanError {
    #[error("[E{code:04}] Configuration error: {message}")]
    Config {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Provisioning error: {message}")]
    Provision {
        code: u16,
        message: String,
        provider: Option<String>,
        step: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Execution error: {message}")]
    Execution {
        code: u16,
        message: String,
        command: Option<String>,
        exit_code: Option<i32>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Teardown error: {message}")]
    Teardown {
        code: u16,
        message: String,
        resource: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Validation error: {message}")]
    Validation {
        code: u16,
        message: String,
        field: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// User pressed the interrupt key mid-run. Carries no diagnostic and
    /// must never be rendered with failure language.
    #[error("deployment interrupted by user")]
    Interrupted,

    #[error("[E{code:04}] {message}")]
    Other {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl CapstanError {
    /// Create a configuration error with default code
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            code: ErrorCode::CONFIG_GENERIC,
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with specific code
    pub fn config_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Config {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create a provisioning error with default code
    pub fn provision(message: impl Into<String>) -> Self {
        Self::Provision {
            code: ErrorCode::PROVISION_GENERIC,
            message: message.into(),
            provider: None,
            step: None,
            source: None,
        }
    }

    /// Create a provisioning error with specific code and provider
    pub fn provision_with_code(
        code: u16,
        message: impl Into<String>,
        provider: Option<String>,
    ) -> Self {
        Self::Provision {
            code,
            message: message.into(),
            provider,
            step: None,
            source: None,
        }
    }

    /// Create an execution error with default code
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            code: ErrorCode::EXEC_GENERIC,
            message: message.into(),
            command: None,
            exit_code: None,
            source: None,
        }
    }

    /// Create an execution error with specific code
    pub fn execution_with_code(
        code: u16,
        message: impl Into<String>,
        command: Option<String>,
    ) -> Self {
        Self::Execution {
            code,
            message: message.into(),
            command,
            exit_code: None,
            source: None,
        }
    }

    /// Create a teardown error with default code
    pub fn teardown(message: impl Into<String>) -> Self {
        Self::Teardown {
            code: ErrorCode::TEARDOWN_GENERIC,
            message: message.into(),
            resource: None,
            source: None,
        }
    }

    /// Create a teardown error with specific code and resource kind
    pub fn teardown_with_code(
        code: u16,
        message: impl Into<String>,
        resource: Option<String>,
    ) -> Self {
        Self::Teardown {
            code,
            message: message.into(),
            resource,
            source: None,
        }
    }

    /// Create a validation error with default code
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            code: ErrorCode::VALIDATION_GENERIC,
            message: message.into(),
            field: None,
            source: None,
        }
    }

    /// Create a generic other error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            code: ErrorCode::OTHER_GENERIC,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error to this error
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        match &mut self {
            Self::Config { source: src, .. }
            | Self::Provision { source: src, .. }
            | Self::Execution { source: src, .. }
            | Self::Teardown { source: src, .. }
            | Self::Validation { source: src, .. }
            | Self::Other { source: src, .. } => {
                *src = Some(source.into());
            }
            Self::Interrupted => {}
        }
        self
    }

    /// Add context to the error message
    pub fn with_context(mut self, context: impl Display) -> Self {
        match &mut self {
            Self::Config { message, .. }
            | Self::Provision { message, .. }
            | Self::Execution { message, .. }
            | Self::Teardown { message, .. }
            | Self::Validation { message, .. }
            | Self::Other { message, .. } => {
                *message = format!("{}: {}", message, context);
            }
            Self::Interrupted => {}
        }
        self
    }

    /// Set the failing step on a provisioning error
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        if let Self::Provision {
            step: ref mut s, ..
        } = self
        {
            *s = Some(step.into());
        }
        self
    }

    /// Set the exit code for an execution error
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        if let Self::Execution {
            exit_code: ref mut ec,
            ..
        } = self
        {
            *ec = Some(exit_code);
        }
        self
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 2,
            Self::Provision { .. } => 3,
            Self::Execution { .. } => 4,
            Self::Teardown { .. } => 5,
            Self::Validation { .. } => 6,
            Self::Interrupted => 130,
            Self::Other { .. } => 1,
        }
    }

    /// Get the error code
    pub fn code(&self) -> u16 {
        match self {
            Self::Config { code, .. }
            | Self::Provision { code, .. }
            | Self::Execution { code, .. }
            | Self::Teardown { code, .. }
            | Self::Validation { code, .. }
            | Self::Other { code, .. } => *code,
            Self::Interrupted => ErrorCode::PROVISION_CANCELLED,
        }
    }

    /// True when the run ended because the user interrupted it
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Config { message, .. } => format!("Configuration problem: {}", message),
            Self::Provision {
                message,
                provider,
                step,
                ..
            } => {
                let mut msg = String::from("Deployment failed");
                if let Some(p) = provider {
                    msg.push_str(&format!(" on '{}'", p));
                }
                if let Some(s) = step {
                    msg.push_str(&format!(" at step '{}'", s));
                }
                format!("{}: {}", msg, message)
            }
            Self::Execution {
                message, command, ..
            } => {
                if let Some(cmd) = command {
                    format!("Command '{}' failed: {}", cmd, message)
                } else {
                    format!("Execution error: {}", message)
                }
            }
            Self::Teardown {
                message, resource, ..
            } => {
                if let Some(r) = resource {
                    format!("Teardown of {} failed: {}", r, message)
                } else {
                    format!("Teardown error: {}", message)
                }
            }
            Self::Validation { message, field, .. } => {
                if let Some(f) = field {
                    format!("Validation error for '{}': {}", f, message)
                } else {
                    format!("Validation error: {}", message)
                }
            }
            Self::Interrupted => "Deployment interrupted".to_string(),
            Self::Other { message, .. } => message.clone(),
        }
    }
}

/// Type alias for Results using CapstanError
pub type Result<T> = std::result::Result<T, CapstanError>;

/// Type alias for application Results (using anyhow for flexibility)
pub type AppResult<T> = anyhow::Result<T>;

// Conversion from common error types

impl From<std::io::Error> for CapstanError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let (code, message) = match err.kind() {
            ErrorKind::NotFound => (ErrorCode::EXEC_COMMAND_NOT_FOUND, "File or command not found"),
            ErrorKind::PermissionDenied => (ErrorCode::EXEC_SPAWN_FAILED, "Permission denied"),
            ErrorKind::TimedOut => (ErrorCode::EXEC_TIMEOUT, "Operation timed out"),
            ErrorKind::Interrupted => (ErrorCode::EXEC_INTERRUPTED, "Operation interrupted"),
            _ => (ErrorCode::EXEC_GENERIC, "IO operation failed"),
        };

        CapstanError::execution_with_code(code, message, None).with_source(err)
    }
}

impl From<toml::de::Error> for CapstanError {
    fn from(err: toml::de::Error) -> Self {
        CapstanError::config_with_code(ErrorCode::CONFIG_INVALID_TOML, "Invalid TOML syntax")
            .with_source(err)
    }
}

impl From<serde_json::Error> for CapstanError {
    fn from(err: serde_json::Error) -> Self {
        CapstanError::config_with_code(ErrorCode::CONFIG_INVALID_JSON, "Invalid JSON syntax")
            .with_source(err)
    }
}
