//! Custom error types for repairkit.
//!
//! Only "hard" failures are errors. Expected agent mistakes (a missing file,
//! a rejected lint, an empty undo history) are reported as plain messages by
//! the editor so the calling agent can reason about them directly.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for repairkit operations
#[derive(Error, Debug)]
pub enum RepairError {
    // =========================================================================
    // Sandbox Errors
    // =========================================================================
    /// A command exited non-zero (or timed out) without `ignore_errors`
    #[error("Command `{command}` failed with exit code {exit_code}:\n\n{output}")]
    CommandFailed {
        command: String,
        output: String,
        exit_code: i32,
    },

    /// The execution context could not be created or bound
    #[error("Sandbox setup failed: {message}")]
    SandboxSetup { message: String },

    /// Missing required tool on the host
    #[error("Missing required tool: {tool}")]
    MissingTool { tool: String },

    // =========================================================================
    // Caller Errors
    // =========================================================================
    /// Structurally invalid tool arguments
    #[error("{message}")]
    Validation { message: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML error wrapper
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RepairError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a command failure
    pub fn command_failed(
        command: impl Into<String>,
        output: impl Into<String>,
        exit_code: i32,
    ) -> Self {
        Self::CommandFailed {
            command: command.into(),
            output: output.into(),
            exit_code,
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a sandbox setup error
    pub fn sandbox_setup(message: impl Into<String>) -> Self {
        Self::SandboxSetup {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error is recoverable within a session
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::CommandFailed { .. } | Self::Validation { .. })
    }

    /// Check if this error is fatal (the session cannot continue)
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SandboxSetup { .. } | Self::MissingTool { .. })
    }

    /// Check if this error is a caller mistake
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::SandboxSetup { .. } => 3,
            Self::MissingTool { .. } => 6,
            Self::Config { .. } | Self::InvalidConfig { .. } | Self::Toml(_) => 7,
            _ => 1,
        }
    }
}

/// Type alias for repairkit results
pub type Result<T> = std::result::Result<T, RepairError>;

/// Extension trait for converting foreign errors to RepairError
pub trait IntoRepairError<T> {
    fn into_repair_config(self) -> Result<T>;
    fn into_repair_setup(self) -> Result<T>;
}

impl<T, E: Into<anyhow::Error>> IntoRepairError<T> for std::result::Result<T, E> {
    fn into_repair_config(self) -> Result<T> {
        self.map_err(|e| RepairError::config(e.into().to_string()))
    }

    fn into_repair_setup(self) -> Result<T> {
        self.map_err(|e| RepairError::sandbox_setup(e.into().to_string()))
    }
}
