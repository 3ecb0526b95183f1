//! Execution sandbox: one isolated environment bound to a repository checkout.
//!
//! The [`Sandbox`] trait is the only way the editor touches files or runs
//! processes. Implementations supply [`Sandbox::exec_raw`]; everything else
//! (error semantics, file primitives, listing, patch extraction) is layered
//! on top of it by the trait's provided methods.
//!
//! - [`DockerSandbox`] - a long-lived container driven through the `docker` CLI
//! - [`LocalSandbox`] - a host directory, for local checkouts and tests
//!
//! # Example
//!
//! ```rust,ignore
//! use repairkit::sandbox::{DockerSandbox, Sandbox, SandboxSpec};
//!
//! let sandbox = DockerSandbox::create(&SandboxSpec::from_config(&config.sandbox)).await?;
//! let listing = sandbox.list(".").await?;
//! let patch = sandbox.diff_patch(&[]).await?;
//! sandbox.teardown().await?;
//! ```

pub mod docker;
pub mod local;
mod process;

pub use docker::{DockerSandbox, SandboxSpec};
pub use local::LocalSandbox;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{RepairError, Result};

/// Exit code reported for commands that exceeded their timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

// ============================================================================
// Command Types
// ============================================================================

/// Per-call execution options.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Return the output instead of failing on a non-zero exit.
    pub ignore_errors: bool,
    /// Working directory; the sandbox default when unset.
    pub workdir: Option<String>,
    /// Timeout; the sandbox default when unset.
    pub timeout: Option<Duration>,
}

impl ExecOptions {
    /// Options that never fail on exit status.
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            ignore_errors: true,
            ..Self::default()
        }
    }

    /// Run in a different working directory.
    #[must_use]
    pub fn with_workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    /// Override the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Captured result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Combined stdout and stderr, plus a timeout annotation if applicable.
    pub output: String,
    /// Process exit code, or [`TIMEOUT_EXIT_CODE`].
    pub exit_code: i32,
    /// Whether the command was cut off by its timeout.
    pub timed_out: bool,
}

impl CommandOutput {
    /// Whether the command exited zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Build the result of a command that ran past its deadline.
    #[must_use]
    pub fn timed_out(partial_output: &str, timeout: Duration) -> Self {
        let mut output = partial_output.to_string();
        if !output.is_empty() && !output.ends_with('\n') {
            output.push('\n');
        }
        output.push_str(&format!("timed out after {} seconds", timeout.as_secs()));
        Self {
            output,
            exit_code: TIMEOUT_EXIT_CODE,
            timed_out: true,
        }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Liveness of an execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerStatus {
    Created,
    Running,
    Stopped,
    Removed,
}

impl ContainerStatus {
    /// Map a `docker inspect` state string.
    #[must_use]
    pub fn from_docker_state(state: &str) -> Self {
        match state.trim() {
            "created" => Self::Created,
            "running" | "restarting" | "paused" => Self::Running,
            "removing" => Self::Removed,
            _ => Self::Stopped,
        }
    }

    /// Whether teardown still has something to remove.
    #[must_use]
    pub fn needs_removal(&self) -> bool {
        !matches!(self, Self::Removed)
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

// ============================================================================
// Sandbox Trait
// ============================================================================

/// An isolated execution context bound to one repository checkout.
///
/// Commands observe a total order equal to call order. No internal locking is
/// done around command execution: one session owns one sandbox.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Identity of the execution context.
    fn name(&self) -> &str;

    /// Default working directory (the repository root).
    fn workdir(&self) -> &str;

    /// Default per-command timeout.
    fn default_timeout(&self) -> Duration;

    /// Current liveness status.
    fn status(&self) -> ContainerStatus;

    /// Run `command` through `sh -c`, feeding `stdin` if given.
    ///
    /// Never fails on exit status; only on failure to launch the process.
    async fn exec_raw(
        &self,
        command: &str,
        stdin: Option<&str>,
        workdir: &str,
        timeout: Duration,
    ) -> Result<CommandOutput>;

    /// Release the execution context. Safe to call repeatedly.
    async fn teardown(&self) -> Result<()>;

    /// Run a command with the given options.
    ///
    /// # Errors
    ///
    /// Returns [`RepairError::CommandFailed`] on a non-zero exit (including
    /// timeouts) unless `ignore_errors` is set.
    async fn run(&self, command: &str, opts: &ExecOptions) -> Result<CommandOutput> {
        let workdir = opts.workdir.as_deref().unwrap_or_else(|| self.workdir());
        let timeout = opts.timeout.unwrap_or_else(|| self.default_timeout());

        debug!(sandbox = %self.name(), command = %command, workdir = %workdir, "Executing");
        let result = self.exec_raw(command, None, workdir, timeout).await?;

        if result.timed_out {
            warn!(sandbox = %self.name(), command = %command, "Command timed out");
        }

        if !result.success() && !opts.ignore_errors {
            return Err(RepairError::command_failed(
                command,
                result.output,
                result.exit_code,
            ));
        }
        Ok(result)
    }

    /// Run a command and return its output, failing on non-zero exit.
    async fn execute(&self, command: &str) -> Result<String> {
        Ok(self.run(command, &ExecOptions::default()).await?.output)
    }

    /// Run a command with options and return its output.
    async fn execute_with(&self, command: &str, opts: &ExecOptions) -> Result<String> {
        Ok(self.run(command, opts).await?.output)
    }

    /// Directory listing.
    async fn list(&self, directory: &str) -> Result<String> {
        self.execute(&format!("ls -la {}", shell_quote(directory)))
            .await
    }

    /// Read a whole file.
    async fn read_file(&self, path: &str) -> Result<String> {
        self.execute(&format!("cat -- {}", shell_quote(path))).await
    }

    /// Check whether a regular file exists.
    async fn file_exists(&self, path: &str) -> Result<bool> {
        let result = self
            .run(&format!("test -f {}", shell_quote(path)), &ExecOptions::lenient())
            .await?;
        Ok(result.success())
    }

    /// Write a whole file, creating parent directories.
    ///
    /// Content travels on stdin, so it is never shell-interpreted.
    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let quoted = shell_quote(path);
        let command = format!("mkdir -p \"$(dirname -- {quoted})\" && cat > {quoted}");
        let result = self
            .exec_raw(&command, Some(content), self.workdir(), self.default_timeout())
            .await?;
        if !result.success() {
            return Err(RepairError::command_failed(
                command,
                result.output,
                result.exit_code,
            ));
        }
        Ok(())
    }

    /// Stage `paths` (everything when empty) and return the cached diff.
    ///
    /// Calling this twice without an intervening mutation yields identical
    /// output.
    async fn diff_patch(&self, paths: &[String]) -> Result<String> {
        let pathspec = if paths.is_empty() {
            String::new()
        } else {
            let quoted: Vec<String> = paths.iter().map(|p| shell_quote(p)).collect();
            format!(" -- {}", quoted.join(" "))
        };

        let add = self
            .run(&format!("git add -A{pathspec}"), &ExecOptions::lenient())
            .await?;
        if !add.success() {
            warn!(sandbox = %self.name(), output = %add.output.trim(), "git add reported problems");
        }

        self.execute(&format!("git -c core.pager=cat diff --cached --no-color{pathspec}"))
            .await
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Quote a string for POSIX `sh`.
#[must_use]
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Prefix that routes a script's stderr into its stdout so output keeps its
/// original interleaving.
pub(crate) fn merged_script(command: &str) -> String {
    format!("exec 2>&1\n{command}")
}
