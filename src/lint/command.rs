//! Generic command-backed linter.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, info};

use super::{has_extension, Linter};
use crate::error::{RepairError, Result};
use crate::sandbox::{shell_quote, ExecOptions, Sandbox};

/// Exit code `sh` uses for "command not found".
const NOT_FOUND_EXIT_CODE: i32 = 127;

/// A linter defined by an install command and a lint command.
///
/// The file path is appended to the lint command. A zero exit means clean;
/// anything else is reported as findings.
#[derive(Debug)]
pub struct CommandLinter {
    name: String,
    install_command: Option<String>,
    lint_command: String,
    extensions: Vec<String>,
    installed: AtomicBool,
}

impl CommandLinter {
    /// Create a linter with no install step that handles no extensions yet.
    pub fn new(name: impl Into<String>, lint_command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            install_command: None,
            lint_command: lint_command.into(),
            extensions: Vec::new(),
            installed: AtomicBool::new(false),
        }
    }

    /// Set the install command.
    #[must_use]
    pub fn with_install(mut self, command: Option<String>) -> Self {
        self.install_command = command;
        self
    }

    /// Set the handled extensions (without the dot).
    #[must_use]
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    /// The lint command without the file argument.
    #[must_use]
    pub fn lint_command(&self) -> &str {
        &self.lint_command
    }
}

#[async_trait]
impl Linter for CommandLinter {
    fn name(&self) -> &str {
        &self.name
    }

    fn handles(&self, path: &str) -> bool {
        has_extension(path, &self.extensions)
    }

    async fn install(&self, sandbox: &dyn Sandbox) -> Result<()> {
        if self.installed.load(Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(command) = &self.install_command {
            info!(linter = %self.name, "Installing linter");
            sandbox.execute(command).await?;
        }
        self.installed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn lint(&self, sandbox: &dyn Sandbox, path: &str) -> Result<Option<String>> {
        let command = format!("{} {}", self.lint_command, shell_quote(path));
        let result = sandbox.run(&command, &ExecOptions::lenient()).await?;

        if result.success() {
            return Ok(None);
        }
        if result.exit_code == NOT_FOUND_EXIT_CODE {
            return Err(RepairError::MissingTool {
                tool: self.name.clone(),
            });
        }

        debug!(linter = %self.name, path = %path, "Lint findings reported");
        let findings = result.output.trim_end().to_string();
        if findings.is_empty() {
            Ok(Some(format!(
                "{} exited with code {} and no output",
                self.name, result.exit_code
            )))
        } else {
            Ok(Some(findings))
        }
    }
}
