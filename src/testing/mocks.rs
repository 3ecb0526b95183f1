//! Test doubles for the lint and sandbox seams.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::lint::Linter;
use crate::sandbox::{CommandOutput, ContainerStatus, Sandbox};

// ============================================================================
// Mock Linter
// ============================================================================

/// A linter with a tiny rule set evaluated in-process.
///
/// It reads the file through the sandbox, so it sees exactly what a real
/// linter would, and emits flake8-format lines.
#[derive(Debug, Default)]
pub struct MockLinter {
    undefined_names: Vec<String>,
    indent_check: bool,
    extensions: Vec<String>,
    lint_calls: Arc<AtomicU32>,
    install_calls: Arc<AtomicU32>,
}

impl MockLinter {
    /// A linter for `.py` files with no rules enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            extensions: vec!["py".to_string()],
            ..Self::default()
        }
    }

    /// Report `F821 undefined name` for every line mentioning `name`.
    #[must_use]
    pub fn with_undefined_name(mut self, name: &str) -> Self {
        self.undefined_names.push(name.to_string());
        self
    }

    /// Report `E113 unexpected indentation` where a line is indented deeper
    /// than the previous code line without that line opening a block.
    #[must_use]
    pub fn with_indent_check(mut self) -> Self {
        self.indent_check = true;
        self
    }

    /// Counter of `lint` calls, shared with the linter.
    #[must_use]
    pub fn call_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.lint_calls)
    }

    /// Counter of `install` calls, shared with the linter.
    #[must_use]
    pub fn install_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.install_calls)
    }

    /// Apply the rules to `content`, reporting locations against `path`.
    #[must_use]
    pub fn check(&self, path: &str, content: &str) -> Vec<String> {
        let mut findings = Vec::new();
        let mut prev: Option<(usize, &str)> = None;

        for (idx, line) in content.lines().enumerate() {
            let row = idx + 1;
            for name in &self.undefined_names {
                if let Some(col) = line.find(name.as_str()) {
                    findings.push(format!(
                        "{}:{}:{}: F821 undefined name '{}'",
                        path,
                        row,
                        col + 1,
                        name
                    ));
                }
            }

            let trimmed = line.trim_start();
            if trimmed.is_empty() {
                continue;
            }
            let indent = line.len() - trimmed.len();
            if self.indent_check {
                let unexpected = match prev {
                    None => indent > 0,
                    Some((prev_indent, prev_line)) => {
                        indent > prev_indent && !prev_line.trim_end().ends_with(':')
                    }
                };
                if unexpected {
                    findings.push(format!(
                        "{}:{}:{}: E113 unexpected indentation",
                        path,
                        row,
                        indent + 1
                    ));
                }
            }
            prev = Some((indent, line));
        }

        findings
    }
}

#[async_trait]
impl Linter for MockLinter {
    fn name(&self) -> &str {
        "mock"
    }

    fn handles(&self, path: &str) -> bool {
        crate::lint::has_extension(path, &self.extensions)
    }

    async fn install(&self, _sandbox: &dyn Sandbox) -> Result<()> {
        self.install_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn lint(&self, sandbox: &dyn Sandbox, path: &str) -> Result<Option<String>> {
        self.lint_calls.fetch_add(1, Ordering::SeqCst);
        let content = sandbox.read_file(path).await?;
        let findings = self.check(path, &content);
        Ok(if findings.is_empty() {
            None
        } else {
            Some(findings.join("\n"))
        })
    }
}

// ============================================================================
// Recording Sandbox
// ============================================================================

/// Wraps a sandbox and records every command sent to it, in order.
pub struct RecordingSandbox<S: Sandbox> {
    inner: S,
    commands: Mutex<Vec<String>>,
}

impl<S: Sandbox> RecordingSandbox<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Commands issued so far.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Commands that wrote `path` via [`Sandbox::write_file`].
    #[must_use]
    pub fn writes_to(&self, path: &str) -> usize {
        let target = format!("cat > {}", crate::sandbox::shell_quote(path));
        self.commands()
            .iter()
            .filter(|c| c.ends_with(&target))
            .count()
    }
}

#[async_trait]
impl<S: Sandbox> Sandbox for RecordingSandbox<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn workdir(&self) -> &str {
        self.inner.workdir()
    }

    fn default_timeout(&self) -> Duration {
        self.inner.default_timeout()
    }

    fn status(&self) -> ContainerStatus {
        self.inner.status()
    }

    async fn exec_raw(
        &self,
        command: &str,
        stdin: Option<&str>,
        workdir: &str,
        timeout: Duration,
    ) -> Result<CommandOutput> {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command.to_string());
        }
        self.inner.exec_raw(command, stdin, workdir, timeout).await
    }

    async fn teardown(&self) -> Result<()> {
        self.inner.teardown().await
    }
}
