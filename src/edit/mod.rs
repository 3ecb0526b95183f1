//! The editing session.
//!
//! An [`Editor`] owns everything one agent session needs: the sandbox, the
//! linter, the view window, the undo ledger and the registry of relevant
//! tests. Mutating operations live in [`protocol`]; this module holds
//! construction, navigation, search, and test execution.
//!
//! Every operation returns a human-readable string. Expected agent mistakes
//! (missing files, lint rejections, empty history) are messages; malformed
//! arguments are [`RepairError::Validation`] errors; environment breakage is
//! [`RepairError::CommandFailed`].

pub mod protocol;
pub mod text;

pub use protocol::EditAttempt;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::RepairConfig;
use crate::error::{RepairError, Result};
use crate::history::EditHistory;
use crate::lint::Linter;
use crate::regression::{
    find_related_test_file, is_test_path, run_tests, summarize, SummaryLimits, TestCommand,
    TestFileRegistry,
};
use crate::sandbox::{shell_quote, ExecOptions, Sandbox};
use crate::view::{CurrentWindow, Viewer, WindowBuffer};

/// One editing session bound to one sandbox.
pub struct Editor {
    sandbox: Arc<dyn Sandbox>,
    linter: Box<dyn Linter>,
    config: RepairConfig,
    viewer: Viewer,
    history: EditHistory,
    registry: TestFileRegistry,
    test_command: TestCommand,
}

impl Editor {
    pub fn new(sandbox: Arc<dyn Sandbox>, linter: Box<dyn Linter>, config: RepairConfig) -> Self {
        let buffer = WindowBuffer::new(config.editor.window_above, config.editor.window_below);
        let test_command = TestCommand::from_config(&config.tests);
        Self {
            sandbox,
            linter,
            viewer: Viewer::new(buffer),
            history: EditHistory::new(),
            registry: TestFileRegistry::new(),
            test_command,
            config,
        }
    }

    /// Replace the configured test invocation.
    #[must_use]
    pub fn with_test_command(mut self, command: TestCommand) -> Self {
        self.test_command = command;
        self
    }

    #[must_use]
    pub fn sandbox(&self) -> &dyn Sandbox {
        self.sandbox.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &RepairConfig {
        &self.config
    }

    #[must_use]
    pub fn history(&self) -> &EditHistory {
        &self.history
    }

    #[must_use]
    pub fn registry(&self) -> &TestFileRegistry {
        &self.registry
    }

    #[must_use]
    pub fn current_window(&self) -> Option<&CurrentWindow> {
        self.viewer.current()
    }

    /// Provision the linter ahead of the first edit.
    ///
    /// # Errors
    ///
    /// Returns an error if the linter's install command fails.
    pub async fn prepare(&self) -> Result<()> {
        self.linter.install(self.sandbox.as_ref()).await
    }

    /// Release the sandbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the sandbox could not be removed.
    pub async fn close(&self) -> Result<()> {
        self.sandbox.teardown().await
    }

    // ------------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------------

    /// Show `[start_line, end_line]` of a file.
    pub async fn view(&self, path: &str, start_line: usize, end_line: usize) -> Result<String> {
        self.viewer
            .view(self.sandbox.as_ref(), path, start_line, end_line)
            .await
    }

    /// Open a file with the window anchored at `line_number`.
    pub async fn open(&mut self, path: &str, line_number: usize) -> Result<String> {
        self.viewer
            .open(self.sandbox.as_ref(), path, line_number)
            .await
    }

    pub async fn scroll_down(&mut self) -> Result<String> {
        self.viewer.scroll_down(self.sandbox.as_ref()).await
    }

    pub async fn scroll_up(&mut self) -> Result<String> {
        self.viewer.scroll_up(self.sandbox.as_ref()).await
    }

    /// Close the view window.
    pub fn reset_window(&mut self) {
        self.viewer.reset();
    }

    /// Directory listing.
    pub async fn list(&self, directory: &str) -> Result<String> {
        self.sandbox.list(directory).await
    }

    // ------------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------------

    /// Find files by name. A pattern without glob characters matches any
    /// file name containing it.
    pub async fn search_files(&self, pattern: &str) -> Result<String> {
        if pattern.trim().is_empty() {
            return Err(RepairError::validation("pattern must not be empty"));
        }
        let name = if pattern.contains(['*', '?', '[']) {
            pattern.to_string()
        } else {
            format!("*{pattern}*")
        };
        let command = format!(
            "find . -type f -name {} -not -path './.git/*'",
            shell_quote(&name)
        );
        let output = self
            .sandbox
            .execute_with(&command, &ExecOptions::lenient())
            .await?;

        let mut files: Vec<&str> = output
            .lines()
            .map(|l| l.trim().trim_start_matches("./"))
            .filter(|l| !l.is_empty())
            .collect();
        files.sort_unstable();

        if files.is_empty() {
            return Ok(format!("No files matching \"{pattern}\" found."));
        }

        let cap = self.config.editor.max_file_search_results;
        let mut out = format!("Found {} files matching \"{}\":\n", files.len(), pattern);
        for file in files.iter().take(cap) {
            out.push_str(file);
            out.push('\n');
        }
        if files.len() > cap {
            out.push_str(&format!(
                "... ({} more not shown; narrow the search)\n",
                files.len() - cap
            ));
        }
        Ok(out)
    }

    /// Grep for an exact term under `path` (the repository root by default).
    pub async fn explicit_search(&self, term: &str, path: Option<&str>) -> Result<String> {
        if term.is_empty() {
            return Err(RepairError::validation("search term must not be empty"));
        }
        let target = path.unwrap_or(".");
        let command = format!(
            "grep -rnF --exclude-dir=.git -e {} -- {}",
            shell_quote(term),
            shell_quote(target)
        );
        let result = self.sandbox.run(&command, &ExecOptions::lenient()).await?;

        match result.exit_code {
            0 => {}
            1 => return Ok(format!("No matches for \"{term}\" in {target}.")),
            _ => return Ok(format!("Search failed: {}", result.output.trim())),
        }

        let matches: Vec<&str> = result
            .output
            .lines()
            .map(|l| l.strip_prefix("./").unwrap_or(l))
            .collect();
        let cap = self.config.editor.max_file_search_results;
        let mut out = format!("Found {} matches for \"{}\" in {}:\n", matches.len(), term, target);
        for line in matches.iter().take(cap) {
            out.push_str(line);
            out.push('\n');
        }
        if matches.len() > cap {
            out.push_str(&format!(
                "... ({} more matches not shown; narrow the search)\n",
                matches.len() - cap
            ));
        }
        Ok(out)
    }

    /// Run an arbitrary shell command, capping the output.
    pub async fn execute_command(&self, command: &str) -> Result<String> {
        let result = self.sandbox.run(command, &ExecOptions::lenient()).await?;
        let mut out = cap_lines(&result.output, self.config.editor.max_output_lines);
        if !result.success() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&format!("[exit code {}]", result.exit_code));
        }
        Ok(out)
    }

    // ------------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------------

    /// Register a test file explicitly.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the file does not exist.
    pub async fn add_test_file(&mut self, path: &str) -> Result<String> {
        if !self.sandbox.file_exists(path).await? {
            return Err(RepairError::validation(format!(
                "test file {path} does not exist"
            )));
        }
        Ok(if self.registry.register(path) {
            format!("Registered test file {path}.")
        } else {
            format!("Test file {path} is already registered.")
        })
    }

    pub fn list_tests(&self) -> String {
        if self.registry.is_empty() {
            return "No test files registered.".to_string();
        }
        let mut out = String::from("Registered test files:\n");
        for file in self.registry.files() {
            out.push_str(&format!("- {file}\n"));
        }
        out
    }

    /// Run `files`, or every registered test file when empty.
    pub async fn run_tests(&self, files: &[String]) -> Result<String> {
        let files = if files.is_empty() {
            self.registry.files()
        } else {
            files
        };
        if files.is_empty() {
            return Ok("No test files registered. Use add_test_file first.".to_string());
        }

        let records = run_tests(
            self.sandbox.as_ref(),
            &self.test_command,
            files,
            Duration::from_secs(self.config.tests.timeout_secs),
        )
        .await?;
        Ok(summarize(&records, SummaryLimits::from(&self.config.tests)))
    }

    /// Correlate `path` with a test file and, for non-test files, run the
    /// registered tests. Returns text to append to the edit result.
    async fn after_commit(&mut self, path: &str) -> String {
        match find_related_test_file(self.sandbox.as_ref(), path).await {
            Ok(Some(test_file)) => {
                if self.registry.register(test_file.clone()) {
                    debug!(source = %path, test = %test_file, "Registered related test file");
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(path = %path, error = %e, "Test correlation failed");
                return format!("\n\nTest correlation skipped: {e}");
            }
        }

        if is_test_path(path) || !self.config.tests.run_on_edit || self.registry.is_empty() {
            return String::new();
        }

        match self.run_tests(&[]).await {
            Ok(summary) => format!("\n\n{summary}"),
            Err(e) => {
                warn!(path = %path, error = %e, "Test run failed");
                format!("\n\nTest run failed: {e}")
            }
        }
    }

    // ------------------------------------------------------------------------
    // Patch
    // ------------------------------------------------------------------------

    /// Unified diff of `paths` (everything when empty).
    pub async fn diff_patch(&self, paths: &[String]) -> Result<String> {
        self.sandbox.diff_patch(paths).await
    }

    /// The session's net change, excluding scratch files.
    pub async fn final_patch(&self) -> Result<String> {
        let mut pathspec = vec![".".to_string()];
        pathspec.extend(
            self.config
                .editor
                .scratch_files
                .iter()
                .map(|f| format!(":(exclude){f}")),
        );
        self.sandbox.diff_patch(&pathspec).await
    }
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("sandbox", &self.sandbox.name())
            .field("linter", &self.linter.name())
            .field("window", &self.viewer.current())
            .field("tests", &self.registry.files())
            .finish()
    }
}

/// Keep the first `max` lines, noting how many were dropped.
fn cap_lines(text: &str, max: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max {
        return text.to_string();
    }
    let mut out = lines[..max].join("\n");
    out.push_str(&format!(
        "\n... (output trimmed, {} more lines)\n",
        lines.len() - max
    ));
    out
}
