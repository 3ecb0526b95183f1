//! Configuration management for repairkit.
//!
//! Configuration is layered: the user-level file
//! (`{config_dir}/repairkit/config.toml`) is loaded first and the
//! project-level `repairkit.toml` is merged over it, table by table. Every
//! field has a default, so both files are optional.
//!
//! # Example repairkit.toml
//!
//! ```toml
//! [editor]
//! window_above = 5
//! window_below = 95
//! max_edit_retries = 3
//!
//! [sandbox]
//! image = "sweb.eval.x86_64.django__django-11099:latest"
//! workdir = "/testbed"
//!
//! [lint]
//! kind = "flake8"
//!
//! [tests]
//! command = "./tests/runtests.py --verbosity 2"
//! module_style = true
//! ```

pub mod validation;

pub use validation::{ConfigValidator, ValidationReport};

use crate::error::{IntoRepairError, RepairError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Project-level configuration file name.
pub const PROJECT_CONFIG_FILE: &str = "repairkit.toml";

// ============================================================================
// Editor
// ============================================================================

/// Settings for the view window and the lint-gated edit protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Lines shown above the focus line when opening a file.
    pub window_above: usize,
    /// Lines shown below the focus line when opening a file.
    pub window_below: usize,
    /// Upper bound on widening attempts for range edits.
    pub max_edit_retries: u32,
    /// Context lines around an edit in before/after snippets.
    pub snippet_lines: usize,
    /// Cap on results returned by file and text searches.
    pub max_file_search_results: usize,
    /// Cap on output lines returned by `execute_command`.
    pub max_output_lines: usize,
    /// Directory inside the sandbox used for shadow writes.
    pub shadow_dir: String,
    /// Scratch files never included in the final patch.
    pub scratch_files: Vec<String>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            window_above: 5,
            window_below: 95,
            max_edit_retries: 3,
            snippet_lines: 4,
            max_file_search_results: 100,
            max_output_lines: 50,
            shadow_dir: "/tmp/repairkit".to_string(),
            scratch_files: vec!["reproduce_issue.py".to_string()],
        }
    }
}

impl EditorConfig {
    /// Number of lines a full window spans.
    #[must_use]
    pub fn window_span(&self) -> usize {
        self.window_above + self.window_below + 1
    }
}

// ============================================================================
// Sandbox
// ============================================================================

/// Settings for the execution context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Image the container is started from. The repository is expected to be
    /// checked out and installed in it already.
    pub image: String,
    /// Container name. A fresh `repairkit-<uuid>` name is generated when unset.
    pub name: Option<String>,
    /// Working directory of the repository checkout inside the container.
    pub workdir: String,
    /// Commands run once after the container starts.
    pub setup: Vec<String>,
    /// Default per-command timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: "ubuntu:22.04".to_string(),
            name: None,
            workdir: "/testbed".to_string(),
            setup: Vec::new(),
            timeout_secs: 300,
        }
    }
}

// ============================================================================
// Lint
// ============================================================================

/// Which lint adapter gates edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinterKind {
    /// flake8 restricted to gross errors.
    #[default]
    Flake8,
    /// No linting; edits are committed unconditionally.
    None,
    /// A user-supplied lint command.
    Command,
}

/// Settings for the lint adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LintConfig {
    pub kind: LinterKind,
    /// Display name for a command linter.
    pub name: Option<String>,
    /// Install command for a command linter.
    pub install: Option<String>,
    /// Lint command for a command linter; the file path is appended.
    pub command: Option<String>,
    /// File extensions (without the dot) a command linter handles.
    pub extensions: Vec<String>,
}

// ============================================================================
// Tests
// ============================================================================

/// Settings for regression-test correlation and execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestsConfig {
    /// Test command template; test files are appended as arguments.
    pub command: String,
    /// Pass test files as dotted module names (Django's runner).
    pub module_style: bool,
    /// Run correlated tests after every successful edit of a non-test file.
    pub run_on_edit: bool,
    /// Timeout for one test invocation in seconds.
    pub timeout_secs: u64,
    /// Failing tests detailed in a summary.
    pub max_failures_shown: usize,
    /// Lines of failure output kept per failing test.
    pub failure_lines: usize,
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            command: "pytest -rA".to_string(),
            module_style: false,
            run_on_edit: true,
            timeout_secs: 600,
            max_failures_shown: 5,
            failure_lines: 10,
        }
    }
}

// ============================================================================
// Root
// ============================================================================

/// Complete repairkit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RepairConfig {
    pub editor: EditorConfig,
    pub sandbox: SandboxConfig,
    pub lint: LintConfig,
    pub tests: TestsConfig,
}

impl RepairConfig {
    /// Load the layered configuration for a project.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or parsed.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let paths: Vec<PathBuf> = Self::user_path()
            .into_iter()
            .chain(std::iter::once(Self::project_path(project_dir)))
            .collect();
        Self::load_from(&paths)
    }

    /// Load and merge the given files in order; later files win.
    ///
    /// Missing files are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_from(paths: &[PathBuf]) -> Result<Self> {
        let mut merged = toml::Table::new();

        for path in paths {
            if !path.exists() {
                continue;
            }
            debug!(path = %path.display(), "Loading configuration layer");
            let layer = read_table(path)?;
            merge_tables(&mut merged, layer);
        }

        toml::Value::Table(merged)
            .try_into::<RepairConfig>()
            .into_repair_config()
    }

    /// Parse a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this schema.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Render the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).into_repair_config()
    }

    /// Path of the project-level configuration file.
    pub fn project_path(project_dir: &Path) -> PathBuf {
        project_dir.join(PROJECT_CONFIG_FILE)
    }

    /// Path of the user-level configuration file, if a config dir exists.
    #[must_use]
    pub fn user_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("repairkit").join("config.toml"))
    }

    /// Check field values, returning a list of problems.
    #[must_use]
    pub fn problems(&self) -> Vec<String> {
        self.field_problems()
            .into_iter()
            .map(|(field, reason)| format!("{field} {reason}"))
            .collect()
    }

    /// Fail on the first invalid value.
    ///
    /// # Errors
    ///
    /// Returns [`RepairError::InvalidConfig`] naming the offending field.
    pub fn check(&self) -> Result<()> {
        match self.field_problems().into_iter().next() {
            Some((field, reason)) => Err(RepairError::InvalidConfig {
                field: field.to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn field_problems(&self) -> Vec<(&'static str, &'static str)> {
        let mut problems = Vec::new();

        if self.editor.max_edit_retries == 0 {
            problems.push(("editor.max_edit_retries", "must be at least 1"));
        }
        if self.editor.max_file_search_results == 0 {
            problems.push(("editor.max_file_search_results", "must be at least 1"));
        }
        if self.editor.shadow_dir.trim().is_empty() {
            problems.push(("editor.shadow_dir", "must not be empty"));
        }
        if self.sandbox.timeout_secs == 0 {
            problems.push(("sandbox.timeout_secs", "must be at least 1"));
        }
        if self.sandbox.workdir.trim().is_empty() {
            problems.push(("sandbox.workdir", "must not be empty"));
        }
        if self.tests.command.trim().is_empty() {
            problems.push(("tests.command", "must not be empty"));
        }
        if self.tests.timeout_secs == 0 {
            problems.push(("tests.timeout_secs", "must be at least 1"));
        }
        if self.lint.kind == LinterKind::Command
            && self.lint.command.as_deref().map_or(true, |c| c.trim().is_empty())
        {
            problems.push(("lint.command", "is required when lint.kind = \"command\""));
        }

        problems
    }
}

fn read_table(path: &Path) -> Result<toml::Table> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str::<toml::Table>(&content)
        .map_err(|e| RepairError::config_with_path(e.to_string(), path.to_path_buf()))
}

/// Recursively merge `overlay` into `base`. Nested tables merge, everything
/// else is replaced.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_editor_constants() {
        let config = RepairConfig::default();
        assert_eq!(config.editor.window_above, 5);
        assert_eq!(config.editor.window_below, 95);
        assert_eq!(config.editor.window_span(), 101);
        assert_eq!(config.editor.max_edit_retries, 3);
        assert_eq!(config.editor.max_file_search_results, 100);
        assert_eq!(config.tests.max_failures_shown, 5);
        assert_eq!(config.lint.kind, LinterKind::Flake8);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RepairConfig::from_toml_str(
            r#"
[editor]
max_edit_retries = 5

[lint]
kind = "none"
"#,
        )
        .unwrap();

        assert_eq!(config.editor.max_edit_retries, 5);
        assert_eq!(config.editor.window_below, 95);
        assert_eq!(config.lint.kind, LinterKind::None);
        assert_eq!(config.tests.command, "pytest -rA");
    }

    #[test]
    fn test_layers_merge_with_later_winning() {
        let temp = TempDir::new().unwrap();
        let user = temp.path().join("user.toml");
        let project = temp.path().join("project.toml");
        std::fs::write(
            &user,
            "[sandbox]\nimage = \"python:3.11\"\ntimeout_secs = 60\n",
        )
        .unwrap();
        std::fs::write(&project, "[sandbox]\nimage = \"sweb.eval:latest\"\n").unwrap();

        let config = RepairConfig::load_from(&[user, project]).unwrap();
        assert_eq!(config.sandbox.image, "sweb.eval:latest");
        assert_eq!(config.sandbox.timeout_secs, 60);
    }

    #[test]
    fn test_missing_layers_are_skipped() {
        let temp = TempDir::new().unwrap();
        let config = RepairConfig::load(temp.path()).unwrap_or_default();
        assert_eq!(config.editor.snippet_lines, 4);
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(PROJECT_CONFIG_FILE);
        std::fs::write(&path, "[editor\nbroken").unwrap();

        match RepairConfig::load_from(&[path.clone()]) {
            Err(RepairError::Config { path: Some(p), .. }) => assert_eq!(p, path),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_problems_for_command_linter_without_command() {
        let mut config = RepairConfig::default();
        config.lint.kind = LinterKind::Command;
        config.editor.max_edit_retries = 0;

        let problems = config.problems();
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().any(|p| p.contains("lint.command")));
        assert!(problems.iter().any(|p| p.contains("max_edit_retries")));
    }

    #[test]
    fn test_check_reports_first_invalid_field() {
        assert!(RepairConfig::default().check().is_ok());

        let mut config = RepairConfig::default();
        config.lint.kind = LinterKind::Command;
        let err = config.check().unwrap_err();
        match &err {
            RepairError::InvalidConfig { field, reason } => {
                assert_eq!(field, "lint.command");
                assert!(reason.contains("kind = \"command\""));
            }
            other => panic!("expected invalid config, got {:?}", other),
        }
        assert_eq!(err.exit_code(), 7);
    }

    #[test]
    fn test_wrong_value_type_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(PROJECT_CONFIG_FILE);
        std::fs::write(&path, "[editor]\nmax_edit_retries = \"three\"\n").unwrap();

        let err = RepairConfig::load_from(&[path]).unwrap_err();
        assert!(matches!(err, RepairError::Config { path: None, .. }));
        assert_eq!(err.exit_code(), 7);
    }

    #[test]
    fn test_toml_roundtrip_of_defaults() {
        let config = RepairConfig::default();
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("[editor]"));
        assert_eq!(RepairConfig::from_toml_str(&text).unwrap(), config);
    }
}
