//! Lint adapters that gate edits.
//!
//! A linter here is a syntax and gross-error gate, not a style checker: the
//! rule set is kept deliberately narrow so an edit is only rejected for
//! things like undefined names or broken indentation.
//!
//! # Available Linters
//!
//! - [`Flake8Linter`] - flake8 restricted to F821/F822/F831/E11x/E999/E902
//! - [`CommandLinter`] - any command that prints `path:row:col: CODE message`
//! - [`NullLinter`] - lints nothing; edits commit unconditionally

pub mod command;
pub mod flake8;

pub use command::CommandLinter;
pub use flake8::Flake8Linter;

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use tracing::warn;

use crate::config::{LintConfig, LinterKind};
use crate::error::Result;
use crate::sandbox::Sandbox;

// ============================================================================
// Linter Trait
// ============================================================================

/// A pluggable lint capability bound to a sandbox at call time.
#[async_trait]
pub trait Linter: Send + Sync {
    /// Display name.
    fn name(&self) -> &str;

    /// Whether files like `path` are linted at all.
    fn handles(&self, path: &str) -> bool;

    /// Provision the linter inside the sandbox. Runs once; later calls are
    /// no-ops.
    ///
    /// # Errors
    ///
    /// Returns an error if the install command fails.
    async fn install(&self, sandbox: &dyn Sandbox) -> Result<()>;

    /// Lint one file. `None` means clean; otherwise the raw findings, one per
    /// line.
    ///
    /// # Errors
    ///
    /// Returns an error if the linter itself cannot run.
    async fn lint(&self, sandbox: &dyn Sandbox, path: &str) -> Result<Option<String>>;
}

/// The "no linting configured" linter.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLinter;

#[async_trait]
impl Linter for NullLinter {
    fn name(&self) -> &str {
        "none"
    }

    fn handles(&self, _path: &str) -> bool {
        false
    }

    async fn install(&self, _sandbox: &dyn Sandbox) -> Result<()> {
        Ok(())
    }

    async fn lint(&self, _sandbox: &dyn Sandbox, _path: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Build the linter selected by configuration.
#[must_use]
pub fn linter_from_config(config: &LintConfig) -> Box<dyn Linter> {
    match config.kind {
        LinterKind::Flake8 => Box::new(Flake8Linter::new()),
        LinterKind::None => Box::new(NullLinter),
        LinterKind::Command => match config.command.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(command) => Box::new(
                CommandLinter::new(config.name.as_deref().unwrap_or("custom"), command)
                    .with_install(config.install.clone())
                    .with_extensions(config.extensions.clone()),
            ),
            None => {
                warn!("lint.kind = \"command\" without lint.command; edits will not be linted");
                Box::new(NullLinter)
            }
        },
    }
}

/// Whether `path` has one of `extensions` (given without the dot).
pub(crate) fn has_extension(path: &str, extensions: &[String]) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|allowed| allowed == ext))
}

// ============================================================================
// Diagnostics
// ============================================================================

/// One parsed finding in `path:row:col: CODE message` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub code: String,
    pub message: String,
}

impl Diagnostic {
    /// Parse a single output line.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.splitn(4, ':').collect();
        if parts.len() < 4 {
            return None;
        }

        let row: u32 = parts[1].trim().parse().ok()?;
        let col: u32 = parts[2].trim().parse().ok()?;
        let rest = parts[3].trim();

        let (code, message) = match rest.find(' ') {
            Some(space) => (rest[..space].to_string(), rest[space + 1..].to_string()),
            None => (String::new(), rest.to_string()),
        };

        Some(Self {
            file: parts[0].to_string(),
            line: row,
            column: col,
            code,
            message,
        })
    }

    /// Location-free identity, so findings survive line shifts.
    #[must_use]
    pub fn key(&self) -> String {
        if self.code.is_empty() {
            self.message.clone()
        } else {
            format!("{} {}", self.code, self.message)
        }
    }
}

/// Identity of a raw output line for baseline comparison.
fn line_key(line: &str) -> String {
    Diagnostic::parse(line)
        .map(|d| d.key())
        .unwrap_or_else(|| line.trim().to_string())
}

/// Findings present before an edit, keyed by message text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LintBaseline {
    keys: HashSet<String>,
}

impl LintBaseline {
    /// Build from raw linter output (`None` = clean file).
    #[must_use]
    pub fn from_output(output: Option<&str>) -> Self {
        let keys = output
            .map(|text| {
                text.lines()
                    .filter(|l| !l.trim().is_empty())
                    .map(line_key)
                    .collect()
            })
            .unwrap_or_default();
        Self { keys }
    }

    /// Number of distinct pre-existing findings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the file was clean before the edit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Lines of `output` that were not present in the baseline.
    #[must_use]
    pub fn new_errors(&self, output: Option<&str>) -> Vec<String> {
        output
            .map(|text| {
                text.lines()
                    .filter(|l| !l.trim().is_empty())
                    .filter(|l| !self.keys.contains(&line_key(l)))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flake8_line() {
        let d = Diagnostic::parse("/tmp/a.py:10:5: F821 undefined name 'foo'").unwrap();
        assert_eq!(d.file, "/tmp/a.py");
        assert_eq!(d.line, 10);
        assert_eq!(d.column, 5);
        assert_eq!(d.code, "F821");
        assert_eq!(d.message, "undefined name 'foo'");
        assert_eq!(d.key(), "F821 undefined name 'foo'");
    }

    #[test]
    fn test_parse_rejects_non_diagnostic_lines() {
        assert!(Diagnostic::parse("Traceback (most recent call last):").is_none());
        assert!(Diagnostic::parse("a.py:x:1: E999 bad").is_none());
    }

    #[test]
    fn test_baseline_filters_preexisting_even_when_shifted() {
        let before = "a.py:3:1: F821 undefined name 'legacy'\n";
        let after = "/tmp/s/a.py:9:1: F821 undefined name 'legacy'\n\
                     /tmp/s/a.py:4:5: F821 undefined name 'typo'\n";

        let baseline = LintBaseline::from_output(Some(before));
        assert_eq!(baseline.len(), 1);
        assert_eq!(
            baseline.new_errors(Some(after)),
            vec!["/tmp/s/a.py:4:5: F821 undefined name 'typo'".to_string()]
        );
    }

    #[test]
    fn test_clean_output_has_no_new_errors() {
        let baseline = LintBaseline::from_output(None);
        assert!(baseline.is_empty());
        assert!(baseline.new_errors(None).is_empty());
    }

    #[test]
    fn test_unparseable_lines_compare_verbatim() {
        let baseline = LintBaseline::from_output(Some("warning: config ignored"));
        assert!(baseline
            .new_errors(Some("warning: config ignored\nE999 something"))
            .eq(&vec!["E999 something".to_string()]));
    }

    #[test]
    fn test_has_extension() {
        let exts = vec!["py".to_string(), "pyi".to_string()];
        assert!(has_extension("pkg/mod.py", &exts));
        assert!(has_extension("stubs/mod.pyi", &exts));
        assert!(!has_extension("README.md", &exts));
        assert!(!has_extension("Makefile", &exts));
    }

    #[test]
    fn test_linter_from_config() {
        let mut config = LintConfig::default();
        assert_eq!(linter_from_config(&config).name(), "flake8");

        config.kind = LinterKind::None;
        assert!(!linter_from_config(&config).handles("a.py"));

        config.kind = LinterKind::Command;
        config.name = Some("pyflakes".to_string());
        config.command = Some("pyflakes".to_string());
        config.extensions = vec!["py".to_string()];
        let linter = linter_from_config(&config);
        assert_eq!(linter.name(), "pyflakes");
        assert!(linter.handles("a.py"));
    }

    #[test]
    fn test_command_linter_without_command_lints_nothing() {
        let mut config = LintConfig::default();
        config.kind = LinterKind::Command;
        config.command = Some("   ".to_string());
        assert!(!linter_from_config(&config).handles("a.py"));

        config.command = None;
        assert!(!linter_from_config(&config).handles("a.py"));
    }
}
