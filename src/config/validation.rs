//! Configuration validation for repairkit.
//!
//! Checks TOML syntax of every configuration layer, then the merged field
//! values.
//!
//! # Example
//!
//! ```rust,ignore
//! use repairkit::config::ConfigValidator;
//! use std::path::Path;
//!
//! let report = ConfigValidator::new(Path::new("/path/to/project")).validate();
//! if !report.is_valid() {
//!     eprintln!("{}", report.verbose_report());
//!     std::process::exit(report.exit_code());
//! }
//! ```

use std::path::{Path, PathBuf};

use super::{LinterKind, RepairConfig};

/// Result of configuration validation.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Errors that prevent the configuration from being valid.
    pub errors: Vec<String>,
    /// Warnings that don't prevent validity but indicate potential issues.
    pub warnings: Vec<String>,
    /// Files that were validated, with whether they existed.
    pub files_checked: Vec<(PathBuf, bool)>,
}

impl ValidationReport {
    /// Create a new empty validation report.
    ///
    /// An empty report is considered valid.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the configuration is valid (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns 0 if valid, 1 if invalid.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.is_valid() {
            0
        } else {
            1
        }
    }

    /// Generate a human-readable summary of the validation result.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_valid() {
            if self.warnings.is_empty() {
                "Configuration is valid.".to_string()
            } else {
                format!(
                    "Configuration is valid with {} warning(s).",
                    self.warnings.len()
                )
            }
        } else {
            format!(
                "Configuration is invalid with {} error(s).",
                self.errors.len()
            )
        }
    }

    /// Generate a verbose report including all details.
    #[must_use]
    pub fn verbose_report(&self) -> String {
        let mut lines = vec![
            "Configuration Validation Report".to_string(),
            "\u{2500}".repeat(50),
            String::new(),
            "Layers (lowest priority first):".to_string(),
        ];

        if self.files_checked.is_empty() {
            lines.push("  (no config files found)".to_string());
        } else {
            for (path, exists) in &self.files_checked {
                let status = if *exists { "\u{2713}" } else { "\u{2717}" };
                lines.push(format!("  {} {}", status, path.display()));
            }
        }

        if !self.errors.is_empty() {
            lines.push(String::new());
            lines.push(format!("Errors ({}):", self.errors.len()));
            for error in &self.errors {
                lines.push(format!("  \u{2717} {}", error));
            }
        }

        if !self.warnings.is_empty() {
            lines.push(String::new());
            lines.push(format!("Warnings ({}):", self.warnings.len()));
            for warning in &self.warnings {
                lines.push(format!("  \u{26a0} {}", warning));
            }
        }

        lines.push(String::new());
        lines.push(format!("Status: {}", self.summary()));

        lines.join("\n")
    }
}

/// Validates the configuration layers of a project.
#[derive(Debug, Clone)]
pub struct ConfigValidator {
    project_dir: PathBuf,
    user_config_path: Option<PathBuf>,
}

impl ConfigValidator {
    /// Create a new validator for the given project directory.
    #[must_use]
    pub fn new(project_dir: &Path) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            user_config_path: RepairConfig::user_path(),
        }
    }

    /// Set a custom user config path for testing.
    #[must_use]
    pub fn with_user_config_path(mut self, path: PathBuf) -> Self {
        self.user_config_path = Some(path);
        self
    }

    /// Layers in load order.
    #[must_use]
    pub fn layers(&self) -> Vec<PathBuf> {
        self.user_config_path
            .iter()
            .cloned()
            .chain(std::iter::once(RepairConfig::project_path(&self.project_dir)))
            .collect()
    }

    /// Validate the configuration and return a detailed report.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::new();
        let layers = self.layers();

        for path in &layers {
            let exists = path.exists();
            report.files_checked.push((path.clone(), exists));
            if !exists {
                continue;
            }
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    if let Err(e) = toml::from_str::<toml::Table>(&content) {
                        report
                            .errors
                            .push(format!("{} syntax error: {}", path.display(), e));
                    }
                }
                Err(e) => report
                    .errors
                    .push(format!("Cannot read {}: {}", path.display(), e)),
            }
        }

        if !report.is_valid() {
            return report;
        }

        if !report.files_checked.iter().any(|(_, exists)| *exists) {
            report
                .warnings
                .push("No configuration files found - using defaults".to_string());
        }

        match RepairConfig::load_from(&layers) {
            Ok(config) => {
                report.errors.extend(config.problems());
                report.warnings.extend(Self::warnings_for(&config));
            }
            Err(e) => report.errors.push(e.to_string()),
        }

        report
    }

    fn warnings_for(config: &RepairConfig) -> Vec<String> {
        let mut warnings = Vec::new();

        if config.editor.max_edit_retries > 10 {
            warnings.push(format!(
                "editor.max_edit_retries = {} may silently swallow lines below an edit",
                config.editor.max_edit_retries
            ));
        }
        if config.lint.kind == LinterKind::None {
            warnings.push("lint.kind = \"none\" - edits are committed without validation".to_string());
        }
        if config.lint.kind == LinterKind::Command && config.lint.extensions.is_empty() {
            warnings.push("lint.extensions is empty - the command linter will never run".to_string());
        }
        if config.editor.window_above + config.editor.window_below == 0 {
            warnings.push("editor window is a single line".to_string());
        }

        warnings
    }
}
