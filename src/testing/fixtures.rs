//! Test fixtures for creating reproducible repositories.
//!
//! A [`TestRepo`] is a temporary directory served through a
//! [`LocalSandbox`], plus a separate temporary directory for lint shadow
//! files so they never show up in listings or diffs.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tempfile::TempDir;

use crate::config::RepairConfig;
use crate::edit::Editor;
use crate::lint::{Linter, NullLinter};
use crate::sandbox::LocalSandbox;

/// A temporary repository. Cleaned up when dropped.
pub struct TestRepo {
    root: TempDir,
    shadow: TempDir,
}

impl TestRepo {
    /// Create an empty repository directory.
    ///
    /// # Panics
    ///
    /// Panics if temporary directory creation fails.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: TempDir::new().expect("Failed to create temp directory"),
            shadow: TempDir::new().expect("Failed to create shadow directory"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Write a file relative to the root, creating parent directories.
    ///
    /// # Panics
    ///
    /// Panics if the write fails.
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Read a file relative to the root.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be read.
    #[must_use]
    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.root.path().join(relative)).expect("Failed to read file")
    }

    /// Initialize git and commit everything currently present.
    ///
    /// # Panics
    ///
    /// Panics if any git command fails.
    pub fn git_init(&self) {
        for args in [
            vec!["init", "-q"],
            vec!["config", "user.email", "test@example.com"],
            vec!["config", "user.name", "Test"],
            vec!["add", "-A"],
            vec!["commit", "-q", "-m", "initial"],
        ] {
            let status = Command::new("git")
                .args(&args)
                .current_dir(self.root.path())
                .status()
                .expect("Failed to run git");
            assert!(status.success(), "git {:?} failed", args);
        }
    }

    /// A sandbox over the repository.
    ///
    /// # Panics
    ///
    /// Panics if the sandbox cannot bind the directory.
    #[must_use]
    pub fn sandbox(&self) -> LocalSandbox {
        LocalSandbox::new(self.root.path()).expect("Failed to create local sandbox")
    }

    /// Default configuration with shadow files kept out of the repository.
    #[must_use]
    pub fn config(&self) -> RepairConfig {
        let mut config = RepairConfig::default();
        config.editor.shadow_dir = self.shadow.path().display().to_string();
        config
    }

    /// Editor with no linter and default configuration.
    #[must_use]
    pub fn editor(&self) -> Editor {
        self.editor_with(self.config())
    }

    /// Editor with no linter and the given configuration (shadow directory
    /// is always redirected).
    #[must_use]
    pub fn editor_with(&self, mut config: RepairConfig) -> Editor {
        config.editor.shadow_dir = self.shadow.path().display().to_string();
        Editor::new(Arc::new(self.sandbox()), Box::new(NullLinter), config)
    }

    /// Editor with `linter` and default configuration.
    #[must_use]
    pub fn editor_with_linter(&self, linter: impl Linter + 'static) -> Editor {
        Editor::new(Arc::new(self.sandbox()), Box::new(linter), self.config())
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}
