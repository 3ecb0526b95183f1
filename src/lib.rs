//! repairkit - sandboxed, lint-gated code editing for repair agents.
//!
//! An agent asks for an edit; the editor applies it to a shadow copy inside
//! an isolated sandbox, lints it, subtracts diagnostics that were already
//! there, and only then commits it to the real file. Around that core it
//! keeps a navigable view window, a per-file undo ledger, and a registry of
//! regression tests correlated with the files being edited.
//!
//! # Architecture
//!
//! - [`sandbox`] - execution contexts (Docker container or host directory)
//! - [`lint`] - pluggable lint gates (flake8, custom command, none)
//! - [`view`] - windowed, line-numbered file navigation
//! - [`edit`] - the editing session and its lint-gated mutations
//! - [`history`] - per-file undo ledger
//! - [`regression`] - test correlation, execution, and summaries
//! - [`tools`] - JSON tool-call surface over the editor
//! - [`config`] - layered TOML configuration and validation
//! - [`error`] - error types
//! - [`testing`] - mocks and fixtures
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use repairkit::{Editor, RepairConfig, linter_from_config};
//! use repairkit::sandbox::{DockerSandbox, SandboxSpec};
//!
//! let config = RepairConfig::load(std::path::Path::new("."))?;
//! let sandbox = DockerSandbox::create(&SandboxSpec::from_config(&config.sandbox)).await?;
//! let linter = linter_from_config(&config.lint);
//! let mut editor = Editor::new(Arc::new(sandbox), linter, config);
//!
//! println!("{}", editor.open("django/db/models/query.py", 120).await?);
//! println!("{}", editor.edit_file("django/db/models/query.py", 124, 125, "        return qs\n").await?);
//! let patch = editor.final_patch().await?;
//! editor.close().await?;
//! ```

pub mod config;
pub mod edit;
pub mod error;
pub mod history;
pub mod lint;
pub mod regression;
pub mod sandbox;
pub mod testing;
pub mod tools;
pub mod view;

// Re-export commonly used types
pub use error::{IntoRepairError, RepairError, Result};

pub use config::{ConfigValidator, RepairConfig, ValidationReport};

pub use edit::{EditAttempt, Editor};

pub use history::{EditHistory, PriorState};

pub use lint::{linter_from_config, Diagnostic, LintBaseline, Linter, NullLinter};

pub use regression::{summarize, TestCommand, TestFileRegistry, TestOutcome, TestRecord};

pub use sandbox::{
    CommandOutput, ContainerStatus, DockerSandbox, ExecOptions, LocalSandbox, Sandbox, SandboxSpec,
};

pub use tools::{dispatch, tool_definitions, try_dispatch, ToolCall, ToolDefinition};

pub use view::{CurrentWindow, Viewer, WindowBuffer};
