//! Testing infrastructure for repairkit.
//!
//! - **Mocks**: a rule-based [`MockLinter`] and a command-recording
//!   [`RecordingSandbox`]
//! - **Fixtures**: temporary repositories wired to an editor (test-only)
//!
//! # Example
//!
//! The mocks are public, so an editor can be driven against a real checkout
//! with a rule-based linter. The `TestRepo` fixture is only compiled for
//! this crate's own unit tests.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use repairkit::sandbox::LocalSandbox;
//! use repairkit::testing::MockLinter;
//! use repairkit::{Editor, RepairConfig};
//!
//! # async fn demo() -> repairkit::Result<()> {
//! let sandbox = LocalSandbox::new("/path/to/checkout")?;
//! let linter = MockLinter::new().with_indent_check();
//! let mut editor = Editor::new(Arc::new(sandbox), Box::new(linter), RepairConfig::default());
//! editor.edit_file("a.py", 2, 2, "    return 2").await?;
//! # Ok(())
//! # }
//! ```

#[cfg(test)]
pub mod fixtures;
pub mod mocks;

#[cfg(test)]
pub use fixtures::*;
pub use mocks::*;
