//! flake8 as a narrow syntax gate.

use async_trait::async_trait;

use super::{CommandLinter, Linter};
use crate::error::Result;
use crate::sandbox::Sandbox;

/// Rules that indicate a broken file rather than a style problem:
/// undefined names (F821, F822), redefinition (F831), indentation
/// (E111-E113), syntax errors (E999) and unreadable files (E902).
pub const FLAKE8_SELECT: &str = "F821,F822,F831,E111,E112,E113,E999,E902";

/// flake8 with `--isolated` so repository config cannot widen the rule set.
#[derive(Debug)]
pub struct Flake8Linter {
    inner: CommandLinter,
}

impl Flake8Linter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: CommandLinter::new(
                "flake8",
                format!("flake8 --isolated --select={FLAKE8_SELECT}"),
            )
            .with_install(Some("pip install flake8".to_string()))
            .with_extensions(vec!["py".to_string()]),
        }
    }
}

impl Default for Flake8Linter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Linter for Flake8Linter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn handles(&self, path: &str) -> bool {
        self.inner.handles(path)
    }

    async fn install(&self, sandbox: &dyn Sandbox) -> Result<()> {
        self.inner.install(sandbox).await
    }

    async fn lint(&self, sandbox: &dyn Sandbox, path: &str) -> Result<Option<String>> {
        self.inner.lint(sandbox, path).await
    }
}
