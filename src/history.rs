//! Per-file undo ledger.

use std::collections::HashMap;

/// What a file looked like before one recorded edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriorState {
    /// Exact prior content.
    Content(String),
    /// The file did not exist; the edit created it.
    Created,
}

/// Map from path to a stack of prior states, most recent last.
///
/// There is no ordering across files: undo is always per path.
#[derive(Debug, Clone, Default)]
pub struct EditHistory {
    stacks: HashMap<String, Vec<PriorState>>,
}

impl EditHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the state of `path` before an edit.
    pub fn push(&mut self, path: &str, prior: PriorState) {
        self.stacks.entry(path.to_string()).or_default().push(prior);
    }

    /// Remove and return the most recent prior state of `path`.
    pub fn pop(&mut self, path: &str) -> Option<PriorState> {
        let stack = self.stacks.get_mut(path)?;
        let prior = stack.pop();
        if stack.is_empty() {
            self.stacks.remove(path);
        }
        prior
    }

    /// Number of undoable edits for `path`.
    #[must_use]
    pub fn depth(&self, path: &str) -> usize {
        self.stacks.get(path).map_or(0, Vec::len)
    }

    /// Paths with at least one undoable edit.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.stacks.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}
