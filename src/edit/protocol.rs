//! Lint-gated mutations.
//!
//! Every candidate is written to a shadow path and linted there first. The
//! real file is written at most once per accepted edit and never on a
//! rejected one. Diagnostics that were already present before the edit are
//! subtracted, so only errors the edit introduced can reject it.
//!
//! Range edits retry with a widened end line, since under-selecting the
//! range is the most common way an edit leaves a file broken. Widening only
//! ever moves the end line forward.

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::text::{count_lines, insert_after, occurrence_lines, splice, validate_range};
use super::Editor;
use crate::error::{RepairError, Result};
use crate::history::PriorState;
use crate::lint::LintBaseline;
use crate::view::{render_window, snippet};

/// One cycle of the widening loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditAttempt {
    /// 0 for the edit as requested.
    pub index: u32,
    /// End line the candidate was spliced with.
    pub end_line: usize,
    /// Full candidate file content.
    pub content: String,
    /// Diagnostics not present before the edit.
    pub new_errors: Vec<String>,
}

impl EditAttempt {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.new_errors.is_empty()
    }
}

/// Where a rejected edit landed, for the before/after report.
struct EditSite<'a> {
    path: &'a str,
    original: &'a str,
    first_line: usize,
    original_last: usize,
    candidate_last: usize,
}

impl Editor {
    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Write a whole file. Always succeeds unless the sandbox fails.
    pub async fn create(&mut self, path: &str, text: &str) -> Result<String> {
        let prior = if self.sandbox.file_exists(path).await? {
            PriorState::Content(self.sandbox.read_file(path).await?)
        } else {
            PriorState::Created
        };
        let existed = matches!(prior, PriorState::Content(_));

        self.sandbox.write_file(path, text).await?;
        self.history.push(path, prior);
        info!(path = %path, overwrite = existed, "File written");

        let mut out = if existed {
            format!("File {path} overwritten successfully.")
        } else {
            format!("File created successfully at: {path}")
        };
        out.push_str(&self.after_commit(path).await);
        Ok(out)
    }

    /// Insert `text` after line `insert_line` (0 = before the first line).
    ///
    /// # Errors
    ///
    /// Validation error if the file does not exist or the line is outside
    /// `[0, line_count]`.
    pub async fn insert(&mut self, path: &str, insert_line: usize, text: &str) -> Result<String> {
        if !self.sandbox.file_exists(path).await? {
            return Err(RepairError::validation(format!(
                "file {path} does not exist; use create to make a new file"
            )));
        }
        let original = self.sandbox.read_file(path).await?;
        let total = count_lines(&original);
        if insert_line > total {
            return Err(RepairError::validation(format!(
                "insert_line {insert_line} is out of range [0, {total}]"
            )));
        }

        let candidate = insert_after(&original, insert_line, text);
        let first = insert_line + 1;
        let last = insert_line + count_lines(text).max(1);

        if let Some(errors) = self.gate_once(path, &candidate).await? {
            let site = EditSite {
                path,
                original: &original,
                first_line: first,
                original_last: insert_line,
                candidate_last: last,
            };
            return Ok(self.rejection(&site, &errors, &candidate));
        }

        self.commit(path, &original, &candidate).await?;
        let mut out = format!("Inserted text into {path} after line {insert_line}.\n");
        out.push_str(&self.window_around(path, &candidate, first, last));
        out.push_str(&self.after_commit(path).await);
        Ok(out)
    }

    /// Replace the single occurrence of `old` with `new`.
    ///
    /// # Errors
    ///
    /// Validation error if the file does not exist, or `old` occurs zero or
    /// several times (the latter names every line it occurs on).
    pub async fn str_replace(&mut self, path: &str, old: &str, new: &str) -> Result<String> {
        if old.is_empty() {
            return Err(RepairError::validation("old_str must not be empty"));
        }
        if !self.sandbox.file_exists(path).await? {
            return Err(RepairError::validation(format!("file {path} does not exist")));
        }
        let original = self.sandbox.read_file(path).await?;

        let count = original.matches(old).count();
        if count == 0 {
            return Err(RepairError::validation(format!(
                "no replacement was performed: old_str did not appear verbatim in {path}"
            )));
        }
        if count > 1 {
            let lines = occurrence_lines(&original, old);
            return Err(RepairError::validation(format!(
                "no replacement was performed: multiple occurrences of old_str in lines {lines:?}; \
                 include more context to make it unique"
            )));
        }

        let first = occurrence_lines(&original, old).first().copied().unwrap_or(1);
        let candidate = original.replacen(old, new, 1);
        let original_last = first + old.matches('\n').count();
        let last = first + new.matches('\n').count();

        if let Some(errors) = self.gate_once(path, &candidate).await? {
            let site = EditSite {
                path,
                original: &original,
                first_line: first,
                original_last,
                candidate_last: last,
            };
            return Ok(self.rejection(&site, &errors, &candidate));
        }

        self.commit(path, &original, &candidate).await?;
        let mut out = format!("Replaced text in {path}.\n");
        out.push_str(&self.window_around(path, &candidate, first, last));
        out.push_str(&self.after_commit(path).await);
        Ok(out)
    }

    /// Replace lines `[start_line, end_line]` with `new_text`, retrying with
    /// a widened end line while the result introduces lint errors.
    ///
    /// A missing file is created with `new_text`.
    ///
    /// # Errors
    ///
    /// Validation error for an invalid range.
    pub async fn edit_file(
        &mut self,
        path: &str,
        start_line: usize,
        end_line: usize,
        new_text: &str,
    ) -> Result<String> {
        if !self.sandbox.file_exists(path).await? {
            debug!(path = %path, "Range edit on missing file; creating");
            return self.create(path, new_text).await;
        }
        let original = self.sandbox.read_file(path).await?;
        let total = count_lines(&original);
        let (start, end) = validate_range(start_line, end_line, total)?;
        let new_lines = count_lines(new_text);
        let candidate_last = (start + new_lines).saturating_sub(1).max(start);

        if !self.linter.handles(path) {
            let candidate = splice(&original, start, end, new_text);
            self.commit(path, &original, &candidate).await?;
            let mut out = edited_message(path, start, end, candidate_last);
            out.push_str(&self.window_around(path, &candidate, start, candidate_last));
            out.push_str(&self.after_commit(path).await);
            return Ok(out);
        }

        let baseline = self.baseline(path).await?;
        let attempts = self
            .widening_attempts(path, &original, start, end, total, new_text, &baseline)
            .await?;

        match attempts.iter().find(|a| a.is_clean()) {
            Some(accepted) => {
                let content = accepted.content.clone();
                self.commit(path, &original, &content).await?;

                let mut out = if accepted.index == 0 {
                    edited_message(path, start, end, candidate_last)
                } else {
                    format!(
                        "Edited {path} (lines {start}-{}; end_line widened from {end} to clear lint errors).\n",
                        accepted.end_line
                    )
                };
                out.push_str(&self.window_around(path, &content, start, candidate_last));
                out.push_str(&self.after_commit(path).await);
                Ok(out)
            }
            None => {
                // Reported against the edit as requested, not the last widening.
                let requested = attempts
                    .first()
                    .ok_or_else(|| RepairError::validation("no edit attempts were made"))?;
                info!(path = %path, attempts = attempts.len(), "Range edit rejected");
                let site = EditSite {
                    path,
                    original: &original,
                    first_line: start,
                    original_last: end,
                    candidate_last,
                };
                Ok(self.rejection(&site, &requested.new_errors, &requested.content))
            }
        }
    }

    /// Restore `path` to its state before the last recorded edit.
    pub async fn undo_edit(&mut self, path: &str) -> Result<String> {
        match self.history.pop(path) {
            None => {
                let mut out = format!("No edit history found for {path}.");
                let others = self.history.paths();
                if !others.is_empty() {
                    out.push_str(&format!(" Files with undo history: {}.", others.join(", ")));
                }
                Ok(out)
            }
            Some(PriorState::Created) => Ok(format!(
                "{path} was created in this session and has no earlier content to restore; \
                 the file was left unchanged."
            )),
            Some(PriorState::Content(content)) => {
                self.sandbox.write_file(path, &content).await?;
                info!(path = %path, "Edit undone");
                let total = count_lines(&content);
                let mut out = format!("Last edit to {path} undone successfully.\n");
                out.push_str(&render_window(
                    path,
                    &content,
                    1,
                    total.min(self.config.editor.window_span()),
                ));
                Ok(out)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Gate
    // ------------------------------------------------------------------------

    /// The bounded widening loop. Stops at the first clean attempt or when
    /// widening is clamped by the end of the file.
    #[allow(clippy::too_many_arguments)]
    async fn widening_attempts(
        &self,
        path: &str,
        original: &str,
        start: usize,
        end: usize,
        total: usize,
        new_text: &str,
        baseline: &LintBaseline,
    ) -> Result<Vec<EditAttempt>> {
        let max = self.config.editor.max_edit_retries.max(1);
        let mut attempts: Vec<EditAttempt> = Vec::new();

        for index in 0..max {
            let end_line = if total == 0 {
                end
            } else {
                (end + index as usize).min(total)
            };
            if attempts.last().is_some_and(|prev| prev.end_line == end_line) {
                break;
            }

            let content = splice(original, start, end_line, new_text);
            let new_errors = self.lint_candidate(path, &content, baseline).await?;
            debug!(path = %path, attempt = index, end_line, new_errors = new_errors.len(), "Lint attempt");

            let attempt = EditAttempt {
                index,
                end_line,
                content,
                new_errors,
            };
            let clean = attempt.is_clean();
            attempts.push(attempt);
            if clean {
                break;
            }
        }

        Ok(attempts)
    }

    /// Single-attempt gate. `Some(errors)` means reject.
    async fn gate_once(&self, path: &str, candidate: &str) -> Result<Option<Vec<String>>> {
        if !self.linter.handles(path) {
            return Ok(None);
        }
        let baseline = self.baseline(path).await?;
        let errors = self.lint_candidate(path, candidate, &baseline).await?;
        Ok(if errors.is_empty() { None } else { Some(errors) })
    }

    async fn baseline(&self, path: &str) -> Result<LintBaseline> {
        self.linter.install(self.sandbox.as_ref()).await?;
        let output = self.linter.lint(self.sandbox.as_ref(), path).await?;
        Ok(LintBaseline::from_output(output.as_deref()))
    }

    /// Shadow-write `candidate`, lint it, and return the new errors with the
    /// shadow path rewritten to the real one.
    async fn lint_candidate(
        &self,
        path: &str,
        candidate: &str,
        baseline: &LintBaseline,
    ) -> Result<Vec<String>> {
        let shadow = self.shadow_path(path);
        self.sandbox.write_file(&shadow, candidate).await?;
        let output = self.linter.lint(self.sandbox.as_ref(), &shadow).await?;
        Ok(baseline
            .new_errors(output.as_deref())
            .into_iter()
            .map(|line| line.replace(&shadow, path))
            .collect())
    }

    /// Stable per-path shadow location that keeps the file name and
    /// extension.
    pub(crate) fn shadow_path(&self, path: &str) -> String {
        let digest = hex::encode(Sha256::digest(path.as_bytes()));
        let base = path.rsplit('/').next().unwrap_or(path);
        format!(
            "{}/{}_{}",
            self.config.editor.shadow_dir.trim_end_matches('/'),
            &digest[..12],
            base
        )
    }

    // ------------------------------------------------------------------------
    // Results
    // ------------------------------------------------------------------------

    async fn commit(&mut self, path: &str, original: &str, candidate: &str) -> Result<()> {
        self.sandbox.write_file(path, candidate).await?;
        self.history.push(path, PriorState::Content(original.to_string()));
        info!(path = %path, "Edit committed");
        Ok(())
    }

    fn window_around(&self, path: &str, content: &str, first: usize, last: usize) -> String {
        let context = self.config.editor.snippet_lines;
        render_window(
            path,
            content,
            first.saturating_sub(context),
            last.max(first) + context,
        )
    }

    fn rejection(&self, site: &EditSite<'_>, errors: &[String], candidate: &str) -> String {
        let context = self.config.editor.snippet_lines;
        let mut out = format!(
            "Edit rejected: the change to {} introduces new lint errors:\n",
            site.path
        );
        for error in errors {
            out.push_str(&format!("- {error}\n"));
        }
        out.push_str("\nThis is how the edited region would have looked:\n");
        out.push_str(&snippet(candidate, site.first_line, site.candidate_last, context));
        out.push_str("\nThis is the original code:\n");
        out.push_str(&snippet(site.original, site.first_line, site.original_last, context));
        out.push_str("\nYour changes have NOT been applied. Fix the errors and try again.\n");
        out
    }
}

/// Success line for a range edit. An empty original range (`end < start`)
/// means the new text was appended.
fn edited_message(path: &str, start: usize, end: usize, candidate_last: usize) -> String {
    if end < start {
        format!("Appended to {path} (lines {start}-{candidate_last}).\n")
    } else {
        format!("Edited {path} (lines {start}-{end}).\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepairConfig;
    use crate::testing::fixtures::TestRepo;
    use crate::testing::mocks::MockLinter;

    #[tokio::test]
    async fn test_range_edit_end_to_end() {
        let repo = TestRepo::new();
        repo.write("a.py", "def f():\n    return 1\n");
        let mut editor = repo.editor_with_linter(MockLinter::new().with_undefined_name("undefined_thing"));

        let out = editor.edit_file("a.py", 2, 2, "    return 2").await.unwrap();
        assert!(out.starts_with("Edited a.py (lines 2-2)."));
        assert_eq!(repo.read("a.py"), "def f():\n    return 2\n");
        assert_eq!(editor.history().depth("a.py"), 1);
    }

    #[tokio::test]
    async fn test_widening_recovers_under_selected_range() {
        let repo = TestRepo::new();
        repo.write("b.py", "def f(x):\n    if x:\n        return 1\n    return 2\n");
        let mut editor = repo.editor_with_linter(MockLinter::new().with_indent_check());

        let out = editor.edit_file("b.py", 2, 2, "    return 3").await.unwrap();
        assert!(out.contains("end_line widened from 2 to 3"), "{out}");
        assert_eq!(repo.read("b.py"), "def f(x):\n    return 3\n    return 2\n");
    }

    #[tokio::test]
    async fn test_rejected_edit_leaves_file_untouched_and_bounds_retries() {
        let repo = TestRepo::new();
        let original = "a = 1\nb = 2\nc = 3\nd = 4\n";
        repo.write("c.py", original);
        let linter = MockLinter::new().with_indent_check();
        let calls = linter.call_counter();
        let mut editor = repo.editor_with_linter(linter);

        let out = editor.edit_file("c.py", 1, 1, "    z = 0").await.unwrap();

        assert_eq!(repo.read("c.py"), original);
        assert!(out.starts_with("Edit rejected"));
        assert!(out.contains("- c.py:1:5: E113 unexpected indentation"), "{out}");
        assert!(out.contains("Your changes have NOT been applied"));
        // Baseline plus three attempts.
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 4);
        assert_eq!(editor.history().depth("c.py"), 0);
    }

    #[tokio::test]
    async fn test_rejection_reports_original_attempt() {
        let repo = TestRepo::new();
        repo.write("d.py", "a = 1\nb = 2\nc = 3\n");
        let mut editor = repo.editor_with_linter(MockLinter::new().with_indent_check());

        let out = editor.edit_file("d.py", 1, 1, "    z = 0").await.unwrap();
        // The requested candidate still contains line 2; wider ones do not.
        assert!(out.contains("would have looked:\n1:     z = 0\n2: b = 2\n3: c = 3\n"), "{out}");
    }

    #[tokio::test]
    async fn test_preexisting_errors_do_not_block() {
        let repo = TestRepo::new();
        repo.write("e.py", "def f():\n    return legacy_name\n\nx = 1\n");
        let mut editor = repo.editor_with_linter(MockLinter::new().with_undefined_name("legacy_name"));

        editor.edit_file("e.py", 4, 4, "x = 2").await.unwrap();
        assert_eq!(repo.read("e.py"), "def f():\n    return legacy_name\n\nx = 2\n");
    }

    #[tokio::test]
    async fn test_range_edit_on_missing_file_creates_it() {
        let repo = TestRepo::new();
        let mut editor = repo.editor_with_linter(MockLinter::new().with_indent_check());

        let out = editor.edit_file("new.py", 1, 1, "x = 1\n").await.unwrap();
        assert!(out.starts_with("File created successfully at: new.py"));
        assert_eq!(repo.read("new.py"), "x = 1\n");
    }

    #[tokio::test]
    async fn test_invalid_range_is_validation_error() {
        let repo = TestRepo::new();
        repo.write("a.py", "x = 1\n");
        let mut editor = repo.editor();
        let err = editor.edit_file("a.py", 3, 1, "y").await.unwrap_err();
        assert!(err.is_validation());
        assert!(editor.edit_file("a.py", 3, 3, "y").await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_edit_one_past_last_line_appends() {
        let repo = TestRepo::new();
        repo.write("a.py", "a = 1\nb = 2\n");
        let mut editor = repo.editor_with_linter(MockLinter::new().with_indent_check());

        let out = editor.edit_file("a.py", 3, 3, "c = 3\nd = 4").await.unwrap();
        assert!(out.starts_with("Appended to a.py (lines 3-4)."), "{out}");
        assert_eq!(repo.read("a.py"), "a = 1\nb = 2\nc = 3\nd = 4\n");

        editor.undo_edit("a.py").await.unwrap();
        assert_eq!(repo.read("a.py"), "a = 1\nb = 2\n");
    }

    #[tokio::test]
    async fn test_unlintable_file_commits_unconditionally() {
        let repo = TestRepo::new();
        repo.write("notes.txt", "one\ntwo\n");
        let linter = MockLinter::new().with_indent_check();
        let calls = linter.call_counter();
        let mut editor = repo.editor_with_linter(linter);

        editor.edit_file("notes.txt", 1, 1, "    indented").await.unwrap();
        assert_eq!(repo.read("notes.txt"), "    indented\ntwo\n");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_str_replace_ambiguous_names_lines() {
        let repo = TestRepo::new();
        repo.write("f.py", "x = 1\ny = 2\n\n\n\n\nx = 1\n");
        let mut editor = repo.editor();

        let err = editor.str_replace("f.py", "x = 1", "x = 9").await.unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("lines [1, 7]"), "{err}");

        let missing = editor.str_replace("f.py", "nothing", "x").await.unwrap_err();
        assert!(missing.to_string().contains("did not appear verbatim"));
    }

    #[tokio::test]
    async fn test_str_replace_then_undo_restores_exact_content() {
        let repo = TestRepo::new();
        let original = "def f():\n    return 1\n";
        repo.write("g.py", original);
        let mut editor = repo.editor();

        let out = editor.str_replace("g.py", "return 1", "return 42").await.unwrap();
        assert!(out.contains("2:     return 42"));
        assert_eq!(repo.read("g.py"), "def f():\n    return 42\n");

        editor.undo_edit("g.py").await.unwrap();
        assert_eq!(repo.read("g.py"), original);

        let empty = editor.undo_edit("g.py").await.unwrap();
        assert_eq!(empty, "No edit history found for g.py.");
    }

    #[tokio::test]
    async fn test_undo_without_history_names_undoable_files() {
        let repo = TestRepo::new();
        repo.write("a.py", "a = 1\n");
        repo.write("b.py", "b = 1\n");
        let mut editor = repo.editor();

        editor.str_replace("b.py", "b = 1", "b = 2").await.unwrap();
        editor.str_replace("a.py", "a = 1", "a = 2").await.unwrap();

        let out = editor.undo_edit("c.py").await.unwrap();
        assert_eq!(
            out,
            "No edit history found for c.py. Files with undo history: a.py, b.py."
        );
    }

    #[tokio::test]
    async fn test_str_replace_is_lint_gated() {
        let repo = TestRepo::new();
        repo.write("h.py", "value = 1\n");
        let mut editor = repo.editor_with_linter(MockLinter::new().with_undefined_name("valeu"));

        let out = editor.str_replace("h.py", "value = 1", "value = valeu").await.unwrap();
        assert!(out.starts_with("Edit rejected"));
        assert!(out.contains("F821 undefined name 'valeu'"));
        assert_eq!(repo.read("h.py"), "value = 1\n");
    }

    #[tokio::test]
    async fn test_insert_bounds_and_placement() {
        let repo = TestRepo::new();
        repo.write("i.py", "a = 1\nb = 2\n");
        let mut editor = repo.editor();

        assert!(editor.insert("i.py", 3, "c = 3").await.unwrap_err().is_validation());
        let missing = editor.insert("nope.py", 0, "x").await.unwrap_err();
        assert!(missing.to_string().contains("use create"));

        editor.insert("i.py", 0, "import os").await.unwrap();
        editor.insert("i.py", 3, "c = 3").await.unwrap();
        assert_eq!(repo.read("i.py"), "import os\na = 1\nb = 2\nc = 3\n");

        editor.undo_edit("i.py").await.unwrap();
        assert_eq!(repo.read("i.py"), "import os\na = 1\nb = 2\n");
    }

    #[tokio::test]
    async fn test_undo_after_create() {
        let repo = TestRepo::new();
        let mut editor = repo.editor();

        editor.create("fresh.py", "x = 1\n").await.unwrap();
        let out = editor.undo_edit("fresh.py").await.unwrap();
        assert!(out.contains("left unchanged"));
        assert_eq!(repo.read("fresh.py"), "x = 1\n");

        editor.create("fresh.py", "x = 2\n").await.unwrap();
        editor.undo_edit("fresh.py").await.unwrap();
        assert_eq!(repo.read("fresh.py"), "x = 1\n");
    }

    #[tokio::test]
    async fn test_edit_registers_and_runs_related_tests() {
        let repo = TestRepo::new();
        repo.write("pkg/calc.py", "def add(a, b):\n    return a + b\n");
        repo.write("tests/test_calc.py", "");
        repo.write("runner.sh", "echo \"PASSED $1::test_add\"\n");
        let mut config = RepairConfig::default();
        config.tests.command = "sh runner.sh".to_string();
        let mut editor = repo.editor_with(config);

        let out = editor.edit_file("pkg/calc.py", 2, 2, "    return b + a").await.unwrap();
        assert_eq!(editor.registry().files(), ["tests/test_calc.py"]);
        assert!(out.ends_with("Test results: 1 passed, 0 failed\n"), "{out}");
    }

    #[test]
    fn test_shadow_path_is_stable_and_keeps_extension() {
        let repo = TestRepo::new();
        let editor = repo.editor();
        let a = editor.shadow_path("pkg/mod.py");
        assert_eq!(a, editor.shadow_path("pkg/mod.py"));
        assert_ne!(a, editor.shadow_path("other/mod.py"));
        assert!(a.ends_with("_mod.py"));
    }
}
