//! Tool-call surface for an agent loop.
//!
//! Calls arrive as JSON (`{"tool": "edit_file", "args": {...}}`), are
//! dispatched to the [`Editor`], and always produce one string. Malformed
//! arguments and validation failures become `Error: ...` strings rather
//! than crashing the caller.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::edit::Editor;
use crate::error::{RepairError, Result};

fn first_line() -> usize {
    1
}

fn repo_root() -> String {
    ".".to_string()
}

/// One tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum ToolCall {
    OpenFile {
        path: String,
        #[serde(default = "first_line")]
        line_number: usize,
    },
    ViewFile {
        path: String,
        start_line: usize,
        end_line: usize,
    },
    ScrollUp,
    ScrollDown,
    ListDirectory {
        #[serde(default = "repo_root")]
        path: String,
    },
    SearchFiles {
        pattern: String,
    },
    ExplicitSearch {
        term: String,
        #[serde(default)]
        path: Option<String>,
    },
    Create {
        path: String,
        text: String,
    },
    Insert {
        path: String,
        insert_line: usize,
        new_str: String,
    },
    StrReplace {
        path: String,
        old_str: String,
        new_str: String,
    },
    EditFile {
        path: String,
        start_line: usize,
        end_line: usize,
        new_text: String,
    },
    UndoEdit {
        path: String,
    },
    ExecuteCommand {
        command: String,
    },
    AddTestFile {
        path: String,
    },
    ListTests,
    RunTests {
        #[serde(default)]
        files: Vec<String>,
    },
    DiffPatch {
        #[serde(default)]
        paths: Vec<String>,
    },
}

impl ToolCall {
    /// Parse one JSON tool call.
    ///
    /// # Errors
    ///
    /// Returns a validation error describing the malformed input.
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| RepairError::validation(format!("malformed tool call: {e}")))
    }

    /// Tool name as it appears on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenFile { .. } => "open_file",
            Self::ViewFile { .. } => "view_file",
            Self::ScrollUp => "scroll_up",
            Self::ScrollDown => "scroll_down",
            Self::ListDirectory { .. } => "list_directory",
            Self::SearchFiles { .. } => "search_files",
            Self::ExplicitSearch { .. } => "explicit_search",
            Self::Create { .. } => "create",
            Self::Insert { .. } => "insert",
            Self::StrReplace { .. } => "str_replace",
            Self::EditFile { .. } => "edit_file",
            Self::UndoEdit { .. } => "undo_edit",
            Self::ExecuteCommand { .. } => "execute_command",
            Self::AddTestFile { .. } => "add_test_file",
            Self::ListTests => "list_tests",
            Self::RunTests { .. } => "run_tests",
            Self::DiffPatch { .. } => "diff_patch",
        }
    }

    /// Whether the call can change repository files.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::Create { .. }
                | Self::Insert { .. }
                | Self::StrReplace { .. }
                | Self::EditFile { .. }
                | Self::UndoEdit { .. }
                | Self::ExecuteCommand { .. }
        )
    }
}

/// Run a call, surfacing errors to the caller.
///
/// # Errors
///
/// Returns whatever the underlying operation returned.
pub async fn try_dispatch(editor: &mut Editor, call: &ToolCall) -> Result<String> {
    if call.is_mutating() {
        info!(tool = call.name(), "Dispatching mutating tool call");
    } else {
        debug!(tool = call.name(), "Dispatching tool call");
    }
    match call {
        ToolCall::OpenFile { path, line_number } => editor.open(path, *line_number).await,
        ToolCall::ViewFile {
            path,
            start_line,
            end_line,
        } => editor.view(path, *start_line, *end_line).await,
        ToolCall::ScrollUp => editor.scroll_up().await,
        ToolCall::ScrollDown => editor.scroll_down().await,
        ToolCall::ListDirectory { path } => editor.list(path).await,
        ToolCall::SearchFiles { pattern } => editor.search_files(pattern).await,
        ToolCall::ExplicitSearch { term, path } => {
            editor.explicit_search(term, path.as_deref()).await
        }
        ToolCall::Create { path, text } => editor.create(path, text).await,
        ToolCall::Insert {
            path,
            insert_line,
            new_str,
        } => editor.insert(path, *insert_line, new_str).await,
        ToolCall::StrReplace {
            path,
            old_str,
            new_str,
        } => editor.str_replace(path, old_str, new_str).await,
        ToolCall::EditFile {
            path,
            start_line,
            end_line,
            new_text,
        } => editor.edit_file(path, *start_line, *end_line, new_text).await,
        ToolCall::UndoEdit { path } => editor.undo_edit(path).await,
        ToolCall::ExecuteCommand { command } => editor.execute_command(command).await,
        ToolCall::AddTestFile { path } => editor.add_test_file(path).await,
        ToolCall::ListTests => Ok(editor.list_tests()),
        ToolCall::RunTests { files } => editor.run_tests(files).await,
        ToolCall::DiffPatch { paths } => editor.diff_patch(paths).await,
    }
}

/// Run a call and always return a string.
pub async fn dispatch(editor: &mut Editor, call: &ToolCall) -> String {
    match try_dispatch(editor, call).await {
        Ok(output) => output,
        Err(e) => {
            if !e.is_recoverable() {
                warn!(tool = call.name(), error = %e, "Tool call failed");
            } else if !e.is_validation() {
                debug!(tool = call.name(), error = %e, "Tool call failed");
            }
            format!("Error: {e}")
        }
    }
}

// ============================================================================
// Definitions
// ============================================================================

/// A tool advertised to a model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

fn tool(name: &str, description: &str, properties: serde_json::Value, required: &[&str]) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        }),
    }
}

/// Definitions for every tool [`ToolCall`] accepts.
#[must_use]
pub fn tool_definitions() -> Vec<ToolDefinition> {
    let path = json!({"type": "string", "description": "File path relative to the repository root."});
    vec![
        tool(
            "open_file",
            "Open a file and show a window of lines around line_number.",
            json!({"path": path, "line_number": {"type": "integer", "description": "1-based line to center on. Defaults to 1."}}),
            &["path"],
        ),
        tool(
            "view_file",
            "Show an exact line range of a file without moving the open window.",
            json!({"path": path, "start_line": {"type": "integer"}, "end_line": {"type": "integer"}}),
            &["path", "start_line", "end_line"],
        ),
        tool("scroll_up", "Move the open window up by one screen.", json!({}), &[]),
        tool("scroll_down", "Move the open window down by one screen.", json!({}), &[]),
        tool(
            "list_directory",
            "List a directory.",
            json!({"path": {"type": "string", "description": "Directory relative to the repository root. Defaults to the root."}}),
            &[],
        ),
        tool(
            "search_files",
            "Find files whose name contains pattern, or matches it as a glob.",
            json!({"pattern": {"type": "string"}}),
            &["pattern"],
        ),
        tool(
            "explicit_search",
            "Search file contents for an exact term.",
            json!({"term": {"type": "string"}, "path": {"type": "string", "description": "Optional directory or file to search in."}}),
            &["term"],
        ),
        tool(
            "create",
            "Create a file, or overwrite it entirely.",
            json!({"path": path, "text": {"type": "string"}}),
            &["path", "text"],
        ),
        tool(
            "insert",
            "Insert text after insert_line (0 inserts before the first line). The file must exist.",
            json!({"path": path, "insert_line": {"type": "integer"}, "new_str": {"type": "string"}}),
            &["path", "insert_line", "new_str"],
        ),
        tool(
            "str_replace",
            "Replace the single occurrence of old_str with new_str. Fails if old_str is missing or not unique.",
            json!({"path": path, "old_str": {"type": "string"}, "new_str": {"type": "string"}}),
            &["path", "old_str", "new_str"],
        ),
        tool(
            "edit_file",
            "Replace lines start_line..end_line (inclusive) with new_text. A start_line one past the last line appends. The edit is linted before it is applied.",
            json!({"path": path, "start_line": {"type": "integer"}, "end_line": {"type": "integer"}, "new_text": {"type": "string"}}),
            &["path", "start_line", "end_line", "new_text"],
        ),
        tool(
            "undo_edit",
            "Revert the last edit made to a file.",
            json!({"path": path}),
            &["path"],
        ),
        tool(
            "execute_command",
            "Run a shell command in the repository. Long output is trimmed.",
            json!({"command": {"type": "string"}}),
            &["command"],
        ),
        tool(
            "add_test_file",
            "Register a test file to run after every edit.",
            json!({"path": path}),
            &["path"],
        ),
        tool("list_tests", "List registered test files.", json!({}), &[]),
        tool(
            "run_tests",
            "Run the given test files, or every registered one.",
            json!({"files": {"type": "array", "items": {"type": "string"}}}),
            &[],
        ),
        tool(
            "diff_patch",
            "Show the unified diff of all changes so far.",
            json!({"paths": {"type": "array", "items": {"type": "string"}}}),
            &[],
        ),
    ]
}
