//! Pure line-addressed text operations.

use crate::error::{RepairError, Result};

/// Replace lines `[start, end]` (1-indexed, inclusive) with `replacement`.
///
/// `end < start` inserts before `start` without removing anything. Bounds are
/// clamped to the content. A trailing newline on the original is kept.
#[must_use]
pub fn splice(content: &str, start: usize, end: usize, replacement: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start_idx = start.saturating_sub(1).min(lines.len());
    let end_idx = end.min(lines.len()).max(start_idx);

    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + 1);
    out.extend_from_slice(&lines[..start_idx]);
    out.extend(replacement.lines());
    out.extend_from_slice(&lines[end_idx..]);

    let mut result = out.join("\n");
    let keep_newline = content.is_empty() || content.ends_with('\n');
    if keep_newline && !result.is_empty() {
        result.push('\n');
    }
    result
}

/// Insert `text` after line `after` (0 = before the first line).
#[must_use]
pub fn insert_after(content: &str, after: usize, text: &str) -> String {
    splice(content, after + 1, after, text)
}

/// 1-indexed line numbers on which `needle` starts, deduplicated.
#[must_use]
pub fn occurrence_lines(content: &str, needle: &str) -> Vec<usize> {
    let mut lines: Vec<usize> = content
        .match_indices(needle)
        .map(|(idx, _)| content[..idx].matches('\n').count() + 1)
        .collect();
    lines.dedup();
    lines
}

/// Line count as the editor addresses lines.
#[must_use]
pub fn count_lines(text: &str) -> usize {
    text.lines().count()
}

/// Check a `[start, end]` range against a file of `total` lines and clamp
/// `end` to the file.
///
/// # Errors
///
/// Returns a validation error for a zero or inverted range, or a start more
/// than one line past the end of a non-empty file. `start == total + 1`
/// appends, and the returned `end` is then `total`.
pub fn validate_range(start: usize, end: usize, total: usize) -> Result<(usize, usize)> {
    if start == 0 {
        return Err(RepairError::validation("start_line must be at least 1"));
    }
    if end < start {
        return Err(RepairError::validation(format!(
            "end_line ({end}) must not be before start_line ({start})"
        )));
    }
    if total > 0 && start > total + 1 {
        return Err(RepairError::validation(format!(
            "start_line ({start}) is past the end of the file ({total} lines); \
             use start_line {} to append",
            total + 1
        )));
    }
    Ok((start, if total == 0 { end } else { end.min(total) }))
}
