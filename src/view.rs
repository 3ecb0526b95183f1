//! Windowed, line-numbered navigation over files in the sandbox.
//!
//! The viewer keeps one [`CurrentWindow`]: the file that is "open" and the
//! anchor line the window was derived from. Scrolling re-opens the window
//! so that it starts on the last line of the previous one (or ends on its
//! first line when scrolling up). Consecutive windows share one line and
//! never skip content, even when the first window was clamped at the top.

use crate::error::Result;
use crate::sandbox::Sandbox;

/// The file and line the caller is currently looking at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentWindow {
    pub path: String,
    pub line: usize,
}

/// Asymmetric window size around the anchor line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBuffer {
    pub above: usize,
    pub below: usize,
}

impl WindowBuffer {
    #[must_use]
    pub fn new(above: usize, below: usize) -> Self {
        Self { above, below }
    }

    /// Number of lines in a full window.
    #[must_use]
    pub fn span(&self) -> usize {
        self.above + self.below + 1
    }

    /// 1-indexed inclusive bounds of the window anchored at `line`, plus
    /// the anchor after clamping to the file.
    #[must_use]
    pub fn bounds(&self, line: usize, total: usize) -> (usize, usize, usize) {
        let anchor = line.clamp(1, total.max(1));
        let start = anchor.saturating_sub(self.above).max(1);
        let end = (anchor + self.below).min(total);
        (start, end, anchor)
    }
}

impl Default for WindowBuffer {
    fn default() -> Self {
        Self::new(5, 95)
    }
}

/// Render `[start, end]` of `content` with a header and truncation markers.
///
/// Out-of-range bounds are clamped to the file.
#[must_use]
pub fn render_window(path: &str, content: &str, start: usize, end: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let total = lines.len();
    let start = start.max(1);
    let end = end.min(total);

    let mut out = format!("[File: {} ({} lines total)]\n", path, total);
    if start > 1 {
        out.push_str(&format!("({} more lines above)\n", (start - 1).min(total)));
    }
    out.push_str(&numbered_lines(&lines, start, end));
    if end < total {
        out.push_str(&format!("({} more lines below)\n", total - end));
    } else {
        out.push_str("(end of file)\n");
    }
    out
}

/// `"{n}: {text}"` for each line in `[start, end]`.
pub(crate) fn numbered_lines(lines: &[&str], start: usize, end: usize) -> String {
    let mut out = String::new();
    if start == 0 || start > end {
        return out;
    }
    for (idx, text) in lines.iter().enumerate().take(end).skip(start - 1) {
        out.push_str(&format!("{}: {}\n", idx + 1, text));
    }
    out
}

/// Numbered lines `[first - context, last + context]`, clamped to the file.
#[must_use]
pub fn snippet(content: &str, first: usize, last: usize, context: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = first.saturating_sub(context).max(1);
    let end = (last.max(first) + context).min(lines.len());
    numbered_lines(&lines, start, end)
}

/// Number of lines as the viewer counts them.
#[must_use]
pub fn line_count(content: &str) -> usize {
    content.lines().count()
}

// ============================================================================
// Viewer
// ============================================================================

/// Navigation state for one session.
#[derive(Debug, Clone, Default)]
pub struct Viewer {
    buffer: WindowBuffer,
    window: Option<CurrentWindow>,
}

impl Viewer {
    #[must_use]
    pub fn new(buffer: WindowBuffer) -> Self {
        Self {
            buffer,
            window: None,
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<&CurrentWindow> {
        self.window.as_ref()
    }

    #[must_use]
    pub fn buffer(&self) -> WindowBuffer {
        self.buffer
    }

    /// Forget the open window.
    pub fn reset(&mut self) {
        self.window = None;
    }

    /// Show `[start_line, end_line]` of `path` without moving the window.
    ///
    /// # Errors
    ///
    /// Only sandbox failures are errors; a missing file is a message.
    pub async fn view(
        &self,
        sandbox: &dyn Sandbox,
        path: &str,
        start_line: usize,
        end_line: usize,
    ) -> Result<String> {
        if !sandbox.file_exists(path).await? {
            return Ok(missing_file(path));
        }
        let content = sandbox.read_file(path).await?;
        Ok(render_window(path, &content, start_line, end_line))
    }

    /// Open `path` with the window anchored at `line_number`.
    ///
    /// # Errors
    ///
    /// Only sandbox failures are errors; a missing file is a message.
    pub async fn open(
        &mut self,
        sandbox: &dyn Sandbox,
        path: &str,
        line_number: usize,
    ) -> Result<String> {
        if !sandbox.file_exists(path).await? {
            return Ok(missing_file(path));
        }
        let content = sandbox.read_file(path).await?;
        let (start, end, anchor) = self.buffer.bounds(line_number, line_count(&content));

        self.window = Some(CurrentWindow {
            path: path.to_string(),
            line: anchor,
        });
        Ok(render_window(path, &content, start, end))
    }

    /// Move the window down so it starts on the current last line.
    ///
    /// # Errors
    ///
    /// Only sandbox failures are errors.
    pub async fn scroll_down(&mut self, sandbox: &dyn Sandbox) -> Result<String> {
        let Some(window) = self.window.clone() else {
            return Ok(NO_WINDOW.to_string());
        };
        if !sandbox.file_exists(&window.path).await? {
            return Ok(missing_file(&window.path));
        }
        let total = line_count(&sandbox.read_file(&window.path).await?);
        let (_, end, _) = self.buffer.bounds(window.line, total);
        if end >= total {
            return Ok(format!(
                "Already at the end of {}; cannot scroll down.",
                window.path
            ));
        }

        self.open(sandbox, &window.path, end + self.buffer.above)
            .await
    }

    /// Move the window up so it ends on the current first line.
    ///
    /// # Errors
    ///
    /// Only sandbox failures are errors.
    pub async fn scroll_up(&mut self, sandbox: &dyn Sandbox) -> Result<String> {
        let Some(window) = self.window.clone() else {
            return Ok(NO_WINDOW.to_string());
        };
        if !sandbox.file_exists(&window.path).await? {
            return Ok(missing_file(&window.path));
        }
        let total = line_count(&sandbox.read_file(&window.path).await?);
        let (start, _, _) = self.buffer.bounds(window.line, total);
        if start <= 1 {
            return Ok(format!(
                "Already at the top of {}; cannot scroll up.",
                window.path
            ));
        }

        let anchor = start.saturating_sub(self.buffer.below).max(1);
        self.open(sandbox, &window.path, anchor).await
    }
}

const NO_WINDOW: &str = "No file is open. Use open_file first.";

fn missing_file(path: &str) -> String {
    format!("Error: file {} does not exist.", path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::LocalSandbox;
    use tempfile::TempDir;

    fn numbered(n: usize) -> String {
        (1..=n).map(|i| format!("line {i}\n")).collect()
    }

    fn first_line_number(rendered: &str) -> usize {
        rendered
            .lines()
            .find_map(|l| l.split_once(": line ").map(|(n, _)| n.parse().unwrap()))
            .unwrap()
    }

    #[test]
    fn test_render_window_markers() {
        let out = render_window("a.py", &numbered(10), 3, 5);
        assert_eq!(
            out,
            "[File: a.py (10 lines total)]\n\
             (2 more lines above)\n\
             3: line 3\n4: line 4\n5: line 5\n\
             (5 more lines below)\n"
        );
    }

    fn shown_lines(rendered: &str) -> Vec<usize> {
        rendered
            .lines()
            .filter_map(|l| l.split_once(": line ").map(|(n, _)| n.parse().unwrap()))
            .collect()
    }

    #[test]
    fn test_render_window_past_end_counts_only_real_lines() {
        let out = render_window("a.py", &numbered(3), 10, 12);
        assert_eq!(
            out,
            "[File: a.py (3 lines total)]\n(3 more lines above)\n(end of file)\n"
        );
    }

    #[test]
    fn test_render_window_end_of_file() {
        let out = render_window("a.py", &numbered(3), 1, 10);
        assert!(!out.contains("more lines above"));
        assert!(out.ends_with("3: line 3\n(end of file)\n"));
    }

    #[test]
    fn test_snippet_context_is_clamped() {
        assert_eq!(snippet(&numbered(10), 2, 2, 4), "1: line 1\n2: line 2\n3: line 3\n4: line 4\n5: line 5\n6: line 6\n");
        assert_eq!(snippet(&numbered(3), 3, 3, 1), "2: line 2\n3: line 3\n");
        assert_eq!(snippet("", 1, 1, 4), "");
    }

    #[test]
    fn test_bounds_clamp_anchor() {
        let buffer = WindowBuffer::default();
        assert_eq!(buffer.bounds(0, 50), (1, 50, 1));
        assert_eq!(buffer.bounds(500, 50), (45, 50, 50));
        assert_eq!(buffer.bounds(20, 300), (15, 115, 20));
        assert_eq!(buffer.bounds(1, 0), (1, 0, 1));
    }

    #[tokio::test]
    async fn test_open_first_line_of_short_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.py"), numbered(50)).unwrap();
        let sb = LocalSandbox::new(temp.path()).unwrap();
        let mut viewer = Viewer::default();

        let out = viewer.open(&sb, "a.py", 1).await.unwrap();
        assert!(out.contains("1: line 1\n"));
        assert!(out.contains("50: line 50\n"));
        assert!(out.ends_with("(end of file)\n"));
        assert!(!out.contains("more lines above"));
        assert_eq!(
            viewer.current(),
            Some(&CurrentWindow {
                path: "a.py".into(),
                line: 1
            })
        );
    }

    #[tokio::test]
    async fn test_consecutive_scrolls_advance_by_span_minus_one() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("big.py"), numbered(1000)).unwrap();
        let sb = LocalSandbox::new(temp.path()).unwrap();
        let mut viewer = Viewer::default();
        let span = viewer.buffer().span();

        viewer.open(&sb, "big.py", 300).await.unwrap();
        let first = first_line_number(&viewer.scroll_down(&sb).await.unwrap());
        let second = first_line_number(&viewer.scroll_down(&sb).await.unwrap());
        assert_eq!(second - first, span - 1);

        let back = first_line_number(&viewer.scroll_up(&sb).await.unwrap());
        assert_eq!(back, first);
    }

    #[tokio::test]
    async fn test_scroll_after_open_at_top_shows_every_line() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("big.py"), numbered(1000)).unwrap();
        let sb = LocalSandbox::new(temp.path()).unwrap();
        let mut viewer = Viewer::default();

        let first = shown_lines(&viewer.open(&sb, "big.py", 1).await.unwrap());
        let second = shown_lines(&viewer.scroll_down(&sb).await.unwrap());
        assert_eq!(first.last(), Some(&96));
        assert_eq!(second.first(), Some(&96));

        let third = shown_lines(&viewer.scroll_down(&sb).await.unwrap());
        assert_eq!(third.first(), second.last());

        let mut seen: Vec<usize> = first.iter().chain(&second).chain(&third).copied().collect();
        seen.sort_unstable();
        seen.dedup();
        let expected: Vec<usize> = (1..=*third.last().unwrap()).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_scroll_up_ends_on_previous_first_line() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("big.py"), numbered(1000)).unwrap();
        let sb = LocalSandbox::new(temp.path()).unwrap();
        let mut viewer = Viewer::default();

        let opened = shown_lines(&viewer.open(&sb, "big.py", 150).await.unwrap());
        assert_eq!(opened.first(), Some(&145));

        let up = shown_lines(&viewer.scroll_up(&sb).await.unwrap());
        assert_eq!(up.first(), Some(&45));
        assert_eq!(up.last(), Some(&145));

        let top = shown_lines(&viewer.scroll_up(&sb).await.unwrap());
        assert_eq!(top.first(), Some(&1));
        assert!(*top.last().unwrap() >= 45);
    }

    #[tokio::test]
    async fn test_scroll_limits_and_missing_window() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.py"), numbered(20)).unwrap();
        let sb = LocalSandbox::new(temp.path()).unwrap();
        let mut viewer = Viewer::default();

        assert_eq!(viewer.scroll_down(&sb).await.unwrap(), NO_WINDOW);

        viewer.open(&sb, "a.py", 3).await.unwrap();
        assert!(viewer.scroll_down(&sb).await.unwrap().starts_with("Already at the end"));
        assert!(viewer.scroll_up(&sb).await.unwrap().starts_with("Already at the top"));

        viewer.reset();
        assert_eq!(viewer.scroll_up(&sb).await.unwrap(), NO_WINDOW);
    }

    #[tokio::test]
    async fn test_missing_file_is_a_message() {
        let temp = TempDir::new().unwrap();
        let sb = LocalSandbox::new(temp.path()).unwrap();
        let mut viewer = Viewer::default();

        let out = viewer.open(&sb, "nope.py", 1).await.unwrap();
        assert!(out.contains("does not exist"));
        assert!(viewer.current().is_none());
    }
}
