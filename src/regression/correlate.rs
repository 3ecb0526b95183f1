//! Source-to-test correlation.
//!
//! Given an edited source file, find the test file most likely to exercise
//! it. Candidates come from three naming conventions; when several match, the
//! one closest in the directory tree wins.

use std::path::{Component, Path};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;

use crate::error::{RepairError, Result};
use crate::sandbox::Sandbox;

/// Command listing every tracked-looking file relative to the repository root.
const LIST_FILES_COMMAND: &str = "find . -type f -not -path './.git/*'";

/// Whether `path` already looks like a test.
#[must_use]
pub fn is_test_path(path: &str) -> bool {
    path.contains("test")
}

/// Glob patterns naming tests for `path`:
/// `test_<name>`, `<stem>_test.<ext>` and `<stem>/tests.<ext>`.
#[must_use]
pub fn candidate_patterns(path: &str) -> Vec<String> {
    let source = Path::new(path);
    let Some(file_name) = source.file_name().and_then(|n| n.to_str()) else {
        return Vec::new();
    };
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    let ext = source.extension().and_then(|e| e.to_str()).unwrap_or("py");

    vec![
        format!("**/test_{}", globset::escape(file_name)),
        format!("**/{}_test.{}", globset::escape(stem), globset::escape(ext)),
        format!("**/{}/tests.{}", globset::escape(stem), globset::escape(ext)),
    ]
}

fn build_matcher(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| RepairError::validation(format!("bad test pattern {pattern}: {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RepairError::validation(format!("bad test patterns: {e}")))
}

/// Number of leading directory components two paths share.
fn shared_prefix_len(a: &Path, b: &Path) -> usize {
    let normal = |p: &Path| -> Vec<String> {
        p.components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect()
    };
    normal(a)
        .iter()
        .zip(normal(b).iter())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Pick the candidate whose directory shares the longest prefix with the
/// source's directory. Ties go to the earliest candidate.
#[must_use]
pub fn select_closest(source: &str, candidates: &[String]) -> Option<String> {
    let source_dir = Path::new(source).parent().unwrap_or_else(|| Path::new(""));

    let mut best: Option<(&String, usize)> = None;
    for candidate in candidates {
        let dir = Path::new(candidate).parent().unwrap_or_else(|| Path::new(""));
        let score = shared_prefix_len(source_dir, dir);
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }
    best.map(|(c, _)| c.clone())
}

/// Files in `listing` matching any candidate pattern for `path`, in listing
/// order.
///
/// # Errors
///
/// Returns an error only if a pattern cannot be compiled.
pub fn matching_tests(path: &str, listing: &[String]) -> Result<Vec<String>> {
    let matcher = build_matcher(&candidate_patterns(path))?;
    Ok(listing
        .iter()
        .filter(|f| matcher.is_match(f.as_str()))
        .cloned()
        .collect())
}

/// All regular files in the sandbox repository, relative to its root.
///
/// # Errors
///
/// Returns a sandbox error if listing fails.
pub async fn list_repository_files(sandbox: &dyn Sandbox) -> Result<Vec<String>> {
    let listing = sandbox.execute(LIST_FILES_COMMAND).await?;
    Ok(listing
        .lines()
        .map(|l| l.trim().trim_start_matches("./").to_string())
        .filter(|l| !l.is_empty())
        .collect())
}

/// Find the test file most related to `path`.
///
/// A path that already looks like a test is its own answer.
///
/// # Errors
///
/// Returns a sandbox error if the repository cannot be listed.
pub async fn find_related_test_file(sandbox: &dyn Sandbox, path: &str) -> Result<Option<String>> {
    if is_test_path(path) {
        return Ok(Some(path.to_string()));
    }

    let listing = list_repository_files(sandbox).await?;
    let matches = matching_tests(path, &listing)?;
    debug!(path = %path, candidates = matches.len(), "Correlating test files");

    Ok(match matches.len() {
        0 => None,
        1 => matches.into_iter().next(),
        _ => select_closest(path, &matches),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::LocalSandbox;
    use tempfile::TempDir;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_candidate_patterns() {
        assert_eq!(
            candidate_patterns("pkg/foo.py"),
            strings(&["**/test_foo.py", "**/foo_test.py", "**/foo/tests.py"])
        );
    }

    #[test]
    fn test_matching_conventions() {
        let listing = strings(&[
            "pkg/foo.py",
            "tests/test_foo.py",
            "pkg/foo_test.py",
            "tests/foo/tests.py",
            "tests/test_foobar.py",
            "test_foo.py",
        ]);
        assert_eq!(
            matching_tests("pkg/foo.py", &listing).unwrap(),
            strings(&["tests/test_foo.py", "pkg/foo_test.py", "tests/foo/tests.py", "test_foo.py"])
        );
    }

    #[test]
    fn test_select_closest_prefers_longest_shared_directory() {
        let candidates = strings(&["tests/test_foo.py", "lib/core/tests/test_foo.py"]);
        assert_eq!(
            select_closest("lib/core/foo.py", &candidates),
            Some("lib/core/tests/test_foo.py".to_string())
        );
    }

    #[test]
    fn test_select_closest_ties_go_to_first() {
        let candidates = strings(&["a/test_foo.py", "b/test_foo.py"]);
        assert_eq!(
            select_closest("src/foo.py", &candidates),
            Some("a/test_foo.py".to_string())
        );
    }

    #[test]
    fn test_shared_prefix_is_component_wise() {
        assert_eq!(shared_prefix_len(Path::new("lib/core"), Path::new("lib/corex")), 1);
        assert_eq!(shared_prefix_len(Path::new("lib/core"), Path::new("lib/core/tests")), 2);
    }

    #[tokio::test]
    async fn test_find_related_single_and_multiple() {
        let temp = TempDir::new().unwrap();
        for file in ["src/foo.py", "tests/test_foo.py", "src/bar.py", "src/bar_test.py", "tests/test_bar.py"] {
            let path = temp.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "").unwrap();
        }
        let sb = LocalSandbox::new(temp.path()).unwrap();

        assert_eq!(
            find_related_test_file(&sb, "src/foo.py").await.unwrap(),
            Some("tests/test_foo.py".to_string())
        );
        assert_eq!(
            find_related_test_file(&sb, "src/bar.py").await.unwrap(),
            Some("src/bar_test.py".to_string())
        );
        assert_eq!(find_related_test_file(&sb, "src/baz.py").await.unwrap(), None);
        assert_eq!(
            find_related_test_file(&sb, "tests/test_bar.py").await.unwrap(),
            Some("tests/test_bar.py".to_string())
        );
    }
}
