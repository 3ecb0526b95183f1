//! Test-runner output parsing.
//!
//! Two formats are understood:
//!
//! - pytest with `-rA`: short-summary lines (`PASSED path::test`,
//!   `FAILED path::test - message`) plus `___ name ___` failure sections
//! - Django's runner at verbosity 2: `test_x (mod.Case) ... ok` lines plus
//!   `FAIL: test_x (mod.Case)` tracebacks

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Outcome of a single test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Passed,
    Failed,
    Error,
    Skipped,
}

impl TestOutcome {
    /// Failures and errors both count against the edit.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Error)
    }
}

impl std::fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "PASSED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Error => write!(f, "ERROR"),
            Self::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// One parsed test result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRecord {
    pub name: String,
    pub outcome: TestOutcome,
    /// Failure output; empty for passing tests.
    pub detail: String,
}

impl TestRecord {
    pub fn new(name: impl Into<String>, outcome: TestOutcome) -> Self {
        Self {
            name: name.into(),
            outcome,
            detail: String::new(),
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

/// Parse runner output into records, in the order the runner reported them.
#[must_use]
pub fn parse_test_output(output: &str) -> Vec<TestRecord> {
    let pytest = parse_pytest(output);
    if !pytest.is_empty() {
        return pytest;
    }
    parse_django(output)
}

// ============================================================================
// pytest
// ============================================================================

fn parse_pytest(output: &str) -> Vec<TestRecord> {
    let sections = pytest_sections(output);
    let mut records = Vec::new();

    for line in output.lines() {
        let (outcome, rest) = if let Some(rest) = line.strip_prefix("PASSED ") {
            (TestOutcome::Passed, rest)
        } else if let Some(rest) = line.strip_prefix("FAILED ") {
            (TestOutcome::Failed, rest)
        } else if let Some(rest) = line.strip_prefix("ERROR ") {
            (TestOutcome::Error, rest)
        } else if let Some(rest) = line.strip_prefix("SKIPPED ") {
            (TestOutcome::Skipped, rest)
        } else {
            continue;
        };
        // unittest's closing `FAILED (failures=1)` line.
        if rest.starts_with('(') {
            continue;
        }

        let (name, message) = match rest.find(" - ") {
            Some(dash) => (rest[..dash].trim(), rest[dash + 3..].trim()),
            None => (rest.trim(), ""),
        };

        let mut record = TestRecord::new(name, outcome);
        if outcome.is_failure() {
            let detail = sections
                .get(&pytest_section_title(name))
                .cloned()
                .unwrap_or_else(|| message.to_string());
            record = record.with_detail(detail);
        }
        records.push(record);
    }

    records
}

/// `path::Class::test` -> `Class.test`, the title pytest prints above a
/// failure section.
fn pytest_section_title(node_id: &str) -> String {
    match node_id.split_once("::") {
        Some((_, rest)) => rest.replace("::", "."),
        None => node_id.to_string(),
    }
}

/// Failure and error sections keyed by their title.
fn pytest_sections(output: &str) -> HashMap<String, String> {
    let mut sections = HashMap::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in output.lines() {
        let trimmed = line.trim();
        if let Some(title) = section_header(trimmed) {
            if let Some((name, body)) = current.take() {
                sections.insert(name, join_body(&body));
            }
            current = Some((title, Vec::new()));
        } else if trimmed.starts_with("====") {
            if let Some((name, body)) = current.take() {
                sections.insert(name, join_body(&body));
            }
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }
    if let Some((name, body)) = current {
        sections.insert(name, join_body(&body));
    }

    sections
}

fn section_header(trimmed: &str) -> Option<String> {
    if !(trimmed.starts_with("___") && trimmed.ends_with("___")) {
        return None;
    }
    let title = trimmed.trim_matches('_').trim();
    if title.is_empty() {
        return None;
    }
    let title = ["ERROR at setup of ", "ERROR at teardown of ", "ERROR collecting "]
        .iter()
        .find_map(|prefix| title.strip_prefix(prefix))
        .unwrap_or(title);
    Some(title.to_string())
}

fn join_body(body: &[&str]) -> String {
    let start = body.iter().position(|l| !l.trim().is_empty()).unwrap_or(body.len());
    let end = body
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map_or(start, |i| i + 1);
    body[start..end.max(start)].join("\n")
}

// ============================================================================
// Django
// ============================================================================

/// `test_name (module.Case) ... status`, optionally followed on the same
/// line by a docstring before the dots.
const DJANGO_RESULT_PATTERN: &str =
    r"^(?P<name>\S+ \([^)]*\)).* \.\.\. (?P<status>ok|FAIL|ERROR|skipped.*|expected failure|unexpected success)\s*$";

fn django_result_line() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(DJANGO_RESULT_PATTERN).ok())
        .as_ref()
}

fn parse_django(output: &str) -> Vec<TestRecord> {
    let Some(result_line) = django_result_line() else {
        return Vec::new();
    };
    let tracebacks = django_tracebacks(output);
    let mut records = Vec::new();

    for line in output.lines() {
        let Some(caps) = result_line.captures(line) else {
            continue;
        };
        let name = &caps["name"];
        let status = &caps["status"];
        let outcome = match status {
            "ok" => TestOutcome::Passed,
            "FAIL" | "unexpected success" => TestOutcome::Failed,
            "ERROR" => TestOutcome::Error,
            _ => TestOutcome::Skipped,
        };

        let mut record = TestRecord::new(name, outcome);
        if let Some(detail) = tracebacks.get(name) {
            record = record.with_detail(detail.clone());
        }
        records.push(record);
    }

    records
}

fn django_tracebacks(output: &str) -> HashMap<String, String> {
    let mut blocks = HashMap::new();
    let lines: Vec<&str> = output.lines().collect();
    let mut i = 0;

    while i < lines.len() {
        let header = lines[i]
            .strip_prefix("FAIL: ")
            .or_else(|| lines[i].strip_prefix("ERROR: "));
        let Some(name) = header else {
            i += 1;
            continue;
        };

        // Skip the dashed rule under the header.
        let mut j = i + 1;
        if lines.get(j).is_some_and(|l| l.starts_with("----")) {
            j += 1;
        }
        let start = j;
        while j < lines.len() && !lines[j].starts_with("====") && !lines[j].starts_with("----") {
            j += 1;
        }
        blocks.insert(name.trim().to_string(), join_body(&lines[start..j]));
        i = j;
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    const PYTEST_OUTPUT: &str = "\
============================= test session starts ==============================
collected 3 items

tests/test_calc.py .F.                                                   [100%]

=================================== FAILURES ===================================
_____________________________ TestCalc.test_divide _____________________________

self = <tests.test_calc.TestCalc object at 0x7f>

    def test_divide(self):
>       assert divide(4, 2) == 3
E       assert 2.0 == 3

tests/test_calc.py:12: AssertionError
=========================== short test summary info ============================
PASSED tests/test_calc.py::test_add
FAILED tests/test_calc.py::TestCalc::test_divide - assert 2.0 == 3
PASSED tests/test_calc.py::test_sub
========================= 1 failed, 2 passed in 0.03s ==========================
";

    #[test]
    fn test_parse_pytest_summary_and_detail() {
        let records = parse_test_output(PYTEST_OUTPUT);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], TestRecord::new("tests/test_calc.py::test_add", TestOutcome::Passed));

        let failed = &records[1];
        assert_eq!(failed.name, "tests/test_calc.py::TestCalc::test_divide");
        assert_eq!(failed.outcome, TestOutcome::Failed);
        assert!(failed.detail.starts_with("self = <tests.test_calc.TestCalc"));
        assert!(failed.detail.ends_with("tests/test_calc.py:12: AssertionError"));
    }

    #[test]
    fn test_pytest_failure_without_section_uses_message() {
        let records = parse_test_output("FAILED tests/test_a.py::test_x - ValueError: boom\n");
        assert_eq!(records[0].detail, "ValueError: boom");
    }

    #[test]
    fn test_pytest_setup_error_section() {
        let output = "\
==================================== ERRORS ====================================
__________________________ ERROR at setup of test_db ___________________________
fixture 'db' not found
=========================== short test summary info ============================
ERROR tests/test_models.py::test_db
";
        let records = parse_test_output(output);
        assert_eq!(records[0].outcome, TestOutcome::Error);
        assert_eq!(records[0].detail, "fixture 'db' not found");
    }

    #[test]
    fn test_parse_django_runner() {
        let output = "\
test_create (queries.tests.ModelTests) ... ok
test_filter (queries.tests.ModelTests) ... FAIL
test_legacy (queries.tests.ModelTests) ... skipped 'no backend'

======================================================================
FAIL: test_filter (queries.tests.ModelTests)
----------------------------------------------------------------------
Traceback (most recent call last):
  File \"/testbed/tests/queries/tests.py\", line 40, in test_filter
    self.assertEqual(qs.count(), 2)
AssertionError: 1 != 2

----------------------------------------------------------------------
Ran 3 tests in 0.120s

FAILED (failures=1, skipped=1)
";
        let records = parse_test_output(output);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].outcome, TestOutcome::Passed);
        assert_eq!(records[2].outcome, TestOutcome::Skipped);

        let failed = &records[1];
        assert_eq!(failed.name, "test_filter (queries.tests.ModelTests)");
        assert!(failed.detail.starts_with("Traceback (most recent call last):"));
        assert!(failed.detail.ends_with("AssertionError: 1 != 2"));
    }

    #[test]
    fn test_unrecognized_output_yields_nothing() {
        assert!(parse_test_output("ImportError: No module named foo\n").is_empty());
    }
}
