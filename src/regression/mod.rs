//! Regression test correlation and execution.
//!
//! - [`correlate`] - associate a source file with its most relevant test file
//! - [`command`] - turn test files into a runner invocation
//! - [`parser`] - turn runner output into [`TestRecord`]s
//!
//! Test runs never fail on test failures: a red test is an expected outcome,
//! reported through [`summarize`].

pub mod command;
pub mod correlate;
pub mod parser;

pub use command::TestCommand;
pub use correlate::{find_related_test_file, is_test_path};
pub use parser::{parse_test_output, TestOutcome, TestRecord};

use std::time::Duration;

use tracing::{debug, info};

use crate::config::TestsConfig;
use crate::error::Result;
use crate::sandbox::{ExecOptions, Sandbox};

// ============================================================================
// Registry
// ============================================================================

/// Ordered, duplicate-free set of test files relevant to the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestFileRegistry {
    files: Vec<String>,
}

impl TestFileRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `path` unless already present. Returns whether it was added.
    pub fn register(&mut self, path: impl Into<String>) -> bool {
        let path = path.into();
        if self.files.contains(&path) {
            return false;
        }
        self.files.push(path);
        true
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.files.iter().any(|f| f == path)
    }

    /// Registered files in insertion order.
    #[must_use]
    pub fn files(&self) -> &[String] {
        &self.files
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

// ============================================================================
// Running
// ============================================================================

/// Bounds on summary size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryLimits {
    /// Failing tests shown in full.
    pub max_failures: usize,
    /// Lines of detail per failing test.
    pub max_lines: usize,
}

impl Default for SummaryLimits {
    fn default() -> Self {
        Self {
            max_failures: 5,
            max_lines: 10,
        }
    }
}

impl From<&TestsConfig> for SummaryLimits {
    fn from(config: &TestsConfig) -> Self {
        Self {
            max_failures: config.max_failures_shown,
            max_lines: config.failure_lines,
        }
    }
}

/// Run each test file and collect parsed records.
///
/// A file whose output yields no records but whose run failed (import
/// error, timeout, missing runner) is reported as a single error record
/// named after the file.
///
/// # Errors
///
/// Returns a sandbox error only if a command cannot be launched.
pub async fn run_tests(
    sandbox: &dyn Sandbox,
    command: &TestCommand,
    files: &[String],
    timeout: Duration,
) -> Result<Vec<TestRecord>> {
    let mut records = Vec::new();
    let opts = ExecOptions::lenient().with_timeout(timeout);

    for file in files {
        let invocation = command.build(std::slice::from_ref(file));
        info!(file = %file, "Running tests");
        let result = sandbox.run(&invocation, &opts).await?;

        let parsed = parse_test_output(&result.output);
        debug!(file = %file, records = parsed.len(), exit_code = result.exit_code, "Tests finished");

        if parsed.is_empty() && !result.success() {
            records.push(
                TestRecord::new(file.clone(), TestOutcome::Error).with_detail(result.output),
            );
        } else {
            records.extend(parsed);
        }
    }

    Ok(records)
}

/// Human-readable pass/fail summary with bounded failure detail.
#[must_use]
pub fn summarize(records: &[TestRecord], limits: SummaryLimits) -> String {
    if records.is_empty() {
        return "Test results: no tests were run.".to_string();
    }

    let passed = records.iter().filter(|r| r.outcome == TestOutcome::Passed).count();
    let skipped = records.iter().filter(|r| r.outcome == TestOutcome::Skipped).count();
    let failures: Vec<&TestRecord> = records.iter().filter(|r| r.outcome.is_failure()).collect();

    let mut out = format!("Test results: {} passed, {} failed", passed, failures.len());
    if skipped > 0 {
        out.push_str(&format!(", {} skipped", skipped));
    }
    out.push('\n');

    for record in failures.iter().take(limits.max_failures) {
        out.push_str(&format!("{} {}\n", record.outcome, record.name));
        let lines: Vec<&str> = record.detail.lines().collect();
        for line in lines.iter().take(limits.max_lines) {
            out.push_str(&format!("    {}\n", line));
        }
        if lines.len() > limits.max_lines {
            out.push_str("    ... (output trimmed)\n");
        }
    }
    if failures.len() > limits.max_failures {
        out.push_str(&format!(
            "... and {} more failing tests\n",
            failures.len() - limits.max_failures
        ));
    }

    out
}
