//! Test command resolution.

use crate::config::TestsConfig;
use crate::sandbox::shell_quote;

/// Placeholder substituted with the test arguments when present in the
/// template; otherwise arguments are appended.
pub const FILES_PLACEHOLDER: &str = "{files}";

/// A repository's test invocation template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCommand {
    template: String,
    module_style: bool,
}

impl TestCommand {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            module_style: false,
        }
    }

    /// Pass dotted module labels (`queries.tests`) instead of file paths.
    #[must_use]
    pub fn with_module_style(mut self, module_style: bool) -> Self {
        self.module_style = module_style;
        self
    }

    #[must_use]
    pub fn from_config(config: &TestsConfig) -> Self {
        Self::new(config.command.clone()).with_module_style(config.module_style)
    }

    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// The argument a test file is passed as.
    #[must_use]
    pub fn directive(&self, path: &str) -> String {
        if !self.module_style {
            return path.to_string();
        }
        let path = path.strip_prefix("./").unwrap_or(path);
        let path = path.strip_suffix(".py").unwrap_or(path);
        let path = path.strip_prefix("tests/").unwrap_or(path);
        path.replace('/', ".")
    }

    /// Full shell command for `files`.
    #[must_use]
    pub fn build(&self, files: &[String]) -> String {
        let args: Vec<String> = files
            .iter()
            .map(|f| shell_quote(&self.directive(f)))
            .collect();
        let args = args.join(" ");

        if self.template.contains(FILES_PLACEHOLDER) {
            self.template.replace(FILES_PLACEHOLDER, &args)
        } else if args.is_empty() {
            self.template.clone()
        } else {
            format!("{} {}", self.template, args)
        }
    }
}
