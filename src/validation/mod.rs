//! Client options validation.
//!
//! Rules push [`ValidationIssue`]s into a shared [`ValidationResult`]. Errors
//! reject the options; warnings are logged and the options are used anyway.

pub mod report;
pub mod rules;

use crate::config::model::ClientOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    /// Upper-case label used in reports.
    pub fn label(self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
        }
    }
}

/// One problem with one option key.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub severity: Severity,
    /// Option key as written in the options file, e.g. `retry.multiplier` or `uri[1]`.
    pub key: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    fn new(severity: Severity, key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            key: key.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn error(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, key, message)
    }

    pub fn warning(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, key, message)
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Issues found in a set of options, in the order the rules found them.
#[derive(Debug, Default)]
pub struct ValidationResult {
    issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// True when nothing rejects the options.
    pub fn is_valid(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.of(Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.of(Severity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    fn of(&self, severity: Severity) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |issue| issue.severity == severity)
    }
}

/// Runs every option rule.
pub fn validate_options(options: &ClientOptions) -> ValidationResult {
    let mut result = ValidationResult::new();
    rules::check_connection(options, &mut result);
    rules::check_retry(&options.retry, &mut result);
    rules::check_discovery(options, &mut result);
    result
}
