use crate::definition::TestDefinition;
use crate::error::DslError;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

mod practice;
mod reference;
mod semantic;
mod structural;

/// How serious an issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks compilation
    Error,
    /// Advisory only
    Warning,
}

/// Where an issue was found.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Location {
    /// 1-based source line
    pub line: usize,
    /// Path inside the definition (e.g., "do[2].then[0]")
    pub path: String,
}

impl Location {
    pub fn new(line: usize, path: impl Into<String>) -> Self {
        Self {
            line,
            path: path.into(),
        }
    }
}

/// A single diagnostic produced by validation or compilation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,

    /// Stable identifier (see [`error_codes`])
    pub code: &'static str,

    /// Human-readable explanation
    pub message: String,

    pub location: Location,

    /// Suggested fix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,

    /// Example of the corrected form
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

impl ValidationIssue {
    pub fn error(code: &'static str, message: impl Into<String>, location: Location) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            location,
            fix: None,
            example: None,
        }
    }

    pub fn warning(code: &'static str, message: impl Into<String>, location: Location) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, message, location)
        }
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }

    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = Some(example.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (line {}, at {})",
            self.code, self.message, self.location.line, self.location.path
        )
    }
}

/// Validation error codes
pub mod error_codes {
    /// Text could not be decoded
    pub const PARSE: &str = "ERR_DSL_PARSE";

    /// More than one blocking issue
    pub const MULTIPLE: &str = "ERR_DSL_VALIDATION_MULTIPLE";

    // Structural
    pub const UNKNOWN_KEY: &str = "WARN_DSL_UNKNOWN_KEY";
    pub const UNKNOWN_ACTION: &str = "ERR_DSL_UNKNOWN_ACTION";
    pub const MULTIPLE_ACTIONS: &str = "ERR_DSL_MULTIPLE_ACTIONS";
    pub const MALFORMED_ACTION: &str = "ERR_DSL_MALFORMED_ACTION";
    pub const MISSING_FIELD: &str = "ERR_DSL_MISSING_FIELD";

    // Semantic
    pub const EMPTY_TEST_NAME: &str = "ERR_DSL_EMPTY_TEST_NAME";
    pub const EMPTY_SELECTOR: &str = "ERR_DSL_EMPTY_SELECTOR";
    pub const EMPTY_VALUE: &str = "ERR_DSL_EMPTY_VALUE";
    pub const INVALID_NUMBER: &str = "ERR_DSL_INVALID_NUMBER";
    pub const NEGATIVE_DURATION: &str = "ERR_DSL_NEGATIVE_DURATION";
    pub const INVALID_LOOP_BOUND: &str = "ERR_DSL_INVALID_LOOP_BOUND";
    pub const INVALID_CONDITION: &str = "ERR_DSL_INVALID_CONDITION";
    pub const INVALID_IDENTIFIER: &str = "ERR_DSL_INVALID_IDENTIFIER";
    pub const INVALID_BASE_URL: &str = "ERR_DSL_INVALID_BASE_URL";

    // Cross-reference
    pub const UNDEFINED_VARIABLE: &str = "ERR_DSL_UNDEFINED_VARIABLE";
    pub const RUNTIME_VARIABLE_IN_CONTROL: &str = "ERR_DSL_RUNTIME_VARIABLE_IN_CONTROL";
    pub const UNDEFINED_BLOCK: &str = "ERR_DSL_UNDEFINED_BLOCK";
    pub const DUPLICATE_BLOCK: &str = "ERR_DSL_DUPLICATE_BLOCK";
    pub const RECURSIVE_BLOCK: &str = "ERR_DSL_RECURSIVE_BLOCK";

    // Best practice
    pub const ASSERT_AFTER_CLICK: &str = "WARN_DSL_ASSERT_AFTER_CLICK";
    pub const NAV_WITHOUT_WAIT: &str = "WARN_DSL_NAV_WITHOUT_WAIT";
    pub const LONG_TEST_NAME: &str = "WARN_DSL_LONG_TEST_NAME";
    pub const HARDCODED_CREDENTIAL: &str = "WARN_DSL_HARDCODED_CREDENTIAL";
    pub const EMPTY_TEST: &str = "WARN_DSL_EMPTY_TEST";
    pub const LONG_WAIT: &str = "WARN_DSL_LONG_WAIT";
    pub const EMPTY_CONTROL_BLOCK: &str = "WARN_DSL_EMPTY_CONTROL_BLOCK";
    pub const SHADOWED_VARIABLE: &str = "WARN_DSL_SHADOWED_VARIABLE";
    pub const RELATIVE_NAV_WITHOUT_BASE: &str = "WARN_DSL_RELATIVE_NAV_WITHOUT_BASE";
    pub const UNUSUAL_SELECTOR: &str = "WARN_DSL_UNUSUAL_SELECTOR";
    pub const MALFORMED_TEMPLATE: &str = "WARN_DSL_MALFORMED_TEMPLATE";
    pub const UNUSED_BLOCK: &str = "WARN_DSL_UNUSED_BLOCK";

    // Compilation
    pub const UNKNOWN_OVERRIDE: &str = "ERR_COMPILE_UNKNOWN_OVERRIDE";
    pub const UNRESOLVABLE_DEFAULT: &str = "ERR_COMPILE_UNRESOLVABLE_DEFAULT";
    pub const UNRESOLVED_LOOP_BOUND: &str = "ERR_COMPILE_UNRESOLVED_LOOP_BOUND";
    pub const COMPILER_INVARIANT_VIOLATED: &str = "ERR_COMPILER_INVARIANT_VIOLATED";
}

/// Paths of nodes that earlier passes already reported as errors.
#[derive(Debug, Default)]
pub struct ValidationContext {
    flagged: HashSet<String>,
}

impl ValidationContext {
    pub fn is_flagged(&self, path: &str) -> bool {
        self.flagged.contains(path)
    }

    fn record(&mut self, issues: &[ValidationIssue]) {
        self.flagged.extend(
            issues
                .iter()
                .filter(|i| i.is_error())
                .map(|i| i.location.path.clone()),
        );
    }
}

/// A trait for validation passes over a test definition
pub trait Validator {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Check the definition and return every issue found. Never fails.
    fn validate(&self, definition: &TestDefinition, context: &ValidationContext) -> Vec<ValidationIssue>;
}

/// Result of running every validation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Converts blocking issues into an error, keeping warnings on success.
    pub fn into_result(self) -> Result<Vec<ValidationIssue>, DslError> {
        if self.errors.is_empty() {
            Ok(self.warnings)
        } else {
            Err(DslError::Validation(self.errors))
        }
    }
}

/// Run the structural, semantic, cross-reference and best-practice passes in
/// that order.
pub fn validate(definition: &TestDefinition) -> ValidationReport {
    let validators: Vec<Box<dyn Validator>> = vec![
        Box::new(structural::StructuralValidator::new()),
        Box::new(semantic::SemanticValidator::new()),
        Box::new(reference::ReferenceValidator::new()),
        Box::new(practice::PracticeValidator::new()),
    ];

    let mut context = ValidationContext::default();
    let mut report = ValidationReport::default();

    for validator in validators {
        let issues = validator.validate(definition, &context);
        debug!(pass = validator.name(), issues = issues.len(), "Validation pass finished");
        context.record(&issues);
        for issue in issues {
            if issue.is_error() {
                report.errors.push(issue);
            } else {
                report.warnings.push(issue);
            }
        }
    }

    report
}

/// A definition with no blocking issues. The compiler only accepts this.
#[derive(Debug, Clone)]
pub struct ValidatedDefinition {
    definition: TestDefinition,
    warnings: Vec<ValidationIssue>,
}

impl ValidatedDefinition {
    /// Validates the definition, keeping the warnings for reporting.
    pub fn new(definition: TestDefinition) -> Result<Self, DslError> {
        let warnings = validate(&definition).into_result()?;
        Ok(Self {
            definition,
            warnings,
        })
    }

    pub fn definition(&self) -> &TestDefinition {
        &self.definition
    }

    pub fn warnings(&self) -> &[ValidationIssue] {
        &self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn issue_display_includes_location() {
        let issue = ValidationIssue::error(
            error_codes::MISSING_FIELD,
            "'c' requires a selector",
            Location::new(7, "do[3]"),
        );
        assert_eq!(
            issue.to_string(),
            "ERR_DSL_MISSING_FIELD: 'c' requires a selector (line 7, at do[3])"
        );
    }

    #[test]
    fn warnings_do_not_block() {
        let def = parse("test: warn\ndo:\n  - c: '#a'\n  - ch: '#b'\n").unwrap();
        let report = validate(&def);
        assert!(report.is_valid());
        assert!(report
            .warnings
            .iter()
            .any(|w| w.code == error_codes::ASSERT_AFTER_CLICK));
        assert_eq!(report.into_result().unwrap().len(), 1);
    }

    #[test]
    fn structurally_invalid_node_is_not_reported_twice() {
        // Multiple action keys is a structural error; the undefined variable
        // on the same node must not add a cross-reference error.
        let def = parse("test: dup\ndo:\n  - c: '{{missing}}'\n    nav: /x\n").unwrap();
        let report = validate(&def);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].code, error_codes::MULTIPLE_ACTIONS);
    }

    #[test]
    fn validation_is_repeatable() {
        let def = parse(
            "test: twice\ndata:\n  password: hunter2\ndo:\n  - t: '{{nope}}'\n  - wait: -1\n",
        )
        .unwrap();
        assert_eq!(validate(&def), validate(&def));
    }
}
