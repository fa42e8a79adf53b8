use crate::validation::{error_codes, ValidationIssue};
use std::fmt;
use thiserror::Error;

/// Malformed input or a root shape that does not match the dialect.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("line {line}: {reason}")]
pub struct ParseError {
    /// 1-based line the decoder stopped at
    pub line: usize,
    pub reason: String,
}

impl ParseError {
    pub fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

/// Errors produced while compiling a validated definition.
#[derive(Error, Debug, Clone)]
pub enum CompileError {
    /// Problems that only surface with concrete values, e.g. a cyclic default
    #[error("{}", IssuesFormat(.0))]
    Issues(Vec<ValidationIssue>),

    /// Something validation should have rejected reached the compiler
    #[error("compiler invariant violated: {0}")]
    InvariantViolated(String),
}

/// All possible errors that can occur while processing a test definition
#[derive(Error, Debug, Clone)]
pub enum DslError {
    /// The text could not be decoded into a test definition
    #[error("Parse error at {0}")]
    Parse(#[from] ParseError),

    /// Blocking validation issues
    #[error("{}", IssuesFormat(.0))]
    Validation(Vec<ValidationIssue>),

    /// Compilation failed
    #[error(transparent)]
    Compile(#[from] CompileError),
}

// Helper struct to format a list of issues
struct IssuesFormat<'a>(&'a [ValidationIssue]);

impl fmt::Display for IssuesFormat<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            [single] => write!(f, "{}", single),
            issues => {
                write!(f, "Multiple validation errors ({} issues):", issues.len())?;
                for (i, issue) in issues.iter().enumerate() {
                    write!(f, "\n  {}. {}", i + 1, issue)?;
                }
                Ok(())
            }
        }
    }
}

fn issues_code(issues: &[ValidationIssue]) -> &'static str {
    match issues {
        [single] => single.code,
        _ => error_codes::MULTIPLE,
    }
}

impl CompileError {
    pub fn error_code(&self) -> &'static str {
        match self {
            CompileError::Issues(issues) => issues_code(issues),
            CompileError::InvariantViolated(_) => error_codes::COMPILER_INVARIANT_VIOLATED,
        }
    }
}

impl DslError {
    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            DslError::Parse(_) => error_codes::PARSE,
            DslError::Validation(issues) => issues_code(issues),
            DslError::Compile(err) => err.error_code(),
        }
    }

    /// Issues carried by this error, if any.
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            DslError::Validation(issues) | DslError::Compile(CompileError::Issues(issues)) => {
                issues
            }
            _ => &[],
        }
    }
}
