//! # Stepline DSL
//!
//! The Stepline DSL is a terse YAML dialect for describing browser test
//! steps. This crate parses a document into a [`TestDefinition`], runs the
//! validation passes over it, and compiles it into the ordered
//! [`ResolvedOperation`]s the executor sends to the remote platform.
//!
//! ## Features
//!
//! * Shorthand action keys (`c`, `t`, `ch`, `wait`, `store`, ...)
//! * `{{variable}}` substitution with `data` defaults and run-time overrides
//! * Bounded loops, simple conditionals and reusable named blocks
//! * Four validation passes with stable error codes, fixes and examples
//!
//! ## Example
//!
//! ```
//! use stepline_dsl::{compile_source, Overrides};
//!
//! let yaml = r##"
//! test: Login
//! nav: https://app.example.com
//! data:
//!   user: alice
//! do:
//!   - nav: /login
//!   - wait: "#login-form"
//!   - t: { "#name": "{{user}}" }
//!   - c: Sign in
//! "##;
//!
//! let compiled = compile_source(yaml, &Overrides::new()).unwrap();
//! assert_eq!(compiled.operations.len(), 4);
//! assert_eq!(compiled.operations[2].value.as_deref(), Some("alice"));
//! ```

mod error;
mod parser;
mod utils;

pub mod compiler;
pub mod definition;
pub mod validation;

pub use compiler::{compile, OperationKind, Overrides, ResolvedOperation, SelectorKind, Target};
pub use definition::{ActionKind, ActionNode, Literal, TestDefinition};
pub use error::{CompileError, DslError, ParseError};
pub use parser::parse;
pub use validation::{
    error_codes, validate, Location, Severity, ValidatedDefinition, ValidationIssue, ValidationReport,
};

/// Output of a successful parse, validate and compile run.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub definition: TestDefinition,
    pub warnings: Vec<ValidationIssue>,
    pub operations: Vec<ResolvedOperation>,
}

/// Parse and validate a test definition.
///
/// # Errors
///
/// * [`DslError::Parse`] for malformed YAML/JSON or a root shape that is not
///   a test definition
/// * [`DslError::Validation`] carrying every blocking issue
///
/// # Examples
///
/// ```
/// use stepline_dsl::{error_codes, parse_and_validate};
///
/// let result = parse_and_validate("test: t\ndo:\n  - c: '{{missing}}'\n");
/// let err = result.unwrap_err();
/// assert_eq!(err.error_code(), error_codes::UNDEFINED_VARIABLE);
/// assert_eq!(err.issues()[0].location.line, 3);
/// ```
pub fn parse_and_validate(text: &str) -> Result<ValidatedDefinition, DslError> {
    let definition = parser::parse(text)?;
    ValidatedDefinition::new(definition)
}

/// Run the whole front end: parse, validate, then compile with `overrides`.
pub fn compile_source(text: &str, overrides: &Overrides) -> Result<Compilation, DslError> {
    let validated = parse_and_validate(text)?;
    let operations = compiler::compile(&validated, overrides)?;
    Ok(Compilation {
        warnings: validated.warnings().to_vec(),
        definition: validated.definition().clone(),
        operations,
    })
}

/// Returns a version string for the Stepline DSL crate
///
/// ```
/// assert!(stepline_dsl::version().starts_with("0."));
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_stop_the_pipeline() {
        let err = compile_source("test: [unclosed\n", &Overrides::new()).unwrap_err();
        assert!(matches!(err, DslError::Parse(_)));
        assert_eq!(err.error_code(), error_codes::PARSE);
    }

    #[test]
    fn validation_errors_stop_the_pipeline() {
        let err = compile_source("test: t\ndo:\n  - wait: -1\n  - c: ''\n", &Overrides::new()).unwrap_err();
        assert_eq!(err.issues().len(), 2);
        assert_eq!(err.error_code(), error_codes::MULTIPLE);
    }

    #[test]
    fn warnings_travel_with_the_result() {
        let compiled = compile_source("test: t\ndo:\n  - c: Save\n  - ch: Saved\n", &Overrides::new()).unwrap();
        assert_eq!(compiled.operations.len(), 2);
        assert_eq!(compiled.warnings.len(), 1);
        assert_eq!(compiled.definition.name, "t");
    }
}
