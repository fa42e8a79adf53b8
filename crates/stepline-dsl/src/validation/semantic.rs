use super::{error_codes, Location, ValidationContext, ValidationIssue, Validator};
use crate::definition::{
    ActionKind, ActionNode, Condition, Literal, LoopBound, TestDefinition, WaitSpec,
    MAX_LOOP_ITERATIONS,
};
use crate::utils::template;
use url::Url;

/// Value-level sanity checks: numbers, names, selectors and conditions.
pub struct SemanticValidator;

impl SemanticValidator {
    pub fn new() -> Self {
        Self
    }

    fn check_node(&self, node: &ActionNode, issues: &mut Vec<ValidationIssue>) {
        let location = || Location::new(node.line, node.path.clone());
        let key = node.shorthand();

        let mut empty_selector = |selector: &Option<String>| {
            if matches!(selector, Some(s) if s.trim().is_empty()) {
                issues.push(
                    ValidationIssue::error(
                        error_codes::EMPTY_SELECTOR,
                        format!("'{}' has an empty selector", key),
                        location(),
                    )
                    .with_fix("Provide a CSS selector, an XPath or the visible text of the element"),
                );
            }
        };

        match &node.kind {
            ActionKind::Click { selector } | ActionKind::Hover { selector } => empty_selector(selector),
            ActionKind::Type { selector, .. } => empty_selector(selector),
            ActionKind::Assert { selector, .. } => empty_selector(selector),
            ActionKind::Store { selector, .. } => empty_selector(selector),
            ActionKind::Wait(WaitSpec::Element { selector, .. }) => empty_selector(selector),
            ActionKind::Scroll { target } => empty_selector(target),
            _ => {}
        }

        match &node.kind {
            ActionKind::Navigate { url: value }
            | ActionKind::Key { key: value }
            | ActionKind::Script { code: value }
            | ActionKind::Run { block: value } => {
                if matches!(value, Some(v) if v.trim().is_empty()) {
                    issues.push(ValidationIssue::error(
                        error_codes::EMPTY_VALUE,
                        format!("'{}' has an empty value", key),
                        location(),
                    ));
                }
            }
            ActionKind::Wait(WaitSpec::Duration(ms)) => {
                check_duration(ms, "wait", location(), issues);
            }
            ActionKind::Wait(WaitSpec::Element {
                timeout: Some(max), ..
            }) => {
                check_duration(max, "wait.max", location(), issues);
            }
            ActionKind::Store {
                variable: Some(variable),
                ..
            } => {
                if !template::is_identifier(variable) {
                    issues.push(invalid_identifier(variable, "store variable", location()));
                }
            }
            ActionKind::If {
                condition: Some(condition),
                ..
            } => {
                if let Err(err) = Condition::parse(condition) {
                    issues.push(
                        ValidationIssue::error(error_codes::INVALID_CONDITION, err.to_string(), location())
                            .with_fix("Write a single comparison between a variable and a value")
                            .with_example("cond: \"{{env}} == prod\""),
                    );
                }
            }
            ActionKind::Loop(spec) => {
                if let Some(binding) = &spec.binding {
                    if !template::is_identifier(binding) {
                        issues.push(invalid_identifier(binding, "loop variable", location()));
                    }
                }
                match &spec.bound {
                    Some(LoopBound::Times(times)) => check_times(times, location(), issues),
                    Some(LoopBound::Over(items)) if items.len() as i64 > MAX_LOOP_ITERATIONS => {
                        issues.push(ValidationIssue::error(
                            error_codes::INVALID_LOOP_BOUND,
                            format!(
                                "'loop.over' has {} items; at most {} iterations are allowed",
                                items.len(),
                                MAX_LOOP_ITERATIONS
                            ),
                            location(),
                        ));
                    }
                    _ => {}
                }
            }
            _ => {}
        }

        for children in node.children() {
            for child in children {
                self.check_node(child, issues);
            }
        }
    }
}

fn invalid_identifier(name: &str, what: &str, location: Location) -> ValidationIssue {
    ValidationIssue::error(
        error_codes::INVALID_IDENTIFIER,
        format!("'{}' is not a valid {} name", name, what),
        location,
    )
    .with_fix("Use letters, digits and underscores, starting with a letter or underscore")
}

fn check_duration(value: &Literal, field: &str, location: Location, issues: &mut Vec<ValidationIssue>) {
    if let Literal::Str(s) = value {
        if template::contains_reference(s) {
            return;
        }
    }
    match value.as_f64() {
        None => issues.push(
            ValidationIssue::error(
                error_codes::INVALID_NUMBER,
                format!("'{}' must be a number of milliseconds, got '{}'", field, value),
                location,
            )
            .with_example("- wait: 1000"),
        ),
        Some(ms) if ms < 0.0 => issues.push(ValidationIssue::error(
            error_codes::NEGATIVE_DURATION,
            format!("'{}' must not be negative, got {}", field, value),
            location,
        )),
        Some(_) => {}
    }
}

fn check_times(times: &Literal, location: Location, issues: &mut Vec<ValidationIssue>) {
    if let Literal::Str(s) = times {
        if template::whole_reference(s).is_some() {
            return;
        }
        if template::contains_reference(s) {
            issues.push(ValidationIssue::error(
                error_codes::INVALID_LOOP_BOUND,
                format!("'loop.times' must be an integer or a single variable reference, got '{}'", s),
                location,
            ));
            return;
        }
    }

    let reason = match times.as_i64() {
        None => format!("'loop.times' must be an integer, got '{}'", times),
        Some(n) if n < 0 => format!("'loop.times' must not be negative, got {}", n),
        Some(n) if n > MAX_LOOP_ITERATIONS => format!(
            "'loop.times' is {}; at most {} iterations are allowed",
            n, MAX_LOOP_ITERATIONS
        ),
        Some(_) => return,
    };
    issues.push(
        ValidationIssue::error(error_codes::INVALID_LOOP_BOUND, reason, location)
            .with_example("- loop:\n    times: 3\n    do:\n      - c: \".next\""),
    );
}

impl Validator for SemanticValidator {
    fn name(&self) -> &'static str {
        "semantic"
    }

    fn validate(&self, definition: &TestDefinition, _context: &ValidationContext) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if definition.name.trim().is_empty() {
            issues.push(
                ValidationIssue::error(
                    error_codes::EMPTY_TEST_NAME,
                    "Test name must not be empty",
                    Location::new(definition.name_line, "test"),
                )
                .with_example("test: Checkout happy path"),
            );
        }

        if let Some(base) = &definition.base_url {
            let usable = template::contains_reference(base)
                || Url::parse(base).map(|u| !u.cannot_be_a_base()).unwrap_or(false);
            if !usable {
                issues.push(
                    ValidationIssue::error(
                        error_codes::INVALID_BASE_URL,
                        format!("Base navigation target '{}' must be an absolute URL", base),
                        Location::new(definition.base_url_line, "nav"),
                    )
                    .with_example("nav: https://app.example.com"),
                );
            }
        }

        for variable in &definition.variables {
            if !template::is_identifier(&variable.name) {
                issues.push(invalid_identifier(
                    &variable.name,
                    "variable",
                    Location::new(variable.line, format!("data.{}", variable.name)),
                ));
            }
        }

        for (_, section) in definition.sections() {
            for node in section {
                self.check_node(node, &mut issues);
            }
        }
        for block in &definition.blocks {
            if block.name.trim().is_empty() {
                issues.push(ValidationIssue::error(
                    error_codes::EMPTY_VALUE,
                    "Block name must not be empty",
                    Location::new(block.line, block.path.clone()),
                ));
            }
            for node in &block.actions {
                self.check_node(node, &mut issues);
            }
        }

        issues
    }
}
