use super::{error_codes, Location, ValidationContext, ValidationIssue, Validator};
use crate::compiler::{navigation, selector};
use crate::compiler::SelectorKind;
use crate::definition::{ActionKind, ActionNode, Literal, LoopBound, TestDefinition, WaitSpec};
use crate::utils::template;
use std::collections::HashSet;

const MAX_TEST_NAME_LEN: usize = 80;
const LONG_WAIT_MS: f64 = 30_000.0;
const CREDENTIAL_HINTS: &[&str] = &["password", "passwd", "secret", "token", "api_key", "apikey"];

/// Advisory style checks. Everything reported here is a warning.
pub struct PracticeValidator;

impl PracticeValidator {
    pub fn new() -> Self {
        Self
    }

    fn check_list(
        &self,
        nodes: &[ActionNode],
        definition: &TestDefinition,
        context: &ValidationContext,
        issues: &mut Vec<ValidationIssue>,
    ) {
        for (index, node) in nodes.iter().enumerate() {
            if context.is_flagged(&node.path) {
                continue;
            }
            let location = || Location::new(node.line, node.path.clone());
            let next = nodes.get(index + 1);

            match (&node.kind, next.map(|n| &n.kind)) {
                (ActionKind::Click { .. }, Some(ActionKind::Assert { .. })) => {
                    if let Some(next) = next {
                        issues.push(
                            ValidationIssue::warning(
                                error_codes::ASSERT_AFTER_CLICK,
                                "Assertion runs immediately after a click; the page may not have updated yet",
                                Location::new(next.line, next.path.clone()),
                            )
                            .with_fix("Wait for the element or state the click produces before asserting")
                            .with_example("- c: \"Save\"\n- wait: \"#saved\"\n- ch: \"Saved\""),
                        );
                    }
                }
                (
                    ActionKind::Navigate { .. },
                    Some(ActionKind::Wait(_) | ActionKind::Assert { .. } | ActionKind::Navigate { .. }),
                ) => {}
                (ActionKind::Navigate { .. }, Some(_)) => issues.push(
                    ValidationIssue::warning(
                        error_codes::NAV_WITHOUT_WAIT,
                        "Navigation is not followed by a wait or an assertion",
                        location(),
                    )
                    .with_fix("Wait for a landmark element so later actions do not race the page load")
                    .with_example("- nav: /login\n- wait: \"#login-form\""),
                ),
                _ => {}
            }

            self.check_node(node, definition, issues);

            for children in node.children() {
                self.check_list(children, definition, context, issues);
            }
        }
    }

    fn check_node(&self, node: &ActionNode, definition: &TestDefinition, issues: &mut Vec<ValidationIssue>) {
        let location = || Location::new(node.line, node.path.clone());

        for (_, text) in node.template_fields() {
            if template::has_malformed_template(text) {
                issues.push(
                    ValidationIssue::warning(
                        error_codes::MALFORMED_TEMPLATE,
                        format!("'{}' looks like a broken variable reference and is sent as written", text),
                        location(),
                    )
                    .with_fix("References have the form {{name}} with letters, digits and underscores"),
                );
            }
        }

        match &node.kind {
            ActionKind::Click { selector: Some(s) }
            | ActionKind::Hover { selector: Some(s) }
            | ActionKind::Type { selector: Some(s), .. }
            | ActionKind::Assert { selector: Some(s), .. }
            | ActionKind::Store { selector: Some(s), .. }
            | ActionKind::Wait(WaitSpec::Element { selector: Some(s), .. }) => {
                let css = SelectorKind::infer(s) == SelectorKind::Css;
                if css && !template::contains_reference(s) && selector::is_unusual_css(s) {
                    issues.push(
                        ValidationIssue::warning(
                            error_codes::UNUSUAL_SELECTOR,
                            format!("Selector '{}' has unusual characters or unbalanced quotes", s),
                            location(),
                        )
                        .with_fix("Check the selector, or use the element's visible text instead"),
                    );
                }
            }
            _ => {}
        }

        match &node.kind {
            ActionKind::Navigate { url: Some(url) } => {
                let relative = !navigation::has_scheme(url) && !url.trim_start().starts_with("{{");
                if relative && definition.base_url.is_none() {
                    issues.push(
                        ValidationIssue::warning(
                            error_codes::RELATIVE_NAV_WITHOUT_BASE,
                            format!("'{}' is relative but the test has no base 'nav'", url),
                            location(),
                        )
                        .with_example("nav: https://app.example.com"),
                    );
                }
            }
            ActionKind::Wait(WaitSpec::Duration(ms)) => {
                if let Some(ms) = ms.as_f64().filter(|ms| *ms > LONG_WAIT_MS) {
                    issues.push(
                        ValidationIssue::warning(
                            error_codes::LONG_WAIT,
                            format!("Fixed wait of {} ms slows every run", ms),
                            location(),
                        )
                        .with_fix("Wait for an element instead of a fixed delay"),
                    );
                }
            }
            ActionKind::Store {
                variable: Some(variable),
                ..
            } if definition.variable(variable).is_some() => issues.push(
                ValidationIssue::warning(
                    error_codes::SHADOWED_VARIABLE,
                    format!("'store' captures into '{}', which is also declared under 'data'", variable),
                    location(),
                )
                .with_fix("Use a different name for the captured value"),
            ),
            ActionKind::If { then, otherwise, .. } if then.is_empty() && otherwise.is_empty() => {
                issues.push(ValidationIssue::warning(
                    error_codes::EMPTY_CONTROL_BLOCK,
                    "Conditional has no actions in either branch",
                    location(),
                ))
            }
            ActionKind::Loop(spec) => {
                let no_iterations = match &spec.bound {
                    Some(LoopBound::Times(times)) => times.as_i64() == Some(0),
                    Some(LoopBound::Over(items)) => items.is_empty(),
                    None => false,
                };
                if no_iterations || spec.body.is_empty() {
                    issues.push(ValidationIssue::warning(
                        error_codes::EMPTY_CONTROL_BLOCK,
                        "Loop produces no actions",
                        location(),
                    ));
                }
            }
            _ => {}
        }
    }
}

impl Validator for PracticeValidator {
    fn name(&self) -> &'static str {
        "best-practice"
    }

    fn validate(&self, definition: &TestDefinition, context: &ValidationContext) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if definition.name.chars().count() > MAX_TEST_NAME_LEN {
            issues.push(
                ValidationIssue::warning(
                    error_codes::LONG_TEST_NAME,
                    format!("Test name is longer than {} characters", MAX_TEST_NAME_LEN),
                    Location::new(definition.name_line, "test"),
                )
                .with_fix("Move details into 'desc'"),
            );
        }

        if definition.actions.is_empty() {
            issues.push(ValidationIssue::warning(
                error_codes::EMPTY_TEST,
                "Test has no actions under 'do'",
                Location::new(definition.name_line, "do"),
            ));
        }

        for variable in &definition.variables {
            let lowered = variable.name.to_lowercase();
            let sensitive = CREDENTIAL_HINTS.iter().any(|hint| lowered.contains(hint));
            let literal = match &variable.value {
                Literal::Str(s) => !s.is_empty() && !template::contains_reference(s),
                _ => false,
            };
            if sensitive && literal {
                issues.push(
                    ValidationIssue::warning(
                        error_codes::HARDCODED_CREDENTIAL,
                        format!("'{}' looks like a credential stored in the test file", variable.name),
                        Location::new(variable.line, format!("data.{}", variable.name)),
                    )
                    .with_fix(format!("Pass it at run time with --var {}=...", variable.name)),
                );
            }
        }

        for (_, section) in definition.sections() {
            self.check_list(section, definition, context, &mut issues);
        }

        let mut used = HashSet::new();
        definition.walk(&mut |node| {
            if let ActionKind::Run { block: Some(name) } = &node.kind {
                used.insert(name.clone());
            }
        });
        for block in &definition.blocks {
            self.check_list(&block.actions, definition, context, &mut issues);
            if !used.contains(&block.name) {
                issues.push(ValidationIssue::warning(
                    error_codes::UNUSED_BLOCK,
                    format!("Block '{}' is never run", block.name),
                    Location::new(block.line, block.path.clone()),
                ));
            }
        }

        issues
    }
}
