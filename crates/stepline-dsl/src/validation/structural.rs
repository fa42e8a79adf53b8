use super::{error_codes, Location, ValidationContext, ValidationIssue, Validator};
use crate::definition::{ActionKind, ActionNode, TestDefinition, WaitSpec, TOP_LEVEL_KEYS};

/// Checks that every action has the shape and fields its kind requires.
pub struct StructuralValidator;

impl StructuralValidator {
    pub fn new() -> Self {
        Self
    }

    fn check_node(&self, node: &ActionNode, issues: &mut Vec<ValidationIssue>) {
        let location = || Location::new(node.line, node.path.clone());

        for key in &node.unknown_keys {
            issues.push(
                ValidationIssue::warning(
                    error_codes::UNKNOWN_KEY,
                    format!("Unknown key '{}' is ignored", key),
                    location(),
                )
                .with_fix("Remove the key or check its spelling"),
            );
        }

        if !node.extra_actions.is_empty() {
            issues.push(
                ValidationIssue::error(
                    error_codes::MULTIPLE_ACTIONS,
                    format!(
                        "Entry combines '{}' with {}; each entry must hold exactly one action",
                        node.shorthand(),
                        node.extra_actions
                            .iter()
                            .map(|k| format!("'{}'", k))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                    location(),
                )
                .with_fix("Split the entry into one list item per action")
                .with_example("- c: \"#submit\"\n- wait: 500"),
            );
        }

        match &node.kind {
            ActionKind::Unrecognized { keys } if keys.is_empty() => issues.push(
                ValidationIssue::error(
                    error_codes::MALFORMED_ACTION,
                    "Action entry must be a mapping with one action key",
                    location(),
                )
                .with_example("- c: \"Sign in\""),
            ),
            ActionKind::Unrecognized { keys } => issues.push(
                ValidationIssue::error(
                    error_codes::UNKNOWN_ACTION,
                    format!("No known action in entry with keys: {}", keys.join(", ")),
                    location(),
                )
                .with_fix("Use one of: nav, c, t, k, h, ch, nch, eq, neq, gt, lt, wait, store, note, js, scroll, run, if, loop"),
            ),
            ActionKind::Malformed { key, reason } => {
                let mut issue =
                    ValidationIssue::error(error_codes::MALFORMED_ACTION, reason.clone(), location());
                if let Some(example) = example_for(key) {
                    issue = issue.with_example(example);
                }
                issues.push(issue);
            }
            kind => {
                for field in missing_fields(kind) {
                    let mut issue = ValidationIssue::error(
                        error_codes::MISSING_FIELD,
                        format!("'{}' requires {}", node.shorthand(), field),
                        location(),
                    );
                    if let Some(example) = example_for(node.shorthand()) {
                        issue = issue.with_example(example);
                    }
                    issues.push(issue);
                }
            }
        }

        for children in node.children() {
            for child in children {
                self.check_node(child, issues);
            }
        }
    }
}

fn missing_fields(kind: &ActionKind) -> Vec<&'static str> {
    let mut missing = Vec::new();
    match kind {
        ActionKind::Navigate { url: None } => missing.push("a URL"),
        ActionKind::Click { selector: None } | ActionKind::Hover { selector: None } => {
            missing.push("a selector")
        }
        ActionKind::Type { text: None, .. } => missing.push("text to type"),
        ActionKind::Key { key: None } => missing.push("a key name"),
        ActionKind::Assert {
            check,
            selector,
            expected,
        } => {
            if selector.is_none() {
                missing.push("a selector");
            }
            if check.needs_expected() && expected.is_none() {
                missing.push("an expected value");
            }
        }
        ActionKind::Wait(WaitSpec::Element { selector: None, .. }) => {
            missing.push("milliseconds or a selector")
        }
        ActionKind::Store { selector, variable } => {
            if selector.is_none() {
                missing.push("a selector");
            }
            if variable.is_none() {
                missing.push("a variable name");
            }
        }
        ActionKind::Comment { text: None } => missing.push("comment text"),
        ActionKind::Script { code: None } => missing.push("script code"),
        ActionKind::Scroll { target: None } => missing.push("a scroll target"),
        ActionKind::Run { block: None } => missing.push("a block name"),
        ActionKind::If { condition: None, .. } => missing.push("a 'cond' expression"),
        ActionKind::Loop(spec) if spec.bound.is_none() => missing.push("'times' or 'over'"),
        _ => {}
    }
    missing
}

fn example_for(key: &str) -> Option<&'static str> {
    let example = match key {
        "nav" => "- nav: /login",
        "c" => "- c: \"#submit\"",
        "t" => "- t:\n    \"#email\": \"{{email}}\"",
        "k" => "- k: enter",
        "h" => "- h: \".menu\"",
        "ch" => "- ch: \"Welcome\"",
        "nch" => "- nch: \".error\"",
        "eq" | "neq" | "gt" | "lt" => "- eq:\n    \"#total\": \"42\"",
        "wait" => "- wait: 1000\n- wait: \"#ready\"\n- wait:\n    for: \"#ready\"\n    max: 5000",
        "store" => "- store:\n    \"#order-id\": orderId",
        "note" => "- note: Checkout starts here",
        "js" => "- js: \"window.scrollTo(0, 0)\"",
        "scroll" => "- scroll: bottom",
        "run" => "- run: login",
        "if" => "- if:\n    cond: \"{{env}} == prod\"\n    do:\n      - c: \"#prod\"",
        "loop" => "- loop:\n    times: 3\n    do:\n      - c: \".next\"",
        _ => return None,
    };
    Some(example)
}

impl Validator for StructuralValidator {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn validate(&self, definition: &TestDefinition, _context: &ValidationContext) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        for unknown in &definition.unknown_keys {
            issues.push(
                ValidationIssue::warning(
                    error_codes::UNKNOWN_KEY,
                    format!("Unknown top-level key '{}' is ignored", unknown.key),
                    Location::new(unknown.line, unknown.key.clone()),
                )
                .with_fix(format!("Use one of: {}", TOP_LEVEL_KEYS.join(", "))),
            );
        }

        for (_, section) in definition.sections() {
            for node in section {
                self.check_node(node, &mut issues);
            }
        }
        for block in &definition.blocks {
            for node in &block.actions {
                self.check_node(node, &mut issues);
            }
        }

        issues
    }
}
