use super::{error_codes, Location, ValidationContext, ValidationIssue, Validator};
use crate::definition::{ActionKind, ActionNode, Condition, Literal, LoopBound, TestDefinition};
use crate::utils::template;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Resolves variable references and block names.
///
/// Visibility at any point is: `data` globals, the bindings of every
/// enclosing loop, and variables captured by a `store` earlier in the same
/// run. Block bodies only see globals plus their own loops and stores.
pub struct ReferenceValidator;

#[derive(Default)]
struct Scope {
    globals: HashSet<String>,
    loop_locals: Vec<String>,
    runtime: HashSet<String>,
}

enum Resolution {
    CompileTime,
    Runtime,
    Missing,
}

impl Scope {
    fn resolve(&self, name: &str) -> Resolution {
        if self.loop_locals.iter().any(|l| l == name) || self.globals.contains(name) {
            Resolution::CompileTime
        } else if self.runtime.contains(name) {
            Resolution::Runtime
        } else {
            Resolution::Missing
        }
    }
}

fn undefined(name: &str, place: &str, location: Location) -> ValidationIssue {
    ValidationIssue::error(
        error_codes::UNDEFINED_VARIABLE,
        format!("Variable '{}' used in {} is not declared", name, place),
        location,
    )
    .with_fix(format!(
        "Declare '{}' under 'data', bind it with a loop 'as', or capture it with 'store' earlier",
        name
    ))
    .with_example(format!("data:\n  {}: value", name))
}

impl ReferenceValidator {
    pub fn new() -> Self {
        Self
    }

    fn check_list(
        &self,
        nodes: &[ActionNode],
        definition: &TestDefinition,
        scope: &mut Scope,
        context: &ValidationContext,
        issues: &mut Vec<ValidationIssue>,
    ) {
        for node in nodes {
            self.check_node(node, definition, scope, context, issues);
        }
    }

    fn check_node(
        &self,
        node: &ActionNode,
        definition: &TestDefinition,
        scope: &mut Scope,
        context: &ValidationContext,
        issues: &mut Vec<ValidationIssue>,
    ) {
        // Nodes already reported by earlier passes are not checked again,
        // but their declarations still count for the nodes that follow.
        let checked = !context.is_flagged(&node.path);
        let location = || Location::new(node.line, node.path.clone());

        if checked {
            let mut reported = BTreeSet::new();
            for (field, text) in node.template_fields() {
                let place = format!("'{}.{}'", node.shorthand(), field);
                for name in template::references(text) {
                    if !reported.insert(name) {
                        continue;
                    }
                    // Durations are rendered into numbers at compile time
                    if matches!(field, "ms" | "max") {
                        self.check_control_variable(name, &place, scope, location(), issues);
                    } else if matches!(scope.resolve(name), Resolution::Missing) {
                        issues.push(undefined(name, &place, location()));
                    }
                }
            }
        }

        match &node.kind {
            ActionKind::Store {
                variable: Some(variable),
                ..
            } => {
                scope.runtime.insert(variable.clone());
            }
            ActionKind::Run { block: Some(name) } if checked => {
                let count = definition.blocks.iter().filter(|b| &b.name == name).count();
                if count == 0 {
                    issues.push(
                        ValidationIssue::error(
                            error_codes::UNDEFINED_BLOCK,
                            format!("Block '{}' is not defined", name),
                            location(),
                        )
                        .with_fix("Add the block under 'blocks' or fix the name")
                        .with_example(format!("blocks:\n  - name: {}\n    do:\n      - c: \"#go\"", name)),
                    );
                } else if count > 1 {
                    issues.push(ValidationIssue::error(
                        error_codes::DUPLICATE_BLOCK,
                        format!("Block '{}' is defined {} times; it must be defined exactly once", name, count),
                        location(),
                    ));
                }
            }
            ActionKind::If {
                condition,
                then,
                otherwise,
            } => {
                if checked {
                    if let Some(Ok(condition)) = condition.as_deref().map(Condition::parse) {
                        for name in condition.variables() {
                            self.check_control_variable(name, "'if.cond'", scope, location(), issues);
                        }
                    }
                }
                // Only one branch is compiled, so a capture is visible after
                // the `if` only when both branches make it.
                let before = scope.runtime.clone();
                self.check_list(then, definition, scope, context, issues);
                let after_then = std::mem::replace(&mut scope.runtime, before.clone());
                self.check_list(otherwise, definition, scope, context, issues);
                let after_otherwise = std::mem::replace(&mut scope.runtime, before);
                scope
                    .runtime
                    .extend(after_then.intersection(&after_otherwise).cloned());
            }
            ActionKind::Loop(spec) => {
                if checked {
                    match &spec.bound {
                        Some(LoopBound::Times(Literal::Str(times))) => {
                            if let Some(name) = template::whole_reference(times) {
                                self.check_control_variable(name, "'loop.times'", scope, location(), issues);
                            }
                        }
                        Some(LoopBound::Over(items)) => {
                            for item in items {
                                if let Literal::Str(text) = item {
                                    for name in template::references(text) {
                                        self.check_control_variable(name, "'loop.over'", scope, location(), issues);
                                    }
                                }
                            }
                        }
                        _ => {}
                    }
                }

                let before = scope.runtime.clone();
                scope.loop_locals.push(spec.binding_name().to_string());
                self.check_list(&spec.body, definition, scope, context, issues);
                scope.loop_locals.pop();

                // A body that may run zero times captures nothing for the nodes after it
                if !runs_at_least_once(spec.bound.as_ref()) {
                    scope.runtime = before;
                }
            }
            _ => {}
        }
    }

    /// Control expressions are evaluated at compile time, so they may only
    /// use globals and loop bindings.
    fn check_control_variable(
        &self,
        name: &str,
        place: &str,
        scope: &Scope,
        location: Location,
        issues: &mut Vec<ValidationIssue>,
    ) {
        match scope.resolve(name) {
            Resolution::CompileTime => {}
            Resolution::Runtime => issues.push(
                ValidationIssue::error(
                    error_codes::RUNTIME_VARIABLE_IN_CONTROL,
                    format!(
                        "{} uses '{}', which is only captured while the test runs",
                        place, name
                    ),
                    location,
                )
                .with_fix("Only 'data' variables and loop bindings are known before the test runs"),
            ),
            Resolution::Missing => issues.push(undefined(name, place, location)),
        }
    }

    fn check_defaults(&self, definition: &TestDefinition, issues: &mut Vec<ValidationIssue>) {
        for variable in &definition.variables {
            if let Literal::Str(text) = &variable.value {
                for name in template::references(text) {
                    if definition.variable(name).is_none() {
                        issues.push(undefined(
                            name,
                            &format!("the default of '{}'", variable.name),
                            Location::new(variable.line, format!("data.{}", variable.name)),
                        ));
                    }
                }
            }
        }
    }

    fn check_block_cycles(&self, definition: &TestDefinition, issues: &mut Vec<ValidationIssue>) {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for block in &definition.blocks {
            *counts.entry(block.name.as_str()).or_default() += 1;
        }

        // Duplicate definitions are reported at the second and later occurrences
        let mut seen = HashSet::new();
        for block in &definition.blocks {
            if !seen.insert(block.name.as_str()) {
                issues.push(ValidationIssue::error(
                    error_codes::DUPLICATE_BLOCK,
                    format!("Block '{}' is already defined", block.name),
                    Location::new(block.line, block.path.clone()),
                ));
            }
        }

        let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();
        for block in definition.blocks.iter().filter(|b| counts[b.name.as_str()] == 1) {
            let mut targets = Vec::new();
            collect_runs(&block.actions, &mut targets);
            graph.insert(block.name.as_str(), targets);
        }

        for cycle in find_cycles(&graph) {
            let Some(first) = definition.blocks.iter().find(|b| b.name == cycle[0]) else {
                continue;
            };
            issues.push(
                ValidationIssue::error(
                    error_codes::RECURSIVE_BLOCK,
                    format!("Blocks run each other in a cycle: {}", cycle.join(" -> ")),
                    Location::new(first.line, first.path.clone()),
                )
                .with_fix("Blocks are expanded inline and must not run themselves, directly or indirectly"),
            );
        }
    }
}

fn runs_at_least_once(bound: Option<&LoopBound>) -> bool {
    match bound {
        Some(LoopBound::Times(Literal::Int(times))) => *times > 0,
        Some(LoopBound::Over(items)) => !items.is_empty(),
        _ => false,
    }
}

fn collect_runs<'a>(nodes: &'a [ActionNode], targets: &mut Vec<&'a str>) {
    for node in nodes {
        if let ActionKind::Run { block: Some(name) } = &node.kind {
            targets.push(name);
        }
        for children in node.children() {
            collect_runs(children, targets);
        }
    }
}

/// Depth-first search for cycles; each cycle is reported once, starting
/// from its alphabetically first block.
fn find_cycles<'a>(graph: &HashMap<&'a str, Vec<&'a str>>) -> Vec<Vec<&'a str>> {
    fn dfs<'a>(
        node: &'a str,
        graph: &HashMap<&'a str, Vec<&'a str>>,
        stack: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
        cycles: &mut BTreeSet<Vec<&'a str>>,
    ) {
        if let Some(pos) = stack.iter().position(|n| *n == node) {
            let mut cycle: Vec<&str> = stack[pos..].to_vec();
            let start = cycle
                .iter()
                .enumerate()
                .min_by_key(|(_, name)| **name)
                .map(|(i, _)| i)
                .unwrap_or(0);
            cycle.rotate_left(start);
            cycle.push(cycle[0]);
            cycles.insert(cycle);
            return;
        }
        if done.contains(node) {
            return;
        }

        stack.push(node);
        if let Some(targets) = graph.get(node) {
            for target in targets {
                dfs(*target, graph, stack, done, cycles);
            }
        }
        stack.pop();
        done.insert(node);
    }

    let mut names: Vec<&str> = graph.keys().copied().collect();
    names.sort_unstable();

    let mut cycles = BTreeSet::new();
    let mut done = HashSet::new();
    for name in names {
        dfs(name, graph, &mut Vec::new(), &mut done, &mut cycles);
    }
    cycles.into_iter().collect()
}

impl Validator for ReferenceValidator {
    fn name(&self) -> &'static str {
        "cross-reference"
    }

    fn validate(&self, definition: &TestDefinition, context: &ValidationContext) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let globals: HashSet<String> = definition.variables.iter().map(|v| v.name.clone()).collect();

        self.check_defaults(definition, &mut issues);

        // setup, do and teardown form one run and share captured variables
        let mut scope = Scope {
            globals: globals.clone(),
            ..Scope::default()
        };
        for (_, section) in definition.sections() {
            self.check_list(section, definition, &mut scope, context, &mut issues);
        }

        for block in &definition.blocks {
            let mut scope = Scope {
                globals: globals.clone(),
                ..Scope::default()
            };
            self.check_list(&block.actions, definition, &mut scope, context, &mut issues);
        }

        self.check_block_cycles(definition, &mut issues);
        issues
    }
}
