//! Turns a validated definition into the flat list of remote operations.

mod environment;
pub mod navigation;
mod operation;
pub mod selector;

pub use environment::Overrides;
pub use operation::{OperationKind, ResolvedOperation, Target};
pub use selector::SelectorKind;

use crate::definition::{
    ActionKind, ActionNode, AssertKind, Block, Condition, Literal, LoopBound, LoopSpec,
    TestDefinition, WaitSpec, MAX_LOOP_ITERATIONS,
};
use crate::error::CompileError;
use crate::utils::template;
use crate::validation::{error_codes, Location, ValidatedDefinition, ValidationIssue};
use environment::{Binding, Environment};
use tracing::debug;

/// Deepest allowed chain of `run` expansions.
const MAX_BLOCK_DEPTH: usize = 32;

/// Compiles a definition that passed validation.
///
/// Sections are compiled in the order `setup`, `do`, `teardown`. `order`
/// is assigned sequentially from 0 across the unrolled sequence.
pub fn compile(
    validated: &ValidatedDefinition,
    overrides: &Overrides,
) -> Result<Vec<ResolvedOperation>, CompileError> {
    let definition = validated.definition();
    let env = Environment::from_definition(definition, overrides).map_err(CompileError::Issues)?;

    let mut compiler = Compiler {
        definition,
        env,
        operations: Vec::new(),
        depth: 0,
    };
    for (section, nodes) in definition.sections() {
        debug!("Compiling section '{}' ({} actions)", section, nodes.len());
        compiler.compile_list(nodes)?;
    }

    debug!(
        "Compiled '{}' into {} operations",
        definition.name,
        compiler.operations.len()
    );
    Ok(compiler.operations)
}

struct Compiler<'a> {
    definition: &'a TestDefinition,
    env: Environment,
    operations: Vec<ResolvedOperation>,
    depth: usize,
}

impl<'a> Compiler<'a> {
    fn compile_list(&mut self, nodes: &'a [ActionNode]) -> Result<(), CompileError> {
        for node in nodes {
            self.compile_node(node)?;
        }
        Ok(())
    }

    fn compile_node(&mut self, node: &'a ActionNode) -> Result<(), CompileError> {
        match &node.kind {
            ActionKind::If {
                condition,
                then,
                otherwise,
            } => {
                let text = required(node, condition.as_deref(), "condition")?;
                let condition =
                    Condition::parse(text).map_err(|err| invariant(node, err.to_string()))?;
                let env = &self.env;
                let holds = condition
                    .evaluate(|name| env.value(name).cloned())
                    .map_err(|err| invariant(node, err.to_string()))?;
                debug!("Condition '{}' at {} is {}", text, node.path, holds);
                self.compile_list(if holds { then } else { otherwise })
            }
            ActionKind::Loop(spec) => self.compile_loop(node, spec),
            ActionKind::Run { block } => {
                let name = required(node, block.as_deref(), "block")?;
                self.compile_block(node, name)
            }
            ActionKind::Malformed { reason, .. } => Err(invariant(node, reason.clone())),
            ActionKind::Unrecognized { keys } => Err(invariant(
                node,
                format!("no action key among [{}]", keys.join(", ")),
            )),
            _ => {
                let operation = self.leaf(node)?;
                if let ActionKind::Store {
                    variable: Some(variable),
                    ..
                } = &node.kind
                {
                    self.env.capture(variable);
                }
                self.operations.push(operation);
                Ok(())
            }
        }
    }

    fn compile_loop(&mut self, node: &'a ActionNode, spec: &'a LoopSpec) -> Result<(), CompileError> {
        let values: Vec<Literal> = match &spec.bound {
            Some(LoopBound::Times(times)) => {
                let count = self.loop_count(node, times)?;
                (0..count).map(Literal::Int).collect()
            }
            Some(LoopBound::Over(items)) => items
                .iter()
                .map(|item| self.render_literal(node, item))
                .collect::<Result<_, _>>()?,
            None => return Err(invariant(node, "loop has no bound")),
        };

        let binding = spec.binding_name();
        for value in values {
            self.env.push(binding, value);
            let result = self.compile_list(&spec.body);
            self.env.pop();
            result?;
        }
        Ok(())
    }

    fn loop_count(&self, node: &ActionNode, times: &Literal) -> Result<i64, CompileError> {
        let value = match times {
            Literal::Str(text) => match template::whole_reference(text) {
                Some(name) => self
                    .env
                    .value(name)
                    .cloned()
                    .ok_or_else(|| invariant(node, format!("loop bound '{}' is unresolved", name)))?,
                None => times.clone(),
            },
            other => other.clone(),
        };

        match value.as_i64() {
            Some(count) if (0..=MAX_LOOP_ITERATIONS).contains(&count) => Ok(count),
            _ => Err(CompileError::Issues(vec![ValidationIssue::error(
                error_codes::UNRESOLVED_LOOP_BOUND,
                format!(
                    "'loop.times' resolved to '{}'; expected an integer between 0 and {}",
                    value, MAX_LOOP_ITERATIONS
                ),
                Location::new(node.line, node.path.clone()),
            )])),
        }
    }

    fn compile_block(&mut self, node: &ActionNode, name: &str) -> Result<(), CompileError> {
        let definition = self.definition;
        let mut matches = definition.blocks.iter().filter(|b| b.name == name);
        let block: &'a Block = match (matches.next(), matches.next()) {
            (Some(block), None) => block,
            (None, _) => return Err(invariant(node, format!("block '{}' does not exist", name))),
            (Some(_), Some(_)) => {
                return Err(invariant(node, format!("block '{}' is defined twice", name)))
            }
        };

        if self.depth >= MAX_BLOCK_DEPTH {
            return Err(invariant(
                node,
                format!("block expansion deeper than {} levels at '{}'", MAX_BLOCK_DEPTH, name),
            ));
        }

        // Block bodies see globals only
        let frames = self.env.take_frames();
        self.depth += 1;
        let result = self.compile_list(&block.actions);
        self.depth -= 1;
        self.env.restore_frames(frames);
        result
    }

    fn leaf(&self, node: &ActionNode) -> Result<ResolvedOperation, CompileError> {
        let element = |selector: &Option<String>| -> Result<Target, CompileError> {
            let selector = required(node, selector.as_deref(), "selector")?;
            Ok(Target::element(self.render(node, selector)?))
        };
        let text = |value: &Option<String>, field: &str| -> Result<String, CompileError> {
            self.render(node, required(node, value.as_deref(), field)?)
        };

        let (kind, target, value) = match &node.kind {
            ActionKind::Navigate { url } => {
                let url = text(url, "url")?;
                let resolved = navigation::resolve(self.definition.base_url.as_deref(), &url)
                    .map_err(|err| invariant(node, format!("cannot resolve '{}': {}", url, err)))?;
                (OperationKind::Navigate, Some(Target::url(resolved)), None)
            }
            ActionKind::Click { selector } => (OperationKind::Click, Some(element(selector)?), None),
            ActionKind::Hover { selector } => (OperationKind::Hover, Some(element(selector)?), None),
            ActionKind::Type { selector, text: typed } => {
                let target = match selector {
                    Some(_) => Some(element(selector)?),
                    None => None,
                };
                (OperationKind::Type, target, Some(text(typed, "text")?))
            }
            ActionKind::Key { key } => (OperationKind::Key, None, Some(normalize_key(&text(key, "key")?))),
            ActionKind::Assert {
                check,
                selector,
                expected,
            } => {
                let expected = match expected {
                    Some(expected) => Some(self.render(node, expected)?),
                    None if check.needs_expected() => {
                        return Err(invariant(node, "assertion has no expected value"))
                    }
                    None => None,
                };
                (assert_kind(*check), Some(element(selector)?), expected)
            }
            ActionKind::Wait(WaitSpec::Duration(ms)) => (
                OperationKind::WaitTime,
                None,
                Some(self.milliseconds(node, ms, "wait")?),
            ),
            ActionKind::Wait(WaitSpec::Element { selector, timeout }) => {
                let timeout = match timeout {
                    Some(ms) => Some(self.milliseconds(node, ms, "wait.max")?),
                    None => None,
                };
                (OperationKind::WaitElement, Some(element(selector)?), timeout)
            }
            ActionKind::Store { selector, variable } => (
                OperationKind::Store,
                Some(element(selector)?),
                Some(required(node, variable.as_deref(), "variable")?.to_string()),
            ),
            ActionKind::Comment { text: note } => (OperationKind::Comment, None, Some(text(note, "text")?)),
            ActionKind::Script { code } => (OperationKind::Script, None, Some(text(code, "code")?)),
            ActionKind::Scroll { target } => {
                let rendered = text(target, "target")?;
                match rendered.trim().to_ascii_lowercase().as_str() {
                    "top" | "bottom" => (OperationKind::Scroll, None, Some(rendered.trim().to_ascii_lowercase())),
                    _ => (OperationKind::Scroll, Some(Target::element(rendered)), None),
                }
            }
            ActionKind::If { .. }
            | ActionKind::Loop(_)
            | ActionKind::Run { .. }
            | ActionKind::Malformed { .. }
            | ActionKind::Unrecognized { .. } => {
                return Err(invariant(node, "control node compiled as a leaf"))
            }
        };

        Ok(ResolvedOperation {
            order: self.operations.len(),
            kind,
            target,
            value,
            line: node.line,
            source: node.path.clone(),
        })
    }

    /// Substitutes every reference. Runtime captures become `$name`.
    fn render(&self, node: &ActionNode, text: &str) -> Result<String, CompileError> {
        template::substitute(text, |name| match self.env.lookup(name) {
            Some(Binding::Value(value)) => Some(value.to_string()),
            Some(Binding::Runtime) => Some(format!("${}", name)),
            None => None,
        })
        .map_err(|name| invariant(node, format!("unresolved variable '{}'", name)))
    }

    /// Renders a literal; a string that is one whole reference keeps the
    /// referenced value's type.
    fn render_literal(&self, node: &ActionNode, literal: &Literal) -> Result<Literal, CompileError> {
        match literal {
            Literal::Str(text) => match template::whole_reference(text).and_then(|n| self.env.value(n)) {
                Some(value) => Ok(value.clone()),
                None => Ok(Literal::Str(self.render(node, text)?)),
            },
            other => Ok(other.clone()),
        }
    }

    fn milliseconds(&self, node: &ActionNode, ms: &Literal, field: &str) -> Result<String, CompileError> {
        let value = self.render_literal(node, ms)?;
        match value.as_f64() {
            Some(ms) if ms >= 0.0 => Ok((ms.round() as u64).to_string()),
            _ => Err(CompileError::Issues(vec![ValidationIssue::error(
                error_codes::INVALID_NUMBER,
                format!("'{}' resolved to '{}'; expected non-negative milliseconds", field, value),
                Location::new(node.line, node.path.clone()),
            )])),
        }
    }
}

fn required<'n>(node: &ActionNode, value: Option<&'n str>, field: &str) -> Result<&'n str, CompileError> {
    value.ok_or_else(|| invariant(node, format!("'{}' has no {}", node.shorthand(), field)))
}

fn invariant(node: &ActionNode, reason: impl Into<String>) -> CompileError {
    CompileError::InvariantViolated(format!(
        "{} (line {}, at {})",
        reason.into(),
        node.line,
        node.path
    ))
}

fn assert_kind(check: AssertKind) -> OperationKind {
    match check {
        AssertKind::Exists => OperationKind::AssertExists,
        AssertKind::NotExists => OperationKind::AssertNotExists,
        AssertKind::Equals => OperationKind::AssertEquals,
        AssertKind::NotEquals => OperationKind::AssertNotEquals,
        AssertKind::GreaterThan => OperationKind::AssertGreaterThan,
        AssertKind::LessThan => OperationKind::AssertLessThan,
    }
}

/// Maps common spellings to the key names the platform expects.
/// Unknown names and combinations pass through unchanged.
pub fn normalize_key(key: &str) -> String {
    let normalized = match key.trim().to_ascii_lowercase().as_str() {
        "enter" | "return" => "Enter",
        "esc" | "escape" => "Escape",
        "tab" => "Tab",
        "space" | "spacebar" => "Space",
        "backspace" => "Backspace",
        "delete" | "del" => "Delete",
        "up" | "arrowup" => "ArrowUp",
        "down" | "arrowdown" => "ArrowDown",
        "left" | "arrowleft" => "ArrowLeft",
        "right" | "arrowright" => "ArrowRight",
        "home" => "Home",
        "end" => "End",
        "pageup" => "PageUp",
        "pagedown" => "PageDown",
        _ => return key.trim().to_string(),
    };
    normalized.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    fn compile_yaml(yaml: &str) -> Result<Vec<ResolvedOperation>, CompileError> {
        compile_with(yaml, &[])
    }

    fn compile_with(yaml: &str, overrides: &[(&str, Literal)]) -> Result<Vec<ResolvedOperation>, CompileError> {
        let validated = ValidatedDefinition::new(parse(yaml).unwrap()).unwrap();
        let overrides = overrides
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        compile(&validated, &overrides)
    }

    fn summary(ops: &[ResolvedOperation]) -> Vec<(usize, OperationKind, Option<&str>, Option<&str>)> {
        ops.iter()
            .map(|op| {
                (
                    op.order,
                    op.kind,
                    op.target.as_ref().map(|t| t.selector.as_str()),
                    op.value.as_deref(),
                )
            })
            .collect()
    }

    #[test]
    fn type_substitutes_data_variable() {
        let ops = compile_yaml("test: login\ndata:\n  user: alice\ndo:\n  - t: { '#name': '{{user}}' }\n").unwrap();
        assert_eq!(summary(&ops), vec![(0, OperationKind::Type, Some("#name"), Some("alice"))]);
        assert_eq!(ops[0].target.as_ref().unwrap().kind, SelectorKind::Css);
        assert_eq!(ops[0].line, 5);
        assert_eq!(ops[0].source, "do[0]");
    }

    #[test]
    fn loop_times_unrolls_in_order() {
        let ops = compile_yaml("test: pages\ndo:\n  - loop:\n      times: 3\n      do:\n        - c: .next\n").unwrap();
        assert_eq!(
            summary(&ops),
            vec![
                (0, OperationKind::Click, Some(".next"), None),
                (1, OperationKind::Click, Some(".next"), None),
                (2, OperationKind::Click, Some(".next"), None),
            ]
        );
    }

    #[test]
    fn loop_bindings_are_visible_in_body() {
        let ops = compile_yaml(
            "test: rows\ndo:\n  - loop: { over: [a, b], do: [ { c: '#row-{{item}}' } ] }\n  - loop: { times: 2, as: i, do: [ { note: 'pass {{i}}' } ] }\n",
        )
        .unwrap();
        assert_eq!(
            summary(&ops),
            vec![
                (0, OperationKind::Click, Some("#row-a"), None),
                (1, OperationKind::Click, Some("#row-b"), None),
                (2, OperationKind::Comment, None, Some("pass 0")),
                (3, OperationKind::Comment, None, Some("pass 1")),
            ]
        );
    }

    #[test]
    fn loop_bound_from_variable_and_override() {
        let yaml = "test: n\ndata:\n  n: 2\ndo:\n  - loop: { times: '{{n}}', do: [ { c: go } ] }\n";
        assert_eq!(compile_yaml(yaml).unwrap().len(), 2);
        assert_eq!(compile_with(yaml, &[("n", Literal::Int(4))]).unwrap().len(), 4);

        let err = compile_with(yaml, &[("n", Literal::Str("many".into()))]).unwrap_err();
        assert_eq!(err.error_code(), error_codes::UNRESOLVED_LOOP_BOUND);
    }

    #[test]
    fn if_selects_one_branch() {
        let yaml = "test: branch\ndata:\n  env: prod\ndo:\n  - if:\n      cond: '{{env}} == prod'\n      do:\n        - c: Live\n      else:\n        - c: Staging\n";
        let ops = compile_yaml(yaml).unwrap();
        assert_eq!(summary(&ops), vec![(0, OperationKind::Click, Some("Live"), None)]);
        assert_eq!(ops[0].target.as_ref().unwrap().kind, SelectorKind::Guess);

        let ops = compile_with(yaml, &[("env", Literal::Str("qa".into()))]).unwrap();
        assert_eq!(summary(&ops), vec![(0, OperationKind::Click, Some("Staging"), None)]);
    }

    #[test]
    fn navigation_is_joined_with_base() {
        let ops = compile_yaml(
            "test: nav\nnav: https://app.example.com/base/\ndo:\n  - nav: login\n  - wait: 500\n  - nav: https://other.example.com/x\n  - wait: '#ready'\n",
        )
        .unwrap();
        assert_eq!(
            summary(&ops),
            vec![
                (0, OperationKind::Navigate, Some("https://app.example.com/base/login"), None),
                (1, OperationKind::WaitTime, None, Some("500")),
                (2, OperationKind::Navigate, Some("https://other.example.com/x"), None),
                (3, OperationKind::WaitElement, Some("#ready"), None),
            ]
        );
        assert_eq!(ops[0].target.as_ref().unwrap().kind, SelectorKind::Url);
    }

    #[test]
    fn sections_compile_in_order() {
        let ops = compile_yaml("test: s\nteardown:\n  - note: bye\nsetup:\n  - note: hi\ndo:\n  - c: main\n").unwrap();
        assert_eq!(
            summary(&ops),
            vec![
                (0, OperationKind::Comment, None, Some("hi")),
                (1, OperationKind::Click, Some("main"), None),
                (2, OperationKind::Comment, None, Some("bye")),
            ]
        );
    }

    #[test]
    fn blocks_are_inlined_with_globals_only() {
        let ops = compile_yaml(
            "test: blocks\ndata:\n  user: alice\nblocks:\n  - name: login\n    do:\n      - t: { '#user': '{{user}}' }\n      - k: enter\ndo:\n  - run: login\n  - loop: { times: 2, do: [ { run: login } ] }\n",
        )
        .unwrap();
        assert_eq!(ops.len(), 6);
        assert_eq!(ops[1].value.as_deref(), Some("Enter"));
        assert_eq!(ops[5].order, 5);
        assert_eq!(ops[4].source, "blocks[0].do[0]");
    }

    #[test]
    fn store_captures_compile_to_runtime_form() {
        let ops = compile_yaml(
            "test: store\ndo:\n  - store: { '#total': total }\n  - ch: { '#summary': 'Total {{total}}' }\n",
        )
        .unwrap();
        assert_eq!(
            summary(&ops),
            vec![
                (0, OperationKind::Store, Some("#total"), Some("total")),
                (1, OperationKind::AssertEquals, Some("#summary"), Some("Total $total")),
            ]
        );
    }

    #[test]
    fn type_without_selector_targets_focus() {
        let ops = compile_yaml("test: focus\ndo:\n  - t: hello\n  - scroll: Bottom\n  - scroll: '#footer'\n").unwrap();
        assert_eq!(
            summary(&ops),
            vec![
                (0, OperationKind::Type, None, Some("hello")),
                (1, OperationKind::Scroll, None, Some("bottom")),
                (2, OperationKind::Scroll, Some("#footer"), None),
            ]
        );
    }

    #[test]
    fn waits_resolve_from_variables() {
        let yaml = "test: w\ndata:\n  delay: 250\ndo:\n  - wait: '{{delay}}'\n  - wait: { for: '//main', max: 1500.4 }\n";
        let ops = compile_yaml(yaml).unwrap();
        assert_eq!(
            summary(&ops),
            vec![
                (0, OperationKind::WaitTime, None, Some("250")),
                (1, OperationKind::WaitElement, Some("//main"), Some("1500")),
            ]
        );
        assert_eq!(ops[1].target.as_ref().unwrap().kind, SelectorKind::Xpath);

        let err = compile_with(yaml, &[("delay", Literal::Str("soon".into()))]).unwrap_err();
        assert_eq!(err.error_code(), error_codes::INVALID_NUMBER);
    }

    #[test]
    fn unknown_override_is_a_compile_issue() {
        let err = compile_with("test: o\ndo:\n  - c: x\n", &[("ghost", Literal::Int(1))]).unwrap_err();
        assert_eq!(err.error_code(), error_codes::UNKNOWN_OVERRIDE);
    }

    #[test]
    fn key_names_are_normalized() {
        assert_eq!(normalize_key("enter"), "Enter");
        assert_eq!(normalize_key("ESC"), "Escape");
        assert_eq!(normalize_key("down"), "ArrowDown");
        assert_eq!(normalize_key("Control+a"), "Control+a");
    }
}
