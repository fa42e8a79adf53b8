use crate::definition::{
    ActionKind, ActionNode, AssertKind, BindingScope, Block, Literal,
    LoopBound, LoopSpec, TestDefinition, UnknownKey, VariableBinding, WaitSpec, ACTION_KEYS,
};
use crate::error::ParseError;
use crate::utils::template;
use regex::Regex;
use serde_yaml::{Mapping, Value};
use tracing::debug;

/// Parse a test definition from YAML or JSON text.
///
/// Only the shape of the document is checked here. Problems with individual
/// actions are kept in the returned model for the validator to report.
pub fn parse(text: &str) -> Result<TestDefinition, ParseError> {
    let root = decode(text)?;
    let mapping = match root {
        Value::Mapping(m) => m,
        Value::Null => return Err(ParseError::new(1, "document is empty")),
        _ => return Err(ParseError::new(1, "document root must be a mapping")),
    };

    for required in ["test", "do"] {
        if mapping.get(required).is_none() {
            return Err(ParseError::new(
                1,
                format!("missing required top-level key '{}'", required),
            ));
        }
    }

    let mut parser = Parser {
        locator: LineLocator::new(text),
    };
    let definition = parser.definition(&mapping)?;
    debug!(
        test = %definition.name,
        nodes = definition.node_count(),
        "Parsed test definition"
    );
    Ok(definition)
}

fn decode(text: &str) -> Result<Value, ParseError> {
    if text.trim_start().starts_with('{') {
        let json: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| ParseError::new(e.line().max(1), format!("invalid JSON: {}", e)))?;
        return serde_yaml::to_value(json)
            .map_err(|e| ParseError::new(1, format!("invalid JSON: {}", e)));
    }

    serde_yaml::from_str(text).map_err(|e| {
        let line = e.location().map(|l| l.line()).unwrap_or(1);
        ParseError::new(line, format!("invalid YAML: {}", e))
    })
}

/// Finds source lines for keys by scanning forward through the text.
///
/// The model is built in document order, so each lookup starts where the
/// previous one ended.
struct LineLocator<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
    cursor: usize,
}

impl<'a> LineLocator<'a> {
    fn new(text: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            text,
            line_starts,
            cursor: 0,
        }
    }

    fn line_of(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(index) => index + 1,
            Err(index) => index,
        }
    }

    fn current_line(&self) -> usize {
        self.line_of(self.cursor)
    }

    /// Moves past the next occurrence of `key:` and returns its line.
    fn advance_to_key(&mut self, key: &str) -> usize {
        let pattern = format!(
            r#"(?m)(?:^|[\s{{,\-])["']?{}["']?\s*:"#,
            regex::escape(key)
        );
        let found = Regex::new(&pattern)
            .ok()
            .and_then(|re| re.find_at(self.text, self.cursor));
        match found {
            Some(m) => {
                self.cursor = m.end();
                self.line_of(m.end().saturating_sub(1))
            }
            None => self.current_line(),
        }
    }
}

struct Parser<'a> {
    locator: LineLocator<'a>,
}

fn key_text(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "~".to_string(),
        _ => "<complex key>".to_string(),
    }
}

fn scalar_string(value: &Value) -> Result<Option<String>, ()> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Tagged(tagged) => scalar_string(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => Err(()),
    }
}

fn literal(value: &Value) -> Result<Option<Literal>, ()> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(Literal::Bool(*b))),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Ok(Some(Literal::Int(i))),
            (None, Some(f)) => Ok(Some(Literal::Float(f))),
            _ => Err(()),
        },
        Value::String(s) => Ok(Some(Literal::Str(s.clone()))),
        Value::Tagged(tagged) => literal(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => Err(()),
    }
}

/// Splits a one-entry map into its key and value.
fn single_pair(value: &Value) -> Option<(&Value, &Value)> {
    match value {
        Value::Mapping(m) if m.len() == 1 => m.iter().next(),
        _ => None,
    }
}

fn malformed(key: &str, reason: impl Into<String>) -> ActionKind {
    ActionKind::Malformed {
        key: key.to_string(),
        reason: reason.into(),
    }
}

impl Parser<'_> {
    fn definition(&mut self, root: &Mapping) -> Result<TestDefinition, ParseError> {
        let mut definition = TestDefinition {
            name: String::new(),
            name_line: 1,
            description: None,
            base_url: None,
            base_url_line: 1,
            variables: Vec::new(),
            setup: Vec::new(),
            actions: Vec::new(),
            teardown: Vec::new(),
            blocks: Vec::new(),
            unknown_keys: Vec::new(),
        };

        // Walk keys in document order so line lookups only move forward
        for (key, value) in root {
            let key = key_text(key);
            let line = self.locator.advance_to_key(&key);
            match key.as_str() {
                "test" => {
                    definition.name_line = line;
                    definition.name = scalar_string(value)
                        .map_err(|_| ParseError::new(line, "'test' must be a string"))?
                        .unwrap_or_default();
                }
                "desc" => {
                    definition.description = scalar_string(value)
                        .map_err(|_| ParseError::new(line, "'desc' must be a string"))?;
                }
                "nav" => {
                    definition.base_url_line = line;
                    definition.base_url = scalar_string(value)
                        .map_err(|_| ParseError::new(line, "'nav' must be a string"))?;
                }
                "data" => definition.variables = self.variables(value, line)?,
                "setup" => definition.setup = self.section(value, "setup", line)?,
                "do" => definition.actions = self.section(value, "do", line)?,
                "teardown" => definition.teardown = self.section(value, "teardown", line)?,
                "blocks" => definition.blocks = self.blocks(value, line)?,
                _ => definition.unknown_keys.push(UnknownKey { key, line }),
            }
        }

        Ok(definition)
    }

    fn variables(&mut self, value: &Value, line: usize) -> Result<Vec<VariableBinding>, ParseError> {
        let mapping = match value {
            Value::Null => return Ok(Vec::new()),
            Value::Mapping(m) => m,
            _ => return Err(ParseError::new(line, "'data' must be a mapping of name: value")),
        };

        let mut variables = Vec::with_capacity(mapping.len());
        for (key, value) in mapping {
            let name = match key {
                Value::String(s) => s.clone(),
                other => {
                    return Err(ParseError::new(
                        line,
                        format!("variable name '{}' must be a string", key_text(other)),
                    ))
                }
            };
            let var_line = self.locator.advance_to_key(&name);
            let value = match literal(value) {
                Ok(Some(v)) => v,
                Ok(None) => {
                    return Err(ParseError::new(
                        var_line,
                        format!("variable '{}' needs a default value", name),
                    ))
                }
                Err(()) => {
                    return Err(ParseError::new(
                        var_line,
                        format!("variable '{}' must be a string, number or boolean", name),
                    ))
                }
            };
            variables.push(VariableBinding {
                name,
                value,
                scope: BindingScope::Global,
                line: var_line,
            });
        }
        Ok(variables)
    }

    fn section(&mut self, value: &Value, name: &str, line: usize) -> Result<Vec<ActionNode>, ParseError> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Sequence(items) => Ok(self.actions(items, name)),
            _ => Err(ParseError::new(line, format!("'{}' must be a list of actions", name))),
        }
    }

    fn blocks(&mut self, value: &Value, line: usize) -> Result<Vec<Block>, ParseError> {
        let items = match value {
            Value::Null => return Ok(Vec::new()),
            Value::Sequence(items) => items,
            _ => return Err(ParseError::new(line, "'blocks' must be a list of {name, do} entries")),
        };

        let mut blocks = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let path = format!("blocks[{}]", index);
            let mapping = match item {
                Value::Mapping(m) => m,
                _ => return Err(ParseError::new(self.locator.current_line(), format!("{} must be a mapping", path))),
            };

            let mut name = None;
            let mut block_line = self.locator.current_line();
            let mut actions = None;
            for (key, value) in mapping {
                let key = key_text(key);
                let key_line = self.locator.advance_to_key(&key);
                match key.as_str() {
                    "name" => {
                        block_line = key_line;
                        name = scalar_string(value).ok().flatten();
                    }
                    "do" => match value {
                        Value::Sequence(items) => {
                            actions = Some(self.actions(items, &format!("{}.do", path)))
                        }
                        _ => {
                            return Err(ParseError::new(key_line, format!("{}.do must be a list of actions", path)))
                        }
                    },
                    other => {
                        return Err(ParseError::new(
                            key_line,
                            format!("{} has unsupported key '{}'", path, other),
                        ))
                    }
                }
            }

            let name = name.ok_or_else(|| ParseError::new(block_line, format!("{} requires a 'name'", path)))?;
            let actions = actions.ok_or_else(|| ParseError::new(block_line, format!("{} requires a 'do' list", path)))?;
            blocks.push(Block {
                name,
                line: block_line,
                path,
                actions,
            });
        }
        Ok(blocks)
    }

    fn actions(&mut self, items: &[Value], prefix: &str) -> Vec<ActionNode> {
        items
            .iter()
            .enumerate()
            .map(|(index, item)| self.action(item, format!("{}[{}]", prefix, index)))
            .collect()
    }

    fn action(&mut self, entry: &Value, path: String) -> ActionNode {
        let mapping = match entry {
            Value::Mapping(m) => m,
            _ => {
                let line = self.locator.current_line();
                return ActionNode::new(ActionKind::Unrecognized { keys: Vec::new() }, line, path);
            }
        };

        let keys: Vec<String> = mapping.keys().map(key_text).collect();
        let (recognized, unknown): (Vec<&String>, Vec<&String>) =
            keys.iter().partition(|k| ACTION_KEYS.contains(&k.as_str()));

        let Some(primary) = recognized.first().map(|k| k.as_str()) else {
            let line = match keys.first() {
                Some(first) => self.locator.advance_to_key(first),
                None => self.locator.current_line(),
            };
            return ActionNode::new(ActionKind::Unrecognized { keys }, line, path);
        };

        let line = self.locator.advance_to_key(primary);
        let value = mapping.get(primary).unwrap_or(&Value::Null);
        let mut nested_unknown = Vec::new();
        let kind = self.action_kind(primary, value, &path, &mut nested_unknown);

        let mut node = ActionNode::new(kind, line, path);
        node.unknown_keys = unknown.into_iter().cloned().collect();
        node.unknown_keys.extend(nested_unknown);
        node.extra_actions = recognized[1..].iter().map(|k| k.to_string()).collect();
        node
    }

    fn action_kind(
        &mut self,
        key: &str,
        value: &Value,
        path: &str,
        unknown: &mut Vec<String>,
    ) -> ActionKind {
        let text = |value: &Value| scalar_string(value).map_err(|_| malformed(key, format!("'{}' expects a string", key)));

        let result = match key {
            "nav" => text(value).map(|url| ActionKind::Navigate { url }),
            "c" => text(value).map(|selector| ActionKind::Click { selector }),
            "h" => text(value).map(|selector| ActionKind::Hover { selector }),
            "k" => text(value).map(|key| ActionKind::Key { key }),
            "note" => text(value).map(|text| ActionKind::Comment { text }),
            "js" => text(value).map(|code| ActionKind::Script { code }),
            "scroll" => text(value).map(|target| ActionKind::Scroll { target }),
            "run" => text(value).map(|block| ActionKind::Run { block }),
            "t" => Ok(type_action(value)),
            "ch" | "nch" | "eq" | "neq" | "gt" | "lt" => Ok(assert_action(key, value)),
            "wait" => Ok(wait_action(value, unknown)),
            "store" => Ok(match single_pair(value) {
                Some((selector, variable)) => match (scalar_string(selector), scalar_string(variable)) {
                    (Ok(selector), Ok(variable)) => ActionKind::Store { selector, variable },
                    _ => malformed("store", "'store' selector and variable must be strings"),
                },
                None => malformed("store", "'store' expects a one-entry map {selector: variableName}"),
            }),
            "if" => Ok(self.if_action(value, path, unknown)),
            "loop" => Ok(self.loop_action(value, path, unknown)),
            other => Ok(ActionKind::Unrecognized {
                keys: vec![other.to_string()],
            }),
        };

        result.unwrap_or_else(|kind| kind)
    }

    fn nested(&mut self, value: &Value, path: String) -> Result<Vec<ActionNode>, ()> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Sequence(items) => Ok(self.actions(items, &path)),
            _ => Err(()),
        }
    }

    fn if_action(&mut self, value: &Value, path: &str, unknown: &mut Vec<String>) -> ActionKind {
        let mapping = match value {
            Value::Mapping(m) => m,
            _ => return malformed("if", "'if' expects a mapping with 'cond', 'do' and optional 'else'"),
        };

        let mut condition = None;
        let mut then = Vec::new();
        let mut otherwise = Vec::new();
        for (key, value) in mapping {
            let key = key_text(key);
            match key.as_str() {
                "cond" | "condition" => match scalar_string(value) {
                    Ok(c) => condition = c,
                    Err(()) => return malformed("if", "'if.cond' must be a string"),
                },
                "do" | "then" => match self.nested(value, format!("{}.then", path)) {
                    Ok(nodes) => then = nodes,
                    Err(()) => return malformed("if", format!("'if.{}' must be a list of actions", key)),
                },
                "else" => match self.nested(value, format!("{}.else", path)) {
                    Ok(nodes) => otherwise = nodes,
                    Err(()) => return malformed("if", "'if.else' must be a list of actions"),
                },
                other => unknown.push(format!("if.{}", other)),
            }
        }

        ActionKind::If {
            condition,
            then,
            otherwise,
        }
    }

    fn loop_action(&mut self, value: &Value, path: &str, unknown: &mut Vec<String>) -> ActionKind {
        let mapping = match value {
            Value::Mapping(m) => m,
            _ => return malformed("loop", "'loop' expects a mapping with 'times' or 'over' and 'do'"),
        };

        let mut bound = None;
        let mut binding = None;
        let mut body = Vec::new();
        for (key, value) in mapping {
            let key = key_text(key);
            match key.as_str() {
                "times" => {
                    if bound.is_some() {
                        return malformed("loop", "use either 'times' or 'over', not both");
                    }
                    match literal(value) {
                        Ok(Some(times)) => bound = Some(LoopBound::Times(times)),
                        Ok(None) => {}
                        Err(()) => return malformed("loop", "'loop.times' must be a number"),
                    }
                }
                "over" => {
                    if bound.is_some() {
                        return malformed("loop", "use either 'times' or 'over', not both");
                    }
                    let items = match value {
                        Value::Sequence(items) => items,
                        _ => return malformed("loop", "'loop.over' must be a list of values"),
                    };
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        match literal(item) {
                            Ok(Some(v)) => values.push(v),
                            _ => return malformed("loop", "'loop.over' items must be strings, numbers or booleans"),
                        }
                    }
                    bound = Some(LoopBound::Over(values));
                }
                "as" => match scalar_string(value) {
                    Ok(name) => binding = name,
                    Err(()) => return malformed("loop", "'loop.as' must be a variable name"),
                },
                "do" => match self.nested(value, format!("{}.do", path)) {
                    Ok(nodes) => body = nodes,
                    Err(()) => return malformed("loop", "'loop.do' must be a list of actions"),
                },
                other => unknown.push(format!("loop.{}", other)),
            }
        }

        ActionKind::Loop(LoopSpec { bound, binding, body })
    }
}

fn type_action(value: &Value) -> ActionKind {
    match value {
        Value::Mapping(m) => match single_pair(value) {
            Some((selector, text)) => match (scalar_string(selector), scalar_string(text)) {
                (Ok(selector), Ok(text)) => ActionKind::Type { selector, text },
                _ => malformed("t", "'t' selector and text must be strings"),
            },
            None => malformed(
                "t",
                format!("'t' map form must have exactly one selector: text pair, found {}", m.len()),
            ),
        },
        Value::Sequence(_) => malformed("t", "'t' expects text or a one-entry map {selector: text}"),
        other => match scalar_string(other) {
            Ok(text) => ActionKind::Type { selector: None, text },
            Err(()) => malformed("t", "'t' expects text or a one-entry map {selector: text}"),
        },
    }
}

fn assert_action(key: &str, value: &Value) -> ActionKind {
    let pair_kind = match key {
        "ch" => Some(AssertKind::Equals),
        "eq" => Some(AssertKind::Equals),
        "neq" => Some(AssertKind::NotEquals),
        "gt" => Some(AssertKind::GreaterThan),
        "lt" => Some(AssertKind::LessThan),
        _ => None,
    };

    if let Value::Mapping(_) = value {
        return match (pair_kind, single_pair(value)) {
            (Some(check), Some((selector, expected))) => {
                match (scalar_string(selector), scalar_string(expected)) {
                    (Ok(selector), Ok(expected)) => ActionKind::Assert {
                        check,
                        selector,
                        expected,
                    },
                    _ => malformed(key, format!("'{}' selector and expected value must be strings", key)),
                }
            }
            (Some(_), None) => malformed(key, format!("'{}' expects a one-entry map {{selector: value}}", key)),
            (None, _) => malformed(key, format!("'{}' expects a selector string", key)),
        };
    }

    let check = match key {
        "ch" => AssertKind::Exists,
        "nch" => AssertKind::NotExists,
        _ => return malformed(key, format!("'{}' expects a one-entry map {{selector: value}}", key)),
    };
    match scalar_string(value) {
        Ok(selector) => ActionKind::Assert {
            check,
            selector,
            expected: None,
        },
        Err(()) => malformed(key, format!("'{}' expects a selector string", key)),
    }
}

fn wait_action(value: &Value, unknown: &mut Vec<String>) -> ActionKind {
    match value {
        Value::Number(_) => match literal(value) {
            Ok(Some(ms)) => ActionKind::Wait(WaitSpec::Duration(ms)),
            _ => malformed("wait", "'wait' duration must be a number"),
        },
        // A lone `{{name}}` is a duration; selectors never consist of just a reference
        Value::String(s) if s.trim().parse::<f64>().is_ok() || template::whole_reference(s).is_some() => {
            ActionKind::Wait(WaitSpec::Duration(Literal::Str(s.clone())))
        }
        Value::String(s) => ActionKind::Wait(WaitSpec::Element {
            selector: Some(s.clone()),
            timeout: None,
        }),
        Value::Null => ActionKind::Wait(WaitSpec::Element {
            selector: None,
            timeout: None,
        }),
        Value::Mapping(m) => {
            let mut selector = None;
            let mut timeout = None;
            let mut duration = None;
            for (key, value) in m {
                let key = key_text(key);
                match key.as_str() {
                    "for" => match scalar_string(value) {
                        Ok(s) => selector = s,
                        Err(()) => return malformed("wait", "'wait.for' must be a selector string"),
                    },
                    "max" | "timeout" => match literal(value) {
                        Ok(t) => timeout = t,
                        Err(()) => return malformed("wait", format!("'wait.{}' must be a number", key)),
                    },
                    "ms" => match literal(value) {
                        Ok(Some(ms)) => duration = Some(ms),
                        _ => return malformed("wait", "'wait.ms' must be a number"),
                    },
                    other => unknown.push(format!("wait.{}", other)),
                }
            }
            match duration {
                Some(ms) if selector.is_none() => ActionKind::Wait(WaitSpec::Duration(ms)),
                Some(_) => malformed("wait", "use either 'ms' or 'for', not both"),
                None => ActionKind::Wait(WaitSpec::Element { selector, timeout }),
            }
        }
        _ => malformed("wait", "'wait' expects milliseconds, a selector or {for, max}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_minimal_definition() {
        let yaml = r##"
test: Login flow
nav: https://app.example.com
data:
  user: alice
  retries: 2
do:
  - nav: /login
  - t:
      "#name": "{{user}}"
  - c: Sign in
"##;
        let def = parse(yaml).unwrap();
        assert_eq!(def.name, "Login flow");
        assert_eq!(def.base_url.as_deref(), Some("https://app.example.com"));
        assert_eq!(def.variables.len(), 2);
        assert_eq!(def.variables[1].value, Literal::Int(2));
        assert_eq!(def.actions.len(), 3);
        assert_eq!(
            def.actions[1].kind,
            ActionKind::Type {
                selector: Some("#name".into()),
                text: Some("{{user}}".into())
            }
        );
        assert_eq!(def.actions[1].path, "do[1]");
    }

    #[test]
    fn records_action_lines() {
        let yaml = "test: lines\ndo:\n  - c: '#a'\n  - note: hi\n  - loop:\n      times: 2\n      do:\n        - c: .next\n";
        let def = parse(yaml).unwrap();
        assert_eq!(def.name_line, 1);
        assert_eq!(def.actions[0].line, 3);
        assert_eq!(def.actions[1].line, 4);
        assert_eq!(def.actions[2].line, 5);
        let ActionKind::Loop(spec) = &def.actions[2].kind else {
            panic!("expected loop");
        };
        assert_eq!(spec.body[0].line, 8);
        assert_eq!(spec.body[0].path, "do[2].do[0]");
    }

    #[test]
    fn accepts_json() {
        let json = r##"{"test": "json", "do": [{"c": "#go"}, {"wait": 500}]}"##;
        let def = parse(json).unwrap();
        assert_eq!(def.actions.len(), 2);
        assert_eq!(
            def.actions[1].kind,
            ActionKind::Wait(WaitSpec::Duration(Literal::Int(500)))
        );
    }

    #[test]
    fn missing_required_keys_fail() {
        let err = parse("test: x\n").unwrap_err();
        assert!(err.reason.contains("'do'"));
        let err = parse("do: []\n").unwrap_err();
        assert!(err.reason.contains("'test'"));
    }

    #[test]
    fn malformed_yaml_reports_line() {
        let err = parse("test: x\ndo:\n  - c: [unclosed\n").unwrap_err();
        assert!(err.line >= 3, "line was {}", err.line);
        assert!(err.reason.starts_with("invalid YAML"));
    }

    #[test]
    fn non_list_do_is_rejected() {
        let err = parse("test: x\ndo: click\n").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn non_scalar_data_is_rejected() {
        let err = parse("test: x\ndata:\n  users: [a, b]\ndo: []\n").unwrap_err();
        assert_eq!(err.line, 3);
    }

    #[test]
    fn action_shape_problems_are_kept_for_validation() {
        let yaml = r##"
test: shapes
do:
  - t: {}
  - store: nope
  - c: "#a"
    nav: /x
    colour: red
  - bogus: 1
"##;
        let def = parse(yaml).unwrap();
        assert!(matches!(def.actions[0].kind, ActionKind::Malformed { ref key, .. } if key == "t"));
        assert!(matches!(def.actions[1].kind, ActionKind::Malformed { ref key, .. } if key == "store"));
        assert_eq!(def.actions[2].extra_actions, vec!["nav".to_string()]);
        assert_eq!(def.actions[2].unknown_keys, vec!["colour".to_string()]);
        assert_eq!(
            def.actions[3].kind,
            ActionKind::Unrecognized {
                keys: vec!["bogus".into()]
            }
        );
    }

    #[test]
    fn parses_control_flow() {
        let yaml = r##"
test: control
data:
  env: prod
do:
  - if:
      cond: "{{env}} == prod"
      do:
        - c: "#prod"
      else:
        - c: "#dev"
  - loop:
      over: [a, b]
      as: letter
      do:
        - t: "{{letter}}"
"##;
        let def = parse(yaml).unwrap();
        match &def.actions[0].kind {
            ActionKind::If {
                condition,
                then,
                otherwise,
            } => {
                assert_eq!(condition.as_deref(), Some("{{env}} == prod"));
                assert_eq!(then[0].path, "do[0].then[0]");
                assert_eq!(otherwise[0].path, "do[0].else[0]");
            }
            other => panic!("expected if, got {:?}", other),
        }
        match &def.actions[1].kind {
            ActionKind::Loop(spec) => {
                assert_eq!(
                    spec.bound,
                    Some(LoopBound::Over(vec![
                        Literal::Str("a".into()),
                        Literal::Str("b".into())
                    ]))
                );
                assert_eq!(spec.binding_name(), "letter");
            }
            other => panic!("expected loop, got {:?}", other),
        }
    }

    #[test]
    fn wait_forms() {
        let yaml = r##"
test: waits
do:
  - wait: "#spinner"
  - wait: "250"
  - wait:
      for: "#ready"
      max: 5000
  - wait: "{{delay}}"
"##;
        let def = parse(yaml).unwrap();
        assert_eq!(
            def.actions[0].kind,
            ActionKind::Wait(WaitSpec::Element {
                selector: Some("#spinner".into()),
                timeout: None
            })
        );
        assert_eq!(
            def.actions[1].kind,
            ActionKind::Wait(WaitSpec::Duration(Literal::Str("250".into())))
        );
        assert_eq!(
            def.actions[2].kind,
            ActionKind::Wait(WaitSpec::Element {
                selector: Some("#ready".into()),
                timeout: Some(Literal::Int(5000))
            })
        );
        assert_eq!(
            def.actions[3].kind,
            ActionKind::Wait(WaitSpec::Duration(Literal::Str("{{delay}}".into())))
        );
    }

    #[test]
    fn parses_blocks_and_sections() {
        let yaml = r##"
test: blocks
setup:
  - run: login
do:
  - c: "#go"
teardown:
  - note: done
blocks:
  - name: login
    do:
      - t: { "#user": admin }
unexpected: true
"##;
        let def = parse(yaml).unwrap();
        assert_eq!(def.setup.len(), 1);
        assert_eq!(def.teardown.len(), 1);
        assert_eq!(def.blocks[0].name, "login");
        assert_eq!(def.blocks[0].actions[0].path, "blocks[0].do[0]");
        assert_eq!(def.unknown_keys[0].key, "unexpected");
    }
}
