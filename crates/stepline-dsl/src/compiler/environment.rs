use crate::definition::{Literal, TestDefinition};
use crate::utils::template;
use crate::validation::{error_codes, Location, ValidationIssue};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Variable values supplied at compile time, keyed by name.
pub type Overrides = BTreeMap<String, Literal>;

/// Compile-time variable resolution.
///
/// Lookups check loop frames innermost first, then globals. Names captured
/// by `store` are tracked separately; they have no value until the remote
/// platform runs the step.
#[derive(Debug, Default)]
pub(crate) struct Environment {
    globals: HashMap<String, Literal>,
    frames: Vec<(String, Literal)>,
    runtime: HashSet<String>,
}

/// How a reference resolved.
pub(crate) enum Binding<'a> {
    Value(&'a Literal),
    Runtime,
}

impl Environment {
    /// Builds the global bindings from `data` defaults and overrides.
    pub(crate) fn from_definition(
        definition: &TestDefinition,
        overrides: &Overrides,
    ) -> Result<Self, Vec<ValidationIssue>> {
        let mut issues = Vec::new();

        for name in overrides.keys() {
            if definition.variable(name).is_none() {
                issues.push(
                    ValidationIssue::error(
                        error_codes::UNKNOWN_OVERRIDE,
                        format!("Override '{}' does not match any variable under 'data'", name),
                        Location::new(0, format!("overrides.{}", name)),
                    )
                    .with_fix(format!("Declare '{}' under 'data' or drop the override", name)),
                );
            }
        }

        let raw: HashMap<&str, &Literal> = definition
            .variables
            .iter()
            .map(|v| (v.name.as_str(), overrides.get(&v.name).unwrap_or(&v.value)))
            .collect();

        let mut globals = HashMap::new();
        for variable in &definition.variables {
            // Overridden values are taken verbatim
            if let Some(value) = overrides.get(&variable.name) {
                globals.insert(variable.name.clone(), value.clone());
                continue;
            }
            let mut visiting = Vec::new();
            match expand(&variable.name, &raw, &mut visiting, &mut globals) {
                Ok(_) => {}
                Err(reason) => issues.push(
                    ValidationIssue::error(
                        error_codes::UNRESOLVABLE_DEFAULT,
                        format!("Default of '{}' cannot be resolved: {}", variable.name, reason),
                        Location::new(variable.line, format!("data.{}", variable.name)),
                    )
                    .with_fix("Defaults may reference other 'data' variables, but not in a cycle"),
                ),
            }
        }

        if issues.is_empty() {
            Ok(Self {
                globals,
                ..Self::default()
            })
        } else {
            Err(issues)
        }
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<Binding<'_>> {
        self.frames
            .iter()
            .rev()
            .find(|(bound, _)| bound == name)
            .map(|(_, value)| value)
            .or_else(|| self.globals.get(name))
            .map(Binding::Value)
            .or_else(|| self.runtime.contains(name).then(|| Binding::Runtime))
    }

    /// Compile-time value of a name, ignoring runtime captures.
    pub(crate) fn value(&self, name: &str) -> Option<&Literal> {
        match self.lookup(name) {
            Some(Binding::Value(value)) => Some(value),
            _ => None,
        }
    }

    pub(crate) fn push(&mut self, name: &str, value: Literal) {
        self.frames.push((name.to_string(), value));
    }

    pub(crate) fn pop(&mut self) {
        self.frames.pop();
    }

    /// Detaches the loop frames, leaving only globals visible.
    pub(crate) fn take_frames(&mut self) -> Vec<(String, Literal)> {
        std::mem::take(&mut self.frames)
    }

    pub(crate) fn restore_frames(&mut self, frames: Vec<(String, Literal)>) {
        self.frames = frames;
    }

    pub(crate) fn capture(&mut self, name: &str) {
        self.runtime.insert(name.to_string());
    }
}

/// Resolves one default, expanding references to other defaults.
fn expand(
    name: &str,
    raw: &HashMap<&str, &Literal>,
    visiting: &mut Vec<String>,
    resolved: &mut HashMap<String, Literal>,
) -> Result<Literal, String> {
    if let Some(value) = resolved.get(name) {
        return Ok(value.clone());
    }
    if visiting.iter().any(|v| v == name) {
        visiting.push(name.to_string());
        return Err(format!("cycle {}", visiting.join(" -> ")));
    }
    let value = *raw
        .get(name)
        .ok_or_else(|| format!("'{}' is not declared", name))?;

    visiting.push(name.to_string());
    let expanded = match value {
        Literal::Str(text) => match template::whole_reference(text) {
            Some(target) => expand(target, raw, visiting, resolved)?,
            None if template::contains_reference(text) => {
                let mut failure = None;
                let rendered = template::substitute(text, |target| {
                    match expand(target, raw, visiting, resolved) {
                        Ok(v) => Some(v.to_string()),
                        Err(reason) => {
                            failure.get_or_insert(reason);
                            None
                        }
                    }
                });
                match (rendered, failure) {
                    (_, Some(reason)) => return Err(reason),
                    (Err(missing), None) => return Err(format!("'{}' is not declared", missing)),
                    (Ok(text), None) => Literal::Str(text),
                }
            }
            None => value.clone(),
        },
        other => other.clone(),
    };
    visiting.pop();

    resolved.insert(name.to_string(), expanded.clone());
    Ok(expanded)
}
