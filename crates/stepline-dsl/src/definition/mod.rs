//! In-memory representation of a parsed test definition.
//!
//! Everything in this module is plain data. The parser builds it, the
//! validator and the compiler read it, nothing mutates it afterwards.

pub(crate) mod action;
mod condition;

pub use action::{
    ActionKind, ActionNode, AssertKind, LoopBound, LoopSpec, WaitSpec, ACTION_KEYS,
    MAX_LOOP_ITERATIONS,
};
pub use condition::{Comparison, Condition, ConditionError, Operand};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level keys of the dialect.
pub const TOP_LEVEL_KEYS: &[&str] = &[
    "test", "desc", "nav", "data", "setup", "do", "teardown", "blocks",
];

/// A literal value as written in the test definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Literal {
    /// Integer view of the literal. Strings holding an integer count.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Literal::Int(i) => Some(*i),
            Literal::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Literal::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Numeric view of the literal. Strings holding a number count.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Int(i) => Some(*i as f64),
            Literal::Float(f) => Some(*f),
            Literal::Str(s) => s.trim().parse().ok(),
            Literal::Bool(_) => None,
        }
    }

    /// Returns the string payload if this literal was written as a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Interprets command-line text: integers, floats and booleans are
    /// recognized, everything else stays a string.
    pub fn from_text(text: &str) -> Self {
        if let Ok(i) = text.parse::<i64>() {
            Literal::Int(i)
        } else if let Ok(f) = text.parse::<f64>() {
            Literal::Float(f)
        } else if let Ok(b) = text.parse::<bool>() {
            Literal::Bool(b)
        } else {
            Literal::Str(text.to_string())
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(x) => write!(f, "{}", x),
            Literal::Str(s) => f.write_str(s),
        }
    }
}

/// Where a variable binding is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindingScope {
    /// Declared under `data`, visible everywhere.
    Global,
    /// Introduced by a loop, visible inside its body only.
    LoopLocal,
}

/// A named value visible to template references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableBinding {
    pub name: String,
    pub value: Literal,
    pub scope: BindingScope,
    /// Source line of the declaration (0 for bindings created at compile time)
    pub line: usize,
}

/// A reusable, named action list invoked with `run: <name>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: String,
    pub line: usize,
    pub path: String,
    pub actions: Vec<ActionNode>,
}

/// A top-level key the dialect does not know about.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownKey {
    pub key: String,
    pub line: usize,
}

/// Root of a parsed test definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TestDefinition {
    /// Test name (`test`)
    pub name: String,

    /// Line of the `test` key
    pub name_line: usize,

    /// Free-form description (`desc`)
    pub description: Option<String>,

    /// Base navigation target (`nav`); relative navigations are joined against it
    pub base_url: Option<String>,

    /// Line of the `nav` key
    pub base_url_line: usize,

    /// Declared variables in declaration order (`data`)
    pub variables: Vec<VariableBinding>,

    /// Actions run before the main sequence (`setup`)
    pub setup: Vec<ActionNode>,

    /// Main action sequence (`do`)
    pub actions: Vec<ActionNode>,

    /// Actions run after the main sequence (`teardown`)
    pub teardown: Vec<ActionNode>,

    /// Named blocks (`blocks`)
    pub blocks: Vec<Block>,

    /// Top-level keys that were not recognized
    pub unknown_keys: Vec<UnknownKey>,
}

impl TestDefinition {
    /// The three executable sections, in execution order.
    pub fn sections(&self) -> [(&'static str, &[ActionNode]); 3] {
        [
            ("setup", &self.setup),
            ("do", &self.actions),
            ("teardown", &self.teardown),
        ]
    }

    /// Looks up a declared (global) variable.
    pub fn variable(&self, name: &str) -> Option<&VariableBinding> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Visits every action node, blocks included, in document order.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a ActionNode)) {
        fn walk_list<'a>(nodes: &'a [ActionNode], visit: &mut dyn FnMut(&'a ActionNode)) {
            for node in nodes {
                visit(node);
                for child in node.children() {
                    walk_list(child, visit);
                }
            }
        }

        for (_, section) in self.sections() {
            walk_list(section, visit);
        }
        for block in &self.blocks {
            walk_list(&block.actions, visit);
        }
    }

    /// Number of action nodes, control nodes included.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_numeric_views() {
        assert_eq!(Literal::Int(3).as_i64(), Some(3));
        assert_eq!(Literal::Float(2.0).as_i64(), Some(2));
        assert_eq!(Literal::Float(2.5).as_i64(), None);
        assert_eq!(Literal::Str(" 7 ".into()).as_i64(), Some(7));
        assert_eq!(Literal::Str("abc".into()).as_f64(), None);
        assert_eq!(Literal::Bool(true).as_f64(), None);
    }

    #[test]
    fn literal_from_text() {
        assert_eq!(Literal::from_text("42"), Literal::Int(42));
        assert_eq!(Literal::from_text("1.5"), Literal::Float(1.5));
        assert_eq!(Literal::from_text("false"), Literal::Bool(false));
        assert_eq!(Literal::from_text("alice"), Literal::Str("alice".into()));
    }

    #[test]
    fn literal_display() {
        assert_eq!(Literal::Str("x".into()).to_string(), "x");
        assert_eq!(Literal::Int(-4).to_string(), "-4");
        assert_eq!(Literal::Bool(true).to_string(), "true");
    }
}
