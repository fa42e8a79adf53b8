use super::Literal;

/// Shorthand keys that select an action kind.
pub const ACTION_KEYS: &[&str] = &[
    "nav", "c", "t", "k", "h", "ch", "nch", "eq", "neq", "gt", "lt", "wait", "store", "note",
    "js", "scroll", "run", "if", "loop",
];

/// Upper bound on iterations of a single loop.
pub const MAX_LOOP_ITERATIONS: i64 = 1000;

/// Kinds of assertion an `Assert` node can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertKind {
    Exists,
    NotExists,
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
}

impl AssertKind {
    /// The shorthand key this assertion is written with.
    pub fn shorthand(&self) -> &'static str {
        match self {
            AssertKind::Exists | AssertKind::Equals => "ch",
            AssertKind::NotExists => "nch",
            AssertKind::NotEquals => "neq",
            AssertKind::GreaterThan => "gt",
            AssertKind::LessThan => "lt",
        }
    }

    /// Whether the assertion compares against an expected value.
    pub fn needs_expected(&self) -> bool {
        !matches!(self, AssertKind::Exists | AssertKind::NotExists)
    }
}

/// What a `wait` action waits for.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitSpec {
    /// A fixed pause in milliseconds.
    Duration(Literal),
    /// An element to appear, with an optional timeout in milliseconds.
    Element {
        selector: Option<String>,
        timeout: Option<Literal>,
    },
}

/// Iteration bound of a loop.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopBound {
    /// Run the body N times.
    Times(Literal),
    /// Run the body once per listed value.
    Over(Vec<Literal>),
}

/// A bounded loop.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSpec {
    pub bound: Option<LoopBound>,
    /// Name of the loop-local binding (`as`)
    pub binding: Option<String>,
    pub body: Vec<ActionNode>,
}

impl LoopSpec {
    /// Name of the loop-local binding, falling back to `item`/`index`.
    pub fn binding_name(&self) -> &str {
        match (&self.binding, &self.bound) {
            (Some(name), _) => name,
            (None, Some(LoopBound::Over(_))) => "item",
            (None, _) => "index",
        }
    }
}

/// The closed set of actions a test definition can contain.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    Navigate { url: Option<String> },
    Click { selector: Option<String> },
    /// Typing with no selector targets the focused element.
    Type { selector: Option<String>, text: Option<String> },
    Key { key: Option<String> },
    Hover { selector: Option<String> },
    Assert {
        check: AssertKind,
        selector: Option<String>,
        expected: Option<String>,
    },
    Wait(WaitSpec),
    Store { selector: Option<String>, variable: Option<String> },
    Comment { text: Option<String> },
    Script { code: Option<String> },
    Scroll { target: Option<String> },
    Run { block: Option<String> },
    If {
        condition: Option<String>,
        then: Vec<ActionNode>,
        otherwise: Vec<ActionNode>,
    },
    Loop(LoopSpec),
    /// A recognized key whose value has the wrong shape.
    Malformed { key: String, reason: String },
    /// An entry with no recognized action key.
    Unrecognized { keys: Vec<String> },
}

/// One entry of an action list.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionNode {
    pub kind: ActionKind,

    /// 1-based source line
    pub line: usize,

    /// Location inside the definition, e.g. `do[2].then[0]`
    pub path: String,

    /// Keys in this entry that are not part of the dialect
    pub unknown_keys: Vec<String>,

    /// Additional action keys found in the same entry
    pub extra_actions: Vec<String>,
}

impl ActionNode {
    pub fn new(kind: ActionKind, line: usize, path: impl Into<String>) -> Self {
        Self {
            kind,
            line,
            path: path.into(),
            unknown_keys: Vec::new(),
            extra_actions: Vec::new(),
        }
    }

    /// The shorthand key of this node, used in diagnostics.
    pub fn shorthand(&self) -> &str {
        match &self.kind {
            ActionKind::Navigate { .. } => "nav",
            ActionKind::Click { .. } => "c",
            ActionKind::Type { .. } => "t",
            ActionKind::Key { .. } => "k",
            ActionKind::Hover { .. } => "h",
            ActionKind::Assert { check, .. } => {
                if *check == AssertKind::Equals {
                    "ch"
                } else {
                    check.shorthand()
                }
            }
            ActionKind::Wait(_) => "wait",
            ActionKind::Store { .. } => "store",
            ActionKind::Comment { .. } => "note",
            ActionKind::Script { .. } => "js",
            ActionKind::Scroll { .. } => "scroll",
            ActionKind::Run { .. } => "run",
            ActionKind::If { .. } => "if",
            ActionKind::Loop(_) => "loop",
            ActionKind::Malformed { key, .. } => key,
            ActionKind::Unrecognized { .. } => "?",
        }
    }

    /// Leaf nodes produce exactly one operation when compiled.
    pub fn is_leaf(&self) -> bool {
        !matches!(
            self.kind,
            ActionKind::If { .. }
                | ActionKind::Loop(_)
                | ActionKind::Run { .. }
                | ActionKind::Malformed { .. }
                | ActionKind::Unrecognized { .. }
        )
    }

    /// Nested action lists, in document order.
    pub fn children(&self) -> Vec<&[ActionNode]> {
        match &self.kind {
            ActionKind::If { then, otherwise, .. } => vec![then.as_slice(), otherwise.as_slice()],
            ActionKind::Loop(spec) => vec![spec.body.as_slice()],
            _ => Vec::new(),
        }
    }

    /// String fields that may contain `{{var}}` references, by field name.
    pub fn template_fields(&self) -> Vec<(&'static str, &str)> {
        fn push<'b>(
            fields: &mut Vec<(&'static str, &'b str)>,
            name: &'static str,
            value: &'b Option<String>,
        ) {
            if let Some(v) = value {
                fields.push((name, v.as_str()));
            }
        }

        let mut fields = Vec::new();
        match &self.kind {
            ActionKind::Navigate { url } => push(&mut fields, "url", url),
            ActionKind::Click { selector } | ActionKind::Hover { selector } => {
                push(&mut fields, "selector", selector)
            }
            ActionKind::Type { selector, text } => {
                push(&mut fields, "selector", selector);
                push(&mut fields, "text", text);
            }
            ActionKind::Key { key } => push(&mut fields, "key", key),
            ActionKind::Assert { selector, expected, .. } => {
                push(&mut fields, "selector", selector);
                push(&mut fields, "expected", expected);
            }
            ActionKind::Wait(WaitSpec::Element { selector, timeout }) => {
                push(&mut fields, "selector", selector);
                if let Some(Literal::Str(s)) = timeout {
                    fields.push(("max", s.as_str()));
                }
            }
            ActionKind::Wait(WaitSpec::Duration(Literal::Str(s))) => fields.push(("ms", s.as_str())),
            ActionKind::Store { selector, .. } => push(&mut fields, "selector", selector),
            ActionKind::Comment { text } => push(&mut fields, "text", text),
            ActionKind::Script { code } => push(&mut fields, "code", code),
            ActionKind::Scroll { target } => push(&mut fields, "target", target),
            _ => {}
        }
        fields
    }
}
