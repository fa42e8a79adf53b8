use super::SelectorKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The remote action an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Navigate,
    Click,
    Type,
    Key,
    Hover,
    AssertExists,
    AssertNotExists,
    AssertEquals,
    AssertNotEquals,
    AssertGreaterThan,
    AssertLessThan,
    WaitTime,
    WaitElement,
    Store,
    Comment,
    Script,
    Scroll,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Navigate => "navigate",
            OperationKind::Click => "click",
            OperationKind::Type => "type",
            OperationKind::Key => "key",
            OperationKind::Hover => "hover",
            OperationKind::AssertExists => "assert_exists",
            OperationKind::AssertNotExists => "assert_not_exists",
            OperationKind::AssertEquals => "assert_equals",
            OperationKind::AssertNotEquals => "assert_not_equals",
            OperationKind::AssertGreaterThan => "assert_greater_than",
            OperationKind::AssertLessThan => "assert_less_than",
            OperationKind::WaitTime => "wait_time",
            OperationKind::WaitElement => "wait_element",
            OperationKind::Store => "store",
            OperationKind::Comment => "comment",
            OperationKind::Script => "script",
            OperationKind::Scroll => "scroll",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The element or URL an operation acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Selector text exactly as written, after substitution
    pub selector: String,
    pub kind: SelectorKind,
}

impl Target {
    /// An element target whose kind is inferred from its marker.
    pub fn element(selector: impl Into<String>) -> Self {
        let selector = selector.into();
        let kind = SelectorKind::infer(&selector);
        Self { selector, kind }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self {
            selector: url.into(),
            kind: SelectorKind::Url,
        }
    }
}

/// One fully substituted remote step, ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedOperation {
    /// 0-based position in the unrolled sequence
    pub order: usize,

    pub kind: OperationKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Line of the action this operation came from
    pub line: usize,

    /// Path of the action this operation came from
    pub source: String,
}

impl fmt::Display for ResolvedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.order, self.kind)?;
        if let Some(target) = &self.target {
            write!(f, " {}", target.selector)?;
        }
        if let Some(value) = &self.value {
            write!(f, " = {:?}", value)?;
        }
        Ok(())
    }
}
