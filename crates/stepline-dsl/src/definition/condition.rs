use super::Literal;
use crate::utils::template;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Comparison operators allowed in `if` conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    // Two-character operators first so `<=` is not read as `<`.
    const TOKENS: [(&'static str, Comparison); 6] = [
        ("==", Comparison::Eq),
        ("!=", Comparison::Ne),
        ("<=", Comparison::Le),
        (">=", Comparison::Ge),
        ("<", Comparison::Lt),
        (">", Comparison::Gt),
    ];

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Comparison::Eq => ordering == Ordering::Equal,
            Comparison::Ne => ordering != Ordering::Equal,
            Comparison::Lt => ordering == Ordering::Less,
            Comparison::Le => ordering != Ordering::Greater,
            Comparison::Gt => ordering == Ordering::Greater,
            Comparison::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = Self::TOKENS
            .iter()
            .find(|(_, op)| op == self)
            .map(|(t, _)| *t)
            .unwrap_or("?");
        f.write_str(token)
    }
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Variable(String),
    Literal(Literal),
}

/// A single `lhs <op> rhs` comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub lhs: Operand,
    pub op: Comparison,
    pub rhs: Operand,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("condition is empty")]
    Empty,

    #[error("condition '{0}' has no comparison operator (==, !=, <, <=, >, >=)")]
    MissingOperator(String),

    #[error("condition '{0}' must contain a single comparison")]
    Compound(String),

    #[error("operand '{0}' must be a literal or a single {{{{variable}}}} reference")]
    InvalidOperand(String),

    #[error("variable '{0}' is not resolved")]
    Unresolved(String),
}

impl Condition {
    /// Parses `lhs <op> rhs`.
    pub fn parse(text: &str) -> Result<Self, ConditionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ConditionError::Empty);
        }

        let (index, op, width) =
            find_operator(text).ok_or_else(|| ConditionError::MissingOperator(text.to_string()))?;
        let lhs = text[..index].trim();
        let rhs = text[index + width..].trim();

        if find_operator(rhs).is_some() {
            return Err(ConditionError::Compound(text.to_string()));
        }

        Ok(Self {
            lhs: parse_operand(lhs)?,
            op,
            rhs: parse_operand(rhs)?,
        })
    }

    /// Names of the variables the condition reads.
    pub fn variables(&self) -> Vec<&str> {
        [&self.lhs, &self.rhs]
            .into_iter()
            .filter_map(|operand| match operand {
                Operand::Variable(name) => Some(name.as_str()),
                Operand::Literal(_) => None,
            })
            .collect()
    }

    /// Evaluates the comparison. Numbers compare numerically, everything
    /// else compares as text.
    pub fn evaluate<F>(&self, resolve: F) -> Result<bool, ConditionError>
    where
        F: Fn(&str) -> Option<Literal>,
    {
        let value_of = |operand: &Operand| match operand {
            Operand::Literal(lit) => Ok(lit.clone()),
            Operand::Variable(name) => {
                resolve(name).ok_or_else(|| ConditionError::Unresolved(name.clone()))
            }
        };
        let left = value_of(&self.lhs)?;
        let right = value_of(&self.rhs)?;

        let ordering = match (numeric(&left), numeric(&right)) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => left.to_string().cmp(&right.to_string()),
        };
        Ok(self.op.holds(ordering))
    }
}

fn numeric(literal: &Literal) -> Option<f64> {
    match literal {
        Literal::Bool(_) => None,
        other => other.as_f64(),
    }
}

fn find_operator(text: &str) -> Option<(usize, Comparison, usize)> {
    let mut quote: Option<char> = None;
    for (index, ch) in text.char_indices() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None => {
                let rest = &text[index..];
                for (token, op) in Comparison::TOKENS {
                    if rest.starts_with(token) {
                        return Some((index, op, token.len()));
                    }
                }
            }
        }
    }
    None
}

fn parse_operand(raw: &str) -> Result<Operand, ConditionError> {
    if raw.is_empty() {
        return Err(ConditionError::InvalidOperand(raw.to_string()));
    }
    if let Some(name) = template::whole_reference(raw) {
        return Ok(Operand::Variable(name.to_string()));
    }
    if template::contains_reference(raw) {
        return Err(ConditionError::InvalidOperand(raw.to_string()));
    }

    let quoted = raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')));
    if quoted {
        return Ok(Operand::Literal(Literal::Str(raw[1..raw.len() - 1].to_string())));
    }

    Ok(Operand::Literal(Literal::from_text(raw)))
}
