//! Condition predicates.
//!
//! Evaluation is pure and synchronous: it reads the execution context and
//! never touches the browser. Missing data evaluates to false.

use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::model::ValueQuery;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Predicate {
    Literal {
        value: bool,
    },
    /// The queried value has been captured
    Exists {
        operand: ValueQuery,
    },
    /// Present, non-empty, and not "false" or "0"
    Truthy {
        operand: ValueQuery,
    },
    Equals {
        left: ValueQuery,
        right: ValueQuery,
    },
    /// Both sides present and different
    NotEquals {
        left: ValueQuery,
        right: ValueQuery,
    },
    /// Numeric comparison; unparsable operands are false
    Compare {
        left: ValueQuery,
        cmp: CompareOp,
        right: ValueQuery,
    },
    Contains {
        haystack: ValueQuery,
        needle: ValueQuery,
    },
    PreviousStepSucceeded,
    And {
        all: Vec<Predicate>,
    },
    Or {
        any: Vec<Predicate>,
    },
    Not {
        predicate: Box<Predicate>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn holds(&self, left: f64, right: f64) -> bool {
        match self {
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Gt => left > right,
            CompareOp::Ge => left >= right,
        }
    }
}

impl Predicate {
    pub fn evaluate(&self, context: &ExecutionContext) -> bool {
        match self {
            Predicate::Literal { value } => *value,
            Predicate::Exists { operand } => context.lookup(operand).is_some(),
            Predicate::Truthy { operand } => {
                context.lookup(operand).map(is_truthy).unwrap_or(false)
            }
            Predicate::Equals { left, right } => {
                match (context.lookup(left), context.lookup(right)) {
                    (Some(l), Some(r)) => l == r,
                    _ => false,
                }
            }
            Predicate::NotEquals { left, right } => {
                match (context.lookup(left), context.lookup(right)) {
                    (Some(l), Some(r)) => l != r,
                    _ => false,
                }
            }
            Predicate::Compare { left, cmp, right } => {
                let l = context.lookup(left).and_then(parse_number);
                let r = context.lookup(right).and_then(parse_number);
                match (l, r) {
                    (Some(l), Some(r)) => cmp.holds(l, r),
                    _ => false,
                }
            }
            Predicate::Contains { haystack, needle } => {
                match (context.lookup(haystack), context.lookup(needle)) {
                    (Some(h), Some(n)) => h.contains(n),
                    _ => false,
                }
            }
            Predicate::PreviousStepSucceeded => context.previous_step_succeeded(),
            Predicate::And { all } => all.iter().all(|p| p.evaluate(context)),
            Predicate::Or { any } => any.iter().any(|p| p.evaluate(context)),
            Predicate::Not { predicate } => !predicate.evaluate(context),
        }
    }

    /// Nesting depth of the expression, a leaf being 1.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 1usize)];

        while let Some((predicate, depth)) = pending.pop() {
            deepest = deepest.max(depth);
            match predicate {
                Predicate::And { all: children } | Predicate::Or { any: children } => {
                    pending.extend(children.iter().map(|c| (c, depth + 1)));
                }
                Predicate::Not { predicate } => {
                    pending.push((predicate.as_ref(), depth + 1));
                }
                _ => {}
            }
        }

        deepest
    }
}

fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
}

fn parse_number(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| !n.is_nan())
}
