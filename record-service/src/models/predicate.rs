//! Predicate model - abstract filter trees handed to the storage layer.
//!
//! Trees are assembled without any checks. Structural problems (wrong
//! arity, an expression where a boolean is expected) surface as
//! [`MalformedPredicate`] only when a tree is consumed: validated,
//! evaluated in memory, or translated into a backend filter.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use thiserror::Error;

use super::Data;

static NULL: Value = Value::Null;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed predicate: {0}")]
pub struct MalformedPredicate(pub String);

/// Leaf operand: a reference to a record field or a literal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Expression {
    KeyPath(String),
    Literal(Value),
}

impl Expression {
    pub fn key_path(key: impl Into<String>) -> Self {
        Expression::KeyPath(key.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    /// Value of this operand against `data`. Absent fields read as null.
    fn resolve<'a>(&'a self, data: &'a Data) -> &'a Value {
        match self {
            Expression::KeyPath(key) => data.get(key).unwrap_or(&NULL),
            Expression::Literal(value) => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    And,
    Or,
    Not,
}

impl Operator {
    pub fn is_comparison(&self) -> bool {
        !matches!(self, Operator::And | Operator::Or | Operator::Not)
    }

    /// Operator with its operands swapped, e.g. `a < b` == `b > a`.
    pub fn flipped(&self) -> Self {
        match self {
            Operator::LessThan => Operator::GreaterThan,
            Operator::LessThanOrEqual => Operator::GreaterThanOrEqual,
            Operator::GreaterThan => Operator::LessThan,
            Operator::GreaterThanOrEqual => Operator::LessThanOrEqual,
            other => *other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredicateChild {
    Predicate(Predicate),
    Expression(Expression),
}

impl From<Predicate> for PredicateChild {
    fn from(p: Predicate) -> Self {
        PredicateChild::Predicate(p)
    }
}

impl From<Expression> for PredicateChild {
    fn from(e: Expression) -> Self {
        PredicateChild::Expression(e)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub operator: Operator,
    #[serde(default)]
    pub children: Vec<PredicateChild>,
}

impl Predicate {
    pub fn new(operator: Operator, children: Vec<PredicateChild>) -> Self {
        Self { operator, children }
    }

    pub fn and(predicates: Vec<Predicate>) -> Self {
        Self::new(
            Operator::And,
            predicates.into_iter().map(PredicateChild::from).collect(),
        )
    }

    pub fn or(predicates: Vec<Predicate>) -> Self {
        Self::new(
            Operator::Or,
            predicates.into_iter().map(PredicateChild::from).collect(),
        )
    }

    pub fn not(predicate: Predicate) -> Self {
        Self::new(Operator::Not, vec![predicate.into()])
    }

    pub fn compare(operator: Operator, left: Expression, right: Expression) -> Self {
        Self::new(operator, vec![left.into(), right.into()])
    }

    pub fn equal(left: Expression, right: Expression) -> Self {
        Self::compare(Operator::Equal, left, right)
    }

    /// Structural check of the whole tree.
    pub fn validate(&self) -> Result<(), MalformedPredicate> {
        match self.operator {
            Operator::And | Operator::Or => {
                for child in &self.children {
                    match child {
                        PredicateChild::Predicate(p) => p.validate()?,
                        PredicateChild::Expression(_) => {
                            return Err(MalformedPredicate(format!(
                                "{:?} expects predicate children, got an expression",
                                self.operator
                            )));
                        }
                    }
                }
                Ok(())
            }
            Operator::Not => match self.children.as_slice() {
                [PredicateChild::Predicate(p)] => p.validate(),
                _ => Err(MalformedPredicate(
                    "Not expects exactly one predicate child".to_string(),
                )),
            },
            op => match self.children.as_slice() {
                [PredicateChild::Expression(_), PredicateChild::Expression(_)] => Ok(()),
                _ => Err(MalformedPredicate(format!(
                    "{:?} expects exactly two expression children",
                    op
                ))),
            },
        }
    }

    /// Every field referenced anywhere in the tree.
    pub fn key_paths(&self) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        self.collect_key_paths(&mut keys);
        keys
    }

    fn collect_key_paths(&self, keys: &mut BTreeSet<String>) {
        for child in &self.children {
            match child {
                PredicateChild::Predicate(p) => p.collect_key_paths(keys),
                PredicateChild::Expression(Expression::KeyPath(k)) => {
                    keys.insert(k.clone());
                }
                PredicateChild::Expression(Expression::Literal(_)) => {}
            }
        }
    }

    /// Evaluate against a single row. This is the in-memory counterpart of
    /// translating the tree into a database filter.
    pub fn evaluate(&self, data: &Data) -> Result<bool, MalformedPredicate> {
        self.validate()?;
        Ok(self.eval(data))
    }

    // Assumes `validate` has passed.
    fn eval(&self, data: &Data) -> bool {
        let predicates = || {
            self.children.iter().filter_map(|c| match c {
                PredicateChild::Predicate(p) => Some(p),
                PredicateChild::Expression(_) => None,
            })
        };

        match self.operator {
            Operator::And => predicates().all(|p| p.eval(data)),
            Operator::Or => predicates().any(|p| p.eval(data)),
            Operator::Not => predicates().next().is_some_and(|p| !p.eval(data)),
            op => match self.children.as_slice() {
                [PredicateChild::Expression(l), PredicateChild::Expression(r)] => {
                    compare_values(op, l.resolve(data), r.resolve(data))
                }
                _ => false,
            },
        }
    }
}

fn compare_values(op: Operator, left: &Value, right: &Value) -> bool {
    match op {
        Operator::Equal => values_equal(left, right),
        Operator::NotEqual => !values_equal(left, right),
        _ => {
            let ordering = match (left, right) {
                (Value::Number(a), Value::Number(b)) => {
                    a.as_f64().zip(b.as_f64()).and_then(|(a, b)| a.partial_cmp(&b))
                }
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            };
            match (op, ordering) {
                (Operator::LessThan, Some(o)) => o == Ordering::Less,
                (Operator::LessThanOrEqual, Some(o)) => o != Ordering::Greater,
                (Operator::GreaterThan, Some(o)) => o == Ordering::Greater,
                (Operator::GreaterThanOrEqual, Some(o)) => o != Ordering::Less,
                _ => false,
            }
        }
    }
}

/// JSON equality where numbers compare by value, so `30` equals `30.0`
/// the same way a database `$eq` treats them.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => left == right,
    }
}
