//! Translation of predicate trees into MongoDB query filters.

use mongodb::bson::{self, doc, Bson, Document};

use crate::models::{Data, Expression, MalformedPredicate, Operator, Predicate, PredicateChild};

pub fn to_filter(predicate: &Predicate) -> Result<Document, MalformedPredicate> {
    predicate.validate()?;
    translate(predicate)
}

fn translate(predicate: &Predicate) -> Result<Document, MalformedPredicate> {
    match predicate.operator {
        Operator::And => {
            let children = child_filters(predicate)?;
            if children.is_empty() {
                return Ok(Document::new());
            }
            Ok(doc! { "$and": children })
        }
        Operator::Or => {
            let children = child_filters(predicate)?;
            if children.is_empty() {
                return Ok(doc! { "$expr": false });
            }
            Ok(doc! { "$or": children })
        }
        Operator::Not => {
            let children = child_filters(predicate)?;
            Ok(doc! { "$nor": children })
        }
        op => match predicate.children.as_slice() {
            [PredicateChild::Expression(left), PredicateChild::Expression(right)] => {
                comparison(predicate, op, left, right)
            }
            _ => Err(MalformedPredicate(format!(
                "{:?} expects exactly two expression children",
                op
            ))),
        },
    }
}

fn child_filters(predicate: &Predicate) -> Result<Vec<Document>, MalformedPredicate> {
    predicate
        .children
        .iter()
        .map(|child| match child {
            PredicateChild::Predicate(p) => translate(p),
            PredicateChild::Expression(_) => Err(MalformedPredicate(format!(
                "{:?} expects predicate children, got an expression",
                predicate.operator
            ))),
        })
        .collect()
}

fn comparison(
    node: &Predicate,
    op: Operator,
    left: &Expression,
    right: &Expression,
) -> Result<Document, MalformedPredicate> {
    match (left, right) {
        (Expression::KeyPath(key), Expression::Literal(value)) => {
            field_comparison(key, op, literal(value)?)
        }
        (Expression::Literal(value), Expression::KeyPath(key)) => {
            field_comparison(key, op.flipped(), literal(value)?)
        }
        (Expression::KeyPath(a), Expression::KeyPath(b)) => {
            check_field_name(a)?;
            check_field_name(b)?;
            let mut expr = Document::new();
            expr.insert(
                mongo_operator(op),
                vec![Bson::String(format!("${}", a)), Bson::String(format!("${}", b))],
            );
            Ok(doc! { "$expr": expr })
        }
        // Constant folding; there is no row to look at.
        (Expression::Literal(_), Expression::Literal(_)) => {
            let constant = node.evaluate(&Data::new())?;
            Ok(doc! { "$expr": constant })
        }
    }
}

fn field_comparison(key: &str, op: Operator, value: Bson) -> Result<Document, MalformedPredicate> {
    check_field_name(key)?;
    let mut condition = Document::new();
    condition.insert(mongo_operator(op), value);
    let mut filter = Document::new();
    filter.insert(key, condition);
    Ok(filter)
}

fn mongo_operator(op: Operator) -> &'static str {
    match op {
        Operator::Equal => "$eq",
        Operator::NotEqual => "$ne",
        Operator::LessThan => "$lt",
        Operator::LessThanOrEqual => "$lte",
        Operator::GreaterThan => "$gt",
        Operator::GreaterThanOrEqual => "$gte",
        Operator::And => "$and",
        Operator::Or => "$or",
        Operator::Not => "$not",
    }
}

fn literal(value: &serde_json::Value) -> Result<Bson, MalformedPredicate> {
    bson::to_bson(value).map_err(|e| MalformedPredicate(format!("unsupported literal: {}", e)))
}

/// Key paths address top-level fields only.
fn check_field_name(key: &str) -> Result<(), MalformedPredicate> {
    if key.is_empty() || key.starts_with('$') || key.contains('.') {
        return Err(MalformedPredicate(format!("invalid key path '{}'", key)));
    }
    Ok(())
}
