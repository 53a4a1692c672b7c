//! Constant folding of access predicates.

use rowgate_query::{Expr, Literal};

/// Replace every leaf of the AND/OR/NOT skeleton of `expr` that `decide`
/// can answer with its truth value.
pub fn fold<F>(expr: Expr, decide: &mut F) -> Expr
where
    F: FnMut(&Expr) -> Option<bool>,
{
    match expr {
        Expr::And(items) => Expr::And(items.into_iter().map(|item| fold(item, decide)).collect()),
        Expr::Or(items) => Expr::Or(items.into_iter().map(|item| fold(item, decide)).collect()),
        Expr::Not(inner) => Expr::Not(Box::new(fold(*inner, decide))),
        Expr::Nested(inner) => Expr::Nested(Box::new(fold(*inner, decide))),
        Expr::Literal(literal) => Expr::Literal(literal),
        leaf => match decide(&leaf) {
            Some(value) => Expr::boolean(value),
            None => leaf,
        },
    }
}

/// Simplify boolean literals out of the AND/OR/NOT skeleton.
///
/// Parentheses are kept around conjunctions and disjunctions only; the
/// result is a literal only when the whole expression is decided.
pub fn simplify(expr: Expr) -> Expr {
    match expr {
        Expr::And(items) => {
            let mut kept = Vec::with_capacity(items.len());
            for item in items {
                match literal(simplify(item)) {
                    Ok(false) => return Expr::boolean(false),
                    Ok(true) => {}
                    Err(item) => kept.push(item),
                }
            }
            if kept.is_empty() {
                Expr::boolean(true)
            } else {
                Expr::and(kept)
            }
        }
        Expr::Or(items) => {
            let mut kept = Vec::with_capacity(items.len());
            for item in items {
                match literal(simplify(item)) {
                    Ok(true) => return Expr::boolean(true),
                    Ok(false) => {}
                    Err(item) => kept.push(item),
                }
            }
            if kept.is_empty() {
                Expr::boolean(false)
            } else {
                Expr::or(kept)
            }
        }
        Expr::Not(inner) => match literal(simplify(*inner)) {
            Ok(value) => Expr::boolean(!value),
            Err(inner) => Expr::Not(Box::new(inner)),
        },
        Expr::Nested(inner) => match simplify(*inner) {
            inner @ (Expr::And(_) | Expr::Or(_)) => Expr::nested(inner),
            inner => inner,
        },
        other => other,
    }
}

/// The value of a boolean literal, or the expression back.
pub fn literal(expr: Expr) -> Result<bool, Expr> {
    match expr {
        Expr::Literal(Literal::Boolean(value)) => Ok(value),
        other => Err(other),
    }
}

pub fn is_false(expr: &Expr) -> bool {
    matches!(expr.unnested(), Expr::Literal(Literal::Boolean(false)))
}
