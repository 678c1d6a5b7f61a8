// Constant folding
//
// Bottom-up rewrite replacing constant arithmetic with its folded value.
// Only constant operands are ever combined, so nothing with a side effect is
// dropped, and a folded tree folds to itself.

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::value::Value;

pub fn reduce(expr: Expr) -> Expr {
    let expr = expr.map_children(&mut reduce);
    let folded = match &expr {
        Expr::Binary { op, left, right } => match (left.as_ref(), right.as_ref()) {
            (Expr::Constant(l), Expr::Constant(r)) => fold_binary(*op, l, r),
            _ => None,
        },
        Expr::Unary { op, operand } => match (op, operand.as_ref()) {
            (UnaryOp::Plus, Expr::Constant(value)) => Some(value.clone()),
            (UnaryOp::Minus, Expr::Constant(value)) => value.neg().ok(),
            _ => None,
        },
        Expr::Cast { ty, operand } => match operand.as_ref() {
            Expr::Constant(value) => value.cast(ty).ok(),
            _ => None,
        },
        _ => None,
    };
    match folded {
        Some(value) => {
            log::debug!("FOLD {} => {}", expr.shape(), value);
            Expr::Constant(value)
        }
        None => expr,
    }
}

fn fold_binary(op: BinaryOp, left: &Value, right: &Value) -> Option<Value> {
    let folded = match op {
        BinaryOp::Add => left.add(right),
        BinaryOp::Subtract => left.sub(right),
        BinaryOp::Multiply => left.mul(right),
        BinaryOp::Divide => left.div(right),
        BinaryOp::Modulo => left.rem(right),
        _ => return None,
    };
    folded.ok()
}

#[cfg(test)]
#[path = "reduce_tests.rs"]
mod tests;
