//! Local algebraic simplification and constant folding.

use std::collections::HashMap;
use std::rc::Rc;

use trellis_common::ir::{Expr, Expression, Operator, Statement};

/// Simplify every expression in the given statements.
pub fn simplify_statements(statements: &[Statement]) -> Vec<Statement> {
    let mut simplifier = Simplifier::new();
    statements
        .iter()
        .map(|statement| statement.map_expressions(|expr| simplifier.simplify(expr)))
        .collect()
}

pub fn simplify(expr: &Expr) -> Expr {
    Simplifier::new().simplify(expr)
}

/// Simplifies expressions bottom up. Results are cached per node, so an
/// expression shared between several statements stays shared after
/// simplification, and a node that does not change is returned as is.
#[derive(Debug, Default)]
pub struct Simplifier {
    memo: HashMap<*const Expression, (Expr, Expr)>,
}

impl Simplifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn simplify(&mut self, expr: &Expr) -> Expr {
        let key = Rc::as_ptr(expr);
        if let Some((_, simplified)) = self.memo.get(&key) {
            return simplified.clone();
        }

        let simplified = match expr.as_ref() {
            Expression::Const(_) | Expression::Name(_) | Expression::Temp(_) => expr.clone(),

            Expression::Mem(address) => {
                let simple = self.simplify(address);
                if Rc::ptr_eq(&simple, address) {
                    expr.clone()
                } else {
                    Expression::mem(simple)
                }
            }

            Expression::Op(op, e1, e2) => {
                let s1 = self.simplify(e1);
                let s2 = self.simplify(e2);
                match simplify_op(*op, &s1, &s2) {
                    Some(result) => result,
                    None if Rc::ptr_eq(&s1, e1) && Rc::ptr_eq(&s2, e2) => expr.clone(),
                    None => Expression::op(*op, s1, s2),
                }
            }
        };

        // the key is kept alive alongside the result so its address is not reused
        self.memo.insert(key, (expr.clone(), simplified.clone()));
        simplified
    }
}

/// Rewrite an operation on already simplified operands. Returns `None` if no
/// rule applies.
fn simplify_op(op: Operator, e1: &Expr, e2: &Expr) -> Option<Expr> {
    match (op, e1.as_const(), e2.as_const()) {
        (_, Some(a), Some(b)) => op.apply(a, b).map(Expression::constant),

        (Operator::Add | Operator::Xor, _, Some(0)) => Some(e1.clone()),
        (Operator::Add | Operator::Xor, Some(0), _) => Some(e2.clone()),
        (Operator::Mul, _, Some(1)) => Some(e1.clone()),
        (Operator::Mul, Some(1), _) => Some(e2.clone()),
        (Operator::Sub, _, Some(0)) => Some(e1.clone()),

        (Operator::Sub, _, Some(value)) if value != i64::MIN => {
            let negated = Expression::constant(-value);
            Some(
                simplify_op(Operator::Add, e1, &negated)
                    .unwrap_or_else(|| Expression::op(Operator::Add, e1.clone(), negated)),
            )
        }

        _ => None,
    }
}
