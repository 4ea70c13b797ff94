//! Forward constant propagation over a statement list.
//!
//! Predecessors are not tracked, so everything known is forgotten at every
//! label. Temporaries are local to a function, so a call only invalidates its
//! own result.

use std::collections::HashMap;
use std::rc::Rc;

use log::trace;

use trellis_common::ir::{Expr, Expression, Statement};

use crate::simplify::Simplifier;

pub fn propagate_constants(statements: &[Statement]) -> Vec<Statement> {
    let mut known: HashMap<String, i64> = HashMap::new();
    let mut simplifier = Simplifier::new();
    let mut result = Vec::with_capacity(statements.len());

    for statement in statements {
        let statement =
            statement.map_expressions(|expr| simplifier.simplify(&substitute(&known, expr)));

        match statement {
            Statement::Label(_) => {
                known.clear();
                result.push(statement);
            }

            Statement::MoveTemp(ref temp, ref source) => {
                match source.as_const() {
                    Some(value) => known.insert(temp.clone(), value),
                    None => known.remove(temp),
                };
                result.push(statement);
            }

            Statement::Call { ref collector, .. } => {
                if let Some(collector) = collector {
                    known.remove(collector);
                }
                result.push(statement);
            }

            Statement::CJumpFallThrough(ref condition, ref label) => match condition.as_const() {
                Some(0) => trace!("dropping a jump to '{label}' that is never taken"),
                Some(_) => result.push(Statement::Jump(label.clone())),
                None => result.push(statement),
            },

            Statement::CJump {
                ref condition,
                ref on_true,
                ref on_false,
            } => match condition.as_const() {
                Some(0) => result.push(Statement::Jump(on_false.clone())),
                Some(_) => result.push(Statement::Jump(on_true.clone())),
                None => result.push(statement),
            },

            _ => result.push(statement),
        }
    }

    result
}

/// Replace every temporary with a known value by that value.
fn substitute(known: &HashMap<String, i64>, expr: &Expr) -> Expr {
    match expr.as_ref() {
        Expression::Temp(temp) => match known.get(temp) {
            Some(value) => Expression::constant(*value),
            None => expr.clone(),
        },

        Expression::Const(_) | Expression::Name(_) => expr.clone(),

        Expression::Mem(address) => {
            let new = substitute(known, address);
            if Rc::ptr_eq(&new, address) {
                expr.clone()
            } else {
                Expression::mem(new)
            }
        }

        Expression::Op(op, e1, e2) => {
            let n1 = substitute(known, e1);
            let n2 = substitute(known, e2);
            if Rc::ptr_eq(&n1, e1) && Rc::ptr_eq(&n2, e2) {
                expr.clone()
            } else {
                Expression::op(*op, n1, n2)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use trellis_common::ir::{Operator, Statement};

    use super::propagate_constants;
    use crate::testing::{c, call, op, t};

    #[test]
    fn straight_line() {
        let statements = vec![
            Statement::move_temp("a", c(3)),
            Statement::move_temp("b", op(Operator::Mul, t("a"), c(2))),
            Statement::move_temp("c", op(Operator::Add, t("b"), t("x"))),
            Statement::Return(Some(op(Operator::Sub, t("c"), t("b")))),
        ];

        let expected = vec![
            Statement::move_temp("a", c(3)),
            Statement::move_temp("b", c(6)),
            Statement::move_temp("c", op(Operator::Add, c(6), t("x"))),
            Statement::Return(Some(op(Operator::Add, t("c"), c(-6)))),
        ];

        assert_eq!(expected, propagate_constants(&statements));
    }

    #[test]
    fn labels_and_calls_invalidate() {
        let statements = vec![
            Statement::move_temp("a", c(1)),
            Statement::move_temp("b", c(2)),
            call("f", vec![], Some("a")),
            Statement::move_temp("x", op(Operator::Add, t("a"), t("b"))),
            Statement::label("l"),
            Statement::Return(Some(t("b"))),
        ];

        let expected = vec![
            Statement::move_temp("a", c(1)),
            Statement::move_temp("b", c(2)),
            call("f", vec![], Some("a")),
            Statement::move_temp("x", op(Operator::Add, t("a"), c(2))),
            Statement::label("l"),
            Statement::Return(Some(t("b"))),
        ];

        assert_eq!(expected, propagate_constants(&statements));
    }

    #[test]
    fn known_branches() {
        let statements = vec![
            Statement::move_temp("a", c(1)),
            Statement::CJumpFallThrough(op(Operator::Lt, t("a"), c(0)), "never".into()),
            Statement::CJumpFallThrough(op(Operator::Gt, t("a"), c(0)), "always".into()),
            Statement::label("never"),
            Statement::label("always"),
            Statement::cjump(c(0), "yes", "no"),
        ];

        let expected = vec![
            Statement::move_temp("a", c(1)),
            Statement::jump("always"),
            Statement::label("never"),
            Statement::label("always"),
            Statement::jump("no"),
        ];

        assert_eq!(expected, propagate_constants(&statements));
    }

    #[test]
    fn reassignment_forgets() {
        let statements = vec![
            Statement::move_temp("a", c(1)),
            Statement::move_temp("a", t("y")),
            Statement::Return(Some(t("a"))),
        ];

        assert_eq!(statements, propagate_constants(&statements));
    }
}
