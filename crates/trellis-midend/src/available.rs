//! Available expressions. An expression is available before a statement if
//! every path to it computes the expression and changes neither the
//! temporaries it reads nor, if it loads, memory since. Along with each
//! available expression the analysis keeps the statements that computed it.

use im::{HashMap, OrdSet};

use trellis_common::ir::{Expr, Expression, Operator, Statement};

use crate::flow::ControlFlowGraph;

/// Available expressions and the statements computing them.
pub type Facts = HashMap<Expr, OrdSet<usize>>;

/// Is this expression so cheap that it is never worth reusing?
pub fn is_simple(expr: &Expression) -> bool {
    match expr {
        Expression::Const(_) | Expression::Name(_) | Expression::Temp(_) => true,
        Expression::Op(Operator::Add | Operator::Sub | Operator::Xor, e1, e2) => {
            is_primitive(e1) && is_primitive(e2)
        }
        _ => false,
    }
}

fn is_primitive(expr: &Expression) -> bool {
    matches!(
        expr,
        Expression::Const(_) | Expression::Name(_) | Expression::Temp(_)
    )
}

/// Every expression the statement computes that is not simple, outermost
/// first.
pub fn usages(statement: &Statement) -> Vec<Expr> {
    fn collect(expr: &Expr, into: &mut Vec<Expr>) {
        if is_simple(expr) {
            return;
        }

        if !into.contains(expr) {
            into.push(expr.clone());
        }

        match expr.as_ref() {
            Expression::Mem(address) => collect(address, into),
            Expression::Op(_, e1, e2) => {
                collect(e1, into);
                collect(e2, into);
            }
            _ => {}
        }
    }

    let mut into = Vec::new();
    for expr in statement.expressions() {
        collect(expr, &mut into);
    }
    into
}

/// The facts holding before each statement.
pub fn available_before(statements: &[Statement]) -> Vec<Facts> {
    let cfg = ControlFlowGraph::new(statements);
    let gens: Vec<Vec<Expr>> = statements.iter().map(usages).collect();

    // `None` is the top element: nothing has flowed there yet
    let mut outs: Vec<Option<Facts>> = vec![None; statements.len()];
    let mut ins: Vec<Facts> = vec![Facts::new(); statements.len()];

    let mut changed = true;
    while changed {
        changed = false;

        for index in 0..statements.len() {
            let before = if index == 0 {
                Facts::new()
            } else {
                meet(cfg.predecessors(index).iter().filter_map(|&pred| outs[pred].as_ref()))
            };

            let after = transfer(&statements[index], &gens[index], index, &before);
            ins[index] = before;

            if outs[index].as_ref() != Some(&after) {
                outs[index] = Some(after);
                changed = true;
            }
        }
    }

    ins
}

fn meet<'a>(mut facts: impl Iterator<Item = &'a Facts>) -> Facts {
    let first = match facts.next() {
        Some(first) => first.clone(),
        None => return Facts::new(),
    };

    facts.fold(first, |acc, other| {
        acc.intersection_with(other.clone(), |mine, theirs| mine.union(theirs))
    })
}

fn transfer(statement: &Statement, gen: &[Expr], index: usize, before: &Facts) -> Facts {
    let mut after = before.clone();
    for expr in gen {
        after
            .entry(expr.clone())
            .or_insert_with(|| OrdSet::unit(index));
    }

    if let Some(temp) = statement.defined_temp() {
        after.retain(|expr, _| !expr.uses_temp(temp));
    }

    if matches!(statement, Statement::MoveMem { .. } | Statement::Call { .. }) {
        after.retain(|expr, _| !expr.reads_memory());
    }

    after
}
