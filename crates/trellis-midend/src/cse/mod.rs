//! Common subexpression elimination.
//!
//! Every expression whose value is reused somewhere after being computed is
//! stored in a fresh temporary at each statement computing it, and every
//! statement using it reads the temporary instead. Expressions are compared
//! structurally.

#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::trace;

use trellis_common::ir::{Expr, Expression, Statement};
use trellis_common::names::ResourceAllocator;

use crate::available::{available_before, usages};

#[derive(Debug, Default)]
struct Usage {
    /// Statements computing the expression afresh.
    appears: BTreeSet<usize>,
    /// Statements needing its value, including those computing it.
    uses: BTreeSet<usize>,
}

pub fn eliminate_common_subexpressions(
    names: &mut ResourceAllocator,
    statements: &[Statement],
) -> Vec<Statement> {
    let available = available_before(statements);

    let mut usage: BTreeMap<Expr, Usage> = BTreeMap::new();
    for (index, statement) in statements.iter().enumerate() {
        for expr in usages(statement) {
            let sites = available[index].get(&expr).cloned();
            let entry = usage.entry(expr).or_default();

            entry.uses.insert(index);
            match sites {
                Some(sites) => entry.appears.extend(sites),
                None => {
                    entry.appears.insert(index);
                }
            }
        }
    }

    let mut hoists: Vec<Vec<(String, Expr)>> = vec![Vec::new(); statements.len()];
    let mut replacements: Vec<HashMap<Expr, String>> = vec![HashMap::new(); statements.len()];

    for (expr, Usage { appears, uses }) in usage {
        if appears.len() >= uses.len() {
            continue;
        }

        let temp = names.allocate_temp();
        trace!("hoisting {expr} into {temp}");

        for &index in &uses {
            replacements[index].insert(expr.clone(), temp.clone());
        }

        for &index in &appears {
            hoists[index].push((temp.clone(), expr.clone()));
        }
    }

    let mut result = Vec::with_capacity(statements.len());
    for (index, statement) in statements.iter().enumerate() {
        let mut hoisted = std::mem::take(&mut hoists[index]);

        // inner expressions first, so outer ones can read their temporaries
        hoisted.sort_by_key(|(_, expr)| size(expr));

        for (temp, expr) in hoisted {
            let source = replace_children(&expr, &replacements[index]);
            result.push(Statement::MoveTemp(temp, source));
        }

        result.push(statement.map_expressions(|expr| replace(expr, &replacements[index])));
    }

    result
}

/// Replace every outermost occurrence of a mapped expression by its temporary.
fn replace(expr: &Expr, map: &HashMap<Expr, String>) -> Expr {
    match map.get(expr) {
        Some(temp) => Expression::temp(temp.clone()),
        None => replace_children(expr, map),
    }
}

fn replace_children(expr: &Expr, map: &HashMap<Expr, String>) -> Expr {
    match expr.as_ref() {
        Expression::Const(_) | Expression::Name(_) | Expression::Temp(_) => expr.clone(),
        Expression::Mem(address) => Expression::mem(replace(address, map)),
        Expression::Op(op, e1, e2) => Expression::op(*op, replace(e1, map), replace(e2, map)),
    }
}

fn size(expr: &Expression) -> usize {
    match expr {
        Expression::Const(_) | Expression::Name(_) | Expression::Temp(_) => 1,
        Expression::Mem(address) => 1 + size(address),
        Expression::Op(_, e1, e2) => 1 + size(e1) + size(e2),
    }
}
