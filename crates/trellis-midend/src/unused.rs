//! Whole program removal of functions and globals nothing refers to.

use std::collections::{HashMap, HashSet};

use log::debug;

use trellis_common::ir::{CompilationUnit, Expr, Expression, Function};

/// Keep only the functions and globals reachable through name references from
/// the entry function.
pub fn remove_unused_names(unit: CompilationUnit, entry: &str) -> CompilationUnit {
    let references: HashMap<&str, HashSet<&str>> = unit
        .functions
        .iter()
        .map(|function| (function.name.as_str(), referenced_names(function)))
        .collect();

    let mut used: HashSet<String> = HashSet::new();
    let mut worklist = vec![entry];
    while let Some(name) = worklist.pop() {
        if !used.insert(name.into()) {
            continue;
        }

        if let Some(names) = references.get(name) {
            worklist.extend(names.iter().copied().filter(|name| !used.contains(*name)));
        }
    }

    let CompilationUnit { globals, functions } = unit;
    let before = globals.len() + functions.len();

    let globals: Vec<_> = globals
        .into_iter()
        .filter(|global| used.contains(&global.name))
        .collect();
    let functions: Vec<_> = functions
        .into_iter()
        .filter(|function| used.contains(&function.name))
        .collect();

    debug!(
        "removed {} unused names",
        before - globals.len() - functions.len()
    );

    CompilationUnit { globals, functions }
}

fn referenced_names(function: &Function) -> HashSet<&str> {
    fn collect<'a>(expr: &'a Expr, into: &mut HashSet<&'a str>) {
        match expr.as_ref() {
            Expression::Name(name) => {
                into.insert(name);
            }
            Expression::Const(_) | Expression::Temp(_) => {}
            Expression::Mem(address) => collect(address, into),
            Expression::Op(_, e1, e2) => {
                collect(e1, into);
                collect(e2, into);
            }
        }
    }

    let mut names = HashSet::new();
    for statement in function.body.iter() {
        for expr in statement.expressions() {
            collect(expr, &mut names);
        }
    }
    names
}
