//! Control flow cleanup on canonical IR: jumps to jumps and to the very next
//! statement, unreachable code and labels nobody jumps to are removed.

use std::collections::{HashMap, HashSet};

use trellis_common::ir::Statement;

use crate::flow::ControlFlowGraph;

pub fn cleanup(statements: Vec<Statement>) -> Vec<Statement> {
    let statements = coalesce_labels(statements);
    let statements = skip_jump_chains(statements);
    let statements = remove_unreachable(statements);
    let statements = skip_jump_chains(statements);
    let statements = remove_jumps_to_next(statements);
    remove_unused_labels(statements)
}

/// Follow a chain of equivalences to its end. Cycles stop where they loop.
fn resolve(map: &HashMap<String, String>, label: &str) -> Option<String> {
    let mut seen = HashSet::new();
    let mut current = map.get(label)?;
    seen.insert(label);

    while let Some(next) = map.get(current) {
        if !seen.insert(current.as_str()) {
            break;
        }
        current = next;
    }

    Some(current.clone())
}

fn retarget(statement: Statement, map: &HashMap<String, String>) -> Statement {
    match statement {
        Statement::Jump(label) => Statement::Jump(resolve(map, &label).unwrap_or(label)),
        Statement::CJumpFallThrough(condition, label) => {
            let label = resolve(map, &label).unwrap_or(label);
            Statement::CJumpFallThrough(condition, label)
        }
        statement => statement,
    }
}

/// Of several labels in a row keep only the last one.
fn coalesce_labels(statements: Vec<Statement>) -> Vec<Statement> {
    let equivalent: HashMap<String, String> = statements
        .windows(2)
        .filter_map(|pair| match pair {
            [Statement::Label(this), Statement::Label(next)] => Some((this.clone(), next.clone())),
            _ => None,
        })
        .collect();

    if equivalent.is_empty() {
        return statements;
    }

    statements
        .into_iter()
        .filter(|statement| !matches!(statement, Statement::Label(label) if equivalent.contains_key(label)))
        .map(|statement| retarget(statement, &equivalent))
        .collect()
}

/// Jump straight to the end of a chain of labels that only jump elsewhere.
fn skip_jump_chains(statements: Vec<Statement>) -> Vec<Statement> {
    let forwards: HashMap<String, String> = statements
        .windows(2)
        .filter_map(|pair| match pair {
            [Statement::Label(this), Statement::Jump(target)] => Some((this.clone(), target.clone())),
            _ => None,
        })
        .collect();

    if forwards.is_empty() {
        return statements;
    }

    statements
        .into_iter()
        .map(|statement| retarget(statement, &forwards))
        .collect()
}

fn remove_unreachable(statements: Vec<Statement>) -> Vec<Statement> {
    let reachable = ControlFlowGraph::new(&statements).reachable();
    statements
        .into_iter()
        .zip(reachable)
        .filter_map(|(statement, reachable)| reachable.then_some(statement))
        .collect()
}

fn remove_jumps_to_next(statements: Vec<Statement>) -> Vec<Statement> {
    let mut result: Vec<Statement> = Vec::with_capacity(statements.len());
    let mut statements = statements.into_iter().peekable();

    while let Some(statement) = statements.next() {
        let next_label = match statements.peek() {
            Some(Statement::Label(label)) => Some(label.as_str()),
            _ => None,
        };

        let redundant = match &statement {
            Statement::Jump(target) => Some(target.as_str()) == next_label,
            // a failing condition still has to fail
            Statement::CJumpFallThrough(condition, target) => {
                Some(target.as_str()) == next_label && !condition.may_trap()
            }
            _ => false,
        };

        if !redundant {
            result.push(statement);
        }
    }

    result
}

fn remove_unused_labels(statements: Vec<Statement>) -> Vec<Statement> {
    let used: HashSet<String> = statements
        .iter()
        .flat_map(|statement| statement.targets())
        .map(String::from)
        .collect();

    statements
        .into_iter()
        .filter(|statement| !matches!(statement, Statement::Label(label) if !used.contains(label)))
        .collect()
}
