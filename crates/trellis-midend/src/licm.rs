//! Loop invariant code motion.
//!
//! Loops are found through back edges in the dominator tree of the statement
//! level control flow graph. An assignment inside a loop moves into a fresh
//! preheader right before the loop header when its value cannot change while
//! the loop runs and running it early is unobservable:
//!
//! - the source reads no memory and cannot trap,
//! - every temporary in the source is set outside the loop or by another
//!   assignment that moves,
//! - the loop sets the target nowhere else,
//! - and the target is dead at the header and wherever the loop exits to.
//!
//! Inner loops are handled first, so invariants bubble outwards one loop at a
//! time.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, trace};

use trellis_common::ir::{Expr, Expression, Statement};
use trellis_common::names::ResourceAllocator;

use crate::flow::ControlFlowGraph;

const UNDEFINED: usize = usize::MAX;

pub fn hoist_loop_invariants(names: &mut ResourceAllocator, statements: &[Statement]) -> Vec<Statement> {
    let mut body = statements.to_vec();

    // every hoist moves a statement strictly outwards
    for _ in 0..statements.len() {
        match hoist_once(names, &body) {
            Some(next) => body = next,
            None => break,
        }
    }

    body
}

fn hoist_once(names: &mut ResourceAllocator, statements: &[Statement]) -> Option<Vec<Statement>> {
    let cfg = ControlFlowGraph::new(statements);
    if cfg.is_empty() {
        return None;
    }

    let idom = dominators(&cfg);
    let mut loops: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
    for tail in 0..cfg.len() {
        if idom[tail] == UNDEFINED {
            continue;
        }

        for &head in cfg.successors(tail) {
            if dominates(&idom, head, tail) {
                let body = loops.entry(head).or_default();
                extend_loop(&cfg, &idom, head, tail, body);
            }
        }
    }

    if loops.is_empty() {
        return None;
    }

    let live = live_in(statements, &cfg);

    let mut loops: Vec<_> = loops.into_iter().collect();
    loops.sort_by_key(|(_, body)| body.len());

    for (head, body) in loops {
        let Statement::Label(label) = &statements[head] else {
            continue;
        };

        let hoisted = invariants(statements, &cfg, &live, head, &body);
        if hoisted.is_empty() {
            continue;
        }

        debug!("hoisting {} statements out of the loop at '{label}'", hoisted.len());
        return Some(rewrite(names, statements, head, &body, &hoisted));
    }

    None
}

/// Add every statement that reaches `tail` without passing `head`.
fn extend_loop(
    cfg: &ControlFlowGraph,
    idom: &[usize],
    head: usize,
    tail: usize,
    body: &mut BTreeSet<usize>,
) {
    body.insert(head);
    let mut worklist = vec![tail];
    while let Some(node) = worklist.pop() {
        if !body.insert(node) {
            continue;
        }

        worklist.extend(
            cfg.predecessors(node)
                .iter()
                .copied()
                .filter(|&pred| idom[pred] != UNDEFINED && !body.contains(&pred)),
        );
    }
}

/// The assignments of a loop that can move to its preheader, in an order that
/// respects their dependencies.
fn invariants(
    statements: &[Statement],
    cfg: &ControlFlowGraph,
    live: &[BTreeSet<String>],
    head: usize,
    body: &BTreeSet<usize>,
) -> Vec<usize> {
    let mut definitions: BTreeMap<&str, usize> = BTreeMap::new();
    for &index in body {
        if let Some(temp) = statements[index].defined_temp() {
            *definitions.entry(temp).or_default() += 1;
        }
    }

    let exits: BTreeSet<usize> = body
        .iter()
        .flat_map(|&index| cfg.successors(index).iter().copied())
        .filter(|index| !body.contains(index))
        .collect();

    let candidates: Vec<(usize, &str, &Expr)> = body
        .iter()
        .filter_map(|&index| match &statements[index] {
            Statement::MoveTemp(temp, source)
                if !source.reads_memory()
                    && !source.may_trap()
                    && definitions.get(temp.as_str()) == Some(&1)
                    && !live[head].contains(temp)
                    && exits.iter().all(|&exit| !live[exit].contains(temp)) =>
            {
                Some((index, temp.as_str(), source))
            }
            _ => None,
        })
        .collect();

    let mut hoisted: Vec<usize> = Vec::new();
    let mut moved: BTreeSet<&str> = BTreeSet::new();
    let mut changed = true;
    while changed {
        changed = false;
        for &(index, temp, source) in candidates.iter() {
            if hoisted.contains(&index) {
                continue;
            }

            let mut operands = BTreeSet::new();
            temps(source, &mut operands);
            if operands
                .iter()
                .all(|operand| moved.contains(operand.as_str()) || !definitions.contains_key(operand.as_str()))
            {
                trace!("{temp} = {source} is loop invariant");
                hoisted.push(index);
                moved.insert(temp);
                changed = true;
            }
        }
    }

    hoisted
}

fn rewrite(
    names: &mut ResourceAllocator,
    statements: &[Statement],
    head: usize,
    body: &BTreeSet<usize>,
    hoisted: &[usize],
) -> Vec<Statement> {
    let Statement::Label(header) = &statements[head] else {
        return statements.to_vec();
    };

    let preheader = names.allocate_label("PREHEADER");
    let mut result = Vec::with_capacity(statements.len() + 2);

    for (index, statement) in statements.iter().enumerate() {
        if index == head {
            // a fall through from inside the loop must skip the preheader
            if index > 0 && body.contains(&(index - 1)) && !statements[index - 1].is_terminator() {
                result.push(Statement::Jump(header.clone()));
            }

            result.push(Statement::Label(preheader.clone()));
            result.extend(hoisted.iter().map(|&index| statements[index].clone()));
        }

        if hoisted.contains(&index) {
            continue;
        }

        if body.contains(&index) {
            result.push(statement.clone());
        } else {
            result.push(retarget(statement, header, &preheader));
        }
    }

    result
}

fn retarget(statement: &Statement, from: &str, to: &str) -> Statement {
    let swap = |label: &String| if label == from { to.to_string() } else { label.clone() };
    match statement {
        Statement::Jump(label) => Statement::Jump(swap(label)),
        Statement::CJumpFallThrough(condition, label) => {
            Statement::CJumpFallThrough(condition.clone(), swap(label))
        }
        Statement::CJump {
            condition,
            on_true,
            on_false,
        } => Statement::CJump {
            condition: condition.clone(),
            on_true: swap(on_true),
            on_false: swap(on_false),
        },
        statement => statement.clone(),
    }
}

fn temps(expr: &Expr, into: &mut BTreeSet<String>) {
    match expr.as_ref() {
        Expression::Const(_) | Expression::Name(_) => {}
        Expression::Temp(temp) => {
            into.insert(temp.clone());
        }
        Expression::Mem(address) => temps(address, into),
        Expression::Op(_, e1, e2) => {
            temps(e1, into);
            temps(e2, into);
        }
    }
}

/// The temporaries live before each statement.
fn live_in(statements: &[Statement], cfg: &ControlFlowGraph) -> Vec<BTreeSet<String>> {
    let uses: Vec<BTreeSet<String>> = statements
        .iter()
        .map(|statement| {
            let mut used = BTreeSet::new();
            for expr in statement.expressions() {
                temps(expr, &mut used);
            }
            used
        })
        .collect();

    let mut live = vec![BTreeSet::new(); statements.len()];
    let mut changed = true;
    while changed {
        changed = false;
        for index in (0..statements.len()).rev() {
            let mut next: BTreeSet<String> = cfg
                .successors(index)
                .iter()
                .flat_map(|&succ| live[succ].iter().cloned())
                .collect();

            if let Some(temp) = statements[index].defined_temp() {
                next.remove(temp);
            }
            next.extend(uses[index].iter().cloned());

            if next != live[index] {
                live[index] = next;
                changed = true;
            }
        }
    }

    live
}

/// Immediate dominators of every statement reachable from the first one. The
/// first statement is its own dominator, unreachable ones are `UNDEFINED`.
fn dominators(cfg: &ControlFlowGraph) -> Vec<usize> {
    let order = reverse_postorder(cfg);
    let mut position = vec![UNDEFINED; cfg.len()];
    for (at, &node) in order.iter().enumerate() {
        position[node] = at;
    }

    let mut idom = vec![UNDEFINED; cfg.len()];
    idom[0] = 0;

    let mut changed = true;
    while changed {
        changed = false;
        for &node in order.iter().skip(1) {
            let mut dominator = UNDEFINED;
            for &pred in cfg.predecessors(node) {
                if idom[pred] == UNDEFINED {
                    continue;
                }

                dominator = if dominator == UNDEFINED {
                    pred
                } else {
                    intersect(&idom, &position, pred, dominator)
                };
            }

            if dominator != UNDEFINED && idom[node] != dominator {
                idom[node] = dominator;
                changed = true;
            }
        }
    }

    idom
}

fn intersect(idom: &[usize], position: &[usize], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while position[a] > position[b] {
            a = idom[a];
        }
        while position[b] > position[a] {
            b = idom[b];
        }
    }
    a
}

fn dominates(idom: &[usize], dominator: usize, mut node: usize) -> bool {
    loop {
        if node == dominator {
            return true;
        }

        let up = idom[node];
        if up == node || up == UNDEFINED {
            return false;
        }
        node = up;
    }
}

fn reverse_postorder(cfg: &ControlFlowGraph) -> Vec<usize> {
    let mut seen = vec![false; cfg.len()];
    let mut order = Vec::with_capacity(cfg.len());
    let mut stack = vec![(0, 0)];
    seen[0] = true;

    while let Some((node, child)) = stack.pop() {
        match cfg.successors(node).get(child) {
            Some(&next) => {
                stack.push((node, child + 1));
                if !std::mem::replace(&mut seen[next], true) {
                    stack.push((next, 0));
                }
            }
            None => order.push(node),
        }
    }

    order.reverse();
    order
}
