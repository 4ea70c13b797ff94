//! Block layout. The blocks of a function are reordered so that as many of
//! them as possible fall straight into the block they would jump to, and the
//! control flow is then patched up so that every conditional jump has a single
//! target and falls through otherwise.

#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};

use im::Vector;
use log::trace;

use trellis_common::ir::{Expr, Expression, Operator, Statement};
use trellis_common::names::ResourceAllocator;

use crate::block::{build_blocks, BasicBlock, BlockError};

/// Reorder and canonicalize the body of a function. The result contains no
/// two-target conditional jumps.
pub fn schedule(
    names: &mut ResourceAllocator,
    function: &str,
    statements: &[Statement],
) -> Result<Vec<Statement>, BlockError> {
    let blocks = build_blocks(names, function, statements)?;
    let order = Scheduler::new(&blocks).order();
    trace!("'{function}' scheduled as {order:?}");
    Ok(fix_blocks(&blocks, &order))
}

/// The condition that holds exactly when `condition` is false.
pub fn invert_condition(condition: &Expr) -> Expr {
    match condition.as_ref() {
        Expression::Op(op, e1, e2) => match op.negated() {
            Some(negated) => Expression::op(negated, e1.clone(), e2.clone()),
            None => Expression::op(Operator::Eq, condition.clone(), Expression::constant(0)),
        },
        Expression::Const(value) => Expression::constant((*value == 0) as i64),
        _ => Expression::op(Operator::Eq, condition.clone(), Expression::constant(0)),
    }
}

/// A run of blocks, each falling into the next, together with the total
/// number of statements in it.
#[derive(Clone, Debug, Default)]
struct Trace {
    blocks: Vector<usize>,
    size: usize,
}

impl Trace {
    fn prepend(&self, id: usize, size: usize) -> Self {
        let mut blocks = self.blocks.clone();
        blocks.push_front(id);
        Self {
            blocks,
            size: self.size + size,
        }
    }
}

struct Scheduler<'a> {
    blocks: &'a [BasicBlock],
    unused: HashSet<usize>,
}

impl<'a> Scheduler<'a> {
    pub fn new(blocks: &'a [BasicBlock]) -> Self {
        Self {
            blocks,
            unused: (0..blocks.len()).collect(),
        }
    }

    /// Pick traces greedily in the original block order. The first block is
    /// always the first one placed, so the function entry stays in front.
    pub fn order(mut self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.blocks.len());

        for start in 0..self.blocks.len() {
            if !self.unused.contains(&start) {
                continue;
            }

            let mut memo = HashMap::new();
            let trace = self
                .build_trace(start, im::HashSet::new(), &mut memo)
                .expect("an unused block always starts a trace");

            for id in trace.blocks {
                self.unused.remove(&id);
                order.push(id);
            }
        }

        order
    }

    /// The heaviest trace starting at `id` that only goes through unused
    /// blocks not already on the current path.
    fn build_trace(
        &self,
        id: usize,
        visited: im::HashSet<usize>,
        memo: &mut HashMap<usize, Trace>,
    ) -> Option<Trace> {
        if !self.unused.contains(&id) || visited.contains(&id) {
            return None;
        }

        if let Some(known) = memo.get(&id) {
            return Some(known.clone());
        }

        let visited = visited.update(id);
        let block = &self.blocks[id];

        let mut best = Trace::default();
        for &next in &block.successors {
            if let Some(trace) = self.build_trace(next, visited.clone(), memo) {
                if trace.size > best.size {
                    best = trace;
                }
            }
        }

        let trace = best.prepend(id, block.size());
        memo.insert(id, trace.clone());
        Some(trace)
    }
}

/// Lay the blocks out in the given order, dropping jumps that became
/// fallthroughs and adding jumps where a fallthrough was broken.
fn fix_blocks(blocks: &[BasicBlock], order: &[usize]) -> Vec<Statement> {
    let mut result = Vec::new();

    for (position, &id) in order.iter().enumerate() {
        let block = &blocks[id];
        let next = order
            .get(position + 1)
            .map(|&next| blocks[next].label.as_str());

        if !block.has_label() {
            result.push(Statement::Label(block.label.clone()));
        }

        let (last, init) = match block.statements.split_last() {
            Some(split) => split,
            None => continue,
        };

        result.extend(init.iter().cloned());

        match last {
            Statement::Jump(target) => {
                if Some(target.as_str()) != next {
                    result.push(last.clone());
                }
            }

            Statement::CJump {
                condition,
                on_true,
                on_false,
            } => fix_conditional(&mut result, condition, on_true, on_false, next),

            Statement::CJumpFallThrough(condition, on_true) => {
                let on_false = &blocks[block.successors[0]].label;
                fix_conditional(&mut result, condition, on_true, on_false, next);
            }

            Statement::Return(_) => result.push(last.clone()),

            _ => {
                result.push(last.clone());

                if let Some(&follow) = block.successors.first() {
                    let follow = blocks[follow].label.as_str();
                    if Some(follow) != next {
                        result.push(Statement::jump(follow));
                    }
                }
            }
        }
    }

    result
}

fn fix_conditional(
    result: &mut Vec<Statement>,
    condition: &Expr,
    on_true: &str,
    on_false: &str,
    next: Option<&str>,
) {
    if Some(on_true) == next {
        result.push(Statement::CJumpFallThrough(
            invert_condition(condition),
            on_false.into(),
        ));
    } else if Some(on_false) == next {
        result.push(Statement::CJumpFallThrough(
            condition.clone(),
            on_true.into(),
        ));
    } else {
        result.push(Statement::CJumpFallThrough(
            condition.clone(),
            on_true.into(),
        ));
        result.push(Statement::jump(on_false));
    }
}
