//! Statement level control flow.

use std::collections::HashMap;

use trellis_common::ir::Statement;

/// Successors and predecessors of every statement in a function body. Jumps to
/// labels that do not exist are ignored.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ControlFlowGraph {
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
}

impl ControlFlowGraph {
    pub fn new(statements: &[Statement]) -> Self {
        let labels: HashMap<&str, usize> = statements
            .iter()
            .enumerate()
            .filter_map(|(index, statement)| match statement {
                Statement::Label(label) => Some((label.as_str(), index)),
                _ => None,
            })
            .collect();

        let count = statements.len();
        let next = |index: usize| (index + 1 < count).then_some(index + 1);

        let successors: Vec<Vec<usize>> = statements
            .iter()
            .enumerate()
            .map(|(index, statement)| {
                let targets = statement
                    .targets()
                    .into_iter()
                    .filter_map(|label| labels.get(label).copied());

                match statement {
                    Statement::Jump(_) | Statement::CJump { .. } => targets.collect(),
                    Statement::Return(_) => Vec::new(),
                    Statement::CJumpFallThrough(..) => next(index).into_iter().chain(targets).collect(),
                    _ => next(index).into_iter().collect(),
                }
            })
            .collect();

        let mut predecessors = vec![Vec::new(); count];
        for (from, targets) in successors.iter().enumerate() {
            for &to in targets {
                if !predecessors[to].contains(&from) {
                    predecessors[to].push(from);
                }
            }
        }

        Self {
            successors,
            predecessors,
        }
    }

    pub fn len(&self) -> usize {
        self.successors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    pub fn successors(&self, index: usize) -> &[usize] {
        &self.successors[index]
    }

    pub fn predecessors(&self, index: usize) -> &[usize] {
        &self.predecessors[index]
    }

    /// Which statements can be reached from the first one.
    pub fn reachable(&self) -> Vec<bool> {
        let mut seen = vec![false; self.len()];
        let mut stack: Vec<usize> = if self.is_empty() { vec![] } else { vec![0] };

        while let Some(index) = stack.pop() {
            if std::mem::replace(&mut seen[index], true) {
                continue;
            }

            stack.extend(self.successors[index].iter().copied().filter(|&next| !seen[next]));
        }

        seen
    }
}

#[cfg(test)]
mod tests {
    use trellis_common::ir::Statement;

    use super::ControlFlowGraph;
    use crate::testing::{c, t};

    #[test]
    fn edges() {
        let statements = vec![
            Statement::move_temp("x", c(0)),
            Statement::label("loop"),
            Statement::CJumpFallThrough(t("x"), "end".into()),
            Statement::jump("loop"),
            Statement::move_temp("dead", c(1)),
            Statement::label("end"),
            Statement::Return(None),
        ];

        let cfg = ControlFlowGraph::new(&statements);

        assert_eq!(&[1], cfg.successors(0));
        assert_eq!(&[3, 5], cfg.successors(2));
        assert_eq!(&[1], cfg.successors(3));
        assert_eq!(&[] as &[usize], cfg.successors(6));
        assert_eq!(&[0, 3], cfg.predecessors(1));
        assert_eq!(&[2, 4], cfg.predecessors(5));

        assert_eq!(
            vec![true, true, true, true, false, true, true],
            cfg.reachable()
        );
    }
}
