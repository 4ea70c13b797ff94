//! Control flow between instructions.

use std::collections::HashMap;

use trellis_common::asm::{Instruction, JumpKind};

/// The successors of every instruction. An index equal to the length of the
/// list stands for leaving the function.
pub fn successors(instructions: &[Instruction]) -> Vec<Vec<usize>> {
    let labels: HashMap<&str, usize> = instructions
        .iter()
        .enumerate()
        .filter_map(|(index, instruction)| match instruction {
            Instruction::Label(label) => Some((label.as_str(), index)),
            _ => None,
        })
        .collect();

    instructions
        .iter()
        .enumerate()
        .map(|(index, instruction)| match instruction {
            Instruction::Jump {
                kind: JumpKind::Jmp,
                label,
            } => labels.get(label.as_str()).copied().into_iter().collect(),

            Instruction::Jump { label, .. } => {
                let mut next = vec![index + 1];
                next.extend(labels.get(label.as_str()).copied());
                next
            }

            Instruction::Return => Vec::new(),
            _ => vec![index + 1],
        })
        .collect()
}

/// Which instructions can be reached from the first one.
pub fn reachable(instructions: &[Instruction]) -> Vec<bool> {
    let successors = successors(instructions);
    let mut reached = vec![false; instructions.len()];
    let mut worklist = if instructions.is_empty() { vec![] } else { vec![0] };

    while let Some(index) = worklist.pop() {
        if index >= reached.len() || reached[index] {
            continue;
        }

        reached[index] = true;
        worklist.extend(successors[index].iter().copied());
    }

    reached
}
