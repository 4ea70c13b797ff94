//! Peephole cleanup of allocated assembly.

use std::collections::{HashMap, HashSet};

use trellis_common::asm::Instruction;

use crate::flow::reachable;

pub fn cleanup(instructions: Vec<Instruction>, keep_comments: bool) -> Vec<Instruction> {
    let instructions = if keep_comments {
        instructions
    } else {
        instructions
            .into_iter()
            .filter(|instruction| !matches!(instruction, Instruction::Comment(_)))
            .collect()
    };

    let instructions = coalesce_labels(instructions);
    let instructions = remove_unreachable(instructions);
    let instructions = remove_jumps_to_next(instructions);
    remove_unused_labels(instructions)
}

/// Of several labels in a row keep only the last one. Comments in between
/// do not break the row.
fn coalesce_labels(instructions: Vec<Instruction>) -> Vec<Instruction> {
    let mut equivalent: HashMap<String, String> = HashMap::new();
    let mut row: Vec<&str> = Vec::new();

    for instruction in instructions.iter() {
        match instruction {
            Instruction::Label(label) => row.push(label),
            Instruction::Comment(_) => {}
            _ => {
                if let Some((last, rest)) = row.split_last() {
                    for label in rest {
                        equivalent.insert(label.to_string(), last.to_string());
                    }
                }
                row.clear();
            }
        }
    }

    if let Some((last, rest)) = row.split_last() {
        for label in rest {
            equivalent.insert(label.to_string(), last.to_string());
        }
    }

    if equivalent.is_empty() {
        return instructions;
    }

    instructions
        .into_iter()
        .filter_map(|instruction| match instruction {
            Instruction::Label(label) if equivalent.contains_key(&label) => None,
            Instruction::Jump { kind, label } => {
                let label = equivalent.get(&label).cloned().unwrap_or(label);
                Some(Instruction::Jump { kind, label })
            }
            instruction => Some(instruction),
        })
        .collect()
}

fn remove_unreachable(instructions: Vec<Instruction>) -> Vec<Instruction> {
    let reachable = reachable(&instructions);
    instructions
        .into_iter()
        .zip(reachable)
        .filter_map(|(instruction, reachable)| reachable.then_some(instruction))
        .collect()
}

fn remove_jumps_to_next(instructions: Vec<Instruction>) -> Vec<Instruction> {
    let redundant: Vec<bool> = instructions
        .iter()
        .enumerate()
        .map(|(index, instruction)| {
            let Some(target) = instruction.jump_target() else {
                return false;
            };

            instructions[index + 1..]
                .iter()
                .take_while(|next| matches!(next, Instruction::Label(_) | Instruction::Comment(_)))
                .any(|next| matches!(next, Instruction::Label(label) if label == target))
        })
        .collect();

    instructions
        .into_iter()
        .zip(redundant)
        .filter_map(|(instruction, redundant)| (!redundant).then_some(instruction))
        .collect()
}

fn remove_unused_labels(instructions: Vec<Instruction>) -> Vec<Instruction> {
    let used: HashSet<String> = instructions
        .iter()
        .filter_map(|instruction| instruction.jump_target())
        .map(String::from)
        .collect();

    instructions
        .into_iter()
        .filter(|instruction| !matches!(instruction, Instruction::Label(label) if !used.contains(label)))
        .collect()
}

#[cfg(test)]
mod tests {
    use trellis_common::asm::{
        ConstOrReg, Instruction, JumpKind, RegOrMem, Register,
    };

    use super::cleanup;

    fn label(name: &str) -> Instruction {
        Instruction::Label(name.into())
    }

    fn jump(kind: JumpKind, name: &str) -> Instruction {
        Instruction::Jump {
            kind,
            label: name.into(),
        }
    }

    #[test]
    fn full_cleanup() {
        let compare = Instruction::Cmp {
            minuend: RegOrMem::Reg(Register::Rdi.into()),
            subtrahend: ConstOrReg::Const(0),
        };

        let instructions = vec![
            compare.clone(),
            jump(JumpKind::Je, "a"),
            Instruction::mov(Register::Rax, Register::Rdi),
            Instruction::jump("end"),
            Instruction::mov(Register::Rax, Register::Rsi),
            label("a"),
            Instruction::comment("join"),
            label("b"),
            Instruction::mov(Register::Rax, Register::Rdx),
            Instruction::jump("c"),
            label("c"),
            label("end"),
        ];

        let expected = vec![
            compare,
            jump(JumpKind::Je, "b"),
            Instruction::mov(Register::Rax, Register::Rdi),
            Instruction::jump("end"),
            label("b"),
            Instruction::mov(Register::Rax, Register::Rdx),
            label("end"),
        ];

        assert_eq!(expected, cleanup(instructions, false));
    }

    #[test]
    fn comments_can_stay() {
        let instructions = vec![
            Instruction::comment("hello"),
            Instruction::jump("next"),
            Instruction::comment("between"),
            label("next"),
            Instruction::Return,
        ];

        // the second comment is unreachable
        let expected = vec![Instruction::comment("hello"), Instruction::Return];

        assert_eq!(expected, cleanup(instructions, true));
    }
}
