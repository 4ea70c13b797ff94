//! Callee-saved registers are copied into temporaries at the start of a
//! function and restored from them at the end. When coloring never hands out
//! one of these registers, its copies are pointless and get dropped again.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use trellis_common::asm::{Instruction, Memory, Reg, Register};
use trellis_common::names::callee_saved_storage;

pub fn storage(register: Register) -> Reg {
    Reg::Temp(callee_saved_storage(register.name()))
}

pub fn save_callee_saved(instructions: Vec<Instruction>) -> Vec<Instruction> {
    let count = Register::CALLEE_SAVED.len();
    let mut result = Vec::with_capacity(instructions.len() + 2 * count);

    for register in Register::CALLEE_SAVED {
        result.push(Instruction::mov(storage(register), register));
    }

    result.extend(instructions);

    for register in Register::CALLEE_SAVED {
        result.push(Instruction::mov(register, storage(register)));
    }

    result
}

/// Drop the slots of storage for unused callee-saved registers and number
/// the rest from one again. Returns how each kept slot moves and the number
/// of slots left.
pub fn reorganize_slots(
    slots: &BTreeMap<Reg, usize>,
    unused: &BTreeSet<Register>,
) -> (HashMap<Memory, Memory>, usize) {
    let dropped: BTreeSet<Reg> = unused.iter().map(|register| storage(*register)).collect();

    let mut kept: Vec<usize> = slots
        .iter()
        .filter(|(reg, _)| !dropped.contains(*reg))
        .map(|(_, slot)| *slot)
        .collect();
    kept.sort_unstable();

    let moves = kept
        .iter()
        .enumerate()
        .map(|(index, slot)| (Memory::slot(*slot), Memory::slot(index + 1)))
        .collect();

    (moves, kept.len())
}
