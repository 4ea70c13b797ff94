use std::collections::BTreeSet;

use trellis_common::asm::{
    Arg, CallTarget, ConstOrReg, Instruction, Memory, Reg, RegOrMem, Register,
};

use crate::flow::successors;

/// What an instruction reads and writes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UsesAndDefs {
    pub uses: BTreeSet<Reg>,
    pub defs: BTreeSet<Reg>,
}

#[derive(Debug)]
pub struct Liveness {
    /// Registers live right after every instruction.
    pub out: Vec<BTreeSet<Reg>>,
    pub uses_and_defs: Vec<UsesAndDefs>,
}

/// Backwards liveness over single instructions. At the exit of the function
/// the callee-saved registers are live, and so is `rax` if the function
/// returns a value.
pub fn analyze(instructions: &[Instruction], has_return: bool) -> Liveness {
    let uses_and_defs: Vec<_> = instructions.iter().map(uses_and_defs).collect();
    let successors = successors(instructions);

    let mut exit: BTreeSet<Reg> = Register::CALLEE_SAVED
        .into_iter()
        .map(Reg::Machine)
        .collect();
    if has_return {
        exit.insert(Register::Rax.into());
    }

    let mut live_in: Vec<BTreeSet<Reg>> = vec![BTreeSet::new(); instructions.len()];
    let mut out: Vec<BTreeSet<Reg>> = vec![BTreeSet::new(); instructions.len()];

    let mut changed = true;
    while changed {
        changed = false;

        for index in (0..instructions.len()).rev() {
            let mut live = BTreeSet::new();
            for &next in successors[index].iter() {
                match live_in.get(next) {
                    Some(next) => live.extend(next.iter().cloned()),
                    None => live.extend(exit.iter().cloned()),
                }
            }

            let UsesAndDefs { uses, defs } = &uses_and_defs[index];
            let mut entry: BTreeSet<Reg> = live.difference(defs).cloned().collect();
            entry.extend(uses.iter().cloned());

            if entry != live_in[index] || live != out[index] {
                changed = true;
                live_in[index] = entry;
                out[index] = live;
            }
        }
    }

    Liveness { out, uses_and_defs }
}

pub fn uses_and_defs(instruction: &Instruction) -> UsesAndDefs {
    let mut uses = BTreeSet::new();
    let mut defs = BTreeSet::new();

    match instruction {
        Instruction::MoveLong { dest, .. } => {
            defs.insert(dest.clone());
        }

        Instruction::MoveToMemory { dest, src } => {
            uses.extend(memory_regs(dest));
            uses.extend(const_or_reg_regs(src));
        }

        Instruction::MoveToRegister { dest, src } => {
            defs.insert(dest.clone());
            uses.extend(arg_regs(src));
        }

        Instruction::Lea { dest, src } => {
            defs.insert(dest.clone());
            uses.extend(memory_regs(src));
        }

        Instruction::CmpMemory {
            minuend,
            subtrahend,
        } => {
            uses.insert(minuend.clone());
            uses.extend(memory_regs(subtrahend));
        }

        Instruction::Cmp {
            minuend,
            subtrahend,
        } => {
            uses.extend(reg_or_mem_regs(minuend));
            uses.extend(const_or_reg_regs(subtrahend));
        }

        Instruction::SetOnFlag { reg, .. } => {
            defs.insert(reg.clone());
        }

        Instruction::Call(target) => {
            if let CallTarget::Indirect(target) = target {
                uses.extend(reg_or_mem_regs(target));
            }

            uses.extend(Register::ARGUMENTS.into_iter().map(Reg::Machine));
            defs.extend(Register::CALLER_SAVED.into_iter().map(Reg::Machine));
        }

        Instruction::BinaryMemory { dest, src, .. } => {
            uses.extend(memory_regs(dest));
            uses.extend(const_or_reg_regs(src));
        }

        Instruction::BinaryRegister { dest, src, .. } => {
            defs.insert(dest.clone());
            uses.insert(dest.clone());
            uses.extend(arg_regs(src));
        }

        Instruction::IMul { dest, src } => {
            defs.insert(dest.clone());
            uses.insert(dest.clone());
            uses.extend(reg_or_mem_regs(src));
        }

        Instruction::IMulImmediate { dest, src, .. } => {
            defs.insert(dest.clone());
            uses.extend(reg_or_mem_regs(src));
        }

        Instruction::Cqo => {
            uses.insert(Register::Rax.into());
            defs.insert(Register::Rdx.into());
        }

        Instruction::IDiv(divisor) => {
            uses.insert(Register::Rax.into());
            uses.insert(Register::Rdx.into());
            uses.extend(reg_or_mem_regs(divisor));
            defs.insert(Register::Rax.into());
            defs.insert(Register::Rdx.into());
        }

        Instruction::Neg(dest)
        | Instruction::Inc(dest)
        | Instruction::Dec(dest)
        | Instruction::Shl { dest, .. } => match dest {
            RegOrMem::Reg(reg) => {
                uses.insert(reg.clone());
                defs.insert(reg.clone());
            }
            RegOrMem::Mem(memory) => uses.extend(memory_regs(memory)),
        },

        Instruction::Push(arg) => {
            uses.extend(arg_regs(arg));
            uses.insert(Register::Rsp.into());
            defs.insert(Register::Rsp.into());
        }

        Instruction::Pop(reg) => {
            uses.insert(Register::Rsp.into());
            defs.insert(Register::Rsp.into());
            defs.insert(reg.clone());
        }

        Instruction::Jump { .. }
        | Instruction::Return
        | Instruction::Label(_)
        | Instruction::Comment(_) => {}
    }

    UsesAndDefs { uses, defs }
}

fn memory_regs(memory: &Memory) -> impl Iterator<Item = Reg> + '_ {
    memory.regs().cloned()
}

fn arg_regs(arg: &Arg) -> Vec<Reg> {
    match arg {
        Arg::Const(_) => Vec::new(),
        Arg::Reg(reg) => vec![reg.clone()],
        Arg::Mem(memory) => memory.regs().cloned().collect(),
    }
}

fn reg_or_mem_regs(value: &RegOrMem) -> Vec<Reg> {
    match value {
        RegOrMem::Reg(reg) => vec![reg.clone()],
        RegOrMem::Mem(memory) => memory.regs().cloned().collect(),
    }
}

fn const_or_reg_regs(value: &ConstOrReg) -> Option<Reg> {
    match value {
        ConstOrReg::Const(_) => None,
        ConstOrReg::Reg(reg) => Some(reg.clone()),
    }
}
