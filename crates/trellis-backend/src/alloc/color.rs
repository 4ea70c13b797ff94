//! Replace every abstract register by its color.

use std::collections::{BTreeSet, HashMap};

use trellis_common::asm::{Arg, CallTarget, ConstOrReg, Instruction, Memory, Reg, RegOrMem, Register};

/// Color a program. Moves from a register to itself disappear, and so do the
/// saves and restores of callee-saved registers nothing was colored with.
/// Stack slots are renumbered along the given moves.
///
/// # Panics
///
/// If a temporary has no color.
pub fn color(
    instructions: &[Instruction],
    colors: &HashMap<Reg, Register>,
    slots: &HashMap<Memory, Memory>,
    unused: &BTreeSet<Register>,
) -> Vec<Instruction> {
    let colorer = Colorer { colors, slots };
    let mut result = Vec::with_capacity(instructions.len());

    for instruction in instructions {
        let instruction = colorer.instruction(instruction);

        match &instruction {
            Instruction::MoveToRegister {
                dest: Reg::Machine(register),
                ..
            }
            | Instruction::MoveToRegister {
                src: Arg::Reg(Reg::Machine(register)),
                ..
            }
            | Instruction::MoveToMemory {
                src: ConstOrReg::Reg(Reg::Machine(register)),
                ..
            } if unused.contains(register) => continue,

            Instruction::MoveToRegister {
                dest,
                src: Arg::Reg(src),
            } if dest == src => {
                result.push(Instruction::comment(format!("'mov {dest}, {src}' is optimized away.")));
                continue;
            }

            _ => {}
        }

        result.push(instruction);
    }

    result
}

struct Colorer<'a> {
    colors: &'a HashMap<Reg, Register>,
    slots: &'a HashMap<Memory, Memory>,
}

impl Colorer<'_> {
    fn reg(&self, reg: &Reg) -> Reg {
        match reg {
            Reg::Machine(_) => reg.clone(),
            Reg::Temp(name) => match self.colors.get(reg) {
                Some(color) => Reg::Machine(*color),
                None => panic!("inconsistency: '{name}' survived register allocation"),
            },
        }
    }

    fn memory(&self, memory: &Memory) -> Memory {
        let memory = memory.map_regs(|reg| self.reg(reg));
        self.slots.get(&memory).cloned().unwrap_or(memory)
    }

    fn arg(&self, arg: &Arg) -> Arg {
        match arg {
            Arg::Const(value) => Arg::Const(*value),
            Arg::Reg(reg) => Arg::Reg(self.reg(reg)),
            Arg::Mem(memory) => Arg::Mem(self.memory(memory)),
        }
    }

    fn const_or_reg(&self, value: &ConstOrReg) -> ConstOrReg {
        match value {
            ConstOrReg::Const(value) => ConstOrReg::Const(*value),
            ConstOrReg::Reg(reg) => ConstOrReg::Reg(self.reg(reg)),
        }
    }

    fn reg_or_mem(&self, value: &RegOrMem) -> RegOrMem {
        match value {
            RegOrMem::Reg(reg) => RegOrMem::Reg(self.reg(reg)),
            RegOrMem::Mem(memory) => RegOrMem::Mem(self.memory(memory)),
        }
    }

    fn instruction(&self, instruction: &Instruction) -> Instruction {
        match instruction {
            Instruction::MoveLong { dest, value } => Instruction::MoveLong {
                dest: self.reg(dest),
                value: *value,
            },
            Instruction::MoveToMemory { dest, src } => Instruction::MoveToMemory {
                dest: self.memory(dest),
                src: self.const_or_reg(src),
            },
            Instruction::MoveToRegister { dest, src } => Instruction::MoveToRegister {
                dest: self.reg(dest),
                src: self.arg(src),
            },
            Instruction::Lea { dest, src } => Instruction::Lea {
                dest: self.reg(dest),
                src: self.memory(src),
            },
            Instruction::CmpMemory {
                minuend,
                subtrahend,
            } => Instruction::CmpMemory {
                minuend: self.reg(minuend),
                subtrahend: self.memory(subtrahend),
            },
            Instruction::Cmp {
                minuend,
                subtrahend,
            } => Instruction::Cmp {
                minuend: self.reg_or_mem(minuend),
                subtrahend: self.const_or_reg(subtrahend),
            },
            Instruction::SetOnFlag { kind, reg } => Instruction::SetOnFlag {
                kind: *kind,
                reg: self.reg(reg),
            },
            Instruction::Call(CallTarget::Indirect(target)) => {
                Instruction::Call(CallTarget::Indirect(self.reg_or_mem(target)))
            }
            Instruction::BinaryMemory { op, dest, src } => Instruction::BinaryMemory {
                op: *op,
                dest: self.memory(dest),
                src: self.const_or_reg(src),
            },
            Instruction::BinaryRegister { op, dest, src } => Instruction::BinaryRegister {
                op: *op,
                dest: self.reg(dest),
                src: self.arg(src),
            },
            Instruction::IMul { dest, src } => Instruction::IMul {
                dest: self.reg(dest),
                src: self.reg_or_mem(src),
            },
            Instruction::IMulImmediate {
                dest,
                src,
                immediate,
            } => Instruction::IMulImmediate {
                dest: self.reg(dest),
                src: self.reg_or_mem(src),
                immediate: *immediate,
            },
            Instruction::IDiv(divisor) => Instruction::IDiv(self.reg_or_mem(divisor)),
            Instruction::Neg(dest) => Instruction::Neg(self.reg_or_mem(dest)),
            Instruction::Inc(dest) => Instruction::Inc(self.reg_or_mem(dest)),
            Instruction::Dec(dest) => Instruction::Dec(self.reg_or_mem(dest)),
            Instruction::Shl { dest, count } => Instruction::Shl {
                dest: self.reg_or_mem(dest),
                count: *count,
            },
            Instruction::Push(arg) => Instruction::Push(self.arg(arg)),
            Instruction::Pop(reg) => Instruction::Pop(self.reg(reg)),

            Instruction::Call(CallTarget::Function(_))
            | Instruction::Jump { .. }
            | Instruction::Return
            | Instruction::Cqo
            | Instruction::Label(_)
            | Instruction::Comment(_) => instruction.clone(),
        }
    }
}
