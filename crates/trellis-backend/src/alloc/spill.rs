//! Rewrite a program so that spilled registers live in stack slots. Operands
//! that may be memory take the slot directly; everywhere else a fresh register
//! is loaded before the instruction or stored after it.

use std::collections::{BTreeMap, BTreeSet};

use trellis_common::asm::{Arg, CallTarget, ConstOrReg, Instruction, Memory, Reg, RegOrMem};
use trellis_common::names::ResourceAllocator;

#[derive(Debug)]
pub struct Spill {
    pub instructions: Vec<Instruction>,
    /// The slot number of every newly spilled register.
    pub slots: BTreeMap<Reg, usize>,
    /// Registers introduced around the uses and definitions of spilled ones.
    pub temps: Vec<Reg>,
}

/// Spill the given registers into slots numbered after the ones already taken.
pub fn spill(
    names: &mut ResourceAllocator,
    instructions: &[Instruction],
    spilled: &BTreeSet<Reg>,
    slots_taken: usize,
) -> Spill {
    let slots = spilled
        .iter()
        .enumerate()
        .map(|(index, reg)| (reg.clone(), slots_taken + index + 1))
        .collect();

    let mut rewriter = Rewriter {
        names,
        slots,
        temps: Vec::new(),
        instructions: Vec::with_capacity(instructions.len()),
    };

    for instruction in instructions {
        rewriter.rewrite(instruction);
    }

    Spill {
        instructions: rewriter.instructions,
        slots: rewriter.slots,
        temps: rewriter.temps,
    }
}

struct Rewriter<'a> {
    names: &'a mut ResourceAllocator,
    slots: BTreeMap<Reg, usize>,
    temps: Vec<Reg>,
    instructions: Vec<Instruction>,
}

impl Rewriter<'_> {
    fn fresh(&mut self) -> Reg {
        let reg = Reg::Temp(self.names.allocate_register());
        self.temps.push(reg.clone());
        reg
    }

    fn expected(&self, reg: &Reg) -> RegOrMem {
        match self.slots.get(reg) {
            Some(slot) => RegOrMem::Mem(Memory::slot(*slot)),
            None => RegOrMem::Reg(reg.clone()),
        }
    }

    /// A register holding the value of `reg`, loading it from its slot if
    /// it was spilled.
    fn load(&mut self, reg: &Reg) -> Reg {
        match self.expected(reg) {
            RegOrMem::Reg(reg) => reg,
            RegOrMem::Mem(slot) => {
                let fresh = self.fresh();
                self.instructions
                    .push(Instruction::mov(fresh.clone(), Arg::Mem(slot)));
                fresh
            }
        }
    }

    fn memory(&mut self, memory: &Memory) -> Memory {
        memory.map_regs(|reg| self.load(reg))
    }

    fn reg_or_mem(&mut self, value: &RegOrMem) -> RegOrMem {
        match value {
            RegOrMem::Reg(reg) => self.expected(reg),
            RegOrMem::Mem(memory) => RegOrMem::Mem(self.memory(memory)),
        }
    }

    fn const_or_reg(&mut self, value: &ConstOrReg) -> ConstOrReg {
        match value {
            ConstOrReg::Const(value) => ConstOrReg::Const(*value),
            ConstOrReg::Reg(reg) => ConstOrReg::Reg(self.load(reg)),
        }
    }

    fn arg(&mut self, arg: &Arg) -> Arg {
        match arg {
            Arg::Const(value) => Arg::Const(*value),
            Arg::Reg(reg) => self.expected(reg).into(),
            Arg::Mem(memory) => Arg::Mem(self.memory(memory)),
        }
    }

    /// Emit an instruction writing `dest`, storing the result into its slot
    /// afterwards if it was spilled.
    fn define(&mut self, dest: &Reg, build: impl FnOnce(&mut Self, Reg) -> Instruction) {
        match self.expected(dest) {
            RegOrMem::Reg(reg) => {
                let instruction = build(self, reg);
                self.instructions.push(instruction);
            }
            RegOrMem::Mem(slot) => {
                let fresh = self.fresh();
                let instruction = build(self, fresh.clone());
                self.instructions.push(instruction);
                self.instructions.push(Instruction::MoveToMemory {
                    dest: slot,
                    src: ConstOrReg::Reg(fresh),
                });
            }
        }
    }

    fn rewrite(&mut self, instruction: &Instruction) {
        match instruction {
            Instruction::MoveLong { dest, value } => {
                let value = *value;
                self.define(dest, |_, dest| Instruction::MoveLong { dest, value });
            }

            Instruction::MoveToMemory { dest, src } => {
                let dest = self.memory(dest);
                let src = self.const_or_reg(src);
                self.instructions
                    .push(Instruction::MoveToMemory { dest, src });
            }

            Instruction::MoveToRegister { dest, src } => {
                let src = self.arg(src);
                match (self.expected(dest), src) {
                    (RegOrMem::Reg(dest), src) => self.instructions.push(Instruction::mov(dest, src)),
                    (RegOrMem::Mem(slot), Arg::Const(value)) => {
                        self.instructions.push(Instruction::MoveToMemory {
                            dest: slot,
                            src: ConstOrReg::Const(value),
                        })
                    }
                    (RegOrMem::Mem(slot), Arg::Reg(reg)) => {
                        self.instructions.push(Instruction::MoveToMemory {
                            dest: slot,
                            src: ConstOrReg::Reg(reg),
                        })
                    }
                    (RegOrMem::Mem(slot), Arg::Mem(memory)) => {
                        let fresh = self.fresh();
                        self.instructions
                            .push(Instruction::mov(fresh.clone(), Arg::Mem(memory)));
                        self.instructions.push(Instruction::MoveToMemory {
                            dest: slot,
                            src: ConstOrReg::Reg(fresh),
                        });
                    }
                }
            }

            Instruction::Lea { dest, src } => {
                self.define(dest, |this, dest| Instruction::Lea {
                    dest,
                    src: this.memory(src),
                });
            }

            Instruction::CmpMemory {
                minuend,
                subtrahend,
            } => {
                let minuend = self.load(minuend);
                let subtrahend = self.memory(subtrahend);
                self.instructions.push(Instruction::CmpMemory {
                    minuend,
                    subtrahend,
                });
            }

            Instruction::Cmp {
                minuend,
                subtrahend,
            } => {
                let minuend = self.reg_or_mem(minuend);
                let subtrahend = self.const_or_reg(subtrahend);
                self.instructions.push(Instruction::Cmp {
                    minuend,
                    subtrahend,
                });
            }

            Instruction::SetOnFlag { kind, reg } => {
                let kind = *kind;
                self.define(reg, |_, reg| Instruction::SetOnFlag { kind, reg });
            }

            Instruction::Call(CallTarget::Indirect(target)) => {
                let target = self.reg_or_mem(target);
                self.instructions
                    .push(Instruction::Call(CallTarget::Indirect(target)));
            }

            Instruction::BinaryMemory { op, dest, src } => {
                let dest = self.memory(dest);
                let src = self.const_or_reg(src);
                self.instructions.push(Instruction::BinaryMemory { op: *op, dest, src });
            }

            Instruction::BinaryRegister { op, dest, src } => {
                let op = *op;
                let src = self.arg(src);
                match (self.expected(dest), src) {
                    (RegOrMem::Reg(dest), src) => {
                        self.instructions
                            .push(Instruction::BinaryRegister { op, dest, src })
                    }
                    (RegOrMem::Mem(slot), Arg::Const(value)) => {
                        self.instructions.push(Instruction::BinaryMemory {
                            op,
                            dest: slot,
                            src: ConstOrReg::Const(value),
                        })
                    }
                    (RegOrMem::Mem(slot), Arg::Reg(reg)) => {
                        self.instructions.push(Instruction::BinaryMemory {
                            op,
                            dest: slot,
                            src: ConstOrReg::Reg(reg),
                        })
                    }
                    (RegOrMem::Mem(slot), Arg::Mem(memory)) => {
                        let fresh = self.fresh();
                        self.instructions
                            .push(Instruction::mov(fresh.clone(), Arg::Mem(slot.clone())));
                        self.instructions.push(Instruction::BinaryRegister {
                            op,
                            dest: fresh.clone(),
                            src: Arg::Mem(memory),
                        });
                        self.instructions.push(Instruction::MoveToMemory {
                            dest: slot,
                            src: ConstOrReg::Reg(fresh),
                        });
                    }
                }
            }

            Instruction::IMul { dest, src } => {
                let src = self.reg_or_mem(src);
                match self.expected(dest) {
                    RegOrMem::Reg(dest) => self.instructions.push(Instruction::IMul { dest, src }),
                    RegOrMem::Mem(slot) => {
                        let fresh = self.fresh();
                        self.instructions
                            .push(Instruction::mov(fresh.clone(), Arg::Mem(slot.clone())));
                        self.instructions.push(Instruction::IMul {
                            dest: fresh.clone(),
                            src,
                        });
                        self.instructions.push(Instruction::MoveToMemory {
                            dest: slot,
                            src: ConstOrReg::Reg(fresh),
                        });
                    }
                }
            }

            Instruction::IMulImmediate {
                dest,
                src,
                immediate,
            } => {
                let immediate = *immediate;
                self.define(dest, |this, dest| Instruction::IMulImmediate {
                    dest,
                    src: this.reg_or_mem(src),
                    immediate,
                });
            }

            Instruction::IDiv(divisor) => {
                let divisor = self.reg_or_mem(divisor);
                self.instructions.push(Instruction::IDiv(divisor));
            }

            Instruction::Neg(dest) => {
                let dest = self.reg_or_mem(dest);
                self.instructions.push(Instruction::Neg(dest));
            }

            Instruction::Inc(dest) => {
                let dest = self.reg_or_mem(dest);
                self.instructions.push(Instruction::Inc(dest));
            }

            Instruction::Dec(dest) => {
                let dest = self.reg_or_mem(dest);
                self.instructions.push(Instruction::Dec(dest));
            }

            Instruction::Shl { dest, count } => {
                let dest = self.reg_or_mem(dest);
                self.instructions.push(Instruction::Shl {
                    dest,
                    count: *count,
                });
            }

            Instruction::Push(arg) => {
                let arg = self.arg(arg);
                self.instructions.push(Instruction::Push(arg));
            }

            Instruction::Pop(reg) => self.define(reg, |_, reg| Instruction::Pop(reg)),

            Instruction::Call(CallTarget::Function(_))
            | Instruction::Jump { .. }
            | Instruction::Return
            | Instruction::Cqo
            | Instruction::Label(_)
            | Instruction::Comment(_) => self.instructions.push(instruction.clone()),
        }
    }
}
