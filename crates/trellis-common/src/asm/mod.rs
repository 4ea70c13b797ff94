//! x86-64 assembly over abstract registers. Instruction selection produces it
//! with temporaries in register positions; after register allocation only
//! machine registers remain.

mod print;

#[cfg(test)]
mod tests;

use crate::ir::GlobalVariable;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Register {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    Rsp,
    Rbp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

impl Register {
    pub const ALL: [Register; 16] = [
        Self::Rax,
        Self::Rbx,
        Self::Rcx,
        Self::Rdx,
        Self::Rsi,
        Self::Rdi,
        Self::Rsp,
        Self::Rbp,
        Self::R8,
        Self::R9,
        Self::R10,
        Self::R11,
        Self::R12,
        Self::R13,
        Self::R14,
        Self::R15,
    ];

    /// Argument registers, in parameter order.
    pub const ARGUMENTS: [Register; 6] = [
        Self::Rdi,
        Self::Rsi,
        Self::Rdx,
        Self::Rcx,
        Self::R8,
        Self::R9,
    ];

    /// Registers a call may overwrite.
    pub const CALLER_SAVED: [Register; 9] = [
        Self::Rax,
        Self::Rcx,
        Self::Rdx,
        Self::Rsi,
        Self::Rdi,
        Self::R8,
        Self::R9,
        Self::R10,
        Self::R11,
    ];

    /// Registers a function must leave as it found them.
    pub const CALLEE_SAVED: [Register; 5] =
        [Self::Rbx, Self::R12, Self::R13, Self::R14, Self::R15];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Rax => "rax",
            Self::Rbx => "rbx",
            Self::Rcx => "rcx",
            Self::Rdx => "rdx",
            Self::Rsi => "rsi",
            Self::Rdi => "rdi",
            Self::Rsp => "rsp",
            Self::Rbp => "rbp",
            Self::R8 => "r8",
            Self::R9 => "r9",
            Self::R10 => "r10",
            Self::R11 => "r11",
            Self::R12 => "r12",
            Self::R13 => "r13",
            Self::R14 => "r14",
            Self::R15 => "r15",
        }
    }

    /// The name of the lowest byte of this register.
    pub fn low_byte(&self) -> &'static str {
        match self {
            Self::Rax => "al",
            Self::Rbx => "bl",
            Self::Rcx => "cl",
            Self::Rdx => "dl",
            Self::Rsi => "sil",
            Self::Rdi => "dil",
            Self::Rsp => "spl",
            Self::Rbp => "bpl",
            Self::R8 => "r8b",
            Self::R9 => "r9b",
            Self::R10 => "r10b",
            Self::R11 => "r11b",
            Self::R12 => "r12b",
            Self::R13 => "r13b",
            Self::R14 => "r14b",
            Self::R15 => "r15b",
        }
    }

    pub fn from_name(name: &str) -> Option<Register> {
        Self::ALL.into_iter().find(|reg| reg.name() == name)
    }
}

/// A register operand: either a machine register or an abstract one waiting
/// for allocation.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Reg {
    Machine(Register),
    Temp(String),
}

impl Reg {
    pub fn temp(name: impl Into<String>) -> Self {
        Self::Temp(name.into())
    }

    pub fn as_temp(&self) -> Option<&str> {
        match self {
            Self::Machine(_) => None,
            Self::Temp(name) => Some(name),
        }
    }

    /// The graph node name of this register. Machine registers use their
    /// assembly name.
    pub fn id(&self) -> &str {
        match self {
            Self::Machine(reg) => reg.name(),
            Self::Temp(name) => name,
        }
    }
}

impl From<Register> for Reg {
    fn from(reg: Register) -> Self {
        Self::Machine(reg)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Scale {
    One,
    Two,
    Four,
    Eight,
}

impl Scale {
    pub fn from_factor(factor: i64) -> Option<Scale> {
        Some(match factor {
            1 => Self::One,
            2 => Self::Two,
            4 => Self::Four,
            8 => Self::Eight,
            _ => return None,
        })
    }

    pub fn factor(&self) -> i64 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Four => 4,
            Self::Eight => 8,
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Displacement {
    None,
    Const(i32),
    /// A global addressed relative to `rip`. Never combined with a base or an
    /// index.
    Global(String),
}

/// `[base + index * scale + displacement]`
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Memory {
    pub base: Option<Reg>,
    pub index: Option<(Reg, Scale)>,
    pub displacement: Displacement,
}

impl Memory {
    pub fn new(base: Option<Reg>, index: Option<(Reg, Scale)>, displacement: Displacement) -> Self {
        Self {
            base,
            index,
            displacement,
        }
    }

    pub fn reg(base: Reg) -> Self {
        Self::new(Some(base), None, Displacement::None)
    }

    pub fn reg_offset(base: Reg, offset: i32) -> Self {
        Self::new(Some(base), None, Displacement::Const(offset))
    }

    pub fn constant(address: i32) -> Self {
        Self::new(None, None, Displacement::Const(address))
    }

    pub fn global(name: impl Into<String>) -> Self {
        Self::new(None, None, Displacement::Global(name.into()))
    }

    /// A stack slot below the frame pointer. Slots are numbered from one.
    pub fn slot(slot: usize) -> Self {
        Self::reg_offset(Register::Rbp.into(), -8 * slot as i32)
    }

    pub fn regs(&self) -> impl Iterator<Item = &Reg> {
        self.base
            .iter()
            .chain(self.index.iter().map(|(reg, _)| reg))
    }

    pub fn map_regs(&self, mut f: impl FnMut(&Reg) -> Reg) -> Self {
        Self {
            base: self.base.as_ref().map(&mut f),
            index: self.index.as_ref().map(|(reg, scale)| (f(reg), *scale)),
            displacement: self.displacement.clone(),
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Arg {
    Const(i32),
    Reg(Reg),
    Mem(Memory),
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ConstOrReg {
    Const(i32),
    Reg(Reg),
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum RegOrMem {
    Reg(Reg),
    Mem(Memory),
}

impl From<ConstOrReg> for Arg {
    fn from(value: ConstOrReg) -> Self {
        match value {
            ConstOrReg::Const(value) => Self::Const(value),
            ConstOrReg::Reg(reg) => Self::Reg(reg),
        }
    }
}

impl From<RegOrMem> for Arg {
    fn from(value: RegOrMem) -> Self {
        match value {
            RegOrMem::Reg(reg) => Self::Reg(reg),
            RegOrMem::Mem(mem) => Self::Mem(mem),
        }
    }
}

impl From<Reg> for Arg {
    fn from(reg: Reg) -> Self {
        Self::Reg(reg)
    }
}

impl From<Register> for Arg {
    fn from(reg: Register) -> Self {
        Self::Reg(reg.into())
    }
}

/// What a call jumps to.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum CallTarget {
    Function(String),
    Indirect(RegOrMem),
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum JumpKind {
    Jmp,
    Je,
    Jne,
    Jl,
    Jle,
    Jg,
    Jge,
    Jz,
    Jnz,
}

impl JumpKind {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Jmp => "jmp",
            Self::Je => "je",
            Self::Jne => "jne",
            Self::Jl => "jl",
            Self::Jle => "jle",
            Self::Jg => "jg",
            Self::Jge => "jge",
            Self::Jz => "jz",
            Self::Jnz => "jnz",
        }
    }

    /// The `setcc` mnemonic for the same condition.
    pub fn set_mnemonic(&self) -> &'static str {
        match self {
            Self::Jmp => unreachable!("unconditional jumps have no flag to set"),
            Self::Je | Self::Jz => "sete",
            Self::Jne | Self::Jnz => "setne",
            Self::Jl => "setl",
            Self::Jle => "setle",
            Self::Jg => "setg",
            Self::Jge => "setge",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Xor,
}

impl BinaryOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Xor => "xor",
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Instruction {
    /// `movabs`, for constants that do not fit in 32 bits.
    MoveLong { dest: Reg, value: i64 },
    MoveToMemory { dest: Memory, src: ConstOrReg },
    MoveToRegister { dest: Reg, src: Arg },
    Lea { dest: Reg, src: Memory },
    CmpMemory { minuend: Reg, subtrahend: Memory },
    Cmp { minuend: RegOrMem, subtrahend: ConstOrReg },
    /// Set the register to 1 if the flags match the condition, otherwise 0.
    SetOnFlag { kind: JumpKind, reg: Reg },
    Jump { kind: JumpKind, label: String },
    Call(CallTarget),
    Return,
    BinaryMemory { op: BinaryOp, dest: Memory, src: ConstOrReg },
    BinaryRegister { op: BinaryOp, dest: Reg, src: Arg },
    IMul { dest: Reg, src: RegOrMem },
    IMulImmediate { dest: Reg, src: RegOrMem, immediate: i32 },
    Cqo,
    IDiv(RegOrMem),
    Neg(RegOrMem),
    Inc(RegOrMem),
    Dec(RegOrMem),
    Shl { dest: RegOrMem, count: u8 },
    Push(Arg),
    Pop(Reg),
    Label(String),
    Comment(String),
}

impl Instruction {
    pub fn mov(dest: impl Into<Reg>, src: impl Into<Arg>) -> Self {
        Self::MoveToRegister {
            dest: dest.into(),
            src: src.into(),
        }
    }

    pub fn jump(label: impl Into<String>) -> Self {
        Self::Jump {
            kind: JumpKind::Jmp,
            label: label.into(),
        }
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Self::Comment(text.into())
    }

    /// Does control never continue to the next instruction?
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::Jump {
                kind: JumpKind::Jmp,
                ..
            } | Self::Return
        )
    }

    pub fn jump_target(&self) -> Option<&str> {
        match self {
            Self::Jump { label, .. } => Some(label),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AssemblyProgram {
    /// Function names made visible to the linker.
    pub exported: Vec<String>,
    pub globals: Vec<GlobalVariable>,
    pub instructions: Vec<Instruction>,
}
