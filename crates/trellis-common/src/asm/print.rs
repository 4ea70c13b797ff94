use std::fmt;

use super::{
    Arg, AssemblyProgram, CallTarget, ConstOrReg, Displacement, Instruction, Memory, Reg,
    RegOrMem, Scale,
};

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "qword ptr [")?;

        let mut empty = true;
        if let Some(base) = &self.base {
            write!(f, "{base}")?;
            empty = false;
        }

        if let Some((index, scale)) = &self.index {
            if !empty {
                write!(f, "+")?;
            }

            match scale {
                Scale::One => write!(f, "{index}")?,
                scale => write!(f, "{index}*{}", scale.factor())?,
            }
            empty = false;
        }

        match &self.displacement {
            Displacement::None if empty => write!(f, "0")?,
            Displacement::None => {}
            Displacement::Const(value) if empty => write!(f, "{value}")?,
            Displacement::Const(value) if *value < 0 => write!(f, "-{}", value.unsigned_abs())?,
            Displacement::Const(value) => write!(f, "+{value}")?,
            Displacement::Global(name) => write!(f, "rip+{name}")?,
        }

        write!(f, "]")
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(value) => write!(f, "{value}"),
            Self::Reg(reg) => write!(f, "{reg}"),
            Self::Mem(mem) => write!(f, "{mem}"),
        }
    }
}

impl fmt::Display for ConstOrReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(value) => write!(f, "{value}"),
            Self::Reg(reg) => write!(f, "{reg}"),
        }
    }
}

impl fmt::Display for RegOrMem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reg(reg) => write!(f, "{reg}"),
            Self::Mem(mem) => write!(f, "{mem}"),
        }
    }
}

impl fmt::Display for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(name) => write!(f, "{name}"),
            Self::Indirect(target) => write!(f, "{target}"),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MoveLong { dest, value } => write!(f, "movabs {dest}, {value}"),
            Self::MoveToMemory { dest, src } => write!(f, "mov {dest}, {src}"),
            Self::MoveToRegister { dest, src } => write!(f, "mov {dest}, {src}"),
            Self::Lea { dest, src } => write!(f, "lea {dest}, {src}"),
            Self::CmpMemory {
                minuend,
                subtrahend,
            } => write!(f, "cmp {minuend}, {subtrahend}"),
            Self::Cmp {
                minuend,
                subtrahend,
            } => write!(f, "cmp {minuend}, {subtrahend}"),
            Self::SetOnFlag { kind, reg } => {
                let byte = match reg {
                    Reg::Machine(reg) => reg.low_byte().to_string(),
                    Reg::Temp(name) => format!("{name}b"),
                };
                write!(f, "{} {byte}\nmovzx {reg}, {byte}", kind.set_mnemonic())
            }
            Self::Jump { kind, label } => write!(f, "{} {label}", kind.mnemonic()),
            Self::Call(target) => write!(f, "call {target}"),
            Self::Return => write!(f, "ret"),
            Self::BinaryMemory { op, dest, src } => write!(f, "{} {dest}, {src}", op.mnemonic()),
            Self::BinaryRegister { op, dest, src } => {
                write!(f, "{} {dest}, {src}", op.mnemonic())
            }
            Self::IMul { dest, src } => write!(f, "imul {dest}, {src}"),
            Self::IMulImmediate {
                dest,
                src,
                immediate,
            } => write!(f, "imul {dest}, {src}, {immediate}"),
            Self::Cqo => write!(f, "cqo"),
            Self::IDiv(divisor) => write!(f, "idiv {divisor}"),
            Self::Neg(dest) => write!(f, "neg {dest}"),
            Self::Inc(dest) => write!(f, "inc {dest}"),
            Self::Dec(dest) => write!(f, "dec {dest}"),
            Self::Shl { dest, count } => write!(f, "shl {dest}, {count}"),
            Self::Push(arg) => write!(f, "push {arg}"),
            Self::Pop(reg) => write!(f, "pop {reg}"),
            Self::Label(label) => write!(f, "{label}:"),
            Self::Comment(text) => write!(f, "## {text}"),
        }
    }
}

impl fmt::Display for AssemblyProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    .text")?;
        writeln!(f, "    .intel_syntax noprefix")?;
        for name in &self.exported {
            writeln!(f, "    .globl {name}")?;
        }

        for instruction in &self.instructions {
            match instruction {
                Instruction::Label(_) => writeln!(f, "{instruction}")?,
                Instruction::SetOnFlag { .. } => {
                    for line in instruction.to_string().lines() {
                        writeln!(f, "    {line}")?;
                    }
                }
                _ => writeln!(f, "    {instruction}")?,
            }
        }

        if self.globals.is_empty() {
            return Ok(());
        }

        writeln!(f, "    .data")?;
        writeln!(f, "    .align 8")?;
        for global in &self.globals {
            writeln!(f, "{}:", global.name)?;
            writeln!(f, "    .quad {}", global.content.chars().count())?;
            for c in global.content.chars() {
                writeln!(f, "    .quad {} ## {}", c as u32, c.escape_default())?;
            }
        }

        Ok(())
    }
}
