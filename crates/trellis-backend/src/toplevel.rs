use trellis_common::asm::{Arg, BinaryOp, Instruction, Register};

/// Wrap the allocated body of a function in its label, prologue and
/// epilogue. The frame reserves `slots` words below `rbp`, rounded up so the
/// stack stays 16-byte aligned.
pub fn emit_function(name: &str, body: Vec<Instruction>, slots: usize) -> Vec<Instruction> {
    let mut instructions = Vec::with_capacity(body.len() + 7);

    instructions.push(Instruction::Label(name.into()));
    instructions.push(Instruction::Push(Register::Rbp.into()));
    instructions.push(Instruction::mov(Register::Rbp, Register::Rsp));

    if slots > 0 {
        let size = (8 * slots + 15) / 16 * 16;
        instructions.push(Instruction::BinaryRegister {
            op: BinaryOp::Sub,
            dest: Register::Rsp.into(),
            src: Arg::Const(size as i32),
        });
    }

    instructions.extend(body);

    instructions.push(Instruction::mov(Register::Rsp, Register::Rbp));
    instructions.push(Instruction::Pop(Register::Rbp.into()));
    instructions.push(Instruction::Return);
    instructions
}

#[cfg(test)]
mod tests {
    use trellis_common::asm::{Arg, BinaryOp, Instruction, Register};

    use super::emit_function;

    #[test]
    fn frames_are_aligned() {
        let emitted = emit_function("f", vec![], 3);

        assert_eq!(
            vec![
                Instruction::Label("f".into()),
                Instruction::Push(Register::Rbp.into()),
                Instruction::mov(Register::Rbp, Register::Rsp),
                Instruction::BinaryRegister {
                    op: BinaryOp::Sub,
                    dest: Register::Rsp.into(),
                    src: Arg::Const(32),
                },
                Instruction::mov(Register::Rsp, Register::Rbp),
                Instruction::Pop(Register::Rbp.into()),
                Instruction::Return,
            ],
            emitted
        );
    }

    #[test]
    fn no_slots_no_sub() {
        let emitted = emit_function("f", vec![Instruction::Cqo], 0);
        assert_eq!(Instruction::Cqo, emitted[3]);
        assert!(!emitted.iter().any(|instruction| matches!(
            instruction,
            Instruction::BinaryRegister {
                op: BinaryOp::Sub,
                ..
            }
        )));
        assert_eq!(Some(&Instruction::Return), emitted.last());
    }
}
