use super::{
    Arg, AssemblyProgram, CallTarget, ConstOrReg, Displacement, Instruction, JumpKind, Memory,
    Reg, Register, Scale,
};
use crate::ir::GlobalVariable;

#[test]
fn print_memory_operands() {
    let full = Memory::new(
        Some(Reg::temp("a")),
        Some((Reg::temp("b"), Scale::Eight)),
        Displacement::Const(-16),
    );
    assert_eq!("qword ptr [a+b*8-16]", full.to_string());

    assert_eq!("qword ptr [1]", Memory::constant(1).to_string());
    assert_eq!("qword ptr [rbp-8]", Memory::slot(1).to_string());
    assert_eq!("qword ptr [rip+hello]", Memory::global("hello").to_string());

    let index_only = Memory::new(None, Some((Reg::temp("i"), Scale::Two)), Displacement::Const(8));
    assert_eq!("qword ptr [i*2+8]", index_only.to_string());
}

#[test]
fn print_instructions() {
    let set = Instruction::SetOnFlag {
        kind: JumpKind::Jl,
        reg: Register::Rax.into(),
    };
    assert_eq!("setl al\nmovzx rax, al", set.to_string());

    let mov = Instruction::MoveToMemory {
        dest: Memory::reg_offset(Register::Rbp.into(), 16),
        src: ConstOrReg::Const(0),
    };
    assert_eq!("mov qword ptr [rbp+16], 0", mov.to_string());

    assert_eq!(
        "call foo",
        Instruction::Call(CallTarget::Function("foo".into())).to_string()
    );
    assert_eq!("## hi", Instruction::comment("hi").to_string());
    assert_eq!(
        "mov x, 5",
        Instruction::mov(Reg::temp("x"), Arg::Const(5)).to_string()
    );
}

#[test]
fn print_program_with_data() {
    let program = AssemblyProgram {
        exported: vec!["main".into()],
        globals: vec![GlobalVariable {
            name: "S".into(),
            content: "hi".into(),
        }],
        instructions: vec![Instruction::Label("main".into()), Instruction::Return],
    };

    let expected = "    .text
    .intel_syntax noprefix
    .globl main
main:
    ret
    .data
    .align 8
S:
    .quad 2
    .quad 104 ## h
    .quad 105 ## i
";

    assert_eq!(expected, program.to_string());
}
