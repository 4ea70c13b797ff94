use trellis_common::asm::{
    Arg, BinaryOp, CallTarget, ConstOrReg, Displacement, Instruction, JumpKind, Memory, Reg,
    RegOrMem, Register, Scale,
};
use trellis_common::ir::{Expr, Expression, Function, Operator, Statement};
use trellis_common::names::ResourceAllocator;

use super::{cost, tile_function, Tiler};

fn c(value: i64) -> Expr {
    Expression::constant(value)
}

fn t(name: &str) -> Expr {
    Expression::temp(name)
}

fn op(op: Operator, e1: Expr, e2: Expr) -> Expr {
    Expression::op(op, e1, e2)
}

fn reg(name: &str) -> Reg {
    Reg::temp(name)
}

fn tile(statement: Statement) -> Vec<Instruction> {
    let mut names = ResourceAllocator::new();
    let mut tiler = Tiler::new(&mut names);
    tiler
        .tile_statement(&statement, "end")
        .into_iter()
        .filter(|instruction| !matches!(instruction, Instruction::Comment(_)))
        .collect()
}

#[test]
fn power_of_two_is_a_shift() {
    let mut names = ResourceAllocator::new();
    let mut tiler = Tiler::new(&mut names);
    let tiled = tiler.tile_expr(&op(Operator::Mul, t("x"), c(8)));

    assert_eq!(
        vec![
            Instruction::mov(tiled.value.clone(), reg("x")),
            Instruction::Shl {
                dest: RegOrMem::Reg(tiled.value.clone()),
                count: 3,
            },
        ],
        tiled.instructions
    );

    let tiled = tiler.tile_expr(&op(Operator::Mul, c(16), t("y")));
    assert!(tiled
        .instructions
        .iter()
        .any(|instruction| matches!(instruction, Instruction::Shl { count: 4, .. })));
    assert!(!tiled.instructions.iter().any(|instruction| matches!(
        instruction,
        Instruction::IMul { .. } | Instruction::IMulImmediate { .. }
    )));
}

#[test]
fn other_factors_multiply() {
    let mut names = ResourceAllocator::new();
    let mut tiler = Tiler::new(&mut names);
    let tiled = tiler.tile_expr(&op(Operator::Mul, t("x"), c(3)));

    assert_eq!(
        vec![Instruction::IMulImmediate {
            dest: tiled.value.clone(),
            src: RegOrMem::Reg(reg("x")),
            immediate: 3,
        }],
        tiled.instructions
    );
}

#[test]
fn shared_subtrees_are_tiled_once() {
    let mut names = ResourceAllocator::new();
    let mut tiler = Tiler::new(&mut names);

    let shared = op(Operator::Div, t("a"), t("b"));
    let first = tiler.tile_expr(&shared);
    let second = tiler.tile_expr(&shared);
    assert_eq!(first, second);

    // a structurally equal but distinct node gets its own result
    let other = tiler.tile_expr(&op(Operator::Div, t("a"), t("b")));
    assert_ne!(first.value, other.value);
}

#[test]
fn in_place_idioms() {
    assert_eq!(
        vec![Instruction::BinaryRegister {
            op: BinaryOp::Add,
            dest: reg("x"),
            src: Arg::Const(5),
        }],
        tile(Statement::move_temp("x", op(Operator::Add, t("x"), c(5))))
    );

    assert_eq!(
        vec![Instruction::BinaryRegister {
            op: BinaryOp::Sub,
            dest: reg("x"),
            src: Arg::Reg(reg("y")),
        }],
        tile(Statement::move_temp("x", op(Operator::Sub, t("x"), t("y"))))
    );

    assert_eq!(
        vec![Instruction::Neg(RegOrMem::Reg(reg("x")))],
        tile(Statement::move_temp("x", op(Operator::Sub, c(0), t("x"))))
    );

    assert_eq!(
        vec![Instruction::Neg(RegOrMem::Reg(reg("x")))],
        tile(Statement::move_temp("x", op(Operator::Mul, c(-1), t("x"))))
    );

    assert_eq!(
        vec![Instruction::Shl {
            dest: RegOrMem::Reg(reg("x")),
            count: 1,
        }],
        tile(Statement::move_temp("x", op(Operator::Mul, t("x"), c(2))))
    );
}

#[test]
fn steps_by_one() {
    let inc = vec![Instruction::Inc(RegOrMem::Reg(reg("x")))];
    let dec = vec![Instruction::Dec(RegOrMem::Reg(reg("x")))];

    assert_eq!(inc, tile(Statement::move_temp("x", op(Operator::Add, t("x"), c(1)))));
    assert_eq!(inc, tile(Statement::move_temp("x", op(Operator::Add, c(1), t("x")))));
    assert_eq!(inc, tile(Statement::move_temp("x", op(Operator::Sub, t("x"), c(-1)))));
    assert_eq!(dec, tile(Statement::move_temp("x", op(Operator::Sub, t("x"), c(1)))));
    assert_eq!(dec, tile(Statement::move_temp("x", op(Operator::Add, t("x"), c(-1)))));

    // another destination is not a step
    assert!(!tile(Statement::move_temp("y", op(Operator::Add, t("x"), c(1))))
        .iter()
        .any(|instruction| matches!(instruction, Instruction::Inc(_))));
}

#[test]
fn addressing_modes() {
    // y = mem[(a + i * 8) + 16]
    let address = op(
        Operator::Add,
        op(Operator::Add, t("a"), op(Operator::Mul, t("i"), c(8))),
        c(16),
    );

    assert_eq!(
        vec![Instruction::mov(
            reg("y"),
            Arg::Mem(Memory::new(
                Some(reg("a")),
                Some((reg("i"), Scale::Eight)),
                Displacement::Const(16),
            )),
        )],
        tile(Statement::move_temp("y", Expression::mem(address)))
    );

    assert_eq!(
        vec![Instruction::MoveToMemory {
            dest: Memory::reg_offset(reg("p"), 8),
            src: ConstOrReg::Const(3),
        }],
        tile(Statement::MoveMem {
            address: op(Operator::Add, t("p"), c(8)),
            source: c(3),
        })
    );

    assert_eq!(
        vec![Instruction::Lea {
            dest: reg("z"),
            src: Memory::new(Some(reg("a")), Some((reg("b"), Scale::One)), Displacement::None),
        }],
        tile(Statement::move_temp("z", op(Operator::Add, t("a"), t("b"))))
    );
}

#[test]
fn division_goes_through_rax() {
    assert_eq!(
        vec![
            Instruction::mov(Register::Rax, reg("x")),
            Instruction::Cqo,
            Instruction::IDiv(RegOrMem::Reg(reg("y"))),
            Instruction::mov(reg("_reg0"), Register::Rdx),
            Instruction::mov(reg("q"), reg("_reg0")),
        ],
        tile(Statement::move_temp("q", op(Operator::Mod, t("x"), t("y"))))
    );
}

#[test]
fn conditional_jumps() {
    assert_eq!(
        vec![
            Instruction::Cmp {
                minuend: RegOrMem::Reg(reg("x")),
                subtrahend: ConstOrReg::Const(10),
            },
            Instruction::Jump {
                kind: JumpKind::Jl,
                label: "l".into(),
            },
        ],
        tile(Statement::CJumpFallThrough(
            op(Operator::Lt, t("x"), c(10)),
            "l".into()
        ))
    );

    assert_eq!(
        vec![
            Instruction::Cmp {
                minuend: RegOrMem::Reg(reg("flag")),
                subtrahend: ConstOrReg::Const(0),
            },
            Instruction::Jump {
                kind: JumpKind::Jnz,
                label: "l".into(),
            },
        ],
        tile(Statement::CJumpFallThrough(t("flag"), "l".into()))
    );
}

#[test]
fn calls_keep_the_stack_aligned() {
    let call = Statement::Call {
        function: Expression::name("f"),
        args: (1..=7).map(c).collect(),
        collector: Some("r".into()),
    };

    assert_eq!(
        vec![
            Instruction::BinaryRegister {
                op: BinaryOp::Sub,
                dest: Register::Rsp.into(),
                src: Arg::Const(8),
            },
            Instruction::Push(Arg::Const(7)),
            Instruction::mov(Register::Rdi, Arg::Const(1)),
            Instruction::mov(Register::Rsi, Arg::Const(2)),
            Instruction::mov(Register::Rdx, Arg::Const(3)),
            Instruction::mov(Register::Rcx, Arg::Const(4)),
            Instruction::mov(Register::R8, Arg::Const(5)),
            Instruction::mov(Register::R9, Arg::Const(6)),
            Instruction::Call(CallTarget::Function("f".into())),
            Instruction::mov(reg("r"), Register::Rax),
            Instruction::BinaryRegister {
                op: BinaryOp::Add,
                dest: Register::Rsp.into(),
                src: Arg::Const(16),
            },
        ],
        tile(call)
    );
}

#[test]
fn returns_jump_to_the_epilogue() {
    assert_eq!(
        vec![
            Instruction::mov(Register::Rax, reg("x")),
            Instruction::jump("end"),
        ],
        tile(Statement::Return(Some(t("x"))))
    );
}

#[test]
fn function_parameters() {
    let mut names = ResourceAllocator::new();
    let params: Vec<String> = (0..8).map(|i| format!("p{i}")).collect();
    let function = Function {
        name: "f".into(),
        params,
        has_return: false,
        body: vec![Statement::Return(None)],
    };

    let instructions = tile_function(&mut names, &function);

    assert_eq!(Instruction::mov(reg("p0"), Register::Rdi), instructions[0]);
    assert_eq!(Instruction::mov(reg("p5"), Register::R9), instructions[5]);
    assert_eq!(
        Instruction::mov(reg("p7"), Arg::Mem(Memory::reg_offset(Register::Rbp.into(), 24))),
        instructions[7]
    );
    assert_eq!(
        Some(&Instruction::Label("_LABEL_EPILOGUE_FOR_f".into())),
        instructions.last()
    );
    assert_eq!(9, cost(&instructions));
}
