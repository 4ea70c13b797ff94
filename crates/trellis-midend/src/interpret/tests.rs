use trellis_common::ir::{Expression, Operator, Statement};

use super::{interpret, InterpretError, Outcome, INT_TO_STRING, MALLOC, THROW};
use crate::testing::{c, call, function, global, n, op, println, t, unit};

#[test]
fn print_and_return() {
    let unit = unit(
        vec![global("MSG", "hello")],
        vec![function(
            "main",
            &[],
            true,
            vec![
                println(n("MSG")),
                Statement::Return(Some(op(Operator::Mul, c(6), c(7)))),
            ],
        )],
    );

    assert_eq!(
        Ok(Outcome {
            value: Some(42),
            output: "hello\n".into()
        }),
        interpret(&unit, "main")
    );
}

#[test]
fn loops_and_calls() {
    // fact(n) = if n <= 1 then 1 else n * fact(n - 1), printed for 5
    let fact = function(
        "fact",
        &["n"],
        true,
        vec![
            Statement::CJumpFallThrough(op(Operator::Le, t("n"), c(1)), "base".into()),
            call("fact", vec![op(Operator::Sub, t("n"), c(1))], Some("r")),
            Statement::Return(Some(op(Operator::Mul, t("n"), t("r")))),
            Statement::label("base"),
            Statement::Return(Some(c(1))),
        ],
    );

    let main = function(
        "main",
        &[],
        false,
        vec![
            Statement::move_temp("i", c(0)),
            Statement::label("loop"),
            Statement::cjump(op(Operator::Lt, t("i"), c(3)), "body", "done"),
            Statement::label("body"),
            call("fact", vec![op(Operator::Add, t("i"), c(3))], Some("f")),
            call(INT_TO_STRING, vec![t("f")], Some("s")),
            println(t("s")),
            Statement::move_temp("i", op(Operator::Add, t("i"), c(1))),
            Statement::jump("loop"),
            Statement::label("done"),
            Statement::Return(None),
        ],
    );

    let unit = unit(vec![], vec![fact, main]);
    let outcome = interpret(&unit, "main").unwrap();

    assert_eq!(None, outcome.value);
    assert_eq!("6\n24\n120\n", outcome.output);
}

#[test]
fn memory_and_indirect_calls() {
    let id = function("id", &["x"], true, vec![Statement::Return(Some(t("x")))]);
    let main = function(
        "main",
        &[],
        true,
        vec![
            call(MALLOC, vec![c(16)], Some("p")),
            Statement::MoveMem {
                address: op(Operator::Add, t("p"), c(8)),
                source: n("id"),
            },
            Statement::Call {
                function: Expression::mem(op(Operator::Add, t("p"), c(8))),
                args: vec![c(5)],
                collector: Some("r".into()),
            },
            Statement::Return(Some(t("r"))),
        ],
    );

    let unit = unit(vec![], vec![id, main]);
    assert_eq!(Some(5), interpret(&unit, "main").unwrap().value);
}

#[test]
fn runtime_errors() {
    let divide = unit(
        vec![],
        vec![function(
            "main",
            &[],
            true,
            vec![Statement::Return(Some(op(Operator::Div, c(1), t("zero"))))],
        )],
    );
    assert_eq!(Err(InterpretError::DivisionByZero), interpret(&divide, "main"));

    let throw = unit(
        vec![global("OOPS", "oops")],
        vec![function(
            "main",
            &[],
            false,
            vec![call(THROW, vec![n("OOPS")], None), Statement::Return(None)],
        )],
    );
    assert_eq!(
        Err(InterpretError::Thrown("oops".into())),
        interpret(&throw, "main")
    );

    let missing = unit(vec![], vec![]);
    assert_eq!(
        Err(InterpretError::UndefinedName("main".into())),
        interpret(&missing, "main")
    );
}

#[test]
fn huge_allocations_fail() {
    for bytes in [i64::MAX, i64::MAX - 7] {
        let unit = unit(
            vec![],
            vec![function(
                "main",
                &[],
                true,
                vec![
                    call(MALLOC, vec![c(bytes)], Some("p")),
                    Statement::Return(Some(t("p"))),
                ],
            )],
        );

        assert_eq!(Err(InterpretError::OutOfMemory(bytes)), interpret(&unit, "main"));
    }
}
