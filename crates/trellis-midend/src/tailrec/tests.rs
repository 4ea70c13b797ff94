use trellis_common::ir::{Expression, Function, Operator, Statement};
use trellis_common::names::ResourceAllocator;

use super::eliminate_tail_recursion;
use crate::interpret::{interpret, INT_TO_STRING};
use crate::testing::{c, call, function, op, println, t, unit};

fn self_calls(function: &Function) -> usize {
    function
        .body
        .iter()
        .filter(|statement| {
            matches!(statement, Statement::Call { function: target, .. }
                if matches!(target.as_ref(), Expression::Name(name) if *name == function.name))
        })
        .count()
}

fn run(functions: Vec<Function>) -> Option<i64> {
    interpret(&unit(vec![], functions), "main").unwrap().value
}

fn main_calling(name: &str, args: Vec<i64>) -> Function {
    function(
        "main",
        &[],
        true,
        vec![
            call(name, args.into_iter().map(c).collect(), Some("r")),
            Statement::Return(Some(t("r"))),
        ],
    )
}

#[test]
fn accumulator_factorial() {
    let mut names = ResourceAllocator::new();
    let fact = function(
        "fact",
        &["n", "acc"],
        true,
        vec![
            Statement::cjump(op(Operator::Le, t("n"), c(1)), "base", "step"),
            Statement::label("step"),
            call(
                "fact",
                vec![
                    op(Operator::Sub, t("n"), c(1)),
                    op(Operator::Mul, t("acc"), t("n")),
                ],
                Some("r"),
            ),
            Statement::Return(Some(t("r"))),
            Statement::label("base"),
            Statement::Return(Some(t("acc"))),
        ],
    );

    let looped = eliminate_tail_recursion(&mut names, fact.clone());

    assert_eq!(0, self_calls(&looped));
    assert!(matches!(&looped.body[0], Statement::Label(_)));
    assert_eq!(
        run(vec![fact, main_calling("fact", vec![10, 1])]),
        run(vec![looped, main_calling("fact", vec![10, 1])])
    );
}

#[test]
fn through_a_join() {
    // sum(n, acc) = if n == 0 then acc else sum(n - 1, acc + n), with both
    // arms meeting at a single return
    let mut names = ResourceAllocator::new();
    let sum = function(
        "sum",
        &["n", "acc"],
        true,
        vec![
            Statement::CJumpFallThrough(op(Operator::Eq, t("n"), c(0)), "done".into()),
            call(
                "sum",
                vec![
                    op(Operator::Sub, t("n"), c(1)),
                    op(Operator::Add, t("acc"), t("n")),
                ],
                Some("t"),
            ),
            Statement::move_temp("result", t("t")),
            Statement::jump("join"),
            Statement::label("done"),
            Statement::move_temp("result", t("acc")),
            Statement::label("join"),
            Statement::Return(Some(t("result"))),
        ],
    );

    let looped = eliminate_tail_recursion(&mut names, sum.clone());

    assert_eq!(0, self_calls(&looped));
    assert_eq!(
        Some(5050),
        run(vec![looped, main_calling("sum", vec![100, 0])])
    );
    assert_eq!(
        Some(5050),
        run(vec![sum, main_calling("sum", vec![100, 0])])
    );
}

#[test]
fn void_countdown() {
    let mut names = ResourceAllocator::new();
    let countdown = function(
        "countdown",
        &["n"],
        false,
        vec![
            Statement::CJumpFallThrough(op(Operator::Lt, t("n"), c(1)), "stop".into()),
            call(INT_TO_STRING, vec![t("n")], Some("s")),
            println(t("s")),
            call("countdown", vec![op(Operator::Sub, t("n"), c(1))], None),
            Statement::label("stop"),
            Statement::Return(None),
        ],
    );

    let looped = eliminate_tail_recursion(&mut names, countdown);
    assert_eq!(0, self_calls(&looped));

    let main = function(
        "main",
        &[],
        false,
        vec![call("countdown", vec![c(3)], None), Statement::Return(None)],
    );
    let outcome = interpret(&unit(vec![], vec![looped, main]), "main").unwrap();
    assert_eq!("3\n2\n1\n", outcome.output);
}

#[test]
fn non_tail_calls_are_kept() {
    let mut names = ResourceAllocator::new();
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

    assert_eq!(fact.clone(), eliminate_tail_recursion(&mut names, fact));
}

#[test]
fn arguments_are_evaluated_first() {
    // swap(a, b, n) swaps its arguments n times, so every argument must be
    // read before any parameter is overwritten
    let mut names = ResourceAllocator::new();
    let swap = function(
        "swap",
        &["a", "b", "n"],
        true,
        vec![
            Statement::CJumpFallThrough(op(Operator::Eq, t("n"), c(0)), "done".into()),
            call(
                "swap",
                vec![t("b"), t("a"), op(Operator::Sub, t("n"), c(1))],
                Some("r"),
            ),
            Statement::Return(Some(t("r"))),
            Statement::label("done"),
            Statement::Return(Some(op(Operator::Sub, t("a"), t("b")))),
        ],
    );

    let looped = eliminate_tail_recursion(&mut names, swap);
    assert_eq!(
        Some(1),
        run(vec![looped, main_calling("swap", vec![1, 2, 3])])
    );
}
