use trellis_common::ir::{Expression, Operator, Statement};
use trellis_common::names::ResourceAllocator;

use super::eliminate_common_subexpressions;
use crate::interpret::{interpret, INT_TO_STRING};
use crate::testing::{c, call, function, op, println, t, unit};

#[test]
fn hoist_inside_out() {
    let mut names = ResourceAllocator::new();
    let product = op(Operator::Mul, t("a"), t("b"));
    let doubled = op(Operator::Mul, product.clone(), c(2));

    let statements = vec![
        Statement::move_temp("a", c(3)),
        Statement::move_temp("b", c(4)),
        Statement::move_temp("x", doubled.clone()),
        Statement::move_temp("y", doubled.clone()),
        Statement::Return(Some(op(Operator::Add, t("x"), t("y")))),
    ];

    let expected = vec![
        Statement::move_temp("a", c(3)),
        Statement::move_temp("b", c(4)),
        Statement::move_temp("_t0", product),
        Statement::move_temp("_t1", op(Operator::Mul, t("_t0"), c(2))),
        Statement::move_temp("x", t("_t1")),
        Statement::move_temp("y", t("_t1")),
        Statement::Return(Some(op(Operator::Add, t("x"), t("y")))),
    ];

    assert_eq!(expected, eliminate_common_subexpressions(&mut names, &statements));
}

#[test]
fn stores_invalidate_loads() {
    let mut names = ResourceAllocator::new();
    let load = Expression::mem(op(Operator::Mul, t("p"), c(8)));

    let statements = vec![
        Statement::move_temp("x", load.clone()),
        Statement::MoveMem {
            address: t("q"),
            source: c(1),
        },
        Statement::move_temp("y", load.clone()),
        Statement::Return(Some(op(Operator::Add, t("x"), t("y")))),
    ];

    let result = eliminate_common_subexpressions(&mut names, &statements);

    // the address is still shared, the load is not
    assert_eq!(
        Statement::move_temp("x", Expression::mem(t("_t0"))),
        result[1]
    );
    assert_eq!(
        Statement::move_temp("y", Expression::mem(t("_t0"))),
        result[3]
    );
}

#[test]
fn nothing_to_share() {
    let mut names = ResourceAllocator::new();
    let statements = vec![
        Statement::move_temp("x", op(Operator::Mul, t("a"), t("b"))),
        Statement::move_temp("a", c(1)),
        Statement::move_temp("y", op(Operator::Mul, t("a"), t("b"))),
        Statement::Return(Some(op(Operator::Add, t("x"), t("y")))),
    ];

    assert_eq!(
        statements,
        eliminate_common_subexpressions(&mut names, &statements)
    );
}

#[test]
fn behavior_is_preserved() {
    let mut names = ResourceAllocator::new();
    let square = op(Operator::Mul, t("i"), t("i"));
    let scaled = op(Operator::Div, op(Operator::Mul, square.clone(), c(3)), c(2));

    let body = vec![
        Statement::move_temp("i", c(0)),
        Statement::move_temp("acc", c(0)),
        Statement::label("loop"),
        Statement::CJumpFallThrough(op(Operator::Ge, t("i"), c(5)), "done".into()),
        Statement::move_temp("acc", op(Operator::Add, t("acc"), scaled.clone())),
        Statement::move_temp("other", op(Operator::Sub, scaled.clone(), square.clone())),
        call(INT_TO_STRING, vec![op(Operator::Mul, t("other"), square)], Some("s")),
        println(Expression::temp("s")),
        Statement::move_temp("i", op(Operator::Add, t("i"), c(1))),
        Statement::jump("loop"),
        Statement::label("done"),
        Statement::Return(Some(op(Operator::Mul, t("acc"), scaled))),
    ];

    let optimized = eliminate_common_subexpressions(&mut names, &body);
    assert!(optimized.len() > body.len());

    let before = unit(vec![], vec![function("main", &[], true, body)]);
    let after = unit(vec![], vec![function("main", &[], true, optimized)]);

    let expected = interpret(&before, "main").unwrap();
    assert_eq!(expected, interpret(&after, "main").unwrap());
    assert_eq!("0\n0\n8\n36\n128\n", expected.output);
}
