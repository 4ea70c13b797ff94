use trellis_common::ir::{Operator, Statement};
use trellis_common::names::ResourceAllocator;

use super::{invert_condition, schedule};
use crate::interpret::interpret;
use crate::testing::{c, call, function, op, t, unit};

fn labels(statements: &[Statement]) -> Vec<&str> {
    statements
        .iter()
        .filter_map(|statement| match statement {
            Statement::Label(label) => Some(label.as_str()),
            _ => None,
        })
        .collect()
}

#[test]
fn jump_to_next_block_is_dropped() {
    let mut names = ResourceAllocator::new();
    let statements = vec![
        Statement::label("a"),
        Statement::jump("c"),
        Statement::label("b"),
        Statement::Return(Some(c(2))),
        Statement::label("c"),
        Statement::jump("b"),
    ];

    let scheduled = schedule(&mut names, "f", &statements).unwrap();

    assert_eq!(
        vec![
            Statement::label("a"),
            Statement::label("c"),
            Statement::label("b"),
            Statement::Return(Some(c(2))),
        ],
        scheduled
    );
}

#[test]
fn conditional_jumps_become_fallthroughs() {
    let mut names = ResourceAllocator::new();
    let condition = op(Operator::Lt, t("x"), c(0));
    let statements = vec![
        Statement::label("start"),
        Statement::cjump(condition.clone(), "negative", "positive"),
        Statement::label("negative"),
        Statement::move_temp("y", c(1)),
        Statement::Return(Some(t("y"))),
        Statement::label("positive"),
        Statement::Return(Some(c(0))),
    ];

    let scheduled = schedule(&mut names, "f", &statements).unwrap();

    assert!(!scheduled
        .iter()
        .any(|statement| matches!(statement, Statement::CJump { .. })));
    assert_eq!(vec!["start", "negative", "positive"], labels(&scheduled));
    assert_eq!(
        Statement::CJumpFallThrough(op(Operator::Ge, t("x"), c(0)), "positive".into()),
        scheduled[1]
    );
}

#[test]
fn every_block_is_placed_once() {
    let mut names = ResourceAllocator::new();
    let statements = vec![
        Statement::move_temp("i", c(0)),
        Statement::move_temp("sum", c(0)),
        Statement::label("loop"),
        Statement::cjump(op(Operator::Lt, t("i"), c(10)), "body", "done"),
        Statement::label("done"),
        Statement::Return(Some(t("sum"))),
        Statement::label("body"),
        Statement::move_temp("sum", op(Operator::Add, t("sum"), t("i"))),
        Statement::move_temp("i", op(Operator::Add, t("i"), c(1))),
        Statement::jump("loop"),
    ];

    let scheduled = schedule(&mut names, "f", &statements).unwrap();

    let mut placed = labels(&scheduled);
    assert_eq!(4, placed.len());
    placed.sort_unstable();
    placed.dedup();
    assert_eq!(4, placed.len());

    let before = unit(vec![], vec![function("f", &[], true, statements)]);
    let after = unit(vec![], vec![function("f", &[], true, scheduled)]);
    assert_eq!(Some(45), interpret(&before, "f").unwrap().value);
    assert_eq!(interpret(&before, "f"), interpret(&after, "f"));
}

#[test]
fn broken_fallthrough_gets_a_jump() {
    let mut names = ResourceAllocator::new();
    let statements = vec![
        Statement::label("entry"),
        Statement::CJumpFallThrough(t("c"), "far".into()),
        Statement::label("near"),
        call("g", vec![], None),
        Statement::label("join"),
        Statement::Return(None),
        Statement::label("far"),
        Statement::jump("join"),
    ];

    let scheduled = schedule(&mut names, "f", &statements).unwrap();

    // every transfer out of a block is either a fallthrough or explicit
    for (i, statement) in scheduled.iter().enumerate() {
        if let Statement::Label(label) = statement {
            if i == 0 {
                continue;
            }

            let previous = &scheduled[i - 1];
            let falls_in = !matches!(previous, Statement::Jump(_) | Statement::Return(_));
            let jumped_to = scheduled
                .iter()
                .any(|statement| statement.targets().contains(&label.as_str()));
            assert!(falls_in || jumped_to, "block '{label}' is unreachable");
        }
    }

    let g = function("g", &[], false, vec![Statement::Return(None)]);
    for value in [0, 1] {
        let mut body = vec![Statement::move_temp("c", c(value))];
        body.extend(scheduled.iter().cloned());
        let program = unit(vec![], vec![g.clone(), function("f", &[], false, body)]);
        assert!(interpret(&program, "f").is_ok());
    }
}

#[test]
fn inverted_conditions() {
    assert_eq!(
        op(Operator::Gt, t("a"), t("b")),
        invert_condition(&op(Operator::Le, t("a"), t("b")))
    );
    assert_eq!(
        op(Operator::Eq, op(Operator::Add, t("a"), c(1)), c(0)),
        invert_condition(&op(Operator::Add, t("a"), c(1)))
    );
    assert_eq!(
        op(Operator::Eq, t("a"), c(0)),
        invert_condition(&t("a"))
    );
    assert_eq!(c(1), invert_condition(&c(0)));
}
