use trellis_common::ir::{Expression, Statement};
use trellis_common::names::ResourceAllocator;

use super::{build_blocks, BlockError};

#[test]
fn partition_at_labels_and_terminators() {
    let mut names = ResourceAllocator::new();
    let statements = vec![
        Statement::label("foo"),
        Statement::label("bar"),
        Statement::move_temp("x", Expression::constant(1)),
        Statement::cjump(Expression::temp("x"), "baz", "baz"),
        Statement::jump("baz"),
        Statement::label("baz"),
        Statement::Return(None),
    ];

    let blocks = build_blocks(&mut names, "f", &statements).unwrap();

    assert_eq!(4, blocks.len());
    assert_eq!("foo", blocks[0].label);
    assert_eq!("bar", blocks[1].label);
    assert_eq!("_LABEL_0_f", blocks[2].label);
    assert_eq!("baz", blocks[3].label);

    assert_eq!(vec![1], blocks[0].successors);
    assert_eq!(vec![3, 3], blocks[1].successors);
    assert_eq!(vec![3], blocks[2].successors);
    assert_eq!(Vec::<usize>::new(), blocks[3].successors);

    assert!(blocks[0].has_label());
    assert!(!blocks[2].has_label());

    let concatenated: Vec<_> = blocks
        .into_iter()
        .flat_map(|block| block.statements)
        .collect();
    assert_eq!(statements, concatenated);
}

#[test]
fn fallthrough_jump_has_two_successors() {
    let mut names = ResourceAllocator::new();
    let statements = vec![
        Statement::CJumpFallThrough(Expression::temp("c"), "out".into()),
        Statement::move_temp("x", Expression::constant(1)),
        Statement::label("out"),
        Statement::Return(None),
    ];

    let blocks = build_blocks(&mut names, "f", &statements).unwrap();

    assert_eq!(3, blocks.len());
    assert_eq!(vec![1, 2], blocks[0].successors);
    assert_eq!(vec![2], blocks[1].successors);
}

#[test]
fn empty_body_has_no_blocks() {
    let mut names = ResourceAllocator::new();
    assert_eq!(Ok(vec![]), build_blocks(&mut names, "f", &[]));
}

#[test]
fn missing_terminator() {
    let mut names = ResourceAllocator::new();
    let statements = vec![
        Statement::label("start"),
        Statement::move_temp("x", Expression::constant(1)),
    ];

    assert_eq!(
        Err(BlockError::MissingTerminator {
            function: "f".into()
        }),
        build_blocks(&mut names, "f", &statements)
    );
}

#[test]
fn dangling_label() {
    let mut names = ResourceAllocator::new();
    let statements = vec![Statement::jump("nowhere")];

    assert_eq!(
        Err(BlockError::DanglingLabel {
            function: "f".into(),
            label: "nowhere".into()
        }),
        build_blocks(&mut names, "f", &statements)
    );
}

#[test]
fn duplicate_label() {
    let mut names = ResourceAllocator::new();
    let statements = vec![
        Statement::label("a"),
        Statement::jump("a"),
        Statement::label("a"),
        Statement::Return(None),
    ];

    assert!(matches!(
        build_blocks(&mut names, "f", &statements),
        Err(BlockError::DuplicateLabel { .. })
    ));
}
