use trellis_common::ir::{CompilationUnit, Expression, Operator, Statement};
use trellis_common::names::ResourceAllocator;
use trellis_common::{Driver, IrOutput, OptLevel};

use crate::interpret::{interpret, INT_TO_STRING, STRING_TO_INT};
use crate::optimize;
use crate::testing::{c, call, function, global, n, op, println, t, unit};

struct TestDriver {
    level: OptLevel,
    stages: Vec<&'static str>,
}

impl TestDriver {
    pub fn new(level: OptLevel) -> Self {
        Self {
            level,
            stages: Vec::new(),
        }
    }
}

impl Driver for TestDriver {
    fn output_ir(&mut self, at: IrOutput, _: impl FnOnce() -> String) {
        if let IrOutput::Ir(stage) = at {
            self.stages.push(stage);
        }
    }

    fn entry_name(&mut self) -> Option<String> {
        Some("main".into())
    }

    fn opt_level(&mut self) -> OptLevel {
        self.level
    }
}

fn program() -> CompilationUnit {
    // prints the triangular numbers below 50, then returns fib(20)
    let triangles = function(
        "triangles",
        &["limit"],
        false,
        vec![
            Statement::move_temp("i", c(1)),
            Statement::move_temp("sum", c(0)),
            Statement::label("loop"),
            Statement::move_temp("sum", op(Operator::Add, t("sum"), t("i"))),
            Statement::cjump(op(Operator::Ge, t("sum"), t("limit")), "done", "print"),
            Statement::label("print"),
            call(INT_TO_STRING, vec![t("sum")], Some("s")),
            println(t("s")),
            Statement::move_temp("i", op(Operator::Sub, t("i"), c(-1))),
            Statement::jump("loop"),
            Statement::label("done"),
            Statement::Return(None),
        ],
    );

    let fib = function(
        "fib",
        &["n", "a", "b"],
        true,
        vec![
            Statement::cjump(op(Operator::Eq, t("n"), c(0)), "base", "step"),
            Statement::label("step"),
            call(
                "fib",
                vec![
                    op(Operator::Sub, t("n"), c(1)),
                    t("b"),
                    op(Operator::Add, t("a"), t("b")),
                ],
                Some("r"),
            ),
            Statement::Return(Some(t("r"))),
            Statement::label("base"),
            Statement::Return(Some(t("a"))),
        ],
    );

    let unused = function(
        "unused",
        &[],
        false,
        vec![println(n("UNUSED")), Statement::Return(None)],
    );

    let main = function(
        "main",
        &[],
        true,
        vec![
            println(n("HELLO")),
            Statement::move_temp("limit", op(Operator::Mul, c(5), c(10))),
            call("triangles", vec![t("limit")], None),
            call("fib", vec![c(20), c(0), c(1)], Some("r")),
            Statement::Return(Some(t("r"))),
        ],
    );

    unit(
        vec![global("HELLO", "hello"), global("UNUSED", "unused")],
        vec![triangles, fib, unused, main],
    )
}

#[test]
fn every_level_preserves_behavior() {
    let expected = interpret(&program(), "main").unwrap();
    assert_eq!(Some(6765), expected.value);
    assert_eq!("hello\n1\n3\n6\n10\n15\n21\n28\n36\n45\n", expected.output);

    for level in [OptLevel::None, OptLevel::Basic, OptLevel::Full] {
        let mut driver = TestDriver::new(level);
        let mut names = ResourceAllocator::new();
        let optimized = optimize(&mut driver, &mut names, program()).unwrap();

        assert_eq!(expected, interpret(&optimized, "main").unwrap());
        for function in optimized.functions.iter() {
            assert!(!function
                .body
                .iter()
                .any(|statement| matches!(statement, Statement::CJump { .. })));
        }
    }
}

#[test]
fn optimizations_remove_names_and_recursion() {
    let mut driver = TestDriver::new(OptLevel::Basic);
    let mut names = ResourceAllocator::new();
    let optimized = optimize(&mut driver, &mut names, program()).unwrap();

    assert!(optimized.function("unused").is_none());
    assert_eq!(1, optimized.globals.len());

    let fib = optimized.function("fib").unwrap();
    assert!(!fib.body.iter().any(|statement| matches!(
        statement,
        Statement::Call { function, .. } if *function == n("fib")
    )));

    assert_eq!(
        vec!["input", "tail recursion", "scheduling", "optimization"],
        driver.stages
    );
}

#[test]
fn no_optimization_keeps_everything() {
    let mut driver = TestDriver::new(OptLevel::None);
    let mut names = ResourceAllocator::new();
    let optimized = optimize(&mut driver, &mut names, program()).unwrap();

    assert_eq!(4, optimized.functions.len());
    assert!(optimized.function("fib").unwrap().body.iter().any(|statement| matches!(
        statement,
        Statement::Call { function, .. } if *function == n("fib")
    )));
    assert_eq!(vec!["input", "tail recursion", "scheduling"], driver.stages);
}

#[test]
fn small_functions_are_inlined_at_full() {
    let mut driver = TestDriver::new(OptLevel::Full);
    let mut names = ResourceAllocator::new();
    let optimized = optimize(&mut driver, &mut names, program()).unwrap();

    let main = optimized.function("main").unwrap();
    assert!(!main.body.iter().any(|statement| matches!(
        statement,
        Statement::Call { function, .. } if *function == n("fib") || *function == n("triangles")
    )));
    assert!(optimized.function("fib").is_none());
    assert!(optimized.function("triangles").is_none());

    assert_eq!(interpret(&program(), "main").unwrap(), interpret(&optimized, "main").unwrap());
    assert_eq!(
        vec!["input", "tail recursion", "scheduling", "optimization"],
        driver.stages
    );
}

#[test]
fn invariants_leave_loops_at_full() {
    // `k` only depends on the parameter, so it moves in front of the loop
    let sums = function(
        "sums",
        &["a", "limit"],
        true,
        vec![
            Statement::move_temp("i", c(0)),
            Statement::move_temp("total", c(0)),
            Statement::label("loop"),
            Statement::cjump(op(Operator::Lt, t("i"), t("limit")), "body", "done"),
            Statement::label("body"),
            Statement::move_temp("k", op(Operator::Mul, t("a"), t("a"))),
            Statement::move_temp("total", op(Operator::Add, t("total"), op(Operator::Add, t("k"), t("i")))),
            Statement::move_temp("i", op(Operator::Add, t("i"), c(1))),
            Statement::jump("loop"),
            Statement::label("done"),
            Statement::Return(Some(t("total"))),
        ],
    );

    let main = function(
        "main",
        &[],
        true,
        vec![
            call(STRING_TO_INT, vec![n("THREE")], Some("a")),
            call("sums", vec![t("a"), c(4)], Some("x")),
            call("sums", vec![op(Operator::Add, t("a"), c(2)), c(0)], Some("y")),
            call(INT_TO_STRING, vec![t("x")], Some("s")),
            println(t("s")),
            Statement::Return(Some(op(Operator::Add, t("x"), t("y")))),
        ],
    );

    let program = unit(vec![global("THREE", "3")], vec![sums, main]);
    let expected = interpret(&program, "main").unwrap();
    assert_eq!(Some(36 + 6), expected.value);

    let mut driver = TestDriver::new(OptLevel::Full);
    let mut names = ResourceAllocator::new();
    let optimized = optimize(&mut driver, &mut names, program).unwrap();
    assert_eq!(expected, interpret(&optimized, "main").unwrap());

    // every multiplication is now outside a loop: it runs before the first
    // backwards jump of its inlined copy
    let body = &optimized.function("main").unwrap().body;
    let labels: Vec<(usize, &str)> = body
        .iter()
        .enumerate()
        .filter_map(|(index, statement)| match statement {
            Statement::Label(label) => Some((index, label.as_str())),
            _ => None,
        })
        .collect();
    for (index, statement) in body.iter().enumerate() {
        let multiplies = statement
            .expressions()
            .into_iter()
            .any(|expr| matches!(**expr, Expression::Op(Operator::Mul, ..)));
        if !multiplies {
            continue;
        }

        let in_loop = body[index + 1..].iter().any(|later| {
            later.targets().iter().any(|target| {
                labels
                    .iter()
                    .any(|(at, label)| label == target && *at <= index)
            })
        });
        assert!(!in_loop, "{statement:?} still runs in a loop");
    }
}
