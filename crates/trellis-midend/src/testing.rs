//! Shorthands for building IR by hand in tests.

use trellis_common::ir::{CompilationUnit, Expr, Expression, Function, GlobalVariable, Operator, Statement};

pub fn c(value: i64) -> Expr {
    Expression::constant(value)
}

pub fn t(name: &str) -> Expr {
    Expression::temp(name)
}

pub fn n(name: &str) -> Expr {
    Expression::name(name)
}

pub fn op(op: Operator, e1: Expr, e2: Expr) -> Expr {
    Expression::op(op, e1, e2)
}

pub fn call(function: &str, args: Vec<Expr>, collector: Option<&str>) -> Statement {
    Statement::Call {
        function: n(function),
        args,
        collector: collector.map(Into::into),
    }
}

pub fn println(value: Expr) -> Statement {
    call(crate::interpret::PRINTLN, vec![value], None)
}

pub fn function(name: &str, params: &[&str], has_return: bool, body: Vec<Statement>) -> Function {
    Function {
        name: name.into(),
        params: params.iter().map(|param| param.to_string()).collect(),
        has_return,
        body,
    }
}

pub fn global(name: &str, content: &str) -> GlobalVariable {
    GlobalVariable {
        name: name.into(),
        content: content.into(),
    }
}

pub fn unit(globals: Vec<GlobalVariable>, functions: Vec<Function>) -> CompilationUnit {
    CompilationUnit { globals, functions }
}
