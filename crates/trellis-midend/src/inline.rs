//! Inlining of small functions.
//!
//! A direct call to a function whose body is short and never calls itself is
//! replaced by a copy of that body. Every temporary and label of the copy is
//! renamed, the parameters are assigned from the arguments, and each return
//! becomes an assignment to the collector followed by a jump past the copy.
//! Bodies are copied as they were before any inlining happened, so mutually
//! recursive functions are unrolled at most once.

use std::collections::HashMap;

use log::{debug, trace};

use trellis_common::ir::{CompilationUnit, Expr, Expression, Function, Statement};
use trellis_common::names::ResourceAllocator;

/// Bodies longer than this are never inlined.
pub const INLINE_LIMIT: usize = 24;

/// How many statements inlining may add to a single function.
pub const GROWTH_LIMIT: usize = 256;

pub fn inline_functions(names: &mut ResourceAllocator, unit: CompilationUnit) -> CompilationUnit {
    let candidates: HashMap<String, Function> = unit
        .functions
        .iter()
        .filter(|function| is_candidate(function))
        .map(|function| (function.name.clone(), function.clone()))
        .collect();

    if candidates.is_empty() {
        return unit;
    }

    let CompilationUnit { globals, functions } = unit;
    let functions = functions
        .into_iter()
        .map(|function| inline_into(names, &candidates, function))
        .collect();

    CompilationUnit { globals, functions }
}

fn is_candidate(function: &Function) -> bool {
    function.body.len() <= INLINE_LIMIT
        && !function.body.iter().any(|statement| matches!(
            statement,
            Statement::Call { function: callee, .. }
                if matches!(callee.as_ref(), Expression::Name(name) if *name == function.name)
        ))
}

fn inline_into(
    names: &mut ResourceAllocator,
    candidates: &HashMap<String, Function>,
    function: Function,
) -> Function {
    let mut growth = 0;
    let mut inlined = 0;
    let mut body = Vec::with_capacity(function.body.len());

    for statement in function.body.iter() {
        let Statement::Call {
            function: callee,
            args,
            collector,
        } = statement
        else {
            body.push(statement.clone());
            continue;
        };

        let callee = match callee.as_ref() {
            Expression::Name(name) if *name != function.name => candidates.get(name),
            _ => None,
        };

        let callee = match callee {
            Some(callee)
                if callee.params.len() == args.len()
                    && (collector.is_none() || callee.has_return)
                    && growth + callee.body.len() <= GROWTH_LIMIT =>
            {
                callee
            }
            _ => {
                body.push(statement.clone());
                continue;
            }
        };

        trace!("inlining '{}' into '{}'", callee.name, function.name);
        growth += callee.body.len();
        inlined += 1;
        body.extend(instantiate(names, callee, args, collector.as_deref()));
    }

    if inlined > 0 {
        debug!("inlined {inlined} calls into '{}'", function.name);
    }

    Function { body, ..function }
}

/// A renamed copy of `callee`'s body, computing its result into `collector`.
fn instantiate(
    names: &mut ResourceAllocator,
    callee: &Function,
    args: &[Expr],
    collector: Option<&str>,
) -> Vec<Statement> {
    let mut renaming = Renaming::default();
    let end = names.allocate_label(&format!("{}_INLINE_END", callee.name));

    let mut body = Vec::with_capacity(callee.body.len() + args.len() + 1);
    for (param, arg) in callee.params.iter().zip(args) {
        let param = renaming.temp(names, param);
        body.push(Statement::MoveTemp(param, arg.clone()));
    }

    for statement in callee.body.iter() {
        match statement {
            Statement::Return(value) => {
                if let Some(value) = value {
                    let value = renaming.expr(names, value);
                    // a result nobody collects may still trap
                    let target = match collector {
                        Some(collector) => collector.to_string(),
                        None => names.allocate_temp(),
                    };
                    body.push(Statement::MoveTemp(target, value));
                }
                body.push(Statement::Jump(end.clone()));
            }
            statement => body.push(renaming.statement(names, statement)),
        }
    }

    body.push(Statement::Label(end));
    body
}

#[derive(Debug, Default)]
struct Renaming {
    temps: HashMap<String, String>,
    labels: HashMap<String, String>,
}

impl Renaming {
    fn temp(&mut self, names: &mut ResourceAllocator, temp: &str) -> String {
        self.temps
            .entry(temp.into())
            .or_insert_with(|| names.allocate_temp())
            .clone()
    }

    fn label(&mut self, names: &mut ResourceAllocator, label: &str) -> String {
        self.labels
            .entry(label.into())
            .or_insert_with(|| names.allocate_label("INLINED"))
            .clone()
    }

    fn expr(&mut self, names: &mut ResourceAllocator, expr: &Expr) -> Expr {
        match expr.as_ref() {
            Expression::Const(_) | Expression::Name(_) => expr.clone(),
            Expression::Temp(temp) => Expression::temp(self.temp(names, temp)),
            Expression::Mem(address) => Expression::mem(self.expr(names, address)),
            Expression::Op(op, e1, e2) => {
                let e1 = self.expr(names, e1);
                let e2 = self.expr(names, e2);
                Expression::op(*op, e1, e2)
            }
        }
    }

    fn statement(&mut self, names: &mut ResourceAllocator, statement: &Statement) -> Statement {
        let statement = statement.map_expressions(|expr| self.expr(names, expr));
        match statement {
            Statement::MoveTemp(temp, source) => Statement::MoveTemp(self.temp(names, &temp), source),
            Statement::Call {
                function,
                args,
                collector,
            } => Statement::Call {
                function,
                args,
                collector: collector.map(|collector| self.temp(names, &collector)),
            },
            Statement::Jump(label) => Statement::Jump(self.label(names, &label)),
            Statement::Label(label) => Statement::Label(self.label(names, &label)),
            Statement::CJumpFallThrough(condition, label) => {
                Statement::CJumpFallThrough(condition, self.label(names, &label))
            }
            Statement::CJump {
                condition,
                on_true,
                on_false,
            } => Statement::CJump {
                condition,
                on_true: self.label(names, &on_true),
                on_false: self.label(names, &on_false),
            },
            statement @ (Statement::MoveMem { .. } | Statement::Return(_)) => statement,
        }
    }
}
