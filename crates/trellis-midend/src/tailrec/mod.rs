//! Tail recursion to loops.
//!
//! A call of a function to itself is in tail position if nothing but labels,
//! jumps and copies of its result happen between it and a return of that
//! result, or a plain return in a function without a result. Such calls become
//! a reassignment of the parameters and a jump back to the top of the body, so
//! the recursion runs in constant stack space.

#[cfg(test)]
mod tests;

use std::collections::HashMap;

use log::debug;

use trellis_common::ir::{Expression, Function, Statement};
use trellis_common::names::ResourceAllocator;

pub fn eliminate_tail_recursion(names: &mut ResourceAllocator, function: Function) -> Function {
    let labels: HashMap<&str, usize> = function
        .body
        .iter()
        .enumerate()
        .filter_map(|(index, statement)| match statement {
            Statement::Label(label) => Some((label.as_str(), index)),
            _ => None,
        })
        .collect();

    let tail_calls: Vec<usize> = function
        .body
        .iter()
        .enumerate()
        .filter(|(index, statement)| is_tail_call(&function, &labels, *index, statement))
        .map(|(index, _)| index)
        .collect();

    if tail_calls.is_empty() {
        return function;
    }

    debug!(
        "'{}' has {} tail recursive calls",
        function.name,
        tail_calls.len()
    );

    let start = names.allocate_label(&format!("{}_TAIL_START", function.name));
    let mut body = Vec::with_capacity(function.body.len() + 1);
    body.push(Statement::Label(start.clone()));

    for (index, statement) in function.body.iter().enumerate() {
        let args = match statement {
            Statement::Call { args, .. } if tail_calls.contains(&index) => args,
            statement => {
                body.push(statement.clone());
                continue;
            }
        };

        // evaluate every argument before any parameter changes
        let fresh: Vec<String> = args
            .iter()
            .map(|arg| {
                let temp = names.allocate_temp();
                body.push(Statement::MoveTemp(temp.clone(), arg.clone()));
                temp
            })
            .collect();

        for (param, temp) in function.params.iter().zip(fresh) {
            body.push(Statement::MoveTemp(param.clone(), Expression::temp(temp)));
        }

        body.push(Statement::Jump(start.clone()));
    }

    Function { body, ..function }
}

fn is_tail_call(
    function: &Function,
    labels: &HashMap<&str, usize>,
    index: usize,
    statement: &Statement,
) -> bool {
    let (args, collector) = match statement {
        Statement::Call {
            function: target,
            args,
            collector,
        } if matches!(target.as_ref(), Expression::Name(name) if *name == function.name) => {
            (args, collector)
        }
        _ => return false,
    };

    if args.len() != function.params.len() {
        return false;
    }

    // the temporary currently holding the result of the call
    let mut result = collector.clone();
    let mut pc = index + 1;

    for _ in 0..=function.body.len() {
        match function.body.get(pc) {
            None => return !function.has_return,
            Some(Statement::Label(_)) => pc += 1,
            Some(Statement::Jump(label)) => match labels.get(label.as_str()) {
                Some(&target) => pc = target,
                None => return false,
            },

            Some(Statement::MoveTemp(dest, source)) => {
                let Expression::Temp(source) = source.as_ref() else {
                    return false;
                };

                if result.as_deref() == Some(source.as_str()) {
                    result = Some(dest.clone());
                } else if result.as_deref() == Some(dest.as_str()) {
                    result = None;
                }

                pc += 1;
            }

            Some(Statement::Return(None)) => return !function.has_return,
            Some(Statement::Return(Some(value))) => {
                return function.has_return
                    && matches!(&result, Some(result) if value.is_temp(result));
            }

            Some(_) => return false,
        }
    }

    // only jumps and copies forever
    false
}
