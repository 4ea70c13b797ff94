pub mod available;
pub mod block;
pub mod cleanup;
pub mod constant;
pub mod cse;
pub mod flow;
pub mod inline;
pub mod interpret;
pub mod licm;
pub mod schedule;
pub mod simplify;
pub mod tailrec;
pub mod unused;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

use log::{debug, info, trace, warn};

use trellis_common::ir::pretty::Prettier;
use trellis_common::ir::{CompilationUnit, Function};
use trellis_common::names::{ResourceAllocator, DEFAULT_ENTRY};
use trellis_common::{Driver, IrOutput, OptLevel};

pub use block::BlockError;

/// Canonicalize and optimize a compilation unit. The result has every
/// function body scheduled, so it contains no two-target conditional jumps.
pub fn optimize(
    driver: &mut impl Driver,
    names: &mut ResourceAllocator,
    unit: CompilationUnit,
) -> Result<CompilationUnit, BlockError> {
    info!("beginning optimization");

    let level = driver.opt_level();
    let entry = driver.entry_name().unwrap_or_else(|| DEFAULT_ENTRY.into());

    driver.output_ir(IrOutput::Ir("input"), || {
        let prettier = Prettier::new();
        prettier.pretty_unit(&unit)
    });

    let unit = if level == OptLevel::None {
        debug!("skipped whole program optimizations");
        unit
    } else {
        let has_entry = unit.function(&entry).is_some();
        let unit = if has_entry {
            unused::remove_unused_names(unit, &entry)
        } else {
            warn!("no entry function '{entry}', keeping every name");
            unit
        };

        let CompilationUnit { globals, functions } = unit;
        let functions = functions
            .into_iter()
            .map(|function| tailrec::eliminate_tail_recursion(names, function))
            .collect();
        let unit = CompilationUnit { globals, functions };

        if level == OptLevel::Full {
            let unit = inline::inline_functions(names, unit);
            if has_entry {
                unused::remove_unused_names(unit, &entry)
            } else {
                unit
            }
        } else {
            unit
        }
    };

    driver.output_ir(IrOutput::Ir("tail recursion"), || {
        let prettier = Prettier::new();
        prettier.pretty_unit(&unit)
    });

    let CompilationUnit { globals, functions } = unit;
    let functions = functions
        .into_iter()
        .map(|function| {
            let body = schedule::schedule(names, &function.name, &function.body)?;
            Ok(Function { body, ..function })
        })
        .collect::<Result<Vec<_>, BlockError>>()?;
    let unit = CompilationUnit { globals, functions };

    trace!("scheduled every function");
    driver.output_ir(IrOutput::Ir("scheduling"), || {
        let prettier = Prettier::new();
        prettier.pretty_unit(&unit)
    });

    if level == OptLevel::None {
        info!("done optimizing");
        return Ok(unit);
    }

    let CompilationUnit { globals, functions } = unit;
    let functions = functions
        .into_iter()
        .map(|function| optimize_function(names, level, function))
        .collect();
    let unit = CompilationUnit { globals, functions };

    driver.output_ir(IrOutput::Ir("optimization"), || {
        let prettier = Prettier::new();
        prettier.pretty_unit(&unit)
    });

    info!("done optimizing");
    Ok(unit)
}

/// Run the local passes on a scheduled function until it stops changing or
/// the rounds for this level run out.
fn optimize_function(names: &mut ResourceAllocator, level: OptLevel, function: Function) -> Function {
    let mut body = cleanup::cleanup(function.body);

    for round in 0..level.rounds() {
        let next = simplify::simplify_statements(&body);
        let next = constant::propagate_constants(&next);
        let next = cse::eliminate_common_subexpressions(names, &next);
        let next = if level == OptLevel::Full {
            licm::hoist_loop_invariants(names, &next)
        } else {
            next
        };
        let next = cleanup::cleanup(next);

        if next == body {
            trace!("'{}' stable after {round} rounds", function.name);
            break;
        }

        body = next;
    }

    Function { body, ..function }
}
