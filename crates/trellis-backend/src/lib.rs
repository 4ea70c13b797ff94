pub mod alloc;
pub mod cleanup;
pub mod flow;
pub mod tile;
pub mod toplevel;


use log::{debug, info, warn};

use trellis_common::asm::{AssemblyProgram, Instruction};
use trellis_common::ir::CompilationUnit;
use trellis_common::names::{ResourceAllocator, DEFAULT_ENTRY};
use trellis_common::{Driver, IrOutput};

fn listing(instructions: &[Instruction]) -> String {
    let mut result = String::new();
    for instruction in instructions {
        match instruction {
            Instruction::Label(_) => result.push_str(&format!("{instruction}\n")),
            _ => result.push_str(&format!("    {instruction}\n")),
        }
    }
    result
}

/// Compile a scheduled compilation unit into an assembly program.
pub fn compile(
    driver: &mut impl Driver,
    names: &mut ResourceAllocator,
    unit: &CompilationUnit,
) -> AssemblyProgram {
    info!("beginning code generation");

    let keep_comments = driver.keep_comments();
    let entry = driver.entry_name().unwrap_or_else(|| DEFAULT_ENTRY.into());

    let tiled: Vec<_> = unit
        .functions
        .iter()
        .map(|function| (function, tile::tile_function(names, function)))
        .collect();

    driver.output_ir(IrOutput::Asm("tiling"), || {
        tiled
            .iter()
            .map(|(function, instructions)| format!("{}:\n{}", function.name, listing(instructions)))
            .collect::<Vec<_>>()
            .join("\n")
    });

    let mut instructions = Vec::new();
    for (function, body) in tiled {
        let allocation = alloc::allocate(names, body, function.has_return);
        debug!("'{}' uses {} stack slots", function.name, allocation.slots);

        let body = cleanup::cleanup(allocation.instructions, keep_comments);
        instructions.extend(toplevel::emit_function(&function.name, body, allocation.slots));
    }

    if unit.function(&entry).is_none() {
        warn!("no entry function '{entry}' to export");
    }

    let program = AssemblyProgram {
        exported: vec![entry],
        globals: unit.globals.clone(),
        instructions,
    };

    driver.output_ir(IrOutput::Asm("final"), || program.to_string());

    info!("done generating code");
    program
}
