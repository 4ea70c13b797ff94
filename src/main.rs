mod args;
mod console_driver;
mod input;
mod message;
mod read;


use anyhow::bail;
use clap::Parser;
use codespan_reporting::files::SimpleFiles;
use log::info;

use trellis_common::ir::CompilationUnit;
use trellis_common::names::{ResourceAllocator, DEFAULT_ENTRY};
use trellis_common::Driver;
use trellis_midend::block::build_blocks;
use trellis_midend::interpret::interpret;

use args::Arguments;
use console_driver::ConsoleDriver;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Arguments::parse();
    let options = args.options();

    let src = input::read_file(&options.path)?;
    let mut files = SimpleFiles::new();
    let file = files.add(options.path.display().to_string(), src.clone());

    let mut driver = ConsoleDriver::new(files, options);

    let (unit, messages) = read::read(&src, file);
    let errors = driver.report(messages)?;
    if errors > 0 {
        bail!("could not read '{}' due to {errors} previous errors", options.path.display());
    }

    let mut names = ResourceAllocator::with_globals(&unit.globals);

    if args.command.run() {
        let entry = driver.entry_name().unwrap_or_else(|| DEFAULT_ENTRY.into());
        let unit = trellis_midend::optimize(&mut driver, &mut names, unit)?;
        let outcome = interpret(&unit, &entry)?;

        print!("{}", outcome.output);
        if let Some(value) = outcome.value {
            info!("'{entry}' returned {value}");
        }
    } else if args.command.build() {
        let unit = trellis_midend::optimize(&mut driver, &mut names, unit)?;
        let program = trellis_backend::compile(&mut driver, &mut names, &unit);

        let output = options.output_path();
        input::write_file(&output, &program.to_string())?;
        info!("wrote assembly to '{}'", output.display());
    } else {
        check(&mut names, &unit)?;
    }

    Ok(())
}

/// Make sure every function can be split into basic blocks.
fn check(names: &mut ResourceAllocator, unit: &CompilationUnit) -> anyhow::Result<()> {
    for function in unit.functions.iter() {
        build_blocks(names, &function.name, &function.body)?;
    }

    info!("{} functions are well formed", unit.functions.len());
    Ok(())
}
