use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use trellis_common::OptLevel;

/// an optimizing compiler back end for a small tree IR.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
#[command(propagate_version = true)]
pub struct Arguments {
    #[command(subcommand)]
    pub command: Command,
}

impl Arguments {
    pub fn options(&self) -> &Options {
        self.command.options()
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Optimize the program and run it in the IR interpreter.
    #[command(visible_alias = "r")]
    Run(Options),
    /// Compile the program to x86-64 assembly.
    #[command(visible_alias = "b")]
    Build(Options),
    /// Only read and validate the program.
    #[command(visible_alias = "c")]
    Check(Options),
}

impl Command {
    pub fn options(&self) -> &Options {
        match self {
            Self::Run(opts) => opts,
            Self::Build(opts) => opts,
            Self::Check(opts) => opts,
        }
    }

    pub fn run(&self) -> bool {
        matches!(self, Self::Run(_))
    }

    pub fn build(&self) -> bool {
        matches!(self, Self::Build(_))
    }
}

#[derive(Debug, Args)]
pub struct Options {
    /// How hard to optimize: 0 for not at all, 1 for one round of every
    /// pass, 2 for repeated rounds.
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub opt_level: u8,

    /// Keep explanatory comments in the assembly.
    #[arg(long, action = ArgAction::SetTrue)]
    pub keep_comments: bool,

    /// Print the program after every stage.
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_ir: bool,

    /// The function the program starts in.
    #[arg(long)]
    pub entry: Option<String>,

    /// Where to write the assembly. Defaults to the input with a `.s` extension.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[arg(required = true)]
    pub path: PathBuf,
}

impl Options {
    pub fn opt_level(&self) -> OptLevel {
        match self.opt_level {
            0 => OptLevel::None,
            1 => OptLevel::Basic,
            _ => OptLevel::Full,
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.path.with_extension("s"))
    }
}
