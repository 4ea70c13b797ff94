pub trait Driver {
    /// Output the IR for the given stage. The IR string is taken as a function,
    /// since generating it would usually be wasteful.
    fn output_ir(&mut self, at: IrOutput, data: impl FnOnce() -> String);

    /// The name of the function every reachable name is traced from.
    fn entry_name(&mut self) -> Option<String> {
        None
    }

    fn opt_level(&mut self) -> OptLevel {
        OptLevel::Full
    }

    /// Whether the emitted assembly should keep its explanatory comments.
    fn keep_comments(&mut self) -> bool {
        false
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum OptLevel {
    /// Only canonicalize; run no optimization passes.
    None,
    /// One round of every pass.
    Basic,
    /// Repeat the passes until the program stops changing.
    Full,
}

impl OptLevel {
    pub fn rounds(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Basic => 1,
            Self::Full => 5,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum IrOutput {
    Ir(&'static str),
    Asm(&'static str),
}
