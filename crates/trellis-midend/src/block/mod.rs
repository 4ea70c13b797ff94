#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::error::Error;
use std::fmt::{self, Display};

use log::trace;

use trellis_common::ir::Statement;
use trellis_common::names::ResourceAllocator;

/// A straight run of statements entered only at the top. Its statements are
/// exactly the ones from the input, so a block that did not start with a label
/// in the input has a synthesized `label` that none of its statements declare.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BasicBlock {
    pub label: String,
    pub statements: Vec<Statement>,
    /// Indices of the blocks control may continue to. For conditional jumps
    /// the false target comes first.
    pub successors: Vec<usize>,
}

impl BasicBlock {
    /// Does this block declare its own label?
    pub fn has_label(&self) -> bool {
        matches!(self.statements.first(), Some(Statement::Label(label)) if *label == self.label)
    }

    /// The number of statements, used as the weight of a trace.
    pub fn size(&self) -> usize {
        self.statements.len()
    }

    pub fn last(&self) -> Option<&Statement> {
        self.statements.last()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BlockError {
    MissingTerminator { function: String },
    DanglingLabel { function: String, label: String },
    DuplicateLabel { function: String, label: String },
}

impl Error for BlockError {}
impl Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTerminator { function } => write!(
                f,
                "the body of '{function}' ends without a jump or a return"
            ),
            Self::DanglingLabel { function, label } => {
                write!(f, "'{function}' jumps to the undeclared label '{label}'")
            }
            Self::DuplicateLabel { function, label } => {
                write!(f, "'{function}' declares the label '{label}' more than once")
            }
        }
    }
}

/// Partition a function body into basic blocks. A block ends at a jump, a
/// conditional jump or a return, and a label always starts a new block; a block
/// cut short by a label falls through to it.
pub fn build_blocks(
    names: &mut ResourceAllocator,
    function: &str,
    statements: &[Statement],
) -> Result<Vec<BasicBlock>, BlockError> {
    let mut builder = Builder::new(names, function);
    for statement in statements {
        builder.add(statement)?;
    }

    builder.finish()
}

struct Builder<'a> {
    names: &'a mut ResourceAllocator,
    function: &'a str,

    blocks: Vec<BasicBlock>,
    current: Option<BasicBlock>,
    labels: HashMap<String, usize>,
}

impl<'a> Builder<'a> {
    pub fn new(names: &'a mut ResourceAllocator, function: &'a str) -> Self {
        Self {
            names,
            function,
            blocks: Vec::new(),
            current: None,
            labels: HashMap::new(),
        }
    }

    pub fn add(&mut self, statement: &Statement) -> Result<(), BlockError> {
        if let Statement::Label(label) = statement {
            // whatever came before falls through into this label
            self.close();
            self.start(label.clone())?;
        } else if self.current.is_none() {
            let label = self.names.allocate_label(self.function);
            self.start(label)?;
        }

        let current = self
            .current
            .as_mut()
            .expect("a block is started before a statement is added");
        current.statements.push(statement.clone());

        if statement.is_terminator() || matches!(statement, Statement::CJumpFallThrough(..)) {
            self.close();
        }

        Ok(())
    }

    pub fn finish(mut self) -> Result<Vec<BasicBlock>, BlockError> {
        self.close();

        match self.blocks.last().and_then(BasicBlock::last) {
            None => {}
            Some(last) if last.is_terminator() => {}
            Some(_) => {
                return Err(BlockError::MissingTerminator {
                    function: self.function.into(),
                })
            }
        }

        let count = self.blocks.len();
        for id in 0..count {
            let successors = self.successors_of(id)?;
            self.blocks[id].successors = successors;
        }

        trace!("'{}' has {count} blocks", self.function);
        Ok(self.blocks)
    }

    fn start(&mut self, label: String) -> Result<(), BlockError> {
        let id = self.blocks.len();
        if self.labels.insert(label.clone(), id).is_some() {
            return Err(BlockError::DuplicateLabel {
                function: self.function.into(),
                label,
            });
        }

        self.current = Some(BasicBlock {
            label,
            statements: Vec::new(),
            successors: Vec::new(),
        });

        Ok(())
    }

    fn close(&mut self) {
        if let Some(block) = self.current.take() {
            self.blocks.push(block);
        }
    }

    fn successors_of(&self, id: usize) -> Result<Vec<usize>, BlockError> {
        let block = &self.blocks[id];
        let next = id + 1;

        match block.last() {
            Some(Statement::Jump(label)) => Ok(vec![self.resolve(label)?]),
            Some(Statement::CJump {
                on_true, on_false, ..
            }) => Ok(vec![self.resolve(on_false)?, self.resolve(on_true)?]),
            Some(Statement::Return(_)) => Ok(vec![]),
            Some(Statement::CJumpFallThrough(_, label)) => Ok(vec![next, self.resolve(label)?]),
            _ => Ok(vec![next]),
        }
    }

    fn resolve(&self, label: &str) -> Result<usize, BlockError> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| BlockError::DanglingLabel {
                function: self.function.into(),
                label: label.into(),
            })
    }
}
