mod read;
mod source;

pub use source::{File, Span};

use codespan_reporting::diagnostic::Diagnostic;

#[derive(Debug, Default)]
pub struct Messages {
    pub msgs: Vec<Diagnostic<usize>>,
}

impl Messages {
    pub fn new() -> Self {
        Self { msgs: Vec::new() }
    }

    #[must_use]
    pub fn at(&mut self, span: Span) -> MessageAdder {
        MessageAdder {
            msgs: self,
            at: span,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.msgs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.msgs.len()
    }

    /// The stable codes of every message, in order.
    pub fn codes(&self) -> Vec<&str> {
        self.msgs
            .iter()
            .filter_map(|msg| msg.code.as_deref())
            .collect()
    }
}

#[derive(Debug)]
pub struct MessageAdder<'a> {
    msgs: &'a mut Messages,
    at: Span,
}

impl<'a> MessageAdder<'a> {
    fn add(&mut self, diag: Diagnostic<usize>) {
        self.msgs.msgs.push(diag);
    }
}
