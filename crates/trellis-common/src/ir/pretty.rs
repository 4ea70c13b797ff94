use std::fmt;

use pretty::{Arena, DocAllocator, DocBuilder};

use super::{CompilationUnit, Expression, Function, GlobalVariable, Statement};

pub struct Prettier<'a> {
    allocator: Arena<'a>,
    width: usize,
}

impl<'a> Prettier<'a> {
    pub fn new() -> Self {
        Self {
            allocator: Arena::new(),
            width: 80,
        }
    }

    pub fn with_width(self, width: usize) -> Self {
        Self { width, ..self }
    }

    #[must_use]
    pub fn pretty_unit(&'a self, unit: &CompilationUnit) -> String {
        let doc = self.doc_unit(unit);
        let mut res = Vec::new();
        doc.render(self.width, &mut res).unwrap();
        String::from_utf8(res).unwrap()
    }

    #[must_use]
    pub fn pretty_function(&'a self, function: &Function) -> String {
        let doc = self.doc_function(function);
        let mut res = Vec::new();
        doc.render(self.width, &mut res).unwrap();
        String::from_utf8(res).unwrap()
    }

    fn doc_unit(&'a self, unit: &CompilationUnit) -> DocBuilder<Arena<'a>> {
        let globals = unit.globals.iter().map(|global| self.doc_global(global));
        let functions = unit
            .functions
            .iter()
            .map(|function| self.doc_function(function));

        self.allocator
            .intersperse(
                globals.chain(functions),
                self.allocator.hardline().append(self.allocator.hardline()),
            )
            .append(self.allocator.hardline())
    }

    fn doc_global(&'a self, global: &GlobalVariable) -> DocBuilder<Arena<'a>> {
        self.allocator.text(format!(
            "const {} = \"{}\";",
            global.name,
            escape(&global.content)
        ))
    }

    fn doc_function(&'a self, function: &Function) -> DocBuilder<Arena<'a>> {
        let params = self.allocator.intersperse(
            function
                .params
                .iter()
                .map(|param| self.allocator.text(param.clone())),
            self.allocator.text(", "),
        );

        let header = self
            .allocator
            .text("function ")
            .append(self.allocator.text(function.name.clone()))
            .append(params.parens())
            .append(if function.has_return {
                self.allocator.text(" -> int")
            } else {
                self.allocator.nil()
            })
            .append(self.allocator.text(" {"));

        let body = self.allocator.concat(function.body.iter().map(|stmt| {
            self.allocator
                .hardline()
                .append(self.allocator.text(stmt.to_string()))
        }));

        header
            .append(body.nest(2))
            .append(self.allocator.hardline())
            .append(self.allocator.text("}"))
    }
}

impl Default for Prettier<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Escape a string constant so that the reader gets the same content back.
pub fn escape(content: &str) -> String {
    let mut res = String::with_capacity(content.len());
    for c in content.chars() {
        match c {
            '"' => res.push_str("\\\""),
            '\\' => res.push_str("\\\\"),
            '\n' => res.push_str("\\n"),
            '\t' => res.push_str("\\t"),
            c => res.push(c),
        }
    }
    res
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(value) => write!(f, "{value}"),
            Self::Name(name) => write!(f, "@{name}"),
            Self::Temp(temp) => write!(f, "{temp}"),
            Self::Mem(address) => write!(f, "mem[{address}]"),
            Self::Op(op, e1, e2) => write!(f, "({e1} {} {e2})", op.symbol()),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MoveTemp(temp, source) => write!(f, "{temp} = {source};"),
            Self::MoveMem { address, source } => write!(f, "mem[{address}] = {source};"),
            Self::Jump(label) => write!(f, "goto {label};"),
            Self::Label(label) => write!(f, "{label}:"),
            Self::Call {
                function,
                args,
                collector,
            } => {
                if let Some(collector) = collector {
                    write!(f, "{collector} = ")?;
                }

                write!(f, "call {function}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ");")
            }
            Self::Return(Some(value)) => write!(f, "return {value};"),
            Self::Return(None) => write!(f, "return;"),
            Self::CJumpFallThrough(condition, label) => {
                write!(f, "if ({condition}) goto {label};")
            }
            Self::CJump {
                condition,
                on_true,
                on_false,
            } => write!(f, "if ({condition}) goto {on_true} else {on_false};"),
        }
    }
}
