//! Reading the textual form of the tree IR, as printed by the pretty printer.

mod token;


use std::collections::HashMap;

use log::{info, trace};
use logos::Logos;

use trellis_common::ir::{CompilationUnit, Expr, Expression, Function, GlobalVariable, Operator, Statement};
use trellis_common::names::ResourceAllocator;

use crate::message::{File, Messages, Span};
use token::Token;

pub fn read(src: &str, file: File) -> (CompilationUnit, Messages) {
    info!("reading file with id {file}");

    let mut msgs = Messages::new();
    let tokens: Vec<_> = Token::lexer(src)
        .spanned()
        .filter_map(|(token, range)| {
            let span = Span::new(file, range.start, range.end);
            if token == Token::Error {
                msgs.at(span).read_invalid_token();
                None
            } else {
                Some((token, span))
            }
        })
        .collect();

    let mut reader = Reader::new(tokens, Span::new(file, src.len(), src.len()));
    reader.msgs = msgs;
    let unit = reader.read_unit();

    trace!("done reading {file}");
    (unit, reader.msgs)
}

fn is_reserved(name: &str) -> bool {
    name.starts_with('_')
}

fn operator(token: &Token) -> Option<Operator> {
    Some(match token {
        Token::Plus => Operator::Add,
        Token::Minus => Operator::Sub,
        Token::Star => Operator::Mul,
        Token::Slash => Operator::Div,
        Token::Percent => Operator::Mod,
        Token::Caret => Operator::Xor,
        Token::Less => Operator::Lt,
        Token::LessEqual => Operator::Le,
        Token::Greater => Operator::Gt,
        Token::GreaterEqual => Operator::Ge,
        Token::EqualEqual => Operator::Eq,
        Token::NotEqual => Operator::Ne,
        _ => return None,
    })
}

/// The labels of one function: where each is declared and every jump to it.
#[derive(Debug, Default)]
struct Labels {
    declared: HashMap<String, Span>,
    used: Vec<(String, Span)>,
}

struct Reader<'src> {
    tokens: std::vec::IntoIter<(Token<'src>, Span)>,
    curr: Option<(Token<'src>, Span)>,
    prev: Option<(Token<'src>, Span)>,
    msgs: Messages,
    default_span: Span,

    /// Globals for the string literals inside function bodies.
    strings: ResourceAllocator,

    /// Every label in the unit. They end up in one assembly file, so they
    /// must be unique across functions too.
    all_labels: HashMap<String, Span>,
}

impl<'src> Reader<'src> {
    fn new(tokens: Vec<(Token<'src>, Span)>, default_span: Span) -> Self {
        let mut reader = Self {
            tokens: tokens.into_iter(),
            curr: None,
            prev: None,
            msgs: Messages::new(),
            default_span,
            strings: ResourceAllocator::new(),
            all_labels: HashMap::new(),
        };

        reader.advance();
        reader
    }

    fn is_done(&self) -> bool {
        self.curr.is_none()
    }

    fn advance(&mut self) {
        self.prev = self.curr.take();
        self.curr = self.tokens.next();
    }

    fn span(&self) -> Span {
        self.curr
            .map(|(_, span)| span)
            .unwrap_or(self.default_span)
    }

    fn peek(&self, token: Token) -> bool {
        matches!(self.curr, Some((curr, _)) if curr == token)
    }

    fn consume(&mut self, token: Token) -> bool {
        if self.peek(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Option<Span> {
        if self.consume(token) {
            self.prev.map(|(_, span)| span)
        } else {
            self.msgs.at(self.span()).read_expected(what);
            None
        }
    }

    fn name(&mut self, what: &str) -> Option<(&'src str, Span)> {
        match self.curr {
            Some((Token::Name(name), span)) => {
                self.advance();
                Some((name, span))
            }
            _ => {
                self.msgs.at(self.span()).read_expected(what);
                None
            }
        }
    }

    /// A name that may not start with an underscore.
    fn user_name(&mut self, what: &str) -> Option<(&'src str, Span)> {
        let (name, span) = self.name(what)?;
        if is_reserved(name) {
            self.msgs.at(span).read_reserved_name(name);
        }
        Some((name, span))
    }

    /// Skip to the next top level item.
    fn skip_to_item(&mut self) {
        while !self.is_done() && !self.peek(Token::Const) && !self.peek(Token::Function) {
            self.advance();
        }
    }

    /// Skip past the end of the current statement.
    fn skip_statement(&mut self) {
        while let Some((token, _)) = self.curr {
            match token {
                Token::Semicolon => {
                    self.advance();
                    return;
                }
                Token::RBrace | Token::Const | Token::Function => return,
                _ => self.advance(),
            }
        }
    }

    fn read_unit(&mut self) -> CompilationUnit {
        let mut globals: Vec<GlobalVariable> = Vec::new();
        let mut functions: Vec<Function> = Vec::new();
        let mut global_names: HashMap<String, Span> = HashMap::new();
        let mut function_names: HashMap<String, Span> = HashMap::new();

        while !self.is_done() {
            if self.consume(Token::Const) {
                if let Some((global, span)) = self.read_global() {
                    if global_names.insert(global.name.clone(), span).is_some() {
                        self.msgs.at(span).read_duplicate("constant", &global.name);
                    }
                    globals.push(global);
                } else {
                    self.skip_to_item();
                }
            } else if self.consume(Token::Function) {
                if let Some((function, span)) = self.read_function() {
                    if function_names.insert(function.name.clone(), span).is_some() {
                        self.msgs.at(span).read_duplicate("function", &function.name);
                    }
                    functions.push(function);
                } else {
                    self.skip_to_item();
                }
            } else {
                self.msgs.at(self.span()).read_expected("a constant or a function");
                self.advance();
                self.skip_to_item();
            }
        }

        let mut literals = self.strings.globals();
        literals.sort_by(|a, b| a.name.cmp(&b.name));
        globals.extend(literals);

        CompilationUnit { globals, functions }
    }

    fn read_global(&mut self) -> Option<(GlobalVariable, Span)> {
        let (name, span) = self.user_name("the name of the constant")?;
        self.expect(Token::Equal, "'='")?;

        let content = match self.curr {
            Some((Token::String(literal), literal_span)) => {
                self.advance();
                self.unescape(literal, literal_span)
            }
            _ => {
                self.msgs.at(self.span()).read_expected("a string");
                return None;
            }
        };

        self.expect(Token::Semicolon, "';'")?;
        Some((
            GlobalVariable {
                name: name.into(),
                content,
            },
            span,
        ))
    }

    fn unescape(&mut self, literal: &str, span: Span) -> String {
        let mut content = String::with_capacity(literal.len());
        let mut chars = literal.chars();

        while let Some(c) = chars.next() {
            if c != '\\' {
                content.push(c);
                continue;
            }

            match chars.next() {
                Some('\\') => content.push('\\'),
                Some('"') => content.push('"'),
                Some('n') => content.push('\n'),
                Some('t') => content.push('\t'),
                _ => self.msgs.at(span).read_bad_escape(),
            }
        }

        content
    }

    fn read_function(&mut self) -> Option<(Function, Span)> {
        let (name, span) = self.name("the name of the function")?;
        self.expect(Token::LParen, "'('")?;

        let mut params: Vec<String> = Vec::new();
        if !self.peek(Token::RParen) {
            loop {
                let (param, param_span) = self.user_name("a parameter")?;
                if params.iter().any(|other| other == param) {
                    self.msgs.at(param_span).read_duplicate("parameter", param);
                }
                params.push(param.into());

                if !self.consume(Token::Comma) {
                    break;
                }
            }
        }

        self.expect(Token::RParen, "')'")?;

        let has_return = if self.consume(Token::MinArrow) {
            self.expect(Token::Int, "'int'")?;
            true
        } else {
            false
        };

        self.expect(Token::LBrace, "'{'")?;

        let mut labels = Labels::default();
        let mut body = Vec::new();
        while !self.is_done()
            && !self.peek(Token::RBrace)
            && !self.peek(Token::Function)
            && !self.peek(Token::Const)
        {
            match self.read_statement(&mut labels) {
                Some(statement) => body.push(statement),
                None => self.skip_statement(),
            }
        }

        self.expect(Token::RBrace, "'}'");

        for (label, at) in labels.used {
            if !labels.declared.contains_key(&label) {
                self.msgs.at(at).read_undefined_label(&label);
            }
        }

        trace!("read function '{name}' with {} statements", body.len());
        Some((
            Function {
                name: name.into(),
                params,
                has_return,
                body,
            },
            span,
        ))
    }

    fn read_statement(&mut self, labels: &mut Labels) -> Option<Statement> {
        let Some((token, span)) = self.curr else {
            self.msgs.at(self.span()).read_expected("a statement");
            return None;
        };

        match token {
            Token::Name(_) => {
                let (name, span) = self.user_name("a name")?;

                if self.consume(Token::Colon) {
                    if labels.declared.insert(name.into(), span).is_some()
                        || self.all_labels.insert(name.into(), span).is_some()
                    {
                        self.msgs.at(span).read_duplicate("label", name);
                    }
                    return Some(Statement::label(name));
                }

                self.expect(Token::Equal, "':' or '='")?;

                if self.consume(Token::Call) {
                    return self.read_call(Some(name.into()));
                }

                let source = self.read_expr()?;
                self.expect(Token::Semicolon, "';'")?;
                Some(Statement::move_temp(name, source))
            }

            Token::Mem => {
                self.advance();
                self.expect(Token::LBracket, "'['")?;
                let address = self.read_expr()?;
                self.expect(Token::RBracket, "']'")?;
                self.expect(Token::Equal, "'='")?;
                let source = self.read_expr()?;
                self.expect(Token::Semicolon, "';'")?;
                Some(Statement::MoveMem { address, source })
            }

            Token::Goto => {
                self.advance();
                let label = self.read_target(labels)?;
                self.expect(Token::Semicolon, "';'")?;
                Some(Statement::Jump(label))
            }

            Token::Call => {
                self.advance();
                self.read_call(None)
            }

            Token::Return => {
                self.advance();
                if self.consume(Token::Semicolon) {
                    return Some(Statement::Return(None));
                }

                let value = self.read_expr()?;
                self.expect(Token::Semicolon, "';'")?;
                Some(Statement::Return(Some(value)))
            }

            Token::If => {
                self.advance();
                self.expect(Token::LParen, "'('")?;
                let condition = self.read_expr()?;
                self.expect(Token::RParen, "')'")?;
                self.expect(Token::Goto, "'goto'")?;
                let on_true = self.read_target(labels)?;

                let statement = if self.consume(Token::Else) {
                    let on_false = self.read_target(labels)?;
                    Statement::CJump {
                        condition,
                        on_true,
                        on_false,
                    }
                } else {
                    Statement::CJumpFallThrough(condition, on_true)
                };

                self.expect(Token::Semicolon, "';'")?;
                Some(statement)
            }

            _ => {
                self.msgs.at(span).read_expected("a statement");
                None
            }
        }
    }

    fn read_target(&mut self, labels: &mut Labels) -> Option<String> {
        let (label, span) = self.user_name("a label")?;
        labels.used.push((label.into(), span));
        Some(label.into())
    }

    fn read_call(&mut self, collector: Option<String>) -> Option<Statement> {
        let function = self.read_expr()?;
        self.expect(Token::LParen, "'('")?;

        let mut args = Vec::new();
        if !self.peek(Token::RParen) {
            loop {
                args.push(self.read_expr()?);
                if !self.consume(Token::Comma) {
                    break;
                }
            }
        }

        self.expect(Token::RParen, "')'")?;
        self.expect(Token::Semicolon, "';'")?;

        Some(Statement::Call {
            function,
            args,
            collector,
        })
    }

    fn read_expr(&mut self) -> Option<Expr> {
        let Some((token, span)) = self.curr else {
            self.msgs.at(self.span()).read_expected("an expression");
            return None;
        };

        match token {
            Token::Number(digits) => {
                self.advance();
                self.number(digits, span)
            }

            Token::Minus => {
                self.advance();
                match self.curr {
                    Some((Token::Number(digits), number_span)) => {
                        self.advance();
                        self.number(&format!("-{digits}"), span + number_span)
                    }
                    _ => {
                        self.msgs.at(self.span()).read_expected("a number");
                        None
                    }
                }
            }

            Token::Global(name) => {
                self.advance();
                Some(Expression::name(name))
            }

            Token::String(literal) => {
                self.advance();
                let content = self.unescape(literal, span);
                let global = self.strings.allocate_string(&content);
                Some(Expression::name(global.name))
            }

            Token::Name(_) => {
                let (name, _) = self.user_name("a temporary")?;
                Some(Expression::temp(name))
            }

            Token::Mem => {
                self.advance();
                self.expect(Token::LBracket, "'['")?;
                let address = self.read_expr()?;
                self.expect(Token::RBracket, "']'")?;
                Some(Expression::mem(address))
            }

            Token::LParen => {
                self.advance();
                let e1 = self.read_expr()?;

                let op = match self.curr.and_then(|(token, _)| operator(&token)) {
                    Some(op) => op,
                    None => {
                        self.msgs.at(self.span()).read_expected("an operator");
                        return None;
                    }
                };
                self.advance();

                let e2 = self.read_expr()?;
                self.expect(Token::RParen, "')'")?;
                Some(Expression::op(op, e1, e2))
            }

            _ => {
                self.msgs.at(span).read_expected("an expression");
                None
            }
        }
    }

    fn number(&mut self, digits: &str, span: Span) -> Option<Expr> {
        match digits.parse::<i64>() {
            Ok(value) => Some(Expression::constant(value)),
            Err(_) => {
                self.msgs.at(span).read_number_out_of_range();
                None
            }
        }
    }
}
