use logos::Logos;

#[derive(Logos, Clone, Copy, Debug, Eq, PartialEq)]
pub enum Token<'src> {
    #[token("const")]
    Const,

    #[token("function")]
    Function,

    #[token("int")]
    Int,

    #[token("goto")]
    Goto,

    #[token("call")]
    Call,

    #[token("return")]
    Return,

    #[token("if")]
    If,

    #[token("else")]
    Else,

    #[token("mem")]
    Mem,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token(",")]
    Comma,

    #[token(";")]
    Semicolon,

    #[token(":")]
    Colon,

    #[token("->")]
    MinArrow,

    #[token("=")]
    Equal,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("%")]
    Percent,

    #[token("^")]
    Caret,

    #[token("<")]
    Less,

    #[token("<=")]
    LessEqual,

    #[token(">")]
    Greater,

    #[token(">=")]
    GreaterEqual,

    #[token("==")]
    EqualEqual,

    #[token("!=")]
    NotEqual,

    #[regex(r"@[a-zA-Z_][a-zA-Z0-9_]*", |lex| &lex.slice()[1..])]
    Global(&'src str),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Name(&'src str),

    #[regex(r"[0-9]+")]
    Number(&'src str),

    /// A string literal, without the quotes and with its escapes still in.
    #[regex(r#""([^"\\\n]|\\[^\n])*""#, |lex| { let slice = lex.slice(); &slice[1..slice.len() - 1] })]
    String(&'src str),

    #[error]
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    #[regex(r"//[^\n\r]*", logos::skip)]
    Error,
}
