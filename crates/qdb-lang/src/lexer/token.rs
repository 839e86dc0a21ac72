use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

#[derive(PartialEq, Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column number.
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, line: usize, column: usize) -> Self {
        Self { kind, line, column }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum TokenKind {
    And,
    As,
    Assign,
    Break,
    Colon,
    Comma,
    Continue,
    Dedent,
    Def,
    Elif,
    Else,
    Eof,
    EqEq,
    Except,
    False,
    Finally,
    Float(f64),
    For,
    Global,
    Gt,
    Gte,
    Ident(SmolStr),
    If,
    In,
    Indent,
    Int(i64),
    LBrace,
    LBracket,
    LParen,
    Lt,
    Lte,
    Minus,
    MinusAssign,
    NeEq,
    NewLine,
    None,
    Not,
    Or,
    Pass,
    Percent,
    Plus,
    PlusAssign,
    RBrace,
    RBracket,
    RParen,
    Raise,
    Return,
    Slash,
    SlashAssign,
    SlashSlash,
    Star,
    StarAssign,
    StarStar,
    Str(String),
    True,
    Try,
    While,
}

impl TokenKind {
    pub(crate) fn keyword(ident: &str) -> Option<Self> {
        let kind = match ident {
            "and" => TokenKind::And,
            "as" => TokenKind::As,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "def" => TokenKind::Def,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "except" => TokenKind::Except,
            "False" => TokenKind::False,
            "finally" => TokenKind::Finally,
            "for" => TokenKind::For,
            "global" => TokenKind::Global,
            "if" => TokenKind::If,
            "in" => TokenKind::In,
            "None" => TokenKind::None,
            "not" => TokenKind::Not,
            "or" => TokenKind::Or,
            "pass" => TokenKind::Pass,
            "raise" => TokenKind::Raise,
            "return" => TokenKind::Return,
            "True" => TokenKind::True,
            "try" => TokenKind::Try,
            "while" => TokenKind::While,
            _ => return None,
        };

        Some(kind)
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            TokenKind::And => write!(f, "and"),
            TokenKind::As => write!(f, "as"),
            TokenKind::Assign => write!(f, "="),
            TokenKind::Break => write!(f, "break"),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Continue => write!(f, "continue"),
            TokenKind::Dedent => write!(f, "<dedent>"),
            TokenKind::Def => write!(f, "def"),
            TokenKind::Elif => write!(f, "elif"),
            TokenKind::Else => write!(f, "else"),
            TokenKind::Eof => write!(f, "<EOF>"),
            TokenKind::EqEq => write!(f, "=="),
            TokenKind::Except => write!(f, "except"),
            TokenKind::False => write!(f, "False"),
            TokenKind::Finally => write!(f, "finally"),
            TokenKind::Float(n) => write!(f, "{}", n),
            TokenKind::For => write!(f, "for"),
            TokenKind::Global => write!(f, "global"),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::Gte => write!(f, ">="),
            TokenKind::Ident(ident) => write!(f, "{}", ident),
            TokenKind::If => write!(f, "if"),
            TokenKind::In => write!(f, "in"),
            TokenKind::Indent => write!(f, "<indent>"),
            TokenKind::Int(n) => write!(f, "{}", n),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::LParen => write!(f, "("),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::Lte => write!(f, "<="),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::MinusAssign => write!(f, "-="),
            TokenKind::NeEq => write!(f, "!="),
            TokenKind::NewLine => write!(f, "<newline>"),
            TokenKind::None => write!(f, "None"),
            TokenKind::Not => write!(f, "not"),
            TokenKind::Or => write!(f, "or"),
            TokenKind::Pass => write!(f, "pass"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::PlusAssign => write!(f, "+="),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::Raise => write!(f, "raise"),
            TokenKind::Return => write!(f, "return"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::SlashAssign => write!(f, "/="),
            TokenKind::SlashSlash => write!(f, "//"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::StarAssign => write!(f, "*="),
            TokenKind::StarStar => write!(f, "**"),
            TokenKind::Str(s) => write!(f, "{:?}", s),
            TokenKind::True => write!(f, "True"),
            TokenKind::Try => write!(f, "try"),
            TokenKind::While => write!(f, "while"),
        }
    }
}
