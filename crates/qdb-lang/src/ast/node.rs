use std::{
    fmt::{self, Display, Formatter},
    rc::Rc,
};

use smol_str::SmolStr;

pub type Ident = SmolStr;

/// A sequence of statements executed in order, together with the line each
/// statement starts on. The lines are what `set_next_line` may jump to.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub lines: Rc<[usize]>,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        let lines = stmts.iter().map(|stmt| stmt.line).collect();
        Self { stmts, lines }
    }

    pub fn position(&self, line: usize) -> Option<usize> {
        self.lines.iter().position(|l| *l == line)
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Program {
    pub body: Block,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

impl Stmt {
    pub fn new(line: usize, kind: StmtKind) -> Self {
        Self { line, kind }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum StmtKind {
    Expr(Expr),
    Assign(Target, Expr),
    AugAssign(Target, BinaryOp, Expr),
    /// Each branch carries the line of its `if`/`elif` header.
    If(Vec<IfBranch>, Option<Block>),
    While(Expr, Block),
    For(Ident, Expr, Block),
    Def(Rc<FunctionDef>),
    Return(Option<Expr>),
    Pass,
    Break,
    Continue,
    Global(Vec<Ident>),
    Raise(Option<Expr>),
    Try(TryStmt),
}

#[derive(PartialEq, Debug, Clone)]
pub struct IfBranch {
    pub line: usize,
    pub cond: Expr,
    pub body: Block,
}

#[derive(PartialEq, Debug, Clone)]
pub struct TryStmt {
    pub body: Block,
    pub handlers: Vec<ExceptHandler>,
    pub finally: Option<Block>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ExceptHandler {
    pub line: usize,
    pub type_name: Option<Ident>,
    pub binding: Option<Ident>,
    pub body: Block,
}

impl ExceptHandler {
    /// `Exception` and a bare `except:` catch everything.
    pub fn matches(&self, type_name: &str) -> bool {
        match &self.type_name {
            None => true,
            Some(name) => name == "Exception" || name == type_name,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct FunctionDef {
    pub name: Ident,
    pub params: Vec<Ident>,
    pub body: Block,
    pub line: usize,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Target {
    Name(Ident),
    Index(Box<Expr>, Box<Expr>),
}

#[derive(PartialEq, Debug, Clone)]
pub enum Expr {
    Literal(Literal),
    Name(Ident),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(PartialEq, Debug, Clone)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let op = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
        };
        write!(f, "{}", op)
    }
}

impl Display for CompareOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let op = match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
        };
        write!(f, "{}", op)
    }
}
