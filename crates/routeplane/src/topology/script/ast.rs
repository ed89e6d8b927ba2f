//! Syntax tree

/// Source position, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub stmts: Vec<Stmt>,
}

impl Script {
    /// Top-level `route` blocks.
    pub fn route_blocks(&self) -> usize {
        self.stmts
            .iter()
            .filter(|s| matches!(s, Stmt::Route { .. }))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let { name: String, value: Expr, pos: Pos },
    Route { body: Vec<Stmt>, pos: Pos },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Symbol(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Map(Vec<(String, Expr)>),
    List(Vec<Expr>),
    /// Bare name, with arguments when written as a call
    Call {
        name: String,
        args: Option<Vec<Arg>>,
        pos: Pos,
    },
    /// `receiver.name(args)`
    Method {
        receiver: Box<Expr>,
        name: String,
        args: Option<Vec<Arg>>,
        pos: Pos,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Positional(Expr),
    Named(String, Expr),
}
