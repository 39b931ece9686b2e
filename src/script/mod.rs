//! Restricted command grammar
//!
//! Tool commands are a tiny subset of assignment statements: literal
//! bindings (`name = <literal | list | dict | simple expression>`) and a
//! single kind of call, `target = <handle>.execute(key=value, ...)`.
//! Anything else is rejected at parse time instead of being executed.

mod eval;
mod lexer;
mod parser;

pub use eval::Scope;
pub use parser::parse_script;

use serde_json::Value;

/// Deepest bracket or expression nesting a command may use
pub const MAX_NESTING: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Height of the expression tree
    pub fn depth(&self) -> usize {
        match self {
            Expr::Literal(_) | Expr::Name(_) => 1,
            Expr::List(items) => 1 + items.iter().map(Expr::depth).max().unwrap_or(0),
            Expr::Dict(entries) => {
                1 + entries
                    .iter()
                    .map(|(k, v)| k.depth().max(v.depth()))
                    .max()
                    .unwrap_or(0)
            }
            Expr::Unary(_, operand) => 1 + operand.depth(),
            Expr::Binary(_, left, right) | Expr::Index(left, right) => {
                1 + left.depth().max(right.depth())
            }
        }
    }
}

/// `target = object.execute(kwargs...)`
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub target: String,
    pub object: String,
    pub kwargs: Vec<(String, Expr)>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign {
        target: String,
        value: Expr,
        line: usize,
    },
    Invoke(Invocation),
}

/// A parsed command block
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub statements: Vec<Stmt>,
}
