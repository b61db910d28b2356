//! Syntax tree for parsed snippets

use regex::Regex;
use serde_json::Value;
use std::fmt;

/// 1-based source position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Line number
    pub line: usize,
    /// Column number, counted in characters
    pub column: usize,
}

impl Span {
    /// Create a span
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
}

impl BinOp {
    /// Source symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `in`
    In,
}

impl CmpOp {
    /// Source symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::In => "in",
        }
    }
}

/// Short-circuit operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// `and` / `&&`
    And,
    /// `or` / `||`
    Or,
}

/// Prefix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-`
    Neg,
    /// `not` / `!`
    Not,
}

/// Right-hand side of `=~`
#[derive(Debug, Clone)]
pub enum Pattern {
    /// String literal, compiled with the program
    Static(Regex),
    /// Computed per evaluation
    Dynamic(Box<Expr>),
}

/// Expression node
#[derive(Debug, Clone)]
pub struct Expr {
    /// What the expression is
    pub kind: ExprKind,
    /// Where it starts
    pub span: Span,
}

/// Expression variants
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// JSON literal
    Literal(Value),
    /// Variable or binding name
    Ident(String),
    /// `{{keyspec}}`, resolved fuzzily against the current record
    Template(String),
    /// `[a, b]`
    Array(Vec<Expr>),
    /// `{"k": v}`
    Object(Vec<(String, Expr)>),
    /// Prefix operator
    Unary(UnaryOp, Box<Expr>),
    /// Arithmetic
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// `and` / `or`
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    /// Comparison or membership
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    /// `lhs =~ pattern`
    Match(Box<Expr>, Pattern),
    /// `base[index]`
    Index(Box<Expr>, Box<Expr>),
    /// `base.name`
    Member(Box<Expr>, String),
    /// `name(args)`
    Call(String, Vec<Expr>),
    /// `receiver.name(args)`
    MethodCall(Box<Expr>, String, Vec<Expr>),
}

impl Expr {
    /// Create an expression node
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Whether the expression names a storage location that can be
    /// assigned to or mutated in place.
    pub fn is_place(&self) -> bool {
        match &self.kind {
            ExprKind::Ident(_) | ExprKind::Template(_) => true,
            ExprKind::Member(base, _) | ExprKind::Index(base, _) => base.is_place(),
            _ => false,
        }
    }
}

/// Statement node
#[derive(Debug, Clone)]
pub struct Stmt {
    /// What the statement is
    pub kind: StmtKind,
    /// Where it starts
    pub span: Span,
}

/// Statement variants
#[derive(Debug, Clone)]
pub enum StmtKind {
    /// `if` / `elif` chain with optional `else`
    If {
        /// Conditions and their blocks, in source order
        branches: Vec<(Expr, Block)>,
        /// `else` block
        otherwise: Option<Block>,
    },
    /// `for var in iterable { ... }`
    For {
        /// Loop variable
        var: String,
        /// Iterated expression
        iterable: Expr,
        /// Loop body
        body: Block,
    },
    /// `target = value` or `target op= value`
    Assign {
        /// Place being written
        target: Expr,
        /// Operator for compound assignment
        op: Option<BinOp>,
        /// Right-hand side
        value: Expr,
    },
    /// Bare expression
    Expr(Expr),
}

/// Statement sequence
pub type Block = Vec<Stmt>;

/// A parsed snippet with its source lines, for tracebacks
#[derive(Debug, Clone)]
pub struct Program {
    /// Top-level statements
    pub body: Block,
    lines: Vec<String>,
}

impl Program {
    /// Wrap parsed statements together with their source
    pub fn new(body: Block, source: &str) -> Self {
        Self {
            body,
            lines: source.lines().map(str::to_string).collect(),
        }
    }

    /// True when the program is exactly one expression statement
    pub fn is_single_expression(&self) -> bool {
        matches!(self.body.as_slice(), [Stmt { kind: StmtKind::Expr(_), .. }])
    }

    /// Source text of a 1-based line, or "" when out of range
    pub fn line_text(&self, line: usize) -> &str {
        line.checked_sub(1)
            .and_then(|index| self.lines.get(index))
            .map(String::as_str)
            .unwrap_or("")
    }
}
