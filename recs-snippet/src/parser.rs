//! Recursive-descent parser producing a [`Program`]

use crate::ast::{
    BinOp, Block, CmpOp, Expr, ExprKind, LogicalOp, Pattern, Program, Span, Stmt, StmtKind,
    UnaryOp,
};
use crate::error::SyntaxError;
use crate::lexer::{tokenize, Token, TokenKind};
use recs_core::limits::MAX_NESTING_DEPTH;
use regex::Regex;
use serde_json::Value;

type ParseResult<T> = Result<T, SyntaxError>;

/// Parse snippet source into a program
pub fn parse(source: &str) -> ParseResult<Program> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let body = parser.program()?;
    Ok(Program::new(body, source))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Open expressions and blocks around the current token
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.current().kind
    }

    fn current(&self) -> &Token {
        // tokenize always ends with Eof and advance never moves past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn span(&self) -> Span {
        self.current().span
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> ParseResult<Token> {
        if self.peek() == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("'{kind}'")))
        }
    }

    fn unexpected(&self, wanted: &str) -> SyntaxError {
        let found = match self.peek() {
            TokenKind::Eof | TokenKind::Newline => self.peek().to_string(),
            other => format!("'{other}'"),
        };
        SyntaxError::new(self.span(), format!("expected {wanted}, found {found}"))
    }

    /// Enter one more level of nesting.
    ///
    /// Operator chains call this once per operator since each one wraps the
    /// tree built so far; they reset `depth` themselves when the chain ends.
    fn deeper(&mut self) -> ParseResult<()> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(SyntaxError::new(self.span(), "snippet is nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        self.deeper()?;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn skip_newlines(&mut self) {
        while self.peek() == &TokenKind::Newline {
            self.advance();
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), TokenKind::Newline | TokenKind::Semicolon) {
            self.advance();
        }
    }

    fn program(&mut self) -> ParseResult<Block> {
        let mut body = Vec::new();
        self.skip_separators();
        while self.peek() != &TokenKind::Eof {
            body.push(self.statement()?);
            match self.peek() {
                TokenKind::Newline | TokenKind::Semicolon => self.skip_separators(),
                TokenKind::Eof => {}
                _ => return Err(self.unexpected("end of statement")),
            }
        }
        Ok(body)
    }

    fn block(&mut self) -> ParseResult<Block> {
        self.expect(&TokenKind::LBrace)?;
        self.nested(Self::block_body)
    }

    // Called after the opening brace.
    fn block_body(&mut self) -> ParseResult<Block> {
        let mut body = Vec::new();
        self.skip_separators();
        while self.peek() != &TokenKind::RBrace {
            if self.peek() == &TokenKind::Eof {
                return Err(self.unexpected("'}'"));
            }
            body.push(self.statement()?);
            match self.peek() {
                TokenKind::Newline | TokenKind::Semicolon => self.skip_separators(),
                TokenKind::RBrace => {}
                _ => return Err(self.unexpected("end of statement")),
            }
        }
        self.advance();
        Ok(body)
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        let span = self.span();
        let kind = match self.peek() {
            TokenKind::If => self.if_statement()?,
            TokenKind::For => self.for_statement()?,
            _ => self.assignment_or_expression()?,
        };
        Ok(Stmt { kind, span })
    }

    fn if_statement(&mut self) -> ParseResult<StmtKind> {
        self.advance();
        let mut branches = vec![(self.expression()?, self.block()?)];
        let mut otherwise = None;

        loop {
            let checkpoint = self.pos;
            self.skip_newlines();
            match self.peek() {
                TokenKind::Elif => {
                    self.advance();
                    branches.push((self.expression()?, self.block()?));
                }
                TokenKind::Else => {
                    self.advance();
                    otherwise = Some(if self.peek() == &TokenKind::If {
                        let span = self.span();
                        vec![Stmt {
                            kind: self.if_statement()?,
                            span,
                        }]
                    } else {
                        self.block()?
                    });
                    break;
                }
                _ => {
                    self.pos = checkpoint;
                    break;
                }
            }
        }

        Ok(StmtKind::If {
            branches,
            otherwise,
        })
    }

    fn for_statement(&mut self) -> ParseResult<StmtKind> {
        self.advance();
        let var = match self.peek() {
            TokenKind::Ident(name) => name.clone(),
            _ => return Err(self.unexpected("loop variable name")),
        };
        self.advance();
        self.expect(&TokenKind::In)?;
        let iterable = self.expression()?;
        let body = self.block()?;
        Ok(StmtKind::For {
            var,
            iterable,
            body,
        })
    }

    fn assignment_or_expression(&mut self) -> ParseResult<StmtKind> {
        let target = self.expression()?;
        let op = match self.peek() {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some(BinOp::Add),
            TokenKind::MinusAssign => Some(BinOp::Sub),
            TokenKind::StarAssign => Some(BinOp::Mul),
            TokenKind::SlashAssign => Some(BinOp::Div),
            TokenKind::PercentAssign => Some(BinOp::Mod),
            _ => return Ok(StmtKind::Expr(target)),
        };

        if !target.is_place() {
            return Err(SyntaxError::new(target.span, "cannot assign to expression"));
        }
        self.advance();
        let value = self.expression()?;
        Ok(StmtKind::Assign { target, op, value })
    }

    fn expression(&mut self) -> ParseResult<Expr> {
        self.nested(Self::or)
    }

    fn or(&mut self) -> ParseResult<Expr> {
        let base = self.depth;
        let mut lhs = self.and()?;
        while matches!(self.peek(), TokenKind::Or | TokenKind::OrOr) {
            self.advance();
            self.deeper()?;
            let rhs = self.and()?;
            lhs = binary(ExprKind::Logical(LogicalOp::Or, Box::new(lhs), Box::new(rhs)));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn and(&mut self) -> ParseResult<Expr> {
        let base = self.depth;
        let mut lhs = self.not()?;
        while matches!(self.peek(), TokenKind::And | TokenKind::AndAnd) {
            self.advance();
            self.deeper()?;
            let rhs = self.not()?;
            lhs = binary(ExprKind::Logical(LogicalOp::And, Box::new(lhs), Box::new(rhs)));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn not(&mut self) -> ParseResult<Expr> {
        if matches!(self.peek(), TokenKind::Not | TokenKind::Bang) {
            let span = self.advance().span;
            let operand = self.nested(Self::not)?;
            return Ok(Expr::new(
                ExprKind::Unary(UnaryOp::Not, Box::new(operand)),
                span,
            ));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            TokenKind::EqEq => CmpOp::Eq,
            TokenKind::NotEq => CmpOp::Ne,
            TokenKind::Lt => CmpOp::Lt,
            TokenKind::Le => CmpOp::Le,
            TokenKind::Gt => CmpOp::Gt,
            TokenKind::Ge => CmpOp::Ge,
            TokenKind::In => CmpOp::In,
            TokenKind::Tilde => {
                self.advance();
                let pattern = self.pattern()?;
                return Ok(binary(ExprKind::Match(Box::new(lhs), pattern)));
            }
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.additive()?;
        Ok(binary(ExprKind::Compare(op, Box::new(lhs), Box::new(rhs))))
    }

    fn pattern(&mut self) -> ParseResult<Pattern> {
        let rhs = self.additive()?;
        match &rhs.kind {
            ExprKind::Literal(Value::String(source)) => Regex::new(source)
                .map(Pattern::Static)
                .map_err(|e| SyntaxError::new(rhs.span, format!("invalid regex: {e}"))),
            _ => Ok(Pattern::Dynamic(Box::new(rhs))),
        }
    }

    fn additive(&mut self) -> ParseResult<Expr> {
        let base = self.depth;
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => {
                    self.depth = base;
                    return Ok(lhs);
                }
            };
            self.advance();
            self.deeper()?;
            let rhs = self.multiplicative()?;
            lhs = binary(ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)));
        }
    }

    fn multiplicative(&mut self) -> ParseResult<Expr> {
        let base = self.depth;
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => {
                    self.depth = base;
                    return Ok(lhs);
                }
            };
            self.advance();
            self.deeper()?;
            let rhs = self.unary()?;
            lhs = binary(ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)));
        }
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if self.peek() == &TokenKind::Minus {
            let span = self.advance().span;
            let operand = self.nested(Self::unary)?;
            return Ok(Expr::new(
                ExprKind::Unary(UnaryOp::Neg, Box::new(operand)),
                span,
            ));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let base = self.depth;
        let mut expr = self.primary()?;
        loop {
            if matches!(self.peek(), TokenKind::LBracket | TokenKind::Dot | TokenKind::LParen) {
                self.deeper()?;
            }
            match self.peek() {
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(&TokenKind::RBracket)?;
                    let span = expr.span;
                    expr = Expr::new(ExprKind::Index(Box::new(expr), Box::new(index)), span);
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = match self.peek() {
                        TokenKind::Ident(name) => name.clone(),
                        _ => return Err(self.unexpected("attribute name")),
                    };
                    self.advance();
                    let span = expr.span;
                    expr = if self.eat(&TokenKind::LParen) {
                        let args = self.arguments()?;
                        Expr::new(ExprKind::MethodCall(Box::new(expr), name, args), span)
                    } else {
                        Expr::new(ExprKind::Member(Box::new(expr), name), span)
                    };
                }
                TokenKind::LParen => {
                    let ExprKind::Ident(name) = &expr.kind else {
                        return Err(SyntaxError::new(
                            self.span(),
                            "only named functions can be called",
                        ));
                    };
                    let name = name.clone();
                    self.advance();
                    let args = self.arguments()?;
                    expr = Expr::new(ExprKind::Call(name, args), expr.span);
                }
                _ => {
                    self.depth = base;
                    return Ok(expr);
                }
            }
        }
    }

    // Called after the opening parenthesis.
    fn arguments(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        while self.peek() != &TokenKind::RParen {
            args.push(self.expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(args)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        if !starts_expression(self.peek()) {
            return Err(self.unexpected("an expression"));
        }
        let token = self.advance();
        let span = token.span;
        let kind = match token.kind {
            TokenKind::Int(n) => ExprKind::Literal(Value::from(n)),
            TokenKind::Float(n) => ExprKind::Literal(Value::from(n)),
            TokenKind::Str(s) => ExprKind::Literal(Value::String(s)),
            TokenKind::True => ExprKind::Literal(Value::Bool(true)),
            TokenKind::False => ExprKind::Literal(Value::Bool(false)),
            TokenKind::Null => ExprKind::Literal(Value::Null),
            TokenKind::Ident(name) => ExprKind::Ident(name),
            TokenKind::Template(spec) => ExprKind::Template(spec),
            TokenKind::LParen => {
                let inner = self.expression()?;
                self.expect(&TokenKind::RParen)?;
                return Ok(inner);
            }
            TokenKind::LBracket => {
                let mut items = Vec::new();
                while self.peek() != &TokenKind::RBracket {
                    items.push(self.expression()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBracket)?;
                ExprKind::Array(items)
            }
            TokenKind::LBrace => ExprKind::Object(self.object_entries()?),
            other => {
                return Err(SyntaxError::new(
                    span,
                    format!("expected an expression, found '{other}'"),
                ))
            }
        };
        Ok(Expr::new(kind, span))
    }

    // Called after the opening brace. Line breaks between entries are allowed.
    fn object_entries(&mut self) -> ParseResult<Vec<(String, Expr)>> {
        let mut entries = Vec::new();
        self.skip_newlines();
        while self.peek() != &TokenKind::RBrace {
            let key = match self.peek() {
                TokenKind::Str(key) | TokenKind::Ident(key) => key.clone(),
                _ => return Err(self.unexpected("object key")),
            };
            self.advance();
            self.expect(&TokenKind::Colon)?;
            self.skip_newlines();
            entries.push((key, self.expression()?));
            self.skip_newlines();
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(entries)
    }
}

fn starts_expression(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Int(_)
            | TokenKind::Float(_)
            | TokenKind::Str(_)
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Null
            | TokenKind::Ident(_)
            | TokenKind::Template(_)
            | TokenKind::LParen
            | TokenKind::LBracket
            | TokenKind::LBrace
    )
}

fn binary(kind: ExprKind) -> Expr {
    let span = match &kind {
        ExprKind::Logical(_, lhs, _)
        | ExprKind::Compare(_, lhs, _)
        | ExprKind::Binary(_, lhs, _)
        | ExprKind::Match(lhs, _) => lhs.span,
        _ => Span::default(),
    };
    Expr::new(kind, span)
}
