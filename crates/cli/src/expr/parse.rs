// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recursive-descent parser for the evaluate source language.
//!
//! Function literals keep the raw source slice they were parsed from, so an
//! arrow function appearing as a call argument can be forwarded verbatim to
//! the engine's own evaluator.

use std::fmt;

use super::lex::{lex, LexError, TokKind, Token};

#[derive(Debug, Clone)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Undefined,
    Ident(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Func(FuncLit),
    Member {
        object: Box<Expr>,
        name: String,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    Await,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    StrictEq,
    StrictNe,
    LooseEq,
    LooseNe,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone)]
pub struct FuncLit {
    pub is_async: bool,
    pub params: Vec<String>,
    pub body: FuncBody,
    /// Raw source of the whole literal, for engine forwarding.
    pub source: String,
}

#[derive(Debug, Clone)]
pub enum FuncBody {
    Expr(Box<Expr>),
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Return(Option<Expr>),
    Expr(Expr),
}

#[derive(Debug)]
pub enum ParseErr {
    Lex(LexError),
    Unexpected { at: usize, found: String },
    UnexpectedEof,
}

impl fmt::Display for ParseErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lex(err) => write!(f, "{err}"),
            Self::Unexpected { at, found } => write!(f, "unexpected {found} at byte {at}"),
            Self::UnexpectedEof => f.write_str("unexpected end of source"),
        }
    }
}

impl std::error::Error for ParseErr {}

impl From<LexError> for ParseErr {
    fn from(err: LexError) -> Self {
        Self::Lex(err)
    }
}

/// Parse the whole source as one expression.
pub fn expression(source: &str) -> Result<Expr, ParseErr> {
    let mut parser = Parser::new(source)?;
    let expr = parser.expr()?;
    parser.expect_eof()?;
    Ok(expr)
}

/// Parse the whole source as a method-shorthand function definition:
/// `[async] [name](params) { body }`.
pub fn method_shorthand(source: &str) -> Result<FuncLit, ParseErr> {
    let mut parser = Parser::new(source)?;
    let is_async = parser.eat(&TokKind::KwAsync);
    // Optional method name.
    if matches!(parser.peek(), Some(TokKind::Ident(_))) {
        parser.advance();
    }
    let params = parser.param_list()?;
    let body = parser.block()?;
    parser.expect_eof()?;
    Ok(FuncLit {
        is_async,
        params,
        body: FuncBody::Block(body),
        source: source.trim().to_owned(),
    })
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Result<Self, ParseErr> {
        Ok(Self {
            src,
            tokens: lex(src)?,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&TokKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&TokKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokKind) -> bool {
        if self.peek() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokKind) -> Result<(), ParseErr> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> ParseErr {
        match self.tokens.get(self.pos) {
            Some(token) => ParseErr::Unexpected {
                at: token.start,
                found: format!("{:?}", token.kind),
            },
            None => ParseErr::UnexpectedEof,
        }
    }

    fn expect_eof(&self) -> Result<(), ParseErr> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn token_start(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.start)
            .unwrap_or(self.src.len())
    }

    fn last_end(&self) -> usize {
        if self.pos == 0 {
            0
        } else {
            self.tokens
                .get(self.pos - 1)
                .map(|t| t.end)
                .unwrap_or(self.src.len())
        }
    }

    // -- Expressions ----------------------------------------------------------

    fn expr(&mut self) -> Result<Expr, ParseErr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, ParseErr> {
        let mut lhs = self.and_expr()?;
        while self.eat(&TokKind::OrOr) {
            let rhs = self.and_expr()?;
            lhs = binary(BinOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseErr> {
        let mut lhs = self.equality()?;
        while self.eat(&TokKind::AndAnd) {
            let rhs = self.equality()?;
            lhs = binary(BinOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expr, ParseErr> {
        let mut lhs = self.relational()?;
        loop {
            let op = match self.peek() {
                Some(TokKind::EqEqEq) => BinOp::StrictEq,
                Some(TokKind::NotEqEq) => BinOp::StrictNe,
                Some(TokKind::EqEq) => BinOp::LooseEq,
                Some(TokKind::NotEq) => BinOp::LooseNe,
                _ => break,
            };
            self.advance();
            let rhs = self.relational()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn relational(&mut self) -> Result<Expr, ParseErr> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(TokKind::Lt) => BinOp::Lt,
                Some(TokKind::Gt) => BinOp::Gt,
                Some(TokKind::Le) => BinOp::Le,
                Some(TokKind::Ge) => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.additive()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, ParseErr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(TokKind::Plus) => BinOp::Add,
                Some(TokKind::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseErr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(TokKind::Star) => BinOp::Mul,
                Some(TokKind::Slash) => BinOp::Div,
                Some(TokKind::Percent) => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ParseErr> {
        let op = match self.peek() {
            Some(TokKind::Minus) => Some(UnaryOp::Neg),
            Some(TokKind::Bang) => Some(UnaryOp::Not),
            Some(TokKind::KwAwait) => Some(UnaryOp::Await),
            Some(TokKind::KwTypeof) => Some(UnaryOp::TypeOf),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = self.unary()?;
            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ParseErr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&TokKind::Dot) {
                let name = self.ident()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    name,
                };
            } else if self.peek() == Some(&TokKind::LParen) {
                let args = self.call_args()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, ParseErr> {
        self.expect(&TokKind::LParen)?;
        let mut args = Vec::new();
        if self.eat(&TokKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat(&TokKind::Comma) {
                continue;
            }
            self.expect(&TokKind::RParen)?;
            return Ok(args);
        }
    }

    fn ident(&mut self) -> Result<String, ParseErr> {
        match self.peek() {
            Some(TokKind::Ident(name)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseErr> {
        match self.peek() {
            Some(TokKind::Number(value)) => {
                let value = *value;
                self.advance();
                Ok(Expr::Number(value))
            }
            Some(TokKind::Str(text)) => {
                let text = text.clone();
                self.advance();
                Ok(Expr::Str(text))
            }
            Some(TokKind::KwTrue) => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            Some(TokKind::KwFalse) => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            Some(TokKind::KwNull) => {
                self.advance();
                Ok(Expr::Null)
            }
            Some(TokKind::KwUndefined) => {
                self.advance();
                Ok(Expr::Undefined)
            }
            Some(TokKind::KwAsync) => self.arrow(true),
            Some(TokKind::KwNew) => {
                self.advance();
                let mut callee = self.primary()?;
                while self.eat(&TokKind::Dot) {
                    let name = self.ident()?;
                    callee = Expr::Member {
                        object: Box::new(callee),
                        name,
                    };
                }
                let args = if self.peek() == Some(&TokKind::LParen) {
                    self.call_args()?
                } else {
                    Vec::new()
                };
                Ok(Expr::New {
                    callee: Box::new(callee),
                    args,
                })
            }
            Some(TokKind::Ident(_)) => {
                if self.peek_at(1) == Some(&TokKind::Arrow) {
                    return self.arrow(false);
                }
                self.ident().map(Expr::Ident)
            }
            Some(TokKind::LParen) => {
                if self.paren_starts_arrow() {
                    return self.arrow(false);
                }
                self.advance();
                let expr = self.expr()?;
                self.expect(&TokKind::RParen)?;
                Ok(expr)
            }
            Some(TokKind::LBracket) => {
                self.advance();
                let mut items = Vec::new();
                if self.eat(&TokKind::RBracket) {
                    return Ok(Expr::Array(items));
                }
                loop {
                    items.push(self.expr()?);
                    if self.eat(&TokKind::Comma) {
                        if self.eat(&TokKind::RBracket) {
                            return Ok(Expr::Array(items));
                        }
                        continue;
                    }
                    self.expect(&TokKind::RBracket)?;
                    return Ok(Expr::Array(items));
                }
            }
            Some(TokKind::LBrace) => {
                self.advance();
                let mut props = Vec::new();
                if self.eat(&TokKind::RBrace) {
                    return Ok(Expr::Object(props));
                }
                loop {
                    let key = match self.peek() {
                        Some(TokKind::Ident(name)) => {
                            let name = name.clone();
                            self.advance();
                            name
                        }
                        Some(TokKind::Str(text)) => {
                            let text = text.clone();
                            self.advance();
                            text
                        }
                        _ => return Err(self.unexpected()),
                    };
                    let value = if self.eat(&TokKind::Colon) {
                        self.expr()?
                    } else {
                        // Shorthand property.
                        Expr::Ident(key.clone())
                    };
                    props.push((key, value));
                    if self.eat(&TokKind::Comma) {
                        if self.eat(&TokKind::RBrace) {
                            return Ok(Expr::Object(props));
                        }
                        continue;
                    }
                    self.expect(&TokKind::RBrace)?;
                    return Ok(Expr::Object(props));
                }
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Look ahead from a `(`: does the matching `)` lead into `=>`?
    fn paren_starts_arrow(&self) -> bool {
        let mut depth = 0usize;
        let mut index = self.pos;
        while let Some(token) = self.tokens.get(index) {
            match token.kind {
                TokKind::LParen => depth += 1,
                TokKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(
                            self.tokens.get(index + 1).map(|t| &t.kind),
                            Some(TokKind::Arrow)
                        );
                    }
                }
                _ => {}
            }
            index += 1;
        }
        false
    }

    /// Parse an arrow function. `self.pos` sits on `async`, the single
    /// parameter, or the opening paren.
    fn arrow(&mut self, is_async: bool) -> Result<Expr, ParseErr> {
        let start = self.token_start();
        if is_async {
            self.expect(&TokKind::KwAsync)?;
        }
        let params = if matches!(self.peek(), Some(TokKind::Ident(_))) {
            vec![self.ident()?]
        } else {
            self.param_list()?
        };
        self.expect(&TokKind::Arrow)?;
        let body = if self.peek() == Some(&TokKind::LBrace) {
            FuncBody::Block(self.block()?)
        } else {
            FuncBody::Expr(Box::new(self.expr()?))
        };
        let end = self.last_end();
        Ok(Expr::Func(FuncLit {
            is_async,
            params,
            body,
            source: self.src[start..end].to_owned(),
        }))
    }

    fn param_list(&mut self) -> Result<Vec<String>, ParseErr> {
        self.expect(&TokKind::LParen)?;
        let mut params = Vec::new();
        if self.eat(&TokKind::RParen) {
            return Ok(params);
        }
        loop {
            params.push(self.ident()?);
            if self.eat(&TokKind::Comma) {
                continue;
            }
            self.expect(&TokKind::RParen)?;
            return Ok(params);
        }
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ParseErr> {
        self.expect(&TokKind::LBrace)?;
        let mut stmts = Vec::new();
        loop {
            while self.eat(&TokKind::Semi) {}
            if self.eat(&TokKind::RBrace) {
                return Ok(stmts);
            }
            if self.eat(&TokKind::KwReturn) {
                if self.eat(&TokKind::Semi) {
                    stmts.push(Stmt::Return(None));
                    continue;
                }
                if self.peek() == Some(&TokKind::RBrace) {
                    self.advance();
                    stmts.push(Stmt::Return(None));
                    return Ok(stmts);
                }
                stmts.push(Stmt::Return(Some(self.expr()?)));
                continue;
            }
            stmts.push(Stmt::Expr(self.expr()?));
        }
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}
