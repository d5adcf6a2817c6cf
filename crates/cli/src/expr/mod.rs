// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The evaluate source language: a small JS subset the host can run against
//! its own objects.
//!
//! Sources arrive from the bridge as either a full expression (`1 + 2`, an
//! arrow function) or a method-shorthand definition (`async go(page) {…}`).
//! Compilation tries the expression reading first and the shorthand rewrite
//! second; both failing is reported as not well-serializable. That double
//! try is part of the protocol, not an implementation detail.

pub mod eval;
pub mod lex;
pub mod parse;

use std::fmt;

pub use eval::{apply, eval_expr, to_remote, EvalValue, HostObject, RemoteObject};
pub use parse::{Expr, FuncBody, FuncLit, Stmt};

/// A compiled evaluate source: a bare expression, or a function to apply to
/// `(target, arg)`.
#[derive(Debug, Clone)]
pub enum Compiled {
    Expr(Expr),
    Func(FuncLit),
}

#[derive(Debug)]
pub enum ExprError {
    NotWellSerializable,
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotWellSerializable => f.write_str("passed function is not well-serializable"),
        }
    }
}

impl std::error::Error for ExprError {}

/// Compile an evaluate source with the double-try strategy.
pub fn compile(source: &str) -> Result<Compiled, ExprError> {
    if let Ok(expr) = parse::expression(source) {
        return Ok(match expr {
            Expr::Func(func) => Compiled::Func(func),
            other => Compiled::Expr(other),
        });
    }
    match parse::method_shorthand(source) {
        Ok(func) => Ok(Compiled::Func(func)),
        Err(_) => Err(ExprError::NotWellSerializable),
    }
}

#[cfg(test)]
#[path = "expr_tests.rs"]
mod tests;
