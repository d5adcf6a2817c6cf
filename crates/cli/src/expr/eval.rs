// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tree-walking evaluator.
//!
//! Values are either transferable data ([`RemoteValue`]), references to
//! host-side objects (the page, the context, anything an engine adapter
//! exposes), or function literals kept as source. Method calls against host
//! objects are awaited; function-literal arguments reach the callee as raw
//! source, which is how `page.evaluate(fn, arg)` forwards work to the
//! engine.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use inpagewire::value::RemoteValue;

use super::parse::{BinOp, Expr, FuncBody, FuncLit, Stmt, UnaryOp};

pub type HostObject = Arc<dyn RemoteObject>;

/// A host-side object the evaluate language can call into.
#[async_trait]
pub trait RemoteObject: Send + Sync {
    /// Label used in diagnostics and the serializer's placeholder.
    fn label(&self) -> &'static str;

    /// Invoke a method. Function-literal arguments arrive as
    /// [`EvalValue::Closure`].
    async fn call(&self, method: &str, args: Vec<EvalValue>) -> anyhow::Result<EvalValue>;

    /// Own enumerable data properties.
    fn properties(&self) -> Vec<(String, EvalValue)> {
        Vec::new()
    }
}

#[derive(Clone)]
pub enum EvalValue {
    Data(RemoteValue),
    Object(HostObject),
    Closure(FuncLit),
}

impl std::fmt::Debug for EvalValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Data(value) => write!(f, "Data({})", value.kind()),
            Self::Object(object) => write!(f, "Object({})", object.label()),
            Self::Closure(func) => write!(f, "Closure({})", func.source),
        }
    }
}

impl EvalValue {
    pub fn undefined() -> Self {
        Self::Data(RemoteValue::Undefined)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Data(value) => value.kind(),
            Self::Object(_) => "object",
            Self::Closure(_) => "function",
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Self::Data(value) => value.truthy(),
            _ => true,
        }
    }
}

/// Collapse an eval value into a transferable one. Host objects and
/// closures become `Function` placeholders, which the serializer treats as
/// unencodable (so they fall back, typically to `null`).
pub fn to_remote(value: &EvalValue) -> RemoteValue {
    match value {
        EvalValue::Data(data) => data.clone(),
        EvalValue::Object(object) => RemoteValue::Function(format!("[object {}]", object.label())),
        EvalValue::Closure(func) => RemoteValue::Function(func.source.clone()),
    }
}

type Env = HashMap<String, EvalValue>;

/// Apply a compiled function to `(target, arg)`.
pub async fn apply(
    func: &FuncLit,
    target: EvalValue,
    arg: EvalValue,
) -> anyhow::Result<EvalValue> {
    let mut env = Env::new();
    let mut provided = vec![target, arg].into_iter();
    for param in &func.params {
        env.insert(
            param.clone(),
            provided.next().unwrap_or_else(EvalValue::undefined),
        );
    }
    match &func.body {
        FuncBody::Expr(expr) => eval_expr(expr, &env).await,
        FuncBody::Block(stmts) => eval_block(stmts, &env).await,
    }
}

/// Evaluate a bare expression with the given bindings.
pub async fn eval_expr(expr: &Expr, env: &Env) -> anyhow::Result<EvalValue> {
    eval(expr, env).await
}

async fn eval_block(stmts: &[Stmt], env: &Env) -> anyhow::Result<EvalValue> {
    for stmt in stmts {
        match stmt {
            Stmt::Return(Some(expr)) => return eval(expr, env).await,
            Stmt::Return(None) => return Ok(EvalValue::undefined()),
            Stmt::Expr(expr) => {
                eval(expr, env).await?;
            }
        }
    }
    Ok(EvalValue::undefined())
}

fn eval<'a>(expr: &'a Expr, env: &'a Env) -> BoxFuture<'a, anyhow::Result<EvalValue>> {
    async move {
        match expr {
            Expr::Number(value) => Ok(EvalValue::Data(RemoteValue::Number(*value))),
            Expr::Str(text) => Ok(EvalValue::Data(RemoteValue::String(text.clone()))),
            Expr::Bool(value) => Ok(EvalValue::Data(RemoteValue::Bool(*value))),
            Expr::Null => Ok(EvalValue::Data(RemoteValue::Null)),
            Expr::Undefined => Ok(EvalValue::undefined()),
            Expr::Ident(name) => env
                .get(name)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("{name} is not defined")),
            Expr::Func(func) => Ok(EvalValue::Closure(func.clone())),
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(to_remote(&eval(item, env).await?));
                }
                Ok(EvalValue::Data(RemoteValue::array(values)))
            }
            Expr::Object(props) => {
                let mut pairs = Vec::with_capacity(props.len());
                for (key, value) in props {
                    pairs.push((key.clone(), to_remote(&eval(value, env).await?)));
                }
                Ok(EvalValue::Data(RemoteValue::object(pairs)))
            }
            Expr::Member { object, name } => {
                let object = eval(object, env).await?;
                member(&object, name)
            }
            Expr::Call { callee, args } => {
                let Expr::Member { object, name } = callee.as_ref() else {
                    anyhow::bail!("only method calls are supported here");
                };
                let object = eval(object, env).await?;
                let target = match object {
                    EvalValue::Object(target) => target,
                    other => anyhow::bail!("{} has no methods", other.kind()),
                };
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(eval(arg, env).await?);
                }
                target.call(name, values).await
            }
            Expr::New { .. } => {
                anyhow::bail!("constructors are only available inside page functions")
            }
            Expr::Unary { op, expr } => {
                let value = eval(expr, env).await?;
                match op {
                    UnaryOp::Await => Ok(value),
                    UnaryOp::Not => Ok(EvalValue::Data(RemoteValue::Bool(!value.truthy()))),
                    UnaryOp::Neg => match value {
                        EvalValue::Data(RemoteValue::Number(n)) => {
                            Ok(EvalValue::Data(RemoteValue::Number(-n)))
                        }
                        other => anyhow::bail!("cannot negate {}", other.kind()),
                    },
                    UnaryOp::TypeOf => Ok(EvalValue::Data(RemoteValue::String(
                        type_of(&value).to_owned(),
                    ))),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                // Short-circuit forms first.
                match op {
                    BinOp::And => {
                        let left = eval(lhs, env).await?;
                        if !left.truthy() {
                            return Ok(left);
                        }
                        return eval(rhs, env).await;
                    }
                    BinOp::Or => {
                        let left = eval(lhs, env).await?;
                        if left.truthy() {
                            return Ok(left);
                        }
                        return eval(rhs, env).await;
                    }
                    _ => {}
                }
                let left = eval(lhs, env).await?;
                let right = eval(rhs, env).await?;
                binary(*op, &left, &right)
            }
        }
    }
    .boxed()
}

fn member(object: &EvalValue, name: &str) -> anyhow::Result<EvalValue> {
    match object {
        EvalValue::Object(target) => target
            .properties()
            .into_iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
            .ok_or_else(|| anyhow::anyhow!("unknown property {}.{name}", target.label())),
        EvalValue::Data(RemoteValue::Object(cell)) => {
            let props = cell.lock().clone();
            Ok(props
                .into_iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| EvalValue::Data(value))
                .unwrap_or_else(EvalValue::undefined))
        }
        EvalValue::Data(RemoteValue::Array(cell)) => {
            let items = cell.lock().clone();
            if name == "length" {
                return Ok(EvalValue::Data(RemoteValue::Number(items.len() as f64)));
            }
            match name.parse::<usize>() {
                Ok(index) => Ok(items
                    .get(index)
                    .cloned()
                    .map(EvalValue::Data)
                    .unwrap_or_else(EvalValue::undefined)),
                Err(_) => Ok(EvalValue::undefined()),
            }
        }
        EvalValue::Data(RemoteValue::String(text)) => {
            if name == "length" {
                Ok(EvalValue::Data(RemoteValue::Number(
                    text.chars().count() as f64
                )))
            } else {
                Ok(EvalValue::undefined())
            }
        }
        other => anyhow::bail!("cannot read property {name} of {}", other.kind()),
    }
}

fn type_of(value: &EvalValue) -> &'static str {
    match value {
        EvalValue::Closure(_) => "function",
        EvalValue::Object(_) => "object",
        EvalValue::Data(data) => match data {
            RemoteValue::Undefined | RemoteValue::Symbol(_) => "undefined",
            RemoteValue::Null => "object",
            RemoteValue::Bool(_) => "boolean",
            RemoteValue::Number(_) => "number",
            RemoteValue::String(_) => "string",
            RemoteValue::BigInt(_) => "bigint",
            RemoteValue::Function(_) => "function",
            _ => "object",
        },
    }
}

fn binary(op: BinOp, left: &EvalValue, right: &EvalValue) -> anyhow::Result<EvalValue> {
    use RemoteValue::{Number, String as Str};

    if matches!(
        op,
        BinOp::StrictEq | BinOp::StrictNe | BinOp::LooseEq | BinOp::LooseNe
    ) {
        let equal = strict_eq(left, right);
        let value = match op {
            BinOp::StrictEq | BinOp::LooseEq => equal,
            _ => !equal,
        };
        return Ok(EvalValue::Data(RemoteValue::Bool(value)));
    }

    match (left, right) {
        (EvalValue::Data(a), EvalValue::Data(b)) => match (op, a, b) {
            (BinOp::Add, Number(x), Number(y)) => Ok(EvalValue::Data(Number(x + y))),
            (BinOp::Add, Str(x), Str(y)) => {
                Ok(EvalValue::Data(Str(format!("{x}{y}"))))
            }
            (BinOp::Add, Str(x), Number(y)) => {
                Ok(EvalValue::Data(Str(format!("{x}{}", fmt_number(*y)))))
            }
            (BinOp::Add, Number(x), Str(y)) => {
                Ok(EvalValue::Data(Str(format!("{}{y}", fmt_number(*x)))))
            }
            (BinOp::Sub, Number(x), Number(y)) => Ok(EvalValue::Data(Number(x - y))),
            (BinOp::Mul, Number(x), Number(y)) => Ok(EvalValue::Data(Number(x * y))),
            (BinOp::Div, Number(x), Number(y)) => Ok(EvalValue::Data(Number(x / y))),
            (BinOp::Mod, Number(x), Number(y)) => Ok(EvalValue::Data(Number(x % y))),
            (BinOp::Lt, Number(x), Number(y)) => Ok(EvalValue::Data(RemoteValue::Bool(x < y))),
            (BinOp::Gt, Number(x), Number(y)) => Ok(EvalValue::Data(RemoteValue::Bool(x > y))),
            (BinOp::Le, Number(x), Number(y)) => Ok(EvalValue::Data(RemoteValue::Bool(x <= y))),
            (BinOp::Ge, Number(x), Number(y)) => Ok(EvalValue::Data(RemoteValue::Bool(x >= y))),
            (BinOp::Lt, Str(x), Str(y)) => Ok(EvalValue::Data(RemoteValue::Bool(x < y))),
            (BinOp::Gt, Str(x), Str(y)) => Ok(EvalValue::Data(RemoteValue::Bool(x > y))),
            _ => anyhow::bail!(
                "unsupported operands {} and {}",
                a.kind(),
                b.kind()
            ),
        },
        _ => anyhow::bail!(
            "unsupported operands {} and {}",
            left.kind(),
            right.kind()
        ),
    }
}

fn fmt_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Strict equality: IEEE numbers (`NaN !== NaN`, `0 === -0`), value
/// equality for strings and booleans, identity for containers and host
/// objects.
fn strict_eq(left: &EvalValue, right: &EvalValue) -> bool {
    match (left, right) {
        (EvalValue::Object(a), EvalValue::Object(b)) => Arc::ptr_eq(a, b),
        (EvalValue::Data(a), EvalValue::Data(b)) => match (a, b) {
            (RemoteValue::Number(x), RemoteValue::Number(y)) => x == y,
            (RemoteValue::String(x), RemoteValue::String(y)) => x == y,
            (RemoteValue::Bool(x), RemoteValue::Bool(y)) => x == y,
            (RemoteValue::Null, RemoteValue::Null) => true,
            (RemoteValue::Undefined, RemoteValue::Undefined) => true,
            (RemoteValue::BigInt(x), RemoteValue::BigInt(y)) => x == y,
            (RemoteValue::Array(x), RemoteValue::Array(y)) => Arc::ptr_eq(x, y),
            (RemoteValue::Object(x), RemoteValue::Object(y)) => Arc::ptr_eq(x, y),
            (RemoteValue::Error(x), RemoteValue::Error(y)) => Arc::ptr_eq(x, y),
            _ => false,
        },
        _ => false,
    }
}
