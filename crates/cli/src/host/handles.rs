// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handle action dispatch.
//!
//! Every action resolves; a thrown value comes back serialized with
//! `error: true` instead of tearing anything down.

use std::collections::HashMap;
use std::sync::Arc;

use inpagewire::msg::{HandleAction, HandleRequest, HandleResolve, HandleResult};
use inpagewire::value::{RemoteError, RemoteValue};
use inpagewire::{serialize, serialize_with_fallback};

use crate::expr::{self, Compiled, EvalValue};
use crate::host::{targets, SessionState};

pub async fn perform(state: &Arc<SessionState>, req: HandleRequest) -> HandleResolve {
    match run_action(state, &req).await {
        Ok(result) => HandleResolve {
            id: req.id,
            resolve_id: req.resolve_id,
            result,
            error: false,
        },
        Err(err) => {
            let thrown = RemoteValue::error(RemoteError::new("Error", format!("{err:#}")));
            HandleResolve {
                id: req.id,
                resolve_id: req.resolve_id,
                result: serialize(&thrown).ok().map(HandleResult::Value),
                error: true,
            }
        }
    }
}

async fn run_action(
    state: &Arc<SessionState>,
    req: &HandleRequest,
) -> anyhow::Result<Option<HandleResult>> {
    match &req.action {
        HandleAction::Evaluate { source, arg, h } => {
            let target = state.targets.lock().get(req.id)?;
            let arg = targets::resolve_arg(arg.as_ref(), &state.targets)?;
            let outcome = match expr::compile(source)? {
                Compiled::Expr(expr) => expr::eval_expr(&expr, &HashMap::new()).await?,
                Compiled::Func(func) => expr::apply(&func, target, arg).await?,
            };
            if *h {
                let id = state.targets.lock().register(outcome);
                Ok(Some(HandleResult::Id(id)))
            } else {
                let value = expr::to_remote(&outcome);
                let node = serialize_with_fallback(&value, &RemoteValue::Null)?;
                Ok(Some(HandleResult::Value(node)))
            }
        }
        HandleAction::JsonValue => {
            let target = state.targets.lock().get(req.id)?;
            let value = expr::to_remote(&target);
            let node = serialize_with_fallback(&value, &RemoteValue::Null)?;
            Ok(Some(HandleResult::Value(node)))
        }
        HandleAction::GetProperties => {
            let target = state.targets.lock().get(req.id)?;
            let props = enumerate(&target);
            let mut pairs = Vec::with_capacity(props.len());
            {
                let mut targets = state.targets.lock();
                for (name, value) in props {
                    pairs.push((name, targets.register(value)));
                }
            }
            Ok(Some(HandleResult::Properties(pairs)))
        }
        HandleAction::GetProperty { name } => {
            let target = state.targets.lock().get(req.id)?;
            // Absent properties register as undefined, like a real property
            // read would produce.
            let value = enumerate(&target)
                .into_iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value)
                .unwrap_or_else(EvalValue::undefined);
            let id = state.targets.lock().register(value);
            Ok(Some(HandleResult::Id(id)))
        }
        HandleAction::Dispose => {
            state.targets.lock().dispose(req.id)?;
            Ok(None)
        }
    }
}

/// Own enumerable string-keyed properties of a target.
fn enumerate(target: &EvalValue) -> Vec<(String, EvalValue)> {
    match target {
        EvalValue::Data(RemoteValue::Object(cell)) => cell
            .lock()
            .iter()
            .map(|(key, value)| (key.clone(), EvalValue::Data(value.clone())))
            .collect(),
        EvalValue::Data(RemoteValue::Array(cell)) => cell
            .lock()
            .iter()
            .enumerate()
            .map(|(index, value)| (index.to_string(), EvalValue::Data(value.clone())))
            .collect(),
        EvalValue::Object(object) => object.properties(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
#[path = "handles_tests.rs"]
mod tests;
