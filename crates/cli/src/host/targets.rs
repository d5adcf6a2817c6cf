// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The target vector: handle ids to host-side values.
//!
//! Append-only within a session. Dispose empties a slot but never reuses
//! it, so "already disposed" and "never existed" stay distinguishable by
//! comparing the id to the vector length.

use std::sync::Arc;

use parking_lot::Mutex;

use inpagewire::serial::SerializedValue;
use inpagewire::value::RemoteValue;

use crate::expr::EvalValue;

pub struct TargetList {
    slots: Vec<Option<EvalValue>>,
}

impl TargetList {
    /// Reserved slots: id 0 is the browsing context, id 1 the page.
    pub fn new(context: EvalValue, page: EvalValue) -> Self {
        Self {
            slots: vec![Some(context), Some(page)],
        }
    }

    pub fn get(&self, id: u64) -> anyhow::Result<EvalValue> {
        match self.slots.get(id as usize) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) => anyhow::bail!("handle {id} was already disposed"),
            None => anyhow::bail!("handle {id} does not exist"),
        }
    }

    pub fn register(&mut self, value: EvalValue) -> u64 {
        self.slots.push(Some(value));
        (self.slots.len() - 1) as u64
    }

    /// Empty the slot. Disposing an already-empty slot is a no-op; an
    /// unknown id is a protocol error.
    pub fn dispose(&mut self, id: u64) -> anyhow::Result<()> {
        match self.slots.get_mut(id as usize) {
            Some(slot) => {
                *slot = None;
                Ok(())
            }
            None => anyhow::bail!("handle {id} does not exist"),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Deserialize an evaluate argument, resolving handle nodes against the
/// target vector. A missing argument is `undefined`; an unknown handle id is
/// a protocol error.
pub fn resolve_arg(
    arg: Option<&SerializedValue>,
    targets: &Mutex<TargetList>,
) -> anyhow::Result<EvalValue> {
    let Some(node) = arg else {
        return Ok(EvalValue::undefined());
    };
    let value = inpagewire::parse(node)?;
    resolve_value(&value, targets, 0)
}

const RESOLVE_DEPTH_LIMIT: usize = 64;

fn resolve_value(
    value: &RemoteValue,
    targets: &Mutex<TargetList>,
    depth: usize,
) -> anyhow::Result<EvalValue> {
    if depth > RESOLVE_DEPTH_LIMIT {
        anyhow::bail!("handle-bearing arguments must be acyclic");
    }
    if let RemoteValue::Handle(id) = value {
        return targets.lock().get(*id);
    }
    let mut seen = Vec::new();
    if !contains_handle(value, &mut seen) {
        return Ok(EvalValue::Data(value.clone()));
    }
    match value {
        RemoteValue::Array(cell) => {
            let items = cell.lock().clone();
            let mut out = Vec::with_capacity(items.len());
            for item in &items {
                out.push(resolve_data(item, targets, depth + 1)?);
            }
            Ok(EvalValue::Data(RemoteValue::array(out)))
        }
        RemoteValue::Object(cell) => {
            let props = cell.lock().clone();
            let mut out = Vec::with_capacity(props.len());
            for (key, item) in &props {
                out.push((key.clone(), resolve_data(item, targets, depth + 1)?));
            }
            Ok(EvalValue::Data(RemoteValue::object(out)))
        }
        _ => anyhow::bail!("handles are not supported inside {} values", value.kind()),
    }
}

fn resolve_data(
    value: &RemoteValue,
    targets: &Mutex<TargetList>,
    depth: usize,
) -> anyhow::Result<RemoteValue> {
    match resolve_value(value, targets, depth)? {
        EvalValue::Data(data) => Ok(data),
        other => anyhow::bail!(
            "a handle to a host {} must be the top-level argument",
            other.kind()
        ),
    }
}

fn contains_handle(value: &RemoteValue, seen: &mut Vec<usize>) -> bool {
    match value {
        RemoteValue::Handle(_) => true,
        RemoteValue::Array(cell) => {
            let addr = Arc::as_ptr(cell) as usize;
            if seen.contains(&addr) {
                return false;
            }
            seen.push(addr);
            let items = cell.lock().clone();
            items.iter().any(|item| contains_handle(item, seen))
        }
        RemoteValue::Object(cell) => {
            let addr = Arc::as_ptr(cell) as usize;
            if seen.contains(&addr) {
                return false;
            }
            seen.push(addr);
            let props = cell.lock().clone();
            props.iter().any(|(_, item)| contains_handle(item, seen))
        }
        RemoteValue::Error(cell) => {
            let addr = Arc::as_ptr(cell) as usize;
            if seen.contains(&addr) {
                return false;
            }
            seen.push(addr);
            let cause = cell.lock().cause.clone();
            contains_handle(&cause, seen)
        }
        _ => false,
    }
}

#[cfg(test)]
#[path = "targets_tests.rs"]
mod tests;
