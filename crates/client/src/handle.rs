// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handle proxies over host-side objects.
//!
//! Proxies for the same id share one refcount. Dropping the last proxy is
//! the finalization notification: a best-effort dispose goes out if the
//! channel is still open. Explicit [`Handle::dispose`] always decrements and
//! awaits the host acknowledgment on the final decrement.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;

use inpagewire::msg::{HandleAction, HandleResolve, HandleResult};
use inpagewire::value::RemoteValue;
use inpagewire::{parse, serialize};

use crate::bridge::{BridgeInner, RemoteThrow};

pub struct Handle {
    bridge: Arc<BridgeInner>,
    id: u64,
    disposed: AtomicBool,
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle").field("id", &self.id).finish()
    }
}

impl Clone for Handle {
    fn clone(&self) -> Self {
        self.bridge.retain_handle(self.id);
        Self {
            bridge: Arc::clone(&self.bridge),
            id: self.id,
            disposed: AtomicBool::new(self.disposed.load(Ordering::SeqCst)),
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        if self.bridge.release_handle(self.id) {
            self.bridge.fire_dispose(self.id);
        }
    }
}

impl Handle {
    pub(crate) fn new(bridge: Arc<BridgeInner>, id: u64) -> Self {
        bridge.retain_handle(id);
        Self {
            bridge,
            id,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The wire value referencing this handle, for use as an evaluate
    /// argument.
    pub fn as_value(&self) -> RemoteValue {
        RemoteValue::Handle(self.id)
    }

    fn guard(&self) -> anyhow::Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            anyhow::bail!("handle {} is disposed", self.id);
        }
        Ok(())
    }

    async fn request(&self, action: HandleAction) -> anyhow::Result<HandleResolve> {
        self.bridge.handle_request(self.id, action).await
    }

    fn thrown(resolve: &HandleResolve) -> anyhow::Error {
        let value = match &resolve.result {
            Some(HandleResult::Value(node)) => parse(node).unwrap_or(RemoteValue::Undefined),
            _ => RemoteValue::Undefined,
        };
        anyhow::Error::new(RemoteThrow(value))
    }

    fn into_value(resolve: HandleResolve) -> anyhow::Result<RemoteValue> {
        if resolve.error {
            return Err(Self::thrown(&resolve));
        }
        match resolve.result {
            Some(HandleResult::Value(node)) => {
                parse(&node).map_err(|err| anyhow::anyhow!("unparsable result: {err}"))
            }
            None => Ok(RemoteValue::Undefined),
            Some(other) => anyhow::bail!("unexpected result shape: {other:?}"),
        }
    }

    fn into_id(&self, resolve: HandleResolve) -> anyhow::Result<Handle> {
        if resolve.error {
            return Err(Self::thrown(&resolve));
        }
        match resolve.result {
            Some(HandleResult::Id(id)) => Ok(Handle::new(Arc::clone(&self.bridge), id)),
            other => anyhow::bail!("expected a handle id, got {other:?}"),
        }
    }

    /// Evaluate `source` against the referenced object and return the
    /// serialized result. Unserializable parts of the result come back as
    /// `null`; an unencodable `arg` fails here, on the caller.
    pub async fn evaluate(
        &self,
        source: &str,
        arg: Option<RemoteValue>,
    ) -> anyhow::Result<RemoteValue> {
        self.guard()?;
        let arg = match &arg {
            Some(value) => Some(serialize(value).context("serialize evaluate argument")?),
            None => None,
        };
        let resolve = self
            .request(HandleAction::Evaluate {
                source: source.to_owned(),
                arg,
                h: false,
            })
            .await?;
        Self::into_value(resolve)
    }

    /// Evaluate `source` and keep the result on the host, returning a handle
    /// to it.
    pub async fn evaluate_handle(
        &self,
        source: &str,
        arg: Option<RemoteValue>,
    ) -> anyhow::Result<Handle> {
        self.guard()?;
        let arg = match &arg {
            Some(value) => Some(serialize(value).context("serialize evaluate argument")?),
            None => None,
        };
        let resolve = self
            .request(HandleAction::Evaluate {
                source: source.to_owned(),
                arg,
                h: true,
            })
            .await?;
        self.into_id(resolve)
    }

    /// The referenced object, serialized.
    pub async fn json_value(&self) -> anyhow::Result<RemoteValue> {
        self.guard()?;
        let resolve = self.request(HandleAction::JsonValue).await?;
        Self::into_value(resolve)
    }

    /// Handle to one named property (`undefined` when absent).
    pub async fn get_property(&self, name: &str) -> anyhow::Result<Handle> {
        self.guard()?;
        let resolve = self
            .request(HandleAction::GetProperty {
                name: name.to_owned(),
            })
            .await?;
        self.into_id(resolve)
    }

    /// Handles to every own enumerable property.
    pub async fn get_properties(&self) -> anyhow::Result<Vec<(String, Handle)>> {
        self.guard()?;
        let resolve = self.request(HandleAction::GetProperties).await?;
        if resolve.error {
            return Err(Self::thrown(&resolve));
        }
        match resolve.result {
            Some(HandleResult::Properties(pairs)) => Ok(pairs
                .into_iter()
                .map(|(name, id)| (name, Handle::new(Arc::clone(&self.bridge), id)))
                .collect()),
            other => anyhow::bail!("expected properties, got {other:?}"),
        }
    }

    /// Release this proxy's reference. The final reference for an id awaits
    /// the host's acknowledgment of the dispose. Disposing twice is a no-op.
    pub async fn dispose(&self) -> anyhow::Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.bridge.release_handle(self.id) {
            self.request(HandleAction::Dispose).await?;
        }
        Ok(())
    }
}
