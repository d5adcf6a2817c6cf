// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-page runtime: the client half of the bridge.
//!
//! This crate is what test code links against inside the page environment.
//! It opens the bridge WebSocket, surfaces host-side objects as [`Handle`]
//! proxies, keeps the route-handler stack, and carries the init/done test
//! lifecycle. The page environment supplies two adapters: a [`Fetcher`]
//! (how this page performs network fetches) and a [`DoneSink`] (how the
//! done signal reaches the page, and through it the supervising host).

pub mod bridge;
pub mod client;
pub mod fetch;
pub mod handle;
pub mod matcher;
pub mod route;
pub mod socket;

pub use bridge::{Bridge, RemoteThrow};
pub use client::{Client, ClientOptions, DoneSink};
pub use fetch::{FetchRequest, FetchResponse, Fetcher, HttpFetcher};
pub use handle::Handle;
pub use matcher::UrlMatcher;
pub use route::{handler, ContinueOverrides, FulfillOpts, Route, RouteHandlerFn, RouteView};
