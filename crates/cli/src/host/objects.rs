// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine objects surfaced to the evaluate language.

use std::sync::Arc;

use async_trait::async_trait;

use inpagewire::value::RemoteValue;

use crate::engine::{Browser, BrowserContext, Page};
use crate::expr::{to_remote, EvalValue, RemoteObject};

pub struct PageObject {
    page: Arc<dyn Page>,
}

impl PageObject {
    pub fn new(page: Arc<dyn Page>) -> Self {
        Self { page }
    }
}

#[async_trait]
impl RemoteObject for PageObject {
    fn label(&self) -> &'static str {
        "page"
    }

    async fn call(&self, method: &str, args: Vec<EvalValue>) -> anyhow::Result<EvalValue> {
        match method {
            "evaluate" => {
                let mut args = args.into_iter();
                let source = match args.next() {
                    Some(EvalValue::Closure(func)) => func.source,
                    Some(EvalValue::Data(RemoteValue::String(text))) => text,
                    other => anyhow::bail!(
                        "page.evaluate expects a function or source string, got {other:?}"
                    ),
                };
                let arg = args.next().map(|value| to_remote(&value));
                self.page.evaluate(&source, arg).await.map(EvalValue::Data)
            }
            "goto" => {
                let url = string_arg(args, "page.goto")?;
                self.page.goto(&url).await?;
                Ok(EvalValue::undefined())
            }
            "reload" => {
                self.page.reload().await?;
                Ok(EvalValue::undefined())
            }
            "close" => {
                self.page.close().await?;
                Ok(EvalValue::undefined())
            }
            "context" => Ok(EvalValue::Object(Arc::new(ContextObject::new(
                self.page.context(),
            )))),
            other => anyhow::bail!("page.{other} is not supported"),
        }
    }
}

pub struct ContextObject {
    context: Arc<dyn BrowserContext>,
}

impl ContextObject {
    pub fn new(context: Arc<dyn BrowserContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl RemoteObject for ContextObject {
    fn label(&self) -> &'static str {
        "context"
    }

    async fn call(&self, method: &str, _args: Vec<EvalValue>) -> anyhow::Result<EvalValue> {
        match method {
            "browser" => Ok(EvalValue::Object(Arc::new(BrowserObject {
                browser: self.context.browser(),
            }))),
            other => anyhow::bail!("context.{other} is not supported"),
        }
    }
}

pub struct BrowserObject {
    browser: Arc<dyn Browser>,
}

#[async_trait]
impl RemoteObject for BrowserObject {
    fn label(&self) -> &'static str {
        "browser"
    }

    async fn call(&self, method: &str, _args: Vec<EvalValue>) -> anyhow::Result<EvalValue> {
        match method {
            "version" => Ok(EvalValue::Data(RemoteValue::String(
                self.browser.version(),
            ))),
            "close" => {
                self.browser.close().await?;
                Ok(EvalValue::undefined())
            }
            other => anyhow::bail!("browser.{other} is not supported"),
        }
    }
}

fn string_arg(args: Vec<EvalValue>, what: &str) -> anyhow::Result<String> {
    match args.into_iter().next() {
        Some(EvalValue::Data(RemoteValue::String(text))) => Ok(text),
        other => anyhow::bail!("{what} expects a string argument, got {other:?}"),
    }
}
