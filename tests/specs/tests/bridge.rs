// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bridge protocol specs over the real WebSocket: handles, routes,
//! body framing, bypass.

use bytes::Bytes;

use inpage::engine::stub::StubEngine;
use inpage_specs::{assert_clean, config_for, page_client, run_scripted, run_scripted_on, write_file};
use inpageclient::{handler, ContinueOverrides, FetchRequest, FulfillOpts};
use inpagewire::value::RemoteValue;

fn test_dir(name: &str) -> anyhow::Result<tempfile::TempDir> {
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), "tests/spec.test.js", &format!("// {name}\n"));
    Ok(dir)
}

// -- Handles ------------------------------------------------------------------

#[tokio::test]
async fn evaluate_arithmetic_over_the_bridge() -> anyhow::Result<()> {
    let dir = test_dir("arith")?;
    let outcome = run_scripted(config_for(dir.path(), &["tests/**"]), |env| async move {
        let client = page_client(&env).await?;
        let value = client.page_handle().evaluate("1 + 2", None).await?;
        anyhow::ensure!(value.as_number() == Some(3.0), "got {value:?}");
        client.done(0);
        Ok(())
    })
    .await?;
    assert_clean(outcome);
    Ok(())
}

#[tokio::test]
async fn nested_page_evaluate_dispatches_a_window_event() -> anyhow::Result<()> {
    let dir = test_dir("dispatch")?;

    let engine = StubEngine::new();
    let probe = engine.clone();
    // The engine-side evaluator: a dispatchEvent closure forwarded from the
    // host raises the named window event.
    engine.on_evaluate(|source, arg, env| async move {
        if source.contains("dispatchEvent") {
            if let Some(RemoteValue::String(name)) = arg {
                env.dispatch(&name, RemoteValue::Undefined);
                return Ok(RemoteValue::Undefined);
            }
        }
        anyhow::bail!("unexpected engine evaluate: {source}")
    });

    let outcome = run_scripted_on(
        engine,
        config_for(dir.path(), &["tests/**"]),
        move |env| {
            let probe = probe.clone();
            async move {
                let client = page_client(&env).await?;
                client
                    .page_handle()
                    .evaluate(
                        "async (page, eventName) => { await page.evaluate((n) => dispatchEvent(new Event(n)), eventName); }",
                        Some(RemoteValue::String("x".into())),
                    )
                    .await?;
                let seen = probe
                    .recorded()
                    .iter()
                    .any(|signal| signal.name == "x");
                anyhow::ensure!(seen, "event x never fired");
                client.done(0);
                Ok(())
            }
        },
    )
    .await?;
    assert_clean(outcome);
    Ok(())
}

#[tokio::test]
async fn handle_drilldown_and_dispose() -> anyhow::Result<()> {
    let dir = test_dir("handles")?;
    let outcome = run_scripted(config_for(dir.path(), &["tests/**"]), |env| async move {
        let client = page_client(&env).await?;
        let page = client.page_handle();

        let object = page.evaluate_handle("() => ({ p: [1, 2] })", None).await?;
        let p = object.get_property("p").await?;
        let value = p.json_value().await?;
        let expected = RemoteValue::array(vec![RemoteValue::Number(1.0), RemoteValue::Number(2.0)]);
        anyhow::ensure!(
            inpagewire::structural_eq(&value, &expected),
            "got {value:?}"
        );

        let missing = object.get_property("not-exist").await?;
        anyhow::ensure!(
            matches!(missing.json_value().await?, RemoteValue::Undefined),
            "missing property should be undefined"
        );

        // Disposal: every subsequent operation names the disposed state.
        p.dispose().await?;
        let err = p.json_value().await.map(|_| ()).unwrap_err();
        anyhow::ensure!(err.to_string().contains("disposed"), "{err}");
        let err = p.get_properties().await.map(|_| ()).unwrap_err();
        anyhow::ensure!(err.to_string().contains("disposed"), "{err}");

        client.done(0);
        Ok(())
    })
    .await?;
    assert_clean(outcome);
    Ok(())
}

#[tokio::test]
async fn handles_pass_as_evaluate_arguments() -> anyhow::Result<()> {
    let dir = test_dir("handle-arg")?;
    let outcome = run_scripted(config_for(dir.path(), &["tests/**"]), |env| async move {
        let client = page_client(&env).await?;
        let page = client.page_handle();

        let y = page.evaluate_handle("() => 'Y'", None).await?;
        let value = page
            .evaluate("(_, passed) => passed", Some(y.as_value()))
            .await?;
        anyhow::ensure!(value.as_str() == Some("Y"), "got {value:?}");
        client.done(0);
        Ok(())
    })
    .await?;
    assert_clean(outcome);
    Ok(())
}

#[tokio::test]
async fn thrown_evaluations_reject_on_the_client() -> anyhow::Result<()> {
    let dir = test_dir("throw")?;
    let outcome = run_scripted(config_for(dir.path(), &["tests/**"]), |env| async move {
        let client = page_client(&env).await?;
        let err = client
            .page_handle()
            .evaluate("(p) => nothing_here", None)
            .await
            .map(|_| ())
            .unwrap_err();
        anyhow::ensure!(
            err.to_string().contains("nothing_here is not defined"),
            "{err}"
        );
        client.done(0);
        Ok(())
    })
    .await?;
    assert_clean(outcome);
    Ok(())
}

// -- Routing ------------------------------------------------------------------

#[tokio::test]
async fn times_one_expires_after_the_first_interception() -> anyhow::Result<()> {
    let dir = test_dir("times")?;
    let outcome = run_scripted(config_for(dir.path(), &["tests/**"]), |env| async move {
        let client = page_client(&env).await?;
        client
            .context_route(
                client.glob("/once")?,
                handler(|route| async move {
                    route.fulfill(FulfillOpts::body_text("routed")).await
                }),
                Some(1),
            )
            .await?;

        let first = client.fetch(FetchRequest::get("/once")).await?;
        anyhow::ensure!(first.text() == "routed", "first: {:?}", first.text());

        // The handler is spent: the default server answers 404.
        let second = client.fetch(FetchRequest::get("/once")).await?;
        anyhow::ensure!(second.status == 404, "second: {}", second.status);

        client.done(0);
        Ok(())
    })
    .await?;
    assert_clean(outcome);
    Ok(())
}

#[tokio::test]
async fn stacked_handlers_are_lifo_and_unroute_peels_them() -> anyhow::Result<()> {
    let dir = test_dir("stack")?;
    let outcome = run_scripted(config_for(dir.path(), &["tests/**"]), |env| async move {
        let client = page_client(&env).await?;
        let matcher = client.glob("/x")?;

        let bottom = handler(|route| async move {
            route.fulfill(FulfillOpts::body_text("bottom")).await
        });
        let top = handler(|route| async move {
            route.fulfill(FulfillOpts::body_text("top")).await
        });
        client
            .context_route(matcher.clone(), bottom.clone(), None)
            .await?;
        client.context_route(matcher.clone(), top.clone(), None).await?;

        let served = client.fetch(FetchRequest::get("/x")).await?;
        anyhow::ensure!(served.text() == "top", "LIFO violated: {:?}", served.text());

        // Remove only the top handler; the bottom one takes over.
        client.context_unroute(&matcher, Some(&top)).await?;
        let served = client.fetch(FetchRequest::get("/x")).await?;
        anyhow::ensure!(served.text() == "bottom", "got {:?}", served.text());

        // Remove everything: pass-through again, and nothing backs /x.
        client.context_unroute(&matcher, None).await?;
        let served = client.fetch(FetchRequest::get("/x")).await?;
        anyhow::ensure!(served.status == 404, "got {}", served.status);

        client.done(0);
        Ok(())
    })
    .await?;
    assert_clean(outcome);
    Ok(())
}

#[tokio::test]
async fn bypass_fetch_escapes_every_matcher() -> anyhow::Result<()> {
    let dir = test_dir("bypass")?;
    let outcome = run_scripted(config_for(dir.path(), &["tests/**"]), |env| async move {
        let client = page_client(&env).await?;
        client
            .context_route(
                client.glob("/b")?,
                handler(|route| async move {
                    route.fulfill(FulfillOpts::body_text("intercepted")).await
                }),
                None,
            )
            .await?;

        // The routed view exists...
        let routed = client.fetch(FetchRequest::get("/b")).await?;
        anyhow::ensure!(routed.text() == "intercepted");

        // ...but the bypass goes straight through, to a 404.
        let bypassed = client.bypass_fetch(FetchRequest::get("/b")).await?;
        anyhow::ensure!(
            bypassed.status == 404,
            "bypass observed a matcher: {} {:?}",
            bypassed.status,
            bypassed.text()
        );

        client.done(0);
        Ok(())
    })
    .await?;
    assert_clean(outcome);
    Ok(())
}

#[tokio::test]
async fn fallback_overrides_feed_the_next_handler_and_continue() -> anyhow::Result<()> {
    let dir = test_dir("fallback")?;
    write_file(dir.path(), "fixtures/data.txt", "from disk");
    let outcome = run_scripted(config_for(dir.path(), &["tests/**"]), |env| async move {
        let client = page_client(&env).await?;
        let matcher = client.glob("/original*")?;

        // Bottom: sees the view with the top handler's override applied.
        client
            .context_route(
                matcher.clone(),
                handler(|route| async move {
                    let view = route.request();
                    anyhow::ensure!(
                        view.url.ends_with("?rewritten=1"),
                        "override not visible: {}",
                        view.url
                    );
                    route.fulfill(FulfillOpts::body_text("rewrote")).await
                }),
                None,
            )
            .await?;
        // Top: falls back with a URL override.
        let base = client.base_url().to_owned();
        client
            .context_route(
                matcher,
                handler(move |route| {
                    let base = base.clone();
                    async move {
                        route.fallback(ContinueOverrides {
                            url: Some(format!("{base}/original?rewritten=1")),
                            ..ContinueOverrides::default()
                        })
                    }
                }),
                None,
            )
            .await?;

        let response = client.fetch(FetchRequest::get("/original")).await?;
        anyhow::ensure!(response.text() == "rewrote", "got {:?}", response.text());

        // A lone fallback ends in the inner continue, which carries the
        // accumulated override toward the network.
        let base = client.base_url().to_owned();
        client
            .context_route(
                client.glob("/redirect-me")?,
                handler(move |route| {
                    let base = base.clone();
                    async move {
                        route.fallback(ContinueOverrides {
                            url: Some(format!("{base}/fixtures/data.txt")),
                            ..ContinueOverrides::default()
                        })
                    }
                }),
                None,
            )
            .await?;
        let response = client.fetch(FetchRequest::get("/redirect-me")).await?;
        anyhow::ensure!(response.text() == "from disk", "got {:?}", response.text());

        client.done(0);
        Ok(())
    })
    .await?;
    assert_clean(outcome);
    Ok(())
}

#[tokio::test]
async fn fulfill_can_serve_a_host_side_file() -> anyhow::Result<()> {
    let dir = test_dir("fulfill-path")?;
    let file = write_file(dir.path(), "payload.json", r#"{"from":"disk"}"#);
    let path = file.to_string_lossy().into_owned();

    let outcome = run_scripted(config_for(dir.path(), &["tests/**"]), move |env| {
        let path = path.clone();
        async move {
            let client = page_client(&env).await?;
            client
                .context_route(
                    client.glob("/data")?,
                    handler(move |route| {
                        let path = path.clone();
                        async move {
                            route
                                .fulfill(FulfillOpts {
                                    path: Some(path),
                                    ..FulfillOpts::default()
                                })
                                .await
                        }
                    }),
                    None,
                )
                .await?;

            let response = client.fetch(FetchRequest::get("/data")).await?;
            anyhow::ensure!(response.text() == r#"{"from":"disk"}"#);
            anyhow::ensure!(
                response.header("content-type") == Some("application/json"),
                "guessed mime missing: {:?}",
                response.headers
            );
            client.done(0);
            Ok(())
        }
    })
    .await?;
    assert_clean(outcome);
    Ok(())
}

// -- Body framing -------------------------------------------------------------

#[tokio::test]
async fn post_bodies_cross_both_directions() -> anyhow::Result<()> {
    let dir = test_dir("bodies")?;
    let outcome = run_scripted(config_for(dir.path(), &["tests/**"]), |env| async move {
        let client = page_client(&env).await?;
        client
            .context_route(
                client.glob("/echo")?,
                handler(|route| async move {
                    let body = route.request().post_data.unwrap_or_default();
                    route
                        .fulfill(FulfillOpts {
                            body: Some(body),
                            content_type: Some("application/octet-stream".into()),
                            ..FulfillOpts::default()
                        })
                        .await
                }),
                None,
            )
            .await?;

        let payload = Bytes::from_static(b"\x00raw\xffbytes");
        let response = client
            .fetch(FetchRequest::post("/echo", payload.clone()))
            .await?;
        anyhow::ensure!(response.body == payload, "echo mangled the body");

        client.done(0);
        Ok(())
    })
    .await?;
    assert_clean(outcome);
    Ok(())
}

#[tokio::test]
async fn zero_byte_bodies_send_no_body_frame() -> anyhow::Result<()> {
    let dir = test_dir("empty-body")?;
    let outcome = run_scripted(config_for(dir.path(), &["tests/**"]), |env| async move {
        let client = page_client(&env).await?;
        client
            .context_route(
                client.glob("/empty")?,
                handler(|route| async move {
                    // hasBody was false, so the view carries no post data.
                    anyhow::ensure!(
                        route.request().post_data.is_none(),
                        "unexpected body frame"
                    );
                    route.fulfill(FulfillOpts::body_text("fine")).await
                }),
                None,
            )
            .await?;

        let response = client
            .fetch(FetchRequest::post("/empty", Bytes::new()))
            .await?;
        anyhow::ensure!(response.text() == "fine");

        client.done(0);
        Ok(())
    })
    .await?;
    assert_clean(outcome);
    Ok(())
}

#[tokio::test]
async fn concurrent_routes_resolve_independently() -> anyhow::Result<()> {
    let dir = test_dir("concurrent")?;
    let outcome = run_scripted(config_for(dir.path(), &["tests/**"]), |env| async move {
        let client = page_client(&env).await?;
        client
            .context_route(
                client.glob("/slow")?,
                handler(|route| async move {
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    route.fulfill(FulfillOpts::body_text("slow")).await
                }),
                None,
            )
            .await?;
        client
            .context_route(
                client.glob("/fast")?,
                handler(|route| async move {
                    route.fulfill(FulfillOpts::body_text("fast")).await
                }),
                None,
            )
            .await?;

        let (slow, fast) = tokio::join!(
            client.fetch(FetchRequest::get("/slow")),
            client.fetch(FetchRequest::get("/fast")),
        );
        anyhow::ensure!(slow?.text() == "slow");
        anyhow::ensure!(fast?.text() == "fast");

        client.done(0);
        Ok(())
    })
    .await?;
    assert_clean(outcome);
    Ok(())
}
