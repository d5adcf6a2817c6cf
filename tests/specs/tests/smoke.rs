// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end runner scenarios: the real host against the stub engine, with
//! the real client runtime on the bridge.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use inpage::engine::stub::StubEngine;
use inpage::engine::BrowserKind;
use inpage::run;
use inpage_specs::{assert_clean, config_for, page_client, run_scripted, write_file};

#[tokio::test]
async fn empty_test_list_exits_one() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    // A setup file alone matches nothing.
    write_file(dir.path(), "setup.js", "// setup\n");
    let mut config = config_for(dir.path(), &[]);
    config.setup = Some(dir.path().join("setup.js"));

    let (code, _) = run_scripted(config, |_env| async { Ok(()) }).await?;
    assert_eq!(code, 1);
    Ok(())
}

#[tokio::test]
async fn empty_test_file_with_init_done_exits_zero() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), "tests/empty.test.js", "// no tests\n");
    let config = config_for(dir.path(), &["tests/**/*.test.js"]);

    let outcome = run_scripted(config, |env| async move {
        // The setup file's behavior: onInit(() => done(0)).
        let client = page_client(&env).await?;
        let done = client.clone();
        client.on_init(move || async move {
            done.done(0);
            Ok(())
        });
        client.run_init().await;
        Ok(())
    })
    .await?;
    assert_clean(outcome);
    Ok(())
}

#[tokio::test]
async fn throw_during_init_exits_one() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), "tests/broken.test.js", "throw new Error('x');\n");
    let config = config_for(dir.path(), &["tests/**/*.test.js"]);

    let (code, failures) = run_scripted(config, |env| async move {
        let client = page_client(&env).await?;
        client.on_init(move || async move { anyhow::bail!("boom during init") });
        client.run_init().await;
        Ok(())
    })
    .await?;
    assert_eq!(code, 1);
    assert!(failures.is_empty(), "the throw is a test outcome, not a harness failure");
    Ok(())
}

#[tokio::test]
async fn uncaught_error_reports_the_bundled_stack_and_exits_one() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), "tests/broken.test.js", "boom();\n");
    let config = config_for(dir.path(), &["tests/**/*.test.js"]);

    let (code, _) = run_scripted(config, |env| async move {
        // The entry died before done: an uncaught error with a stack
        // pointing into the bundled output.
        let stack = format!(
            "ReferenceError: boom is not defined\n    at {}/test.js:2:1",
            env.base_url
        );
        env.page_error(&stack);
        Ok(())
    })
    .await?;
    assert_eq!(code, 1);
    Ok(())
}

#[tokio::test]
async fn route_fulfill_scenario_exits_zero() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), "tests/route.test.js", "// route test\n");
    let config = config_for(dir.path(), &["tests/**/*.test.js"]);

    let outcome = run_scripted(config, |env| async move {
        let client = page_client(&env).await?;
        client
            .context_route(
                client.glob("/x")?,
                inpageclient::handler(|route| async move {
                    route
                        .fulfill(inpageclient::FulfillOpts::body_text("ok"))
                        .await
                }),
                None,
            )
            .await?;
        let response = client.fetch(inpageclient::FetchRequest::get("/x")).await?;
        anyhow::ensure!(response.text() == "ok", "got {:?}", response.text());
        client.done(0);
        Ok(())
    })
    .await?;
    assert_clean(outcome);
    Ok(())
}

#[tokio::test]
async fn browser_version_scenario_exits_zero() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), "tests/version.test.js", "// version test\n");
    let config = config_for(dir.path(), &["tests/**/*.test.js"]);

    let outcome = run_scripted(config, |env| async move {
        let client = page_client(&env).await?;
        let version = client
            .page_handle()
            .evaluate("(p) => p.context().browser().version()", None)
            .await?;
        match version.as_str() {
            Some(version) if !version.is_empty() => {
                client.done(0);
                Ok(())
            }
            other => anyhow::bail!("unexpected version value: {other:?}"),
        }
    })
    .await?;
    assert_clean(outcome);
    Ok(())
}

#[tokio::test]
async fn unlinked_driver_is_a_startup_error() {
    let err = inpage::engine::resolve(BrowserKind::Webkit).unwrap_err();
    assert!(err.to_string().contains("no driver linked for webkit"));
}

#[tokio::test]
#[serial_test::serial]
async fn coverage_lands_in_the_env_directory_on_chromium() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), "tests/cov.test.js", "// covered\n");
    let coverage_dir = dir.path().join("coverage-out");
    std::env::set_var("NODE_V8_COVERAGE", &coverage_dir);

    let mut config = config_for(dir.path(), &["tests/**/*.test.js"]);
    config.no_cov = false;
    let outcome = run_scripted(config, |env| async move {
        let client = page_client(&env).await?;
        client.done(0);
        Ok(())
    })
    .await;
    std::env::remove_var("NODE_V8_COVERAGE");
    assert_clean(outcome?);

    let entries: Vec<_> = std::fs::read_dir(&coverage_dir)?
        .filter_map(Result::ok)
        .collect();
    assert_eq!(entries.len(), 1);
    Ok(())
}

#[tokio::test]
async fn watch_mode_reruns_after_a_change() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let test_file = write_file(dir.path(), "tests/w.test.js", "// v1\n");
    let mut config = config_for(dir.path(), &["tests/**/*.test.js"]);
    config.watch = true;

    let engine = StubEngine::new();
    let probe = engine.clone();
    engine.set_page_script(|env| async move {
        match page_client(&env).await {
            Ok(client) => client.done(0),
            Err(_) => env.done(1),
        }
    });

    let shutdown = CancellationToken::new();
    let stopper = shutdown.clone();
    let runner = tokio::spawn(run::run_with_engine(config, Arc::new(engine), shutdown));

    // First run completes, then an edit triggers the rebuild and rerun.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while probe.goto_count() < 1 {
        anyhow::ensure!(tokio::time::Instant::now() < deadline, "first run never started");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    std::fs::write(&test_file, "// v2\n")?;

    while probe.goto_count() < 2 {
        anyhow::ensure!(
            tokio::time::Instant::now() < deadline,
            "rerun never happened (goto_count = {})",
            probe.goto_count()
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    stopper.cancel();
    let code = runner.await??;
    assert_eq!(code, 0);
    Ok(())
}
