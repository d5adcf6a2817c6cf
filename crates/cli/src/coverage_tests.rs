// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn writes_one_file_per_run() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let sink = V8CoverageDir::new(dir.path().join("cov"));

    sink.write(&serde_json::json!({ "result": [] })).await?;
    sink.write(&serde_json::json!({ "result": [] })).await?;

    let files: Vec<_> = std::fs::read_dir(dir.path().join("cov"))?
        .filter_map(Result::ok)
        .collect();
    assert_eq!(files.len(), 2);
    for file in files {
        let name = file.file_name().to_string_lossy().into_owned();
        assert!(name.starts_with("coverage-") && name.ends_with(".json"), "{name}");
        let body: serde_json::Value = serde_json::from_slice(&std::fs::read(file.path())?)?;
        assert!(body["result"].is_array());
    }
    Ok(())
}

#[test]
#[serial_test::serial]
fn from_env_reads_the_coverage_directory() {
    // Temporarily steer the sink through the environment.
    let previous = std::env::var_os(COVERAGE_DIR_ENV);
    std::env::set_var(COVERAGE_DIR_ENV, "/tmp/cov-target");
    let sink = V8CoverageDir::from_env();
    assert_eq!(
        sink.map(|sink| sink.dir().clone()),
        Some(std::path::PathBuf::from("/tmp/cov-target"))
    );

    std::env::remove_var(COVERAGE_DIR_ENV);
    assert!(V8CoverageDir::from_env().is_none());

    match previous {
        Some(value) => std::env::set_var(COVERAGE_DIR_ENV, value),
        None => std::env::remove_var(COVERAGE_DIR_ENV),
    }
}
