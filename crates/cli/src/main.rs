// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use inpage::config::Config;
use inpage::run;

#[tokio::main]
async fn main() {
    let config = Config::parse();
    run::init_tracing(&config);

    let runs = match config.load_runs() {
        Ok(runs) => runs,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(2);
        }
    };

    // Sequential runs; a nonzero code is never overwritten by a later zero.
    let mut exit_code = 0;
    for run_config in runs {
        match run::run(run_config).await {
            Ok(code) => exit_code = exit_code.max(code),
            Err(e) => {
                error!("fatal: {e:#}");
                exit_code = exit_code.max(1);
            }
        }
    }
    std::process::exit(exit_code);
}
