// src/bin/run_timed_tasks.rs

//! Executes every due timed task once and exits.
//!
//! Meant to be started periodically (cron, systemd timer). Takes an optional
//! dotenv-style configuration file as its only argument.

use std::process::ExitCode;
use std::sync::Arc;

use wte::config::Config;
use wte::timed_tasks::{ActionRegistry, TimedTaskRunner};
use wte::{db, telemetry};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match std::env::args_os().nth(1) {
        Some(path) => Config::from_file(path),
        None => Config::from_env(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::from(2);
        }
    };

    let _guard = telemetry::init_tracing(&config, "timed-tasks.log");

    let pool = match db::connect(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open database");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = db::migrate(&pool).await {
        tracing::error!(error = %e, "Failed to apply migrations");
        return ExitCode::FAILURE;
    }

    let registry = Arc::new(ActionRegistry::with_defaults());
    let runner = TimedTaskRunner::new(pool.clone(), registry, (&config).into());

    let code = match runner.run_once().await {
        // Failed tasks are recorded on their rows; the run itself succeeded.
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Timed task run aborted");
            ExitCode::FAILURE
        }
    };

    pool.close().await;
    code
}
