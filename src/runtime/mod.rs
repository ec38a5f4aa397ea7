pub mod client;
pub mod local;
#[cfg(feature = "server")]
pub mod server;
pub mod worker;

use crate::{
    config::RuntimeConfig,
    error::{Result, WorkerError},
};

pub use client::JobQueueClient;
pub use worker::Worker;

/// Where jobs come from for this process.
#[derive(Debug, Clone, PartialEq)]
pub enum RunMode {
    /// Run one job from a JSON document and exit.
    TestInput(String),
    /// Serve the local development API.
    ServeApi,
    /// Poll the job queue webhooks.
    JobQueue,
}

/// Explicit flags win, then the job queue, then a `test_input.json` file.
pub fn select_mode(
    cli_test_input: Option<String>,
    serve_api: bool,
    runtime: &RuntimeConfig,
    test_input_file: Option<String>,
) -> Result<RunMode> {
    if let Some(raw) = cli_test_input {
        return Ok(RunMode::TestInput(raw));
    }
    if serve_api {
        if cfg!(feature = "server") {
            return Ok(RunMode::ServeApi);
        }
        return Err(WorkerError::ConfigError(
            "--serve-api requires the 'server' feature".into(),
        ));
    }
    if runtime.has_job_queue() {
        return Ok(RunMode::JobQueue);
    }
    if let Some(raw) = test_input_file {
        return Ok(RunMode::TestInput(raw));
    }

    Err(WorkerError::ConfigError(
        "no job source: set RUNPOD_WEBHOOK_GET_JOB/RUNPOD_WEBHOOK_POST_OUTPUT, pass --test-input, or provide test_input.json".into(),
    ))
}
