use crate::{
    error::Result,
    handler::Handler,
    models::{Job, JobOutput},
};
use serde_json::Value;
use std::path::Path;

pub const TEST_INPUT_FILE: &str = "test_input.json";
const LOCAL_JOB_ID: &str = "local_test";

/// Runs the handler once on a `{"input": {...}}` document.
pub async fn run_test_input(handler: &Handler, raw: &str) -> Result<JobOutput> {
    let job = parse_test_input(raw)?;
    log::info!("🧪 Running local test job {}", job.id);
    Ok(handler.handle(&job).await)
}

pub fn parse_test_input(raw: &str) -> Result<Job> {
    let document: Value = serde_json::from_str(raw)?;
    let id = document
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or(LOCAL_JOB_ID)
        .to_string();
    let input = document.get("input").cloned().unwrap_or(Value::Null);
    Ok(Job::new(id, input))
}

pub fn read_test_input_file(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(std::fs::read_to_string(path)?))
}
