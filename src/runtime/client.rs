use crate::{
    config::RuntimeConfig,
    error::{Result, WorkerError},
    models::{Job, JobOutput},
};
use reqwest::{header, Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

const SUBMIT_ATTEMPTS: u32 = 3;
const SUBMIT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// HTTP client for the serverless job queue webhooks.
pub struct JobQueueClient {
    client: Client,
    get_job_url: String,
    post_output_url: String,
    ping_url: Option<String>,
    api_key: Option<String>,
    pod_id: String,
}

impl JobQueueClient {
    pub fn new(config: &RuntimeConfig, client: Client) -> Result<Self> {
        let (Some(get_job_url), Some(post_output_url)) =
            (config.get_job_url.clone(), config.post_output_url.clone())
        else {
            return Err(WorkerError::ConfigError(
                "RUNPOD_WEBHOOK_GET_JOB and RUNPOD_WEBHOOK_POST_OUTPUT must be set".into(),
            ));
        };

        Ok(Self {
            client,
            get_job_url,
            post_output_url,
            ping_url: config.ping_url.clone(),
            api_key: config.api_key.clone(),
            pod_id: config.pod_id.clone(),
        })
    }

    pub fn job_take_url(&self) -> String {
        self.get_job_url.replace("$ID", &self.pod_id)
    }

    pub fn job_done_url(&self, job_id: &str) -> Result<String> {
        let mut url = Url::parse(&self.post_output_url.replace("$ID", job_id))
            .map_err(|e| WorkerError::ConfigError(format!("invalid output webhook: {}", e)))?;
        url.query_pairs_mut().append_pair("isStream", "false");
        Ok(url.to_string())
    }

    pub fn heartbeat_url(&self) -> Option<String> {
        self.ping_url
            .as_ref()
            .map(|url| url.replace("$RUNPOD_POD_ID", &self.pod_id))
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header(header::AUTHORIZATION, key),
            None => builder,
        }
    }

    /// Takes the next job, or `None` when the queue has nothing for us.
    pub async fn next_job(&self) -> Result<Option<Job>> {
        let response = self
            .authorized(self.client.get(self.job_take_url()))
            .send()
            .await
            .map_err(|e| WorkerError::RuntimeError(format!("job fetch failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT || status == StatusCode::BAD_REQUEST {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(WorkerError::RuntimeError(format!(
                "job fetch returned {}",
                status
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| WorkerError::RuntimeError(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        let job: Job = serde_json::from_str(&text)?;
        Ok(Some(job))
    }

    /// Reports the job result, retrying transport failures a few times.
    pub async fn submit(&self, job_id: &str, output: &JobOutput) -> Result<()> {
        let url = self.job_done_url(job_id)?;
        let body = result_body(output);

        let mut last_error = None;
        for attempt in 1..=SUBMIT_ATTEMPTS {
            let sent = self
                .authorized(self.client.post(&url))
                .json(&body)
                .send()
                .await
                .and_then(|r| r.error_for_status());

            match sent {
                Ok(_) => {
                    log::debug!("Submitted result for job {}", job_id);
                    return Ok(());
                }
                Err(e) => {
                    log::warn!(
                        "Submitting job {} failed (attempt {}/{}): {}",
                        job_id,
                        attempt,
                        SUBMIT_ATTEMPTS,
                        e
                    );
                    last_error = Some(e);
                    if attempt < SUBMIT_ATTEMPTS {
                        tokio::time::sleep(SUBMIT_RETRY_DELAY).await;
                    }
                }
            }
        }

        Err(WorkerError::RuntimeError(format!(
            "could not submit result for job {}: {}",
            job_id,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Tells the queue this worker is alive, and which job it is on.
    pub async fn ping(&self, job_id: Option<&str>) -> Result<()> {
        let Some(url) = self.heartbeat_url() else {
            return Ok(());
        };

        let mut request = self.client.get(url);
        if let Some(job_id) = job_id {
            request = request.query(&[("job_id", job_id)]);
        }
        self.authorized(request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| WorkerError::RuntimeError(format!("heartbeat failed: {}", e)))?;
        Ok(())
    }
}

/// `{"output": ...}` for results, `{"error": ...}` for failures.
pub fn result_body(output: &JobOutput) -> Value {
    match output {
        JobOutput::Failure { error } => json!({ "error": error }),
        success => json!({ "output": success }),
    }
}
