use crate::{
    error::Result,
    handler::Handler,
    models::Job,
    runtime::client::JobQueueClient,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const FETCH_ERROR_BACKOFF: Duration = Duration::from_secs(1);
const IDLE_BACKOFF: Duration = Duration::from_millis(200);

/// Pulls jobs from the queue one at a time and reports their results.
pub struct Worker {
    handler: Arc<Handler>,
    queue: Arc<JobQueueClient>,
    ping_interval: Duration,
}

impl Worker {
    pub fn new(handler: Arc<Handler>, queue: JobQueueClient, ping_interval: Duration) -> Self {
        Self {
            handler,
            queue: Arc::new(queue),
            ping_interval,
        }
    }

    /// Runs until Ctrl-C. A job in progress is finished and reported first.
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (current_job, watched) = watch::channel(None::<String>);
        let heartbeat = tokio::spawn(heartbeat(self.queue.clone(), watched, self.ping_interval));
        tokio::pin!(shutdown);

        log::info!("👷 Worker started, waiting for jobs");
        loop {
            // A job fetch is never cancelled: the queue may already have
            // handed the job to us.
            let stopping = tokio::select! {
                biased;
                _ = &mut shutdown => true,
                _ = std::future::ready(()) => false,
            };
            if stopping {
                break;
            }

            let backoff = match self.queue.next_job().await {
                Ok(Some(job)) => {
                    self.process(job, &current_job).await;
                    continue;
                }
                Ok(None) => IDLE_BACKOFF,
                Err(e) => {
                    log::warn!("Could not fetch a job: {}", e);
                    FETCH_ERROR_BACKOFF
                }
            };

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(backoff) => {}
            }
        }

        heartbeat.abort();
        log::info!("👋 Worker stopped");
        Ok(())
    }

    async fn process(&self, job: Job, current_job: &watch::Sender<Option<String>>) {
        log::info!("📥 Received job {}", job.id);
        current_job.send_replace(Some(job.id.clone()));

        let output = self.handler.handle(&job).await;
        if let Err(e) = self.queue.submit(&job.id, &output).await {
            log::error!("{}", e);
        }

        current_job.send_replace(None);
    }
}

async fn heartbeat(
    queue: Arc<JobQueueClient>,
    current_job: watch::Receiver<Option<String>>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let job_id = current_job.borrow().clone();
        if let Err(e) = queue.ping(job_id.as_deref()).await {
            log::debug!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GenerationParams, RuntimeConfig};
    use crate::handler::fakes::{FakePipeline, FakeStorage};
    use crate::imaging::{encode_png, ImageFetcher};
    use crate::test_support::{Reply, TestServer};
    use image::{Rgb, RgbImage};
    use reqwest::Client;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, OnceLock};

    #[tokio::test]
    async fn processes_one_job_and_stops_on_shutdown() {
        let png = encode_png(&RgbImage::from_pixel(40, 40, Rgb([5, 5, 5]))).unwrap();
        let base: Arc<OnceLock<String>> = Arc::new(OnceLock::new());
        let base_in = base.clone();
        let handed_out = AtomicBool::new(false);

        let server = TestServer::start(move |req| {
            let base = base_in.get().cloned().unwrap_or_default();
            if req.path.starts_with("/job-take") {
                if handed_out.swap(true, Ordering::SeqCst) {
                    return Reply::status("204 No Content");
                }
                return Reply::json(json!({
                    "id": "job-1",
                    "input": {"prompt": "a bridge", "image_url": format!("{}/ref.png", base)}
                }));
            }
            if req.path == "/ref.png" {
                return Reply::ok("image/png", png.clone());
            }
            Reply::json(json!({}))
        })
        .await;
        base.set(server.base().to_string()).unwrap();

        let runtime = RuntimeConfig {
            get_job_url: Some(server.url("/job-take/$ID")),
            post_output_url: Some(server.url("/job-done/$ID")),
            ping_url: Some(server.url("/ping/$RUNPOD_POD_ID")),
            ..Default::default()
        };
        let handler = Arc::new(Handler::new(
            ImageFetcher::new(Client::new()),
            Arc::new(FakePipeline::default()),
            Arc::new(FakeStorage::default()),
            GenerationParams::default().with_size(32, 32).with_ref_size(32),
        ));
        let queue = JobQueueClient::new(&runtime, Client::new()).unwrap();
        let worker = Worker::new(handler, queue, Duration::from_millis(50));

        worker
            .run_until(tokio::time::sleep(Duration::from_millis(800)))
            .await
            .unwrap();

        let requests = server.requests();
        let done = requests
            .iter()
            .find(|r| r.path.starts_with("/job-done/job-1"))
            .expect("result was submitted");
        let body = done.json();
        assert_eq!(body["output"]["metadata"]["model"], "flux-dev");
        assert!(body["output"]["image"].as_str().unwrap().ends_with(".png"));
        assert!(requests.iter().any(|r| r.path.starts_with("/ping/local")));
    }

    #[tokio::test]
    async fn shutdown_waits_for_an_in_flight_job_fetch() {
        let png = encode_png(&RgbImage::from_pixel(40, 40, Rgb([5, 5, 5]))).unwrap();
        let base: Arc<OnceLock<String>> = Arc::new(OnceLock::new());
        let base_in = base.clone();

        let server = TestServer::start(move |req| {
            let base = base_in.get().cloned().unwrap_or_default();
            if req.path.starts_with("/job-take") {
                return Reply::json(json!({
                    "id": "job-slow",
                    "input": {"prompt": "p", "image_url": format!("{}/ref.png", base)}
                }))
                .after(Duration::from_millis(400));
            }
            if req.path == "/ref.png" {
                return Reply::ok("image/png", png.clone());
            }
            Reply::json(json!({}))
        })
        .await;
        base.set(server.base().to_string()).unwrap();

        let runtime = RuntimeConfig {
            get_job_url: Some(server.url("/job-take/$ID")),
            post_output_url: Some(server.url("/job-done/$ID")),
            ..Default::default()
        };
        let handler = Arc::new(Handler::new(
            ImageFetcher::new(Client::new()),
            Arc::new(FakePipeline::default()),
            Arc::new(FakeStorage::default()),
            GenerationParams::default().with_size(32, 32).with_ref_size(32),
        ));
        let queue = JobQueueClient::new(&runtime, Client::new()).unwrap();
        let worker = Worker::new(handler, queue, Duration::from_secs(60));

        // shutdown fires while the first take is still waiting on the queue
        worker
            .run_until(tokio::time::sleep(Duration::from_millis(100)))
            .await
            .unwrap();

        let requests = server.requests();
        assert_eq!(requests.iter().filter(|r| r.path.starts_with("/job-take")).count(), 1);
        assert!(requests.iter().any(|r| r.path.starts_with("/job-done/job-slow")));
    }
}
