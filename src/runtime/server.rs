//! Local development API mirroring the hosted endpoint's synchronous routes.

use crate::{
    error::Result,
    handler::Handler,
    models::{Job, JobOutput},
};
use actix_web::{web, App, HttpResponse, HttpServer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub input: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunResponse {
    pub id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<JobOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResponse {
    fn from_output(id: String, output: JobOutput) -> Self {
        match output {
            JobOutput::Failure { error } => Self {
                id,
                status: "FAILED".into(),
                output: None,
                error: Some(error),
            },
            success => Self {
                id,
                status: "COMPLETED".into(),
                output: Some(success),
                error: None,
            },
        }
    }
}

async fn run_sync(handler: web::Data<Handler>, body: web::Json<RunRequest>) -> HttpResponse {
    let job = Job::new(format!("sync-{}", Uuid::new_v4()), body.into_inner().input);
    let output = handler.handle(&job).await;
    HttpResponse::Ok().json(RunResponse::from_output(job.id, output))
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/runsync", web::post().to(run_sync))
        .route("/run", web::post().to(run_sync))
        .route("/health", web::get().to(health));
}

pub async fn serve(handler: Arc<Handler>, port: u16) -> Result<()> {
    let data = web::Data::from(handler);
    log::info!("🌐 Development API listening on http://127.0.0.1:{}", port);

    HttpServer::new(move || App::new().app_data(data.clone()).configure(routes))
        .bind(("127.0.0.1", port))?
        .run()
        .await?;
    Ok(())
}
