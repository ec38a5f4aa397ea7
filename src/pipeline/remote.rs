use crate::{
    config::{PipelineConfig, PositionEncoding},
    error::{Result, WorkerError},
    imaging::{decode_rgb, encode_png},
    models::GenerationRequest,
    pipeline::GenerationPipeline,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::RgbImage;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct RemoteGenerateRequest<'a> {
    model_type: &'a str,
    offload: bool,
    only_lora: bool,
    lora_rank: u32,
    prompt: &'a str,
    width: u32,
    height: u32,
    guidance: f32,
    num_steps: u32,
    seed: u64,
    pe: PositionEncoding,
    ref_imgs: Vec<String>,
}

#[derive(Deserialize)]
struct RemoteGenerateResponse {
    image: Option<String>,
    error: Option<String>,
}

/// Client for a UNO inference server that keeps the model weights resident.
pub struct RemotePipeline {
    client: Client,
    config: PipelineConfig,
}

impl RemotePipeline {
    pub async fn new(config: PipelineConfig, client: Client) -> Result<Self> {
        let pipeline = Self { client, config };

        match pipeline.health_check().await {
            Ok(true) => log::info!("Inference server at {} is ready", pipeline.config.endpoint),
            Ok(false) | Err(_) => log::warn!(
                "Inference server at {} is not ready yet; jobs will fail until it is",
                pipeline.config.endpoint
            ),
        }

        Ok(pipeline)
    }

    pub async fn health_check(&self) -> Result<bool> {
        let response = self
            .authorized(self.client.get(format!("{}/health", self.config.endpoint)))
            .send()
            .await
            .map_err(|e| WorkerError::InferenceError(e.to_string()))?;
        Ok(response.status().is_success())
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => builder.header(header::AUTHORIZATION, format!("Bearer {}", key)),
            None => builder,
        }
    }
}

#[async_trait]
impl GenerationPipeline for RemotePipeline {
    fn model_name(&self) -> &str {
        &self.config.model_type
    }

    async fn generate(&self, request: GenerationRequest) -> Result<RgbImage> {
        let ref_imgs = request
            .ref_imgs
            .iter()
            .map(|img| encode_png(img).map(|png| STANDARD.encode(png)))
            .collect::<Result<Vec<_>>>()?;

        let payload = RemoteGenerateRequest {
            model_type: &self.config.model_type,
            offload: self.config.offload,
            only_lora: self.config.only_lora,
            lora_rank: self.config.lora_rank,
            prompt: &request.prompt,
            width: request.width,
            height: request.height,
            guidance: request.guidance,
            num_steps: request.num_steps,
            seed: request.seed,
            pe: request.pe,
            ref_imgs,
        };

        log::info!(
            "Generating {}x{} image with {} ({} steps, seed {})",
            request.width,
            request.height,
            self.config.model_type,
            request.num_steps,
            request.seed
        );

        let response = self
            .authorized(self.client.post(format!("{}/generate", self.config.endpoint)))
            .json(&payload)
            .send()
            .await
            .map_err(|e| WorkerError::InferenceError(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| WorkerError::InferenceError(e.to_string()))?;
        let body: Option<RemoteGenerateResponse> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            let detail = body.and_then(|b| b.error).unwrap_or(text);
            return Err(WorkerError::InferenceError(format!(
                "inference server returned {}: {}",
                status, detail
            )));
        }

        let body = body.ok_or_else(|| {
            WorkerError::InferenceError("inference server returned malformed JSON".into())
        })?;
        if let Some(error) = body.error {
            return Err(WorkerError::InferenceError(error));
        }
        let encoded = body
            .image
            .ok_or_else(|| WorkerError::InferenceError("No image generated".into()))?;
        let png = STANDARD
            .decode(encoded)
            .map_err(|e| WorkerError::InferenceError(format!("invalid image payload: {}", e)))?;

        decode_rgb(&png).map_err(|e| WorkerError::InferenceError(e.to_string()))
    }
}
