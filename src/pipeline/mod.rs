pub mod bedrock;
pub mod remote;

use crate::{
    config::{PipelineBackend, PipelineConfig},
    error::Result,
    models::GenerationRequest,
};
use async_trait::async_trait;
use image::RgbImage;
use reqwest::Client;
use std::sync::Arc;

pub use bedrock::BedrockPipeline;
pub use remote::RemotePipeline;

/// A reference-guided text-to-image model.
#[async_trait]
pub trait GenerationPipeline: Send + Sync {
    /// Identifier reported in job metadata.
    fn model_name(&self) -> &str;

    async fn generate(&self, request: GenerationRequest) -> Result<RgbImage>;
}

/// Builds the configured backend once at startup.
pub async fn build_pipeline(
    config: &PipelineConfig,
    client: Client,
) -> Result<Arc<dyn GenerationPipeline>> {
    let pipeline: Arc<dyn GenerationPipeline> = match config.backend {
        PipelineBackend::Remote => Arc::new(RemotePipeline::new(config.clone(), client).await?),
        PipelineBackend::Bedrock => Arc::new(BedrockPipeline::new(config).await?),
    };

    log::info!(
        "Generation pipeline ready: {} ({})",
        pipeline.model_name(),
        config.backend
    );
    Ok(pipeline)
}
