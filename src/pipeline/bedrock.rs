use crate::{
    config::PipelineConfig,
    error::{Result, WorkerError},
    imaging::{decode_rgb, encode_png},
    models::GenerationRequest,
    pipeline::GenerationPipeline,
};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_bedrockruntime::{config::Region, primitives::Blob, Client};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::RgbImage;
use serde::Deserialize;
use serde_json::{json, Value};

const TITAN_MAX_SEED: u64 = 2_147_483_646;

#[derive(Deserialize)]
struct TitanImageResponse {
    #[serde(default)]
    images: Vec<String>,
    error: Option<String>,
}

/// Titan image generator driven in image-variation mode, so the reference
/// image guides the output the same way it does for UNO.
pub struct BedrockPipeline {
    client: Client,
    model_id: String,
}

impl BedrockPipeline {
    pub async fn new(config: &PipelineConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let aws_config = loader.load().await;

        Ok(Self {
            client: Client::new(&aws_config),
            model_id: config.bedrock_model_id.clone(),
        })
    }

    fn build_payload(request: &GenerationRequest) -> Result<Value> {
        let images = request
            .ref_imgs
            .iter()
            .map(|img| encode_png(img).map(|png| STANDARD.encode(png)))
            .collect::<Result<Vec<_>>>()?;

        Ok(json!({
            "taskType": "IMAGE_VARIATION",
            "imageVariationParams": {
                "text": request.prompt,
                "images": images
            },
            "imageGenerationConfig": {
                "numberOfImages": 1,
                "width": request.width,
                "height": request.height,
                "cfgScale": request.guidance,
                "seed": request.seed.min(TITAN_MAX_SEED)
            }
        }))
    }
}

#[async_trait]
impl GenerationPipeline for BedrockPipeline {
    fn model_name(&self) -> &str {
        &self.model_id
    }

    async fn generate(&self, request: GenerationRequest) -> Result<RgbImage> {
        let payload = Self::build_payload(&request)?;
        let request_json = serde_json::to_string(&payload)?;

        log::info!("Generating image with model: {}", self.model_id);

        let response = self
            .client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(request_json.into_bytes()))
            .send()
            .await
            .map_err(|e| WorkerError::AwsError(e.to_string()))?;

        let titan_response: TitanImageResponse =
            serde_json::from_slice(response.body.as_ref())
                .map_err(|e| WorkerError::InferenceError(e.to_string()))?;

        if let Some(error) = titan_response.error {
            return Err(WorkerError::InferenceError(error));
        }
        let encoded = titan_response
            .images
            .into_iter()
            .next()
            .ok_or_else(|| WorkerError::InferenceError("No image generated".into()))?;
        let png = STANDARD
            .decode(encoded)
            .map_err(|e| WorkerError::InferenceError(format!("invalid image payload: {}", e)))?;

        decode_rgb(&png)
    }
}
