use crate::config::{GenerationParams, PositionEncoding};
use image::RgbImage;

const SEED_MODULUS: i64 = 1 << 31;

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub guidance: f32,
    pub num_steps: u32,
    pub seed: u64,
    pub ref_imgs: Vec<RgbImage>,
    pub pe: PositionEncoding,
}

impl GenerationRequest {
    pub fn new(
        prompt: impl Into<String>,
        params: &GenerationParams,
        ref_imgs: Vec<RgbImage>,
        seed: u64,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            width: params.width,
            height: params.height,
            guidance: params.guidance,
            num_steps: params.num_steps,
            seed,
            ref_imgs,
            pe: params.pe,
        }
    }
}

/// Current unix time in milliseconds, folded into `[0, 2^31)`.
pub fn time_seed() -> u64 {
    chrono::Utc::now().timestamp_millis().rem_euclid(SEED_MODULUS) as u64
}
