use crate::error::{Result, WorkerError};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_REF_SIZE: u32 = 512;
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_B2_API_URL: &str = "https://api.backblazeb2.com";
pub const DEFAULT_PIPELINE_URL: &str = "http://127.0.0.1:7860";
pub const DEFAULT_BEDROCK_MODEL_ID: &str = "amazon.titan-image-generator-v1";

/// How reference-image tokens are positioned relative to the generated image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionEncoding {
    #[serde(rename = "d")]
    Diagonal,
    #[serde(rename = "h")]
    Height,
    #[serde(rename = "w")]
    Width,
    #[serde(rename = "o")]
    Original,
}

impl PositionEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionEncoding::Diagonal => "d",
            PositionEncoding::Height => "h",
            PositionEncoding::Width => "w",
            PositionEncoding::Original => "o",
        }
    }
}

impl FromStr for PositionEncoding {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "d" => Ok(PositionEncoding::Diagonal),
            "h" => Ok(PositionEncoding::Height),
            "w" => Ok(PositionEncoding::Width),
            "o" => Ok(PositionEncoding::Original),
            other => Err(WorkerError::ConfigError(format!(
                "PE must be one of d, h, w, o; got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineBackend {
    Remote,
    Bedrock,
}

impl FromStr for PipelineBackend {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "remote" => Ok(PipelineBackend::Remote),
            "bedrock" => Ok(PipelineBackend::Bedrock),
            other => Err(WorkerError::ConfigError(format!(
                "PIPELINE_BACKEND must be 'remote' or 'bedrock'; got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for PipelineBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineBackend::Remote => write!(f, "remote"),
            PipelineBackend::Bedrock => write!(f, "bedrock"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub backend: PipelineBackend,
    pub model_type: String,
    pub offload: bool,
    pub only_lora: bool,
    pub lora_rank: u32,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub bedrock_model_id: String,
    pub region: Option<String>,
}

/// Per-job generation hyperparameters. Loaded once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub width: u32,
    pub height: u32,
    pub guidance: f32,
    pub num_steps: u32,
    pub ref_size: u32,
    pub pe: PositionEncoding,
}

#[derive(Debug, Clone)]
pub struct B2Config {
    pub key_id: String,
    pub application_key: String,
    pub bucket_name: String,
    pub api_url: String,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub get_job_url: Option<String>,
    pub post_output_url: Option<String>,
    pub ping_url: Option<String>,
    pub api_key: Option<String>,
    pub pod_id: String,
    pub ping_interval: Duration,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub generation: GenerationParams,
    pub b2: B2Config,
    pub runtime: RuntimeConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            backend: PipelineBackend::Remote,
            model_type: "flux-dev".to_string(),
            offload: false,
            only_lora: true,
            lora_rank: 512,
            endpoint: DEFAULT_PIPELINE_URL.to_string(),
            api_key: None,
            bedrock_model_id: DEFAULT_BEDROCK_MODEL_ID.to_string(),
            region: None,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model_type(mut self, model_type: impl Into<String>) -> Self {
        self.model_type = model_type.into();
        self
    }

    /// The identifier reported in job metadata.
    pub fn model_name(&self) -> &str {
        match self.backend {
            PipelineBackend::Remote => &self.model_type,
            PipelineBackend::Bedrock => &self.bedrock_model_id,
        }
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        GenerationParams {
            width: 512,
            height: 512,
            guidance: 4.0,
            num_steps: 25,
            ref_size: DEFAULT_REF_SIZE,
            pe: PositionEncoding::Diagonal,
        }
    }
}

impl GenerationParams {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_ref_size(mut self, ref_size: u32) -> Self {
        self.ref_size = ref_size;
        self
    }
}

impl B2Config {
    pub fn new(
        key_id: impl Into<String>,
        application_key: impl Into<String>,
        bucket_name: impl Into<String>,
    ) -> Self {
        B2Config {
            key_id: key_id.into(),
            application_key: application_key.into(),
            bucket_name: bucket_name.into(),
            api_url: DEFAULT_B2_API_URL.to_string(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            get_job_url: None,
            post_output_url: None,
            ping_url: None,
            api_key: None,
            pod_id: "local".to_string(),
            ping_interval: Duration::from_millis(10_000),
            port: 8000,
        }
    }
}

impl RuntimeConfig {
    /// True when the job-queue webhooks are configured.
    pub fn has_job_queue(&self) -> bool {
        self.get_job_url.is_some() && self.post_output_url.is_some()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let b2 = match (
            get("B2_KEY_ID"),
            get("B2_APPLICATION_KEY"),
            get("B2_BUCKET_NAME"),
        ) {
            (Some(key_id), Some(application_key), Some(bucket_name)) => {
                let mut b2 = B2Config::new(key_id, application_key, bucket_name);
                if let Some(api_url) = get("B2_API_URL") {
                    b2 = b2.with_api_url(api_url);
                }
                b2
            }
            _ => {
                return Err(WorkerError::ConfigError(
                    "B2_KEY_ID, B2_APPLICATION_KEY, and B2_BUCKET_NAME must be set".into(),
                ))
            }
        };

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            backend: match get("PIPELINE_BACKEND") {
                Some(value) => value.parse()?,
                None => defaults.backend,
            },
            model_type: get("MODEL_TYPE").unwrap_or(defaults.model_type),
            offload: parse_flag(get("OFFLOAD"), defaults.offload),
            only_lora: parse_flag(get("ONLY_LORA"), defaults.only_lora),
            lora_rank: parse_number("LORA_RANK", get("LORA_RANK"), defaults.lora_rank)?,
            endpoint: get("PIPELINE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.endpoint),
            api_key: get("PIPELINE_API_KEY"),
            bedrock_model_id: get("BEDROCK_MODEL_ID").unwrap_or(defaults.bedrock_model_id),
            region: get("AWS_REGION").or_else(|| get("AWS_DEFAULT_REGION")),
        };

        let defaults = GenerationParams::default();
        let ref_size: i64 = parse_number("REF_SIZE", get("REF_SIZE"), -1)?;
        let generation = GenerationParams {
            width: positive("WIDTH", parse_number("WIDTH", get("WIDTH"), defaults.width)?)?,
            height: positive("HEIGHT", parse_number("HEIGHT", get("HEIGHT"), defaults.height)?)?,
            guidance: parse_number("GUIDANCE", get("GUIDANCE"), defaults.guidance)?,
            num_steps: positive(
                "NUM_STEPS",
                parse_number("NUM_STEPS", get("NUM_STEPS"), defaults.num_steps)?,
            )?,
            ref_size: resolve_ref_size(ref_size)?,
            pe: match get("PE") {
                Some(value) => value.parse()?,
                None => defaults.pe,
            },
        };

        let defaults = RuntimeConfig::default();
        let ping_ms: u64 = parse_number(
            "RUNPOD_PING_INTERVAL",
            get("RUNPOD_PING_INTERVAL"),
            defaults.ping_interval.as_millis() as u64,
        )?;
        let runtime = RuntimeConfig {
            get_job_url: get("RUNPOD_WEBHOOK_GET_JOB"),
            post_output_url: get("RUNPOD_WEBHOOK_POST_OUTPUT"),
            ping_url: get("RUNPOD_WEBHOOK_PING"),
            api_key: get("RUNPOD_AI_API_KEY"),
            pod_id: get("RUNPOD_POD_ID").unwrap_or(defaults.pod_id),
            ping_interval: Duration::from_millis(ping_ms.max(1)),
            port: parse_number("PORT", get("PORT"), defaults.port)?,
        };

        Ok(Config {
            pipeline,
            generation,
            b2,
            runtime,
        })
    }
}

fn parse_flag(value: Option<String>, default: bool) -> bool {
    value.map_or(default, |v| v.to_lowercase() == "true")
}

fn parse_number<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        Some(raw) => raw.trim().parse().map_err(|_| {
            WorkerError::ConfigError(format!("{} must be a number, got '{}'", key, raw))
        }),
        None => Ok(default),
    }
}

fn positive(key: &str, value: u32) -> Result<u32> {
    if value == 0 {
        return Err(WorkerError::ConfigError(format!("{} must be positive", key)));
    }
    Ok(value)
}

/// `-1` selects the default reference size.
fn resolve_ref_size(value: i64) -> Result<u32> {
    match value {
        -1 => Ok(DEFAULT_REF_SIZE),
        v if v > 0 && v <= u32::MAX as i64 => Ok(v as u32),
        v => Err(WorkerError::ConfigError(format!(
            "REF_SIZE must be positive or -1, got {}",
            v
        ))),
    }
}
