//! Serverless worker for reference-guided image generation.
//!
//! A job carries a prompt and a reference image URL. The worker downloads and
//! normalizes the reference image, runs the UNO generation pipeline, uploads
//! the result to Backblaze B2 and reports the public URL back to the queue.

pub mod config;
pub mod error;
pub mod handler;
pub mod imaging;
pub mod logger;
pub mod models;
pub mod pipeline;
pub mod runtime;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use config::{Config, GenerationParams, PipelineConfig};
pub use error::{Result, WorkerError};
pub use handler::Handler;
pub use models::{Job, JobMetadata, JobOutput};
pub use pipeline::{build_pipeline, GenerationPipeline};
pub use storage::{B2Storage, ObjectStorage};
