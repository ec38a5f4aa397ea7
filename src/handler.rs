use crate::{
    config::GenerationParams,
    error::Result,
    imaging::{encode_png, preprocess_ref, ImageFetcher},
    logger,
    models::{time_seed, GenerationRequest, Job, JobInput, JobMetadata, JobOutput},
    pipeline::GenerationPipeline,
    storage::ObjectStorage,
};
use image::RgbImage;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

pub const MISSING_FIELDS_ERROR: &str = "Both 'prompt' and 'image_url' are required";

/// Runs one job end to end: download, preprocess, generate, upload.
/// Every stage failure becomes a `JobOutput::Failure`; nothing is retried.
pub struct Handler {
    fetcher: ImageFetcher,
    pipeline: Arc<dyn GenerationPipeline>,
    storage: Arc<dyn ObjectStorage>,
    params: GenerationParams,
}

impl Handler {
    pub fn new(
        fetcher: ImageFetcher,
        pipeline: Arc<dyn GenerationPipeline>,
        storage: Arc<dyn ObjectStorage>,
        params: GenerationParams,
    ) -> Self {
        Self {
            fetcher,
            pipeline,
            storage,
            params,
        }
    }

    pub async fn handle(&self, job: &Job) -> JobOutput {
        let started = Instant::now();

        let Some(input) = JobInput::from_value(&job.input) else {
            log::warn!("Job {} rejected: missing prompt or image_url", job.id);
            return JobOutput::failure(MISSING_FIELDS_ERROR);
        };

        let reference = {
            let _timer = logger::timer("download");
            match self.fetcher.fetch(&input.image_url).await {
                Ok(image) => image,
                Err(e) => {
                    log::error!("Job {}: failed to download image: {}", job.id, e);
                    return JobOutput::failure(format!("Failed to download image: {}", e));
                }
            }
        };

        let generated = {
            let _timer = logger::timer("inference");
            match self.generate(input.prompt, &reference).await {
                Ok(image) => image,
                Err(e) => {
                    log::error!("Job {}: inference failed: {}", job.id, e);
                    return JobOutput::failure(format!("Inference failed: {}", e));
                }
            }
        };

        let (url, file_name) = {
            let _timer = logger::timer("upload");
            match self.save_and_upload(&generated).await {
                Ok(uploaded) => uploaded,
                Err(e) => {
                    log::error!("Job {}: upload to B2 failed: {}", job.id, e);
                    return JobOutput::failure(format!("Upload to Backblaze B2 failed: {}", e));
                }
            }
        };

        let time_ms = started.elapsed().as_millis() as u64;
        log::info!("Job {} finished in {}ms: {}", job.id, time_ms, url);

        JobOutput::Success {
            image: url,
            metadata: JobMetadata {
                model: self.pipeline.model_name().to_string(),
                time_ms,
                b2_file: file_name,
            },
        }
    }

    async fn generate(&self, prompt: String, reference: &RgbImage) -> Result<RgbImage> {
        let ref_imgs = vec![preprocess_ref(reference, self.params.ref_size)?];
        let request = GenerationRequest::new(prompt, &self.params, ref_imgs, time_seed());
        self.pipeline.generate(request).await
    }

    /// Writes the image to a temporary PNG and uploads it as `<uuid>.png`.
    async fn save_and_upload(&self, image: &RgbImage) -> Result<(String, String)> {
        let png = encode_png(image)?;
        let tmp = tempfile::Builder::new().suffix(".png").tempfile()?;
        tokio::fs::write(tmp.path(), &png).await?;

        let file_name = format!("{}.png", Uuid::new_v4());
        let uploaded = self.storage.upload_file(tmp.path(), &file_name).await?;
        log::debug!(
            "Uploaded {} ({} bytes) to {} as {}",
            uploaded.file_name,
            uploaded.content_length,
            self.storage.bucket_name(),
            uploaded.file_id
        );
        let url = self.storage.download_url(&file_name)?;

        Ok((url, file_name))
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use crate::{
        error::{Result, WorkerError},
        imaging::decode_rgb,
        models::GenerationRequest,
        pipeline::GenerationPipeline,
        storage::{ObjectStorage, UploadedFile},
    };
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakePipeline {
        pub fail_with: Option<String>,
        pub requests: Mutex<Vec<GenerationRequest>>,
    }

    #[async_trait]
    impl GenerationPipeline for FakePipeline {
        fn model_name(&self) -> &str {
            "flux-dev"
        }

        async fn generate(&self, request: GenerationRequest) -> Result<RgbImage> {
            let (width, height) = (request.width, request.height);
            self.requests.lock().unwrap().push(request);
            match &self.fail_with {
                Some(message) => Err(WorkerError::InferenceError(message.clone())),
                None => Ok(RgbImage::from_pixel(width, height, Rgb([200, 100, 50]))),
            }
        }
    }

    #[derive(Default)]
    pub struct FakeStorage {
        pub fail_with: Option<String>,
        pub uploads: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl ObjectStorage for FakeStorage {
        async fn upload_file(&self, local_path: &Path, object_name: &str) -> Result<UploadedFile> {
            if let Some(message) = &self.fail_with {
                return Err(WorkerError::StorageError(message.clone()));
            }
            let bytes = tokio::fs::read(local_path).await?;
            decode_rgb(&bytes)?;
            let uploaded = UploadedFile {
                file_id: "fake".into(),
                file_name: object_name.into(),
                content_length: bytes.len() as u64,
                content_sha1: String::new(),
            };
            self.uploads
                .lock()
                .unwrap()
                .push((object_name.to_string(), bytes));
            Ok(uploaded)
        }

        fn download_url(&self, object_name: &str) -> Result<String> {
            Ok(format!("https://cdn.test/file/outputs/{}", object_name))
        }

        fn bucket_name(&self) -> &str {
            "outputs"
        }
    }
}
