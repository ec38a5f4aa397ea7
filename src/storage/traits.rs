use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Uploads the file at `local_path` under `object_name`.
    async fn upload_file(&self, local_path: &Path, object_name: &str) -> Result<UploadedFile>;

    /// Public URL for an object in the configured bucket.
    fn download_url(&self, object_name: &str) -> Result<String>;

    fn bucket_name(&self) -> &str;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub file_id: String,
    pub file_name: String,
    pub content_length: u64,
    pub content_sha1: String,
}
