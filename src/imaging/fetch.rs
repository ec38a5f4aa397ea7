use crate::{
    config::DOWNLOAD_TIMEOUT,
    error::{Result, WorkerError},
    imaging::decode_rgb,
};
use image::RgbImage;
use reqwest::Client;
use std::time::Duration;

#[derive(Clone)]
pub struct ImageFetcher {
    client: Client,
    timeout: Duration,
}

impl ImageFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            timeout: DOWNLOAD_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        log::debug!("Downloading reference image from {}", url);

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.download_error(e))?
            .error_for_status()
            .map_err(|e| self.download_error(e))?;

        let bytes = response.bytes().await.map_err(|e| self.download_error(e))?;

        log::debug!("Downloaded {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }

    fn download_error(&self, e: reqwest::Error) -> WorkerError {
        if e.is_timeout() {
            WorkerError::DownloadError(format!("timed out after {:?}: {}", self.timeout, e))
        } else {
            WorkerError::DownloadError(e.to_string())
        }
    }

    /// Downloads and decodes the image at `url` into RGB.
    pub async fn fetch(&self, url: &str) -> Result<RgbImage> {
        let bytes = self.fetch_bytes(url).await?;
        decode_rgb(&bytes)
    }
}
