use crate::{
    config::B2Config,
    error::{Result, WorkerError},
    storage::traits::{ObjectStorage, UploadedFile},
};
use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use sha1::{Digest, Sha1};
use std::path::Path;
use tokio::sync::RwLock;
use url::Url;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeResponse {
    account_id: String,
    authorization_token: String,
    api_url: String,
    download_url: String,
}

#[derive(Debug, Deserialize)]
struct ListBucketsResponse {
    buckets: Vec<Bucket>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Bucket {
    bucket_id: String,
    bucket_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadUrlResponse {
    upload_url: String,
    authorization_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadFileResponse {
    file_id: String,
    file_name: String,
    content_length: u64,
    content_sha1: String,
}

#[derive(Debug, Deserialize)]
struct B2ErrorBody {
    code: String,
    message: String,
}

/// Error codes B2 returns with 401 when the account token must be renewed.
const EXPIRED_AUTH_CODES: [&str; 2] = ["expired_auth_token", "bad_auth_token"];

/// Account token and API host from the latest `b2_authorize_account`.
#[derive(Debug, Clone)]
struct AuthState {
    authorization_token: String,
    api_url: String,
}

/// Backblaze B2 native API client bound to a single bucket.
///
/// Account tokens expire after a day; an upload that hits an expired token
/// re-authorizes once and asks for a fresh upload URL.
pub struct B2Storage {
    client: Client,
    config: B2Config,
    auth: RwLock<AuthState>,
    bucket_name: String,
    bucket_id: String,
    download_url: String,
}

impl B2Storage {
    /// Authorizes the account and resolves the bucket id.
    pub async fn new(config: B2Config, client: Client) -> Result<Self> {
        let auth = authorize(&client, &config).await?;

        let response = client
            .post(format!("{}/b2api/v2/b2_list_buckets", auth.api_url))
            .header(header::AUTHORIZATION, &auth.authorization_token)
            .json(&json!({
                "accountId": auth.account_id,
                "bucketName": config.bucket_name
            }))
            .send()
            .await
            .map_err(|e| WorkerError::StorageError(format!("B2 bucket lookup failed: {}", e)))?;
        let listing: ListBucketsResponse = parse_response(response, "b2_list_buckets").await?;

        let bucket = listing
            .buckets
            .into_iter()
            .find(|b| b.bucket_name == config.bucket_name)
            .ok_or_else(|| {
                WorkerError::StorageError(format!("B2 bucket '{}' not found", config.bucket_name))
            })?;

        log::info!("Connected to B2 bucket {}", bucket.bucket_name);

        Ok(Self {
            client,
            config,
            auth: RwLock::new(AuthState {
                authorization_token: auth.authorization_token,
                api_url: auth.api_url,
            }),
            bucket_name: bucket.bucket_name,
            bucket_id: bucket.bucket_id,
            download_url: auth.download_url,
        })
    }

    async fn get_upload_url(&self) -> Result<UploadUrlResponse> {
        let auth = self.auth.read().await.clone();
        match self.request_upload_url(&auth).await? {
            Some(target) => Ok(target),
            None => {
                log::info!("B2 authorization expired, re-authorizing");
                let auth = self.reauthorize(&auth.authorization_token).await?;
                self.request_upload_url(&auth).await?.ok_or_else(|| {
                    WorkerError::StorageError(
                        "b2_get_upload_url rejected a freshly issued token".into(),
                    )
                })
            }
        }
    }

    /// `None` when B2 rejects the account token as expired.
    async fn request_upload_url(&self, auth: &AuthState) -> Result<Option<UploadUrlResponse>> {
        let response = self
            .client
            .post(format!("{}/b2api/v2/b2_get_upload_url", auth.api_url))
            .header(header::AUTHORIZATION, &auth.authorization_token)
            .json(&json!({ "bucketId": self.bucket_id }))
            .send()
            .await
            .map_err(|e| WorkerError::StorageError(e.to_string()))?;

        parse_unless_expired(response, "b2_get_upload_url").await
    }

    /// Replaces the account token unless another caller already did.
    async fn reauthorize(&self, stale_token: &str) -> Result<AuthState> {
        let mut auth = self.auth.write().await;
        if auth.authorization_token == stale_token {
            let fresh = authorize(&self.client, &self.config).await?;
            *auth = AuthState {
                authorization_token: fresh.authorization_token,
                api_url: fresh.api_url,
            };
        }
        Ok(auth.clone())
    }
}

async fn authorize(client: &Client, config: &B2Config) -> Result<AuthorizeResponse> {
    let response = client
        .get(format!(
            "{}/b2api/v2/b2_authorize_account",
            config.api_url.trim_end_matches('/')
        ))
        .basic_auth(&config.key_id, Some(&config.application_key))
        .send()
        .await
        .map_err(|e| WorkerError::StorageError(format!("B2 authorization failed: {}", e)))?;
    parse_response(response, "b2_authorize_account").await
}

#[async_trait]
impl ObjectStorage for B2Storage {
    async fn upload_file(&self, local_path: &Path, object_name: &str) -> Result<UploadedFile> {
        let bytes = tokio::fs::read(local_path).await?;
        let sha1 = hex::encode(Sha1::digest(&bytes));
        let target = self.get_upload_url().await?;

        log::debug!(
            "Uploading {} ({} bytes) to B2 bucket {}",
            object_name,
            bytes.len(),
            self.bucket_name
        );

        let response = self
            .client
            .post(&target.upload_url)
            .header(header::AUTHORIZATION, &target.authorization_token)
            .header("X-Bz-File-Name", encode_file_name(object_name))
            .header(header::CONTENT_TYPE, content_type_for(object_name))
            .header("X-Bz-Content-Sha1", &sha1)
            .body(bytes)
            .send()
            .await
            .map_err(|e| WorkerError::StorageError(e.to_string()))?;

        let uploaded: UploadFileResponse = parse_response(response, "b2_upload_file").await?;
        Ok(UploadedFile {
            file_id: uploaded.file_id,
            file_name: uploaded.file_name,
            content_length: uploaded.content_length,
            content_sha1: uploaded.content_sha1,
        })
    }

    fn download_url(&self, object_name: &str) -> Result<String> {
        build_download_url(&self.download_url, &self.bucket_name, object_name)
    }

    fn bucket_name(&self) -> &str {
        &self.bucket_name
    }
}

async fn parse_response<T: DeserializeOwned>(response: Response, operation: &str) -> Result<T> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| WorkerError::StorageError(e.to_string()))?;

    if !status.is_success() {
        return Err(call_failed(operation, status, text));
    }

    serde_json::from_str(&text).map_err(|e| {
        WorkerError::StorageError(format!("{} response malformed: {}", operation, e))
    })
}

async fn parse_unless_expired<T: DeserializeOwned>(
    response: Response,
    operation: &str,
) -> Result<Option<T>> {
    if response.status() != StatusCode::UNAUTHORIZED {
        return parse_response(response, operation).await.map(Some);
    }

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| WorkerError::StorageError(e.to_string()))?;
    match serde_json::from_str::<B2ErrorBody>(&text) {
        Ok(body) if EXPIRED_AUTH_CODES.contains(&body.code.as_str()) => Ok(None),
        _ => Err(call_failed(operation, status, text)),
    }
}

fn call_failed(operation: &str, status: StatusCode, text: String) -> WorkerError {
    let detail = match serde_json::from_str::<B2ErrorBody>(&text) {
        Ok(body) => format!("{} ({})", body.message, body.code),
        Err(_) => text,
    };
    WorkerError::StorageError(format!("{} returned {}: {}", operation, status, detail))
}

/// `{downloadUrl}/file/{bucket}/{name}` with each path segment percent-encoded.
fn build_download_url(base: &str, bucket_name: &str, object_name: &str) -> Result<String> {
    let mut url = Url::parse(base)
        .map_err(|e| WorkerError::StorageError(format!("invalid B2 download URL: {}", e)))?;
    url.path_segments_mut()
        .map_err(|_| WorkerError::StorageError(format!("invalid B2 download URL: {}", base)))?
        .pop_if_empty()
        .push("file")
        .push(bucket_name)
        .extend(object_name.split('/'));
    Ok(url.to_string())
}

fn encode_file_name(name: &str) -> String {
    url::form_urlencoded::byte_serialize(name.as_bytes()).collect()
}

fn content_type_for(name: &str) -> &'static str {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
        Some(ext) if ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg") => {
            "image/jpeg"
        }
        _ => "b2/x-auto",
    }
}
