//! Object-storage bucket upload.
//!
//! Objects are written once under a fresh key (`x-upsert: false`) and read
//! back through the bucket's public path, so no separate publish step exists.

use super::{http_client, is_auth_status, status_text, UploadError, UploadProvider};
use crate::safety::redact;
use crate::settings::Credentials;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub struct ObjectStorageUploader {
    client: reqwest::Client,
    /// May contain `{account}`, replaced by the upload account id.
    endpoint: String,
    bucket: String,
    counter: AtomicU64,
}

impl ObjectStorageUploader {
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            counter: AtomicU64::new(0),
        }
    }

    fn endpoint_for(&self, account_id: &str) -> String {
        self.endpoint.replace("{account}", account_id)
    }

    /// `captures/<unix-millis>-<sha256 prefix>.png`. The per-uploader counter
    /// keeps two identical snips in the same millisecond apart.
    fn object_key(&self, png: &[u8]) -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut hasher = Sha256::new();
        hasher.update(png);
        hasher.update(seq.to_le_bytes());
        let digest = format!("{:x}", hasher.finalize());
        format!("captures/{}-{}.png", millis, &digest[..12])
    }
}

#[async_trait]
impl UploadProvider for ObjectStorageUploader {
    fn name(&self) -> &'static str {
        "object-storage"
    }

    async fn upload(&self, png: &[u8], credentials: &Credentials) -> Result<String, UploadError> {
        if credentials.upload_api_token.is_empty() {
            return Err(UploadError::Auth("missing upload token".to_string()));
        }

        let start = Instant::now();
        let base = self.endpoint_for(&credentials.upload_account_id);
        let key = self.object_key(png);

        let part = Part::bytes(png.to_vec())
            .file_name("screenshot.png")
            .mime_str("image/png")
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let response = self
            .client
            .post(format!("{}/object/{}/{}", base, self.bucket, key))
            .bearer_auth(&credentials.upload_api_token)
            .header("x-upsert", "false")
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .map_err(|e| UploadError::Network(redact::scrub(&e.to_string(), credentials)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        log::info!(
            "[UPLOAD] object-storage returned {} for {} in {}ms",
            status,
            key,
            start.elapsed().as_millis()
        );

        if !status.is_success() {
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| {
                    v["message"]
                        .as_str()
                        .or_else(|| v["error"].as_str())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| status_text(status));
            let message = redact::scrub(&message, credentials);
            log::error!("[UPLOAD] object-storage error {}: {}", status, message);
            return Err(if is_auth_status(status) {
                UploadError::Auth(message)
            } else {
                UploadError::QuotaOrService(message)
            });
        }

        let stored = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["Key"].as_str().map(str::to_string));
        if stored.is_none() {
            return Err(UploadError::MalformedResponse(
                "storage did not acknowledge the object key".to_string(),
            ));
        }

        Ok(format!("{}/object/public/{}/{}", base, self.bucket, key))
    }
}
