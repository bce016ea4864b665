//! Image-CDN upload (account-scoped images API).
//!
//! `POST {api_base}/accounts/{account}/images/v1` with one multipart `file`
//! field; the first delivery variant in the reply is the public URL.

use super::{http_client, is_auth_status, status_text, UploadError, UploadProvider};
use crate::safety::redact;
use crate::settings::Credentials;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::{Duration, Instant};

pub const DEFAULT_CDN_API_BASE: &str = "https://api.cloudflare.com/client/v4";

pub struct ImageCdnUploader {
    client: reqwest::Client,
    api_base: String,
}

impl ImageCdnUploader {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn upload_url(&self, account_id: &str) -> String {
        format!("{}/accounts/{}/images/v1", self.api_base, account_id)
    }
}

/// First `errors[].message` of an error body, if it has one.
fn first_error_message(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json["errors"][0]["message"].as_str().map(str::to_string)
}

#[async_trait]
impl UploadProvider for ImageCdnUploader {
    fn name(&self) -> &'static str {
        "image-cdn"
    }

    async fn upload(&self, png: &[u8], credentials: &Credentials) -> Result<String, UploadError> {
        if credentials.upload_account_id.is_empty() || credentials.upload_api_token.is_empty() {
            return Err(UploadError::Auth("missing upload account id or token".to_string()));
        }

        let start = Instant::now();
        let part = Part::bytes(png.to_vec())
            .file_name("screenshot.png")
            .mime_str("image/png")
            .map_err(|e| UploadError::Network(e.to_string()))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.upload_url(&credentials.upload_account_id))
            .bearer_auth(&credentials.upload_api_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Network(redact::scrub(&e.to_string(), credentials)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        log::info!(
            "[UPLOAD] image-cdn returned {} in {}ms ({} bytes sent)",
            status,
            start.elapsed().as_millis(),
            png.len()
        );

        if !status.is_success() {
            let message = first_error_message(&body).unwrap_or_else(|| status_text(status));
            let message = redact::scrub(&message, credentials);
            log::error!("[UPLOAD] image-cdn error {}: {}", status, message);
            return Err(if is_auth_status(status) {
                UploadError::Auth(message)
            } else {
                UploadError::QuotaOrService(message)
            });
        }

        let json: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| UploadError::MalformedResponse(format!("body is not JSON: {}", e)))?;

        let success = json["success"].as_bool().unwrap_or(false);
        match json["result"]["variants"][0].as_str() {
            Some(url) if success && !url.is_empty() => Ok(url.to_string()),
            _ => Err(UploadError::MalformedResponse(
                "upload succeeded but no image URL was returned".to_string(),
            )),
        }
    }
}
