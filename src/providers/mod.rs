//! Upload and analysis providers: the pipeline's external services.
//!
//! Both are traits so the backend is a strategy picked at composition time;
//! the pipeline never knows which image host or proxy it is talking to.

mod image_cdn;
mod object_storage;
mod proxy;
mod response;

pub use image_cdn::{ImageCdnUploader, DEFAULT_CDN_API_BASE};
pub use object_storage::ObjectStorageUploader;
pub use proxy::ProxyAnalyzer;
pub use response::{interpret_analysis_body, BLOCKED_PREFIX};

use crate::settings::Credentials;
use async_trait::async_trait;
use std::time::Duration;

/// Default bound on any single provider call.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How the image reaches the analysis provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    /// Publicly readable URL returned by an upload provider.
    Url(String),
    /// PNG bytes sent inline, skipping the upload step.
    Inline(Vec<u8>),
}

#[async_trait]
pub trait UploadProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Stores `png` as a new object and returns a URL anyone can read.
    async fn upload(&self, png: &[u8], credentials: &Credentials) -> Result<String, UploadError>;
}

#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn analyze(
        &self,
        prompt: &str,
        image: &ImageRef,
        credentials: &Credentials,
    ) -> Result<String, AnalysisError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("Upload rejected credentials: {0}")]
    Auth(String),

    #[error("Upload failed to reach the server: {0}")]
    Network(String),

    #[error("Upload failed: {0}")]
    QuotaOrService(String),

    #[error("Upload succeeded but returned no usable URL: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    #[error("Analysis rejected credentials: {0}")]
    Auth(String),

    #[error("Analysis failed to reach the proxy: {0}")]
    Network(String),

    #[error("API Proxy Error: {message}")]
    UpstreamRejection { status: Option<u16>, message: String },

    #[error("Unexpected response from the proxy: {0}")]
    MalformedResponse(String),
}

/// Shared `reqwest` client with a bounded request timeout.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            log::warn!("[HTTP] Client builder failed ({}), using defaults", e);
            reqwest::Client::new()
        })
}

/// `"401 Unauthorized"` style text for a status with no readable body.
pub(crate) fn status_text(status: reqwest::StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

pub(crate) fn is_auth_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
}
