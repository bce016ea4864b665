//! Analysis through the trust-boundary proxy.
//!
//! Wire contract: `POST {prompt, imageUrl? | imageBase64?, model?}` with the
//! caller's key in `X-API-Key`; `{solution}` on success, `{error}` otherwise.

use super::response::interpret_analysis_body;
use super::{http_client, is_auth_status, status_text, AnalysisError, AnalysisProvider, ImageRef};
use crate::safety::redact;
use crate::settings::Credentials;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::time::{Duration, Instant};

pub struct ProxyAnalyzer {
    client: reqwest::Client,
    endpoint: String,
    model: Option<String>,
}

impl ProxyAnalyzer {
    pub fn new(endpoint: impl Into<String>, model: Option<String>, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            endpoint: endpoint.into(),
            model,
        }
    }

    fn request_body(&self, prompt: &str, image: &ImageRef) -> serde_json::Value {
        let mut body = serde_json::json!({ "prompt": prompt });
        match image {
            ImageRef::Url(url) => body["imageUrl"] = url.clone().into(),
            ImageRef::Inline(png) => body["imageBase64"] = STANDARD.encode(png).into(),
        }
        if let Some(model) = &self.model {
            body["model"] = model.clone().into();
        }
        body
    }
}

#[async_trait]
impl AnalysisProvider for ProxyAnalyzer {
    fn name(&self) -> &'static str {
        "proxy"
    }

    async fn analyze(
        &self,
        prompt: &str,
        image: &ImageRef,
        credentials: &Credentials,
    ) -> Result<String, AnalysisError> {
        if credentials.analysis_api_key.is_empty() {
            return Err(AnalysisError::Auth("no analysis API key".to_string()));
        }

        let start = Instant::now();
        let mode = match image {
            ImageRef::Url(_) => "url",
            ImageRef::Inline(png) => {
                log::debug!("[ANALYZE] Sending {} inline bytes", png.len());
                "inline"
            }
        };
        log::info!(
            "[ANALYZE] Calling proxy (image={}, model={})",
            mode,
            self.model.as_deref().unwrap_or("default")
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-Key", &credentials.analysis_api_key)
            .json(&self.request_body(prompt, image))
            .send()
            .await
            .map_err(|e| AnalysisError::Network(redact::scrub(&e.to_string(), credentials)))?;

        let status = response.status();
        log::info!("[ANALYZE] Proxy returned {} in {}ms", status, start.elapsed().as_millis());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v["error"].as_str().map(str::to_string))
                .unwrap_or_else(|| status_text(status));
            let message = redact::scrub(&message, credentials);
            log::error!("[ANALYZE] Proxy error {}: {}", status, message);

            return Err(if is_auth_status(status) {
                AnalysisError::Auth(message)
            } else {
                AnalysisError::UpstreamRejection {
                    status: Some(status.as_u16()),
                    message,
                }
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AnalysisError::MalformedResponse(format!("body is not JSON: {}", e)))?;

        interpret_analysis_body(&body)
    }
}
