//! Runtime configuration, read once at startup.
//!
//! Values come from the process environment after loading an optional `.env`
//! file. Parsing goes through a lookup closure so tests never touch the real
//! environment.

use crate::capture::{Rect, COMPOSITOR_SETTLE_MS};
use crate::pipeline::{ImageDelivery, SingleCapturePipeline};
use crate::prompts::PromptKind;
use crate::providers::{
    ImageCdnUploader, ObjectStorageUploader, ProxyAnalyzer, DEFAULT_CDN_API_BASE,
    DEFAULT_TIMEOUT_SECS,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-lite";
pub const DEFAULT_BUCKET: &str = "captures";

const KEY_PROXY_URL: &str = "SNAPLENS_PROXY_URL";
const KEY_MODEL: &str = "SNAPLENS_MODEL";
const KEY_UPLOAD_BACKEND: &str = "SNAPLENS_UPLOAD_BACKEND";
const KEY_CDN_API_BASE: &str = "SNAPLENS_CDN_API_BASE";
const KEY_BUCKET_ENDPOINT: &str = "SNAPLENS_BUCKET_ENDPOINT";
const KEY_BUCKET_NAME: &str = "SNAPLENS_BUCKET_NAME";
const KEY_TIMEOUT_SECS: &str = "SNAPLENS_TIMEOUT_SECS";
const KEY_SETTLE_MS: &str = "SNAPLENS_SETTLE_MS";
const KEY_PROMPT: &str = "SNAPLENS_PROMPT";
const KEY_REGION: &str = "SNAPLENS_REGION";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} is required")]
    Missing { key: &'static str },

    #[error("{key} has an invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Where cropped images go before analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadBackend {
    ImageCdn { api_base: String },
    /// `endpoint` may contain `{account}`, filled from the upload account ID.
    Bucket { endpoint: String, bucket: String },
    /// No upload; the proxy receives the image inline.
    Inline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub proxy_url: Option<String>,
    pub model: String,
    pub upload: UploadBackend,
    pub request_timeout: Duration,
    pub settle_delay: Duration,
    pub prompt: PromptKind,
    /// Fixed overlay bounds for the headless shell.
    pub region: Option<Rect>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            proxy_url: None,
            model: DEFAULT_MODEL.to_string(),
            upload: UploadBackend::ImageCdn {
                api_base: DEFAULT_CDN_API_BASE.to_string(),
            },
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            settle_delay: Duration::from_millis(COMPOSITOR_SETTLE_MS),
            prompt: PromptKind::default(),
            region: None,
        }
    }
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => log::info!("[CONFIG] Loaded {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => log::warn!("[CONFIG] Ignoring unreadable .env: {}", e),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset.
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let upload = match get(KEY_UPLOAD_BACKEND).as_deref().unwrap_or("cdn") {
            "cdn" => UploadBackend::ImageCdn {
                api_base: get(KEY_CDN_API_BASE).unwrap_or_else(|| DEFAULT_CDN_API_BASE.to_string()),
            },
            "bucket" => UploadBackend::Bucket {
                endpoint: get(KEY_BUCKET_ENDPOINT).ok_or(ConfigError::Missing {
                    key: KEY_BUCKET_ENDPOINT,
                })?,
                bucket: get(KEY_BUCKET_NAME).unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            },
            "inline" => UploadBackend::Inline,
            other => {
                return Err(ConfigError::Invalid {
                    key: KEY_UPLOAD_BACKEND,
                    value: other.to_string(),
                    reason: "expected cdn, bucket or inline".into(),
                })
            }
        };

        let request_timeout = match get(KEY_TIMEOUT_SECS) {
            Some(v) => Duration::from_secs(parse_positive(KEY_TIMEOUT_SECS, &v)?),
            None => defaults.request_timeout,
        };
        let settle_delay = match get(KEY_SETTLE_MS) {
            Some(v) => Duration::from_millis(parse_number(KEY_SETTLE_MS, &v)?),
            None => defaults.settle_delay,
        };
        let prompt = match get(KEY_PROMPT) {
            Some(v) => PromptKind::from_str(&v).map_err(|reason| ConfigError::Invalid {
                key: KEY_PROMPT,
                value: v.clone(),
                reason,
            })?,
            None => defaults.prompt,
        };
        let region = get(KEY_REGION).map(|v| parse_region(&v)).transpose()?;

        Ok(Self {
            proxy_url: get(KEY_PROXY_URL),
            model: get(KEY_MODEL).unwrap_or(defaults.model),
            upload,
            request_timeout,
            settle_delay,
            prompt,
            region,
        })
    }

    pub fn require_proxy_url(&self) -> Result<&str, ConfigError> {
        self.proxy_url
            .as_deref()
            .ok_or(ConfigError::Missing { key: KEY_PROXY_URL })
    }

    pub fn image_delivery(&self) -> ImageDelivery {
        match &self.upload {
            UploadBackend::ImageCdn { api_base } => ImageDelivery::Upload(Arc::new(
                ImageCdnUploader::new(api_base.clone(), self.request_timeout),
            )),
            UploadBackend::Bucket { endpoint, bucket } => ImageDelivery::Upload(Arc::new(
                ObjectStorageUploader::new(endpoint.clone(), bucket.clone(), self.request_timeout),
            )),
            UploadBackend::Inline => ImageDelivery::Inline,
        }
    }

    /// Wires the configured upload backend and proxy into a pipeline.
    pub fn build_pipeline(&self) -> Result<SingleCapturePipeline, ConfigError> {
        let analyzer = ProxyAnalyzer::new(
            self.require_proxy_url()?,
            Some(self.model.clone()),
            self.request_timeout,
        );
        Ok(SingleCapturePipeline::new(self.image_delivery(), Arc::new(analyzer))
            .with_prompt(self.prompt.template())
            .with_call_timeout(self.request_timeout))
    }
}

fn parse_number(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|e| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_positive(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    match parse_number(key, value)? {
        0 => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be greater than zero".into(),
        }),
        n => Ok(n),
    }
}

/// `"x,y,width,height"` in logical units.
fn parse_region(value: &str) -> Result<Rect, ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        key: KEY_REGION,
        value: value.to_string(),
        reason: reason.to_string(),
    };
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let [x, y, w, h] = parts.as_slice() else {
        return Err(invalid("expected x,y,width,height"));
    };
    let x = x.parse::<i32>().map_err(|e| invalid(&e.to_string()))?;
    let y = y.parse::<i32>().map_err(|e| invalid(&e.to_string()))?;
    let w = w.parse::<u32>().map_err(|e| invalid(&e.to_string()))?;
    let h = h.parse::<u32>().map_err(|e| invalid(&e.to_string()))?;
    if w == 0 || h == 0 {
        return Err(invalid("width and height must be non-zero"));
    }
    Ok(Rect::new(x, y, w, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.model, "gemini-2.0-flash-lite");
        assert_eq!(cfg.settle_delay, Duration::from_millis(120));
        assert!(cfg.require_proxy_url().is_err());
    }

    #[test]
    fn reads_every_key() {
        let cfg = config(&[
            ("SNAPLENS_PROXY_URL", "https://proxy.example/api"),
            ("SNAPLENS_MODEL", "gemini-pro-vision"),
            ("SNAPLENS_UPLOAD_BACKEND", "bucket"),
            ("SNAPLENS_BUCKET_ENDPOINT", "https://{account}.storage.example"),
            ("SNAPLENS_TIMEOUT_SECS", "10"),
            ("SNAPLENS_SETTLE_MS", "0"),
            ("SNAPLENS_PROMPT", "py"),
            ("SNAPLENS_REGION", "100, 200, 640, 480"),
        ])
        .unwrap();

        assert_eq!(cfg.require_proxy_url().unwrap(), "https://proxy.example/api");
        assert_eq!(cfg.model, "gemini-pro-vision");
        assert_eq!(
            cfg.upload,
            UploadBackend::Bucket {
                endpoint: "https://{account}.storage.example".into(),
                bucket: "captures".into(),
            }
        );
        assert_eq!(cfg.request_timeout, Duration::from_secs(10));
        assert_eq!(cfg.settle_delay, Duration::ZERO);
        assert_eq!(cfg.prompt, PromptKind::Python);
        assert_eq!(cfg.region, Some(Rect::new(100, 200, 640, 480)));
    }

    #[test]
    fn invalid_values_name_the_key() {
        let err = config(&[("SNAPLENS_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().starts_with("SNAPLENS_TIMEOUT_SECS"));

        let err = config(&[("SNAPLENS_TIMEOUT_SECS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SNAPLENS_TIMEOUT_SECS", .. }));

        let err = config(&[("SNAPLENS_UPLOAD_BACKEND", "ftp")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SNAPLENS_UPLOAD_BACKEND", .. }));

        let err = config(&[("SNAPLENS_REGION", "1,2,3")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SNAPLENS_REGION", .. }));
    }

    #[test]
    fn bucket_backend_needs_an_endpoint() {
        let err = config(&[("SNAPLENS_UPLOAD_BACKEND", "bucket")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing { key: "SNAPLENS_BUCKET_ENDPOINT" });
    }

    #[test]
    fn inline_backend_builds_a_pipeline_without_upload() {
        let cfg = config(&[
            ("SNAPLENS_PROXY_URL", "http://localhost:8787"),
            ("SNAPLENS_UPLOAD_BACKEND", "inline"),
        ])
        .unwrap();
        assert!(!cfg.build_pipeline().unwrap().needs_upload());
    }

    #[test]
    fn pipeline_requires_a_proxy() {
        assert_eq!(
            config(&[]).unwrap().build_pipeline().err(),
            Some(ConfigError::Missing { key: "SNAPLENS_PROXY_URL" })
        );
    }
}
