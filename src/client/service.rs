//! # Service Client
//!
//! Issues the two outbound calls and maps every transport or service outcome
//! into `Result<_, ServiceError>`.
//!
//! ## Contract
//!
//! Both calls send a single-part multipart body (field `file` by default)
//! and expect a JSON envelope back (see [`envelope`](super::envelope)).
//! Neither call is retried here: cloaking and verification are expensive
//! and non-deterministic, so retrying is left to whoever triggered them.
//!
//! ## Seam
//!
//! The session orchestrator only sees the [`ServiceClient`] trait, so tests can
//! substitute a scripted client and count calls.

use async_trait::async_trait;
use log::{info, warn};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;

use super::envelope::{self, ProtectionResult};
use crate::codec::EncodedImage;
use crate::common::config::ServiceConfig;
use crate::error::ServiceError;

pub const CLOAK_PATH: &str = "/api/cloak-image";
pub const VERIFY_PATH: &str = "/api/check-protection";
pub const HEALTH_PATH: &str = "/health";

/// Multipart file stem; the extension follows the media type.
const UPLOAD_STEM: &str = "image";

/// Outbound calls the session makes.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    /// Submit `image` to the cloaking engine and return the cloaked image.
    async fn request_cloak(&self, image: EncodedImage) -> Result<EncodedImage, ServiceError>;

    /// Submit `image` to the verification engine.
    async fn request_verification(
        &self,
        image: EncodedImage,
    ) -> Result<ProtectionResult, ServiceError>;
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
}

/// [`ServiceClient`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpServiceClient {
    client: Client,
    config: ServiceConfig,
}

impl HttpServiceClient {
    /// Build a client whose every request is bounded by `config.timeout()`.
    pub fn new(config: ServiceConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ServiceError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Probe `GET /health`.
    pub async fn health(&self) -> Result<HealthStatus, ServiceError> {
        let url = self.config.endpoint(HEALTH_PATH);
        let response = self.client.get(&url).send().await?;
        let body = Self::read_success_body(response).await?;
        serde_json::from_str(&body)
            .map_err(|e| ServiceError::Malformed(format!("health body: {e}")))
    }

    /// Poll [`health`](Self::health) until it answers, at most `attempts` times.
    ///
    /// Returns the last error if the service never came up.
    pub async fn wait_until_healthy(
        &self,
        attempts: u32,
        interval: Duration,
    ) -> Result<HealthStatus, ServiceError> {
        let attempts = attempts.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                sleep(interval).await;
            }

            match self.health().await {
                Ok(status) => {
                    info!(
                        "✅ Services healthy at {} ({})",
                        self.config.base_url, status.status
                    );
                    return Ok(status);
                }
                Err(e) => {
                    warn!(
                        "Health check {}/{} against {} failed: {}",
                        attempt, attempts, self.config.base_url, e
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ServiceError::Transport("no health check attempted".into())))
    }

    /// POST `image` as multipart to `path` and return the raw success body.
    async fn post_image(&self, path: &str, image: EncodedImage) -> Result<String, ServiceError> {
        let url = self.config.endpoint(path);
        let file_name = image.file_name(UPLOAD_STEM);
        let media_type = image.media_type().to_string();
        let size = image.len();

        let part = Part::bytes(image.into_bytes())
            .file_name(file_name)
            .mime_str(&media_type)?;
        let form = Form::new().part(self.config.field_name.clone(), part);

        info!("📤 POST {} ({} bytes, {})", url, size, media_type);

        let response = self.client.post(&url).multipart(form).send().await?;
        Self::read_success_body(response).await
    }

    async fn read_success_body(response: reqwest::Response) -> Result<String, ServiceError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let detail = envelope::error_detail(&body).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string()
            });
            return Err(ServiceError::Transport(format!("HTTP {}: {}", status.as_u16(), detail)));
        }

        Ok(body)
    }
}

#[async_trait]
impl ServiceClient for HttpServiceClient {
    async fn request_cloak(&self, image: EncodedImage) -> Result<EncodedImage, ServiceError> {
        let body = self.post_image(CLOAK_PATH, image).await?;
        let cloaked = envelope::parse_cloak(&body)?;
        info!(
            "📥 Cloaked image received ({} bytes, {})",
            cloaked.len(),
            cloaked.media_type()
        );
        Ok(cloaked)
    }

    async fn request_verification(
        &self,
        image: EncodedImage,
    ) -> Result<ProtectionResult, ServiceError> {
        let body = self.post_image(VERIFY_PATH, image).await?;
        let result = envelope::parse_verification(&body)?;
        info!(
            "📥 Verification: {} face(s), level {}",
            result.faces_detected,
            result.protection_level.as_str()
        );
        Ok(result)
    }
}
