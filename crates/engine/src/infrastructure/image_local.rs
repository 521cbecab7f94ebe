//! On-device image generation client
//!
//! Talks to the local inference daemon. On-device generation only works
//! while the app is foregrounded; when backgrounded the call fails fast
//! with no network attempt. Needs no credential.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use recall_domain::ImageBlob;

use crate::infrastructure::ports::{AppStatePort, ImageGenError, ImageGenPort, ImageRequest};

/// Client for the on-device inference daemon
#[derive(Clone)]
pub struct LocalImageClient {
    client: Client,
    base_url: String,
    app_state: Arc<dyn AppStatePort>,
}

impl LocalImageClient {
    pub fn new(base_url: &str, app_state: Arc<dyn AppStatePort>) -> Self {
        // On-device inference is slower than a hosted GPU
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            app_state,
        }
    }

    /// Create client from environment variables.
    pub fn from_env(app_state: Arc<dyn AppStatePort>) -> Self {
        let base_url = std::env::var("RECALL_LOCAL_IMAGE_URL")
            .unwrap_or_else(|_| "http://localhost:7860".to_string());
        Self::new(&base_url, app_state)
    }
}

#[async_trait]
impl ImageGenPort for LocalImageClient {
    fn has_valid_credential(&self) -> bool {
        true
    }

    async fn generate(&self, request: ImageRequest) -> Result<ImageBlob, ImageGenError> {
        // Dispatch-time gate only; an in-flight call is allowed to complete
        // if the app backgrounds mid-generation.
        if !self.app_state.is_foreground() {
            return Err(ImageGenError::Unavailable(
                "app is not in the foreground".to_string(),
            ));
        }

        let body = GenerateRequest {
            prompt: request.prompt,
            width: request.width,
            height: request.height,
            seed: rand::random::<u32>(),
        };

        let response = self
            .client
            .post(format!("{}/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ImageGenError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ImageGenError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImageGenError::Network(e.to_string()))?;

        if bytes.is_empty() {
            return Err(ImageGenError::InvalidResponse(
                "empty image payload".to_string(),
            ));
        }

        Ok(ImageBlob {
            data: bytes.to_vec(),
            format: "png".to_string(),
        })
    }

    async fn check_health(&self) -> Result<bool, ImageGenError> {
        if !self.app_state.is_foreground() {
            return Ok(false);
        }

        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| ImageGenError::Unavailable(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    prompt: String,
    width: u32,
    height: u32,
    seed: u32,
}
