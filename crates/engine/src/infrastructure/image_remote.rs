//! Remote image generation client
//!
//! The high-fidelity hosted provider. Requires an API key; prompts get the
//! user's configured style suffix appended before submission. Deck icons
//! always come through here.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use recall_domain::ImageBlob;

use crate::infrastructure::ports::{ImageGenError, ImageGenPort, ImageRequest};

/// Client for the hosted image generation API
#[derive(Clone)]
pub struct RemoteImageClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    style_suffix: String,
}

impl RemoteImageClient {
    pub fn new(base_url: &str, api_key: Option<String>, style_suffix: &str) -> Self {
        // Generation is slow; allow several minutes end to end
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            style_suffix: style_suffix.to_string(),
        }
    }

    /// Create client from environment variables.
    pub fn from_env(style_suffix: &str) -> Self {
        let base_url = std::env::var("RECALL_IMAGE_API_URL")
            .unwrap_or_else(|_| "https://images.recall.app".to_string());
        let api_key = std::env::var("RECALL_IMAGE_API_KEY").ok();
        Self::new(&base_url, api_key, style_suffix)
    }

    fn credential(&self) -> Result<&str, ImageGenError> {
        self.api_key
            .as_deref()
            .ok_or(ImageGenError::MissingCredential)
    }

    /// Submit a job for execution
    async fn submit_job(&self, request: &ImageRequest) -> Result<JobResponse, ImageGenError> {
        let key = self.credential()?;
        let styled_prompt = if self.style_suffix.is_empty() {
            request.prompt.clone()
        } else {
            format!("{}, {}", request.prompt, self.style_suffix)
        };

        let body = SubmitJobRequest {
            prompt: styled_prompt,
            width: request.width,
            height: request.height,
            seed: rand::random::<u32>(),
        };

        let response = self
            .client
            .post(format!("{}/v1/jobs", self.base_url))
            .bearer_auth(key)
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

        response
            .json()
            .await
            .map_err(|e| ImageGenError::InvalidResponse(e.to_string()))
    }

    /// Poll a job until it completes and return its output descriptor
    async fn wait_for_completion(&self, job_id: &str) -> Result<JobStatus, ImageGenError> {
        const MAX_ATTEMPTS: u32 = 120;
        const POLL_INTERVAL: Duration = Duration::from_secs(1);

        let key = self.credential()?;

        for _ in 0..MAX_ATTEMPTS {
            let response = self
                .client
                .get(format!("{}/v1/jobs/{}", self.base_url, job_id))
                .bearer_auth(key)
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

            let job: JobStatus = response
                .json()
                .await
                .map_err(|e| ImageGenError::InvalidResponse(e.to_string()))?;

            match job.state.as_str() {
                "completed" => return Ok(job),
                "failed" => {
                    return Err(ImageGenError::Api {
                        code: 500,
                        message: job.error.unwrap_or_else(|| "Job failed".to_string()),
                    })
                }
                _ => sleep(POLL_INTERVAL).await,
            }
        }

        Err(ImageGenError::InvalidResponse(
            "Generation timed out".to_string(),
        ))
    }

    /// Download the finished image
    async fn download(&self, job_id: &str) -> Result<(Vec<u8>, String), ImageGenError> {
        let key = self.credential()?;

        let response = self
            .client
            .get(format!("{}/v1/jobs/{}/image", self.base_url, job_id))
            .bearer_auth(key)
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

        let format = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(content_type_to_format)
            .unwrap_or_else(|| "png".to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImageGenError::Network(e.to_string()))?;

        Ok((bytes.to_vec(), format))
    }
}

fn content_type_to_format(content_type: &str) -> String {
    match content_type {
        "image/jpeg" => "jpeg",
        "image/webp" => "webp",
        _ => "png",
    }
    .to_string()
}

#[async_trait]
impl ImageGenPort for RemoteImageClient {
    fn has_valid_credential(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(&self, request: ImageRequest) -> Result<ImageBlob, ImageGenError> {
        let job = self.submit_job(&request).await?;
        let _ = self.wait_for_completion(&job.job_id).await?;
        let (data, format) = self.download(&job.job_id).await?;

        Ok(ImageBlob { data, format })
    }

    async fn check_health(&self) -> Result<bool, ImageGenError> {
        let response = self
            .client
            .get(format!("{}/v1/health", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| ImageGenError::Unavailable(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// =============================================================================
// API types
// =============================================================================

#[derive(Debug, Serialize)]
struct SubmitJobRequest {
    prompt: String,
    width: u32,
    height: u32,
    seed: u32,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    #[allow(dead_code)]
    job_id: String,
    state: String,
    #[serde(default)]
    error: Option<String>,
}
