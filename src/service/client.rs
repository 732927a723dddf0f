//! HTTP client for the content-generation service.
//!
//! Configuration comes from [`Config`]:
//! - `service_url` - Base URL (default: `http://localhost:17020/api`)
//! - `service_api_key` - Bearer token (optional for local services)

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::*;
use crate::config::Config;

#[derive(Debug, Clone)]
pub struct GenerationClient {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl GenerationClient {
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.service_url.clone(), config.service_api_key.clone())
    }

    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: Client::new(),
        }
    }

    /// POST a JSON body and unwrap the service envelope.
    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ServiceError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.post(&url).json(body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::Unauthorized,
                _ => ServiceError::Server(format!("{}: {}", status, body)),
            });
        }

        let envelope: ServiceResponse<T> = response
            .json()
            .await
            .map_err(|e| ServiceError::Malformed(e.to_string()))?;
        envelope.into_result()
    }
}

#[async_trait]
impl GenerationService for GenerationClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedContent, ServiceError> {
        tracing::debug!(brand_id = %request.brand_id, "Requesting content generation");
        self.post("/generate-content", request).await
    }

    async fn regenerate(&self, request: &RegenerationRequest) -> Result<Vec<Value>, ServiceError> {
        tracing::debug!(
            brand_id = %request.brand_id,
            category = %request.content_type,
            "Requesting content regeneration"
        );
        self.post("/regenerate-content", request).await
    }
}
