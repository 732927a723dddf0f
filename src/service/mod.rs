//! Boundary to the external content-generation service.
//!
//! The service is opaque: it receives a questionnaire (or one category plus
//! feedback) and answers with raw JSON entities. Decoding and validation of
//! those entities happens in [`crate::pipeline`], category by category.

mod client;
mod placeholder;

pub use client::GenerationClient;
pub use placeholder::PlaceholderService;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ContentCategory, Questionnaire};

/// Generation service errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unauthorized: API key required or invalid")]
    Unauthorized,

    #[error("Server error: {0}")]
    Server(String),

    /// The service answered with `success: false`.
    #[error("Generation rejected: {0}")]
    Rejected(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// Request for a full generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub brand_id: Uuid,
    pub brand_name: String,
    pub user_id: String,
    pub questionnaire: Questionnaire,
}

/// Request to regenerate one category using free-text feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerationRequest {
    pub brand_id: Uuid,
    pub content_type: ContentCategory,
    pub current_content: Vec<Value>,
    pub feedback: String,
}

/// Undecoded output of a generation call, one raw array per category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedContent {
    #[serde(default)]
    pub products: Vec<Value>,
    #[serde(default)]
    pub providers: Vec<Value>,
    #[serde(default)]
    pub training_programs: Vec<Value>,
    #[serde(default)]
    pub before_afters: Vec<Value>,
}

impl GeneratedContent {
    /// Move one category's raw entities out, leaving an empty array behind.
    pub fn take(&mut self, category: ContentCategory) -> Vec<Value> {
        let slot = match category {
            ContentCategory::Products => &mut self.products,
            ContentCategory::Providers => &mut self.providers,
            ContentCategory::Training => &mut self.training_programs,
            ContentCategory::BeforeAfter => &mut self.before_afters,
        };
        std::mem::take(slot)
    }
}

/// Response envelope used by the generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ServiceResponse<T> {
    /// Unwrap the envelope, treating `success: false` and missing data as errors.
    pub fn into_result(self) -> Result<T, ServiceError> {
        if !self.success {
            return Err(ServiceError::Rejected(
                self.error.unwrap_or_else(|| "no error detail".to_string()),
            ));
        }
        self.data
            .ok_or_else(|| ServiceError::Malformed("response has no data".to_string()))
    }
}

/// A content-generation backend.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Produce all four categories for a questionnaire in one call.
    async fn generate(&self, request: &GenerationRequest)
        -> Result<GeneratedContent, ServiceError>;

    /// Produce a replacement for one category.
    async fn regenerate(&self, request: &RegenerationRequest)
        -> Result<Vec<Value>, ServiceError>;
}
