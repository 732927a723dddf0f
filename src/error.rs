//! Error taxonomy for the generation pipeline.

use thiserror::Error;
use uuid::Uuid;

use crate::models::{ContentCategory, ContentError};
use crate::service::ServiceError;

/// Errors surfaced by orchestration, regeneration and acceptance.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input rejected before any work started. Recoverable by resubmitting.
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Missing brand or user association. Checked before any external call.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The generation service failed during a stage of a run.
    #[error("Generation failed at stage '{stage}': {message}")]
    Stage { stage: String, message: String },

    /// The generation service failed while regenerating one category.
    #[error("Regeneration of {category} failed: {source}")]
    Regeneration {
        category: ContentCategory,
        #[source]
        source: ServiceError,
    },

    /// The service answered but its content did not pass validation.
    #[error(transparent)]
    InvalidContent(#[from] ContentError),

    /// Writing accepted content to the store failed. The staged bundle is kept.
    #[error("Commit failed for brand {brand_id}: {message}")]
    Commit { brand_id: Uuid, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation does not fit the current state (e.g. regenerating a run still in progress).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The staged bundle was discarded while an operation on it was in flight.
    #[error("Staged content was discarded")]
    Discarded,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(vec![message.into()])
    }

    pub fn stage(stage: &str, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
