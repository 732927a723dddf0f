//! The staged generation pipeline.
//!
//! questionnaire → [`GenerationOrchestrator`] → [`StagedContentBundle`]
//! → [`RegenerationController`] (zero or more times, per category)
//! → [`AcceptanceCommitter`] → brand store.
//!
//! [`StagedContentBundle`]: crate::models::StagedContentBundle

mod acceptance;
mod orchestrator;
mod progress;
mod regeneration;
mod staging;

pub use acceptance::*;
pub use orchestrator::*;
pub use progress::*;
pub use regeneration::*;
pub use staging::*;

use crate::error::{PipelineError, Result};
use crate::models::{ContentCategory, ContentError};

/// Products, providers and training programs must never come back empty.
pub(crate) fn require_content(category: ContentCategory, count: usize) -> Result<()> {
    let required = matches!(
        category,
        ContentCategory::Products | ContentCategory::Providers | ContentCategory::Training
    );
    if required && count == 0 {
        return Err(PipelineError::InvalidContent(ContentError {
            category,
            problems: vec![format!("{} must not be empty", category.field_name())],
        }));
    }
    Ok(())
}
