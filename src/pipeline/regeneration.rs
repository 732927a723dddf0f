use std::sync::Arc;

use uuid::Uuid;

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::models::*;
use crate::service::{GenerationService, PlaceholderService, RegenerationRequest, ServiceError};

use super::require_content;

/// Replaces one category of a staged bundle using reviewer feedback.
#[derive(Clone)]
pub struct RegenerationController {
    service: Arc<dyn GenerationService>,
    fallback: PlaceholderService,
    degraded_mode: bool,
}

impl RegenerationController {
    pub fn new(service: Arc<dyn GenerationService>, config: &Config) -> Self {
        Self {
            service,
            fallback: PlaceholderService::new(),
            degraded_mode: config.degraded_mode,
        }
    }

    /// Return a copy of `bundle` with `category` regenerated.
    ///
    /// The other three categories are shared with `bundle`, not copied. On
    /// error `bundle` is untouched and still usable.
    pub async fn regenerate(
        &self,
        brand_id: Uuid,
        bundle: &StagedContentBundle,
        category: ContentCategory,
        feedback: &str,
    ) -> Result<StagedContentBundle> {
        let current = bundle.category(category);
        let replacement = self.regenerate_category(brand_id, &current, feedback).await?;
        Ok(bundle.with_category(replacement))
    }

    /// Produce a validated replacement for one category's entities.
    pub async fn regenerate_category(
        &self,
        brand_id: Uuid,
        current: &CategoryContent,
        feedback: &str,
    ) -> Result<CategoryContent> {
        let feedback = feedback.trim();
        if feedback.is_empty() {
            return Err(PipelineError::validation("feedback is required"));
        }

        let category = current.category();
        let request = RegenerationRequest {
            brand_id,
            content_type: category,
            current_content: current.to_values().map_err(|e| PipelineError::Regeneration {
                category,
                source: ServiceError::Malformed(e.to_string()),
            })?,
            feedback: feedback.to_string(),
        };

        tracing::info!(%brand_id, %category, "Regenerating category");
        let values = match self.service.regenerate(&request).await {
            Ok(values) => values,
            Err(e) if self.degraded_mode => {
                tracing::warn!(
                    error = %e,
                    %category,
                    "Regeneration failed, using placeholder content"
                );
                self.fallback
                    .regenerate(&request)
                    .await
                    .map_err(|source| PipelineError::Regeneration { category, source })?
            }
            Err(source) => {
                tracing::error!(error = %source, %category, "Regeneration failed");
                return Err(PipelineError::Regeneration { category, source });
            }
        };

        let replacement = CategoryContent::decode(category, values)?;
        require_content(category, replacement.len())?;

        tracing::info!(%brand_id, %category, count = replacement.len(), "Category regenerated");
        Ok(replacement)
    }
}
