use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{BrandStore, CommitResult};
use crate::error::{PipelineError, Result};
use crate::models::*;

/// Result of a successful acceptance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AcceptOutcome {
    /// The bundle had been merged before; nothing was appended this time.
    pub already_accepted: bool,
    /// Brand version after the acceptance.
    pub version: i64,
}

/// Merges staged bundles into the persisted brand.
///
/// The committer is the only writer of a brand's four content arrays. Each
/// attempt reads the brand, appends the bundle to every category, and writes
/// all four arrays in a single versioned statement. A version conflict means
/// another acceptance landed in between; the merge is recomputed from the
/// fresh document and retried.
#[derive(Clone)]
pub struct AcceptanceCommitter {
    store: Arc<dyn BrandStore>,
    max_attempts: u32,
}

impl AcceptanceCommitter {
    pub fn new(store: Arc<dyn BrandStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn accept(&self, brand_id: Uuid, bundle: &StagedContentBundle) -> Result<AcceptOutcome> {
        let commit_error = |message: String| PipelineError::Commit { brand_id, message };

        for attempt in 1..=self.max_attempts {
            let brand = self
                .store
                .get_brand(brand_id)
                .map_err(|e| commit_error(e.to_string()))?
                .ok_or_else(|| PipelineError::NotFound(format!("brand {}", brand_id)))?;

            if brand.accepted_bundles.contains(&bundle.id) {
                tracing::info!(%brand_id, bundle_id = %bundle.id, "Bundle already accepted");
                return Ok(AcceptOutcome {
                    already_accepted: true,
                    version: brand.version,
                });
            }

            let merged = brand.content.merged_with(bundle);
            let mut accepted = brand.accepted_bundles.clone();
            accepted.push(bundle.id);

            match self
                .store
                .commit_content(brand_id, &merged, &accepted, brand.version)
            {
                Ok(CommitResult::Committed { version }) => {
                    tracing::info!(
                        %brand_id,
                        bundle_id = %bundle.id,
                        version,
                        "Accepted staged content"
                    );
                    return Ok(AcceptOutcome {
                        already_accepted: false,
                        version,
                    });
                }
                Ok(CommitResult::VersionConflict) => {
                    tracing::warn!(
                        %brand_id,
                        attempt,
                        "Brand changed during acceptance, retrying"
                    );
                }
                Ok(CommitResult::NotFound) => {
                    return Err(PipelineError::NotFound(format!("brand {}", brand_id)));
                }
                Err(e) => {
                    tracing::error!(%brand_id, error = %e, "Failed to write accepted content");
                    return Err(commit_error(e.to_string()));
                }
            }
        }

        Err(commit_error(format!(
            "brand kept changing; gave up after {} attempts",
            self.max_attempts
        )))
    }
}
