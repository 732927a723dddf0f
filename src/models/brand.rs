use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::bundle::StagedContentBundle;
use super::content::*;
use super::questionnaire::Questionnaire;

/// The persisted brand document.
///
/// Accepted content accumulates in the four category arrays; they only ever
/// grow, and only through acceptance. `version` increases by one on every
/// content write and guards against concurrent acceptances overwriting each
/// other. `accepted_bundles` records which staged bundles have already been
/// merged so a repeated acceptance does not append twice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Brand {
    pub id: Uuid,
    pub name: String,
    /// Owner of the brand; generation requires it.
    pub user_id: String,
    pub questionnaire: Option<Questionnaire>,
    #[serde(flatten)]
    pub content: BrandContent,
    #[serde(default)]
    pub accepted_bundles: Vec<Uuid>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The four content arrays of a brand.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BrandContent {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub training_programs: Vec<TrainingProgram>,
    #[serde(default)]
    pub before_afters: Vec<BeforeAfter>,
}

impl BrandContent {
    /// Ordered concatenation of persisted and staged content, per category.
    ///
    /// Existing entries keep their positions; staged entries follow in their
    /// own order. Ids are not de-duplicated.
    pub fn merged_with(&self, bundle: &StagedContentBundle) -> BrandContent {
        BrandContent {
            products: concat(&self.products, &bundle.products),
            providers: concat(&self.providers, &bundle.providers),
            training_programs: concat(&self.training_programs, &bundle.training_programs),
            before_afters: concat(&self.before_afters, &bundle.before_afters),
        }
    }

    pub fn count(&self, category: ContentCategory) -> usize {
        match category {
            ContentCategory::Products => self.products.len(),
            ContentCategory::Providers => self.providers.len(),
            ContentCategory::Training => self.training_programs.len(),
            ContentCategory::BeforeAfter => self.before_afters.len(),
        }
    }
}

fn concat<T: Clone>(persisted: &[T], staged: &[T]) -> Vec<T> {
    let mut merged = Vec::with_capacity(persisted.len() + staged.len());
    merged.extend_from_slice(persisted);
    merged.extend_from_slice(staged);
    merged
}

/// Input for creating a new brand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBrandInput {
    pub name: String,
    pub user_id: String,
}

/// Minimal brand info for list responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandSummary {
    pub id: Uuid,
    pub name: String,
    pub user_id: String,
    pub has_questionnaire: bool,
    pub version: i64,
}

impl From<Brand> for BrandSummary {
    fn from(b: Brand) -> Self {
        Self {
            id: b.id,
            name: b.name,
            user_id: b.user_id,
            has_questionnaire: b.questionnaire.is_some(),
            version: b.version,
        }
    }
}

/// The identity a generation run is issued under.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandContext {
    pub brand_id: Uuid,
    pub brand_name: String,
    pub user_id: String,
}

impl From<&Brand> for BrandContext {
    fn from(b: &Brand) -> Self {
        Self {
            brand_id: b.id,
            brand_name: b.name.clone(),
            user_id: b.user_id.clone(),
        }
    }
}
