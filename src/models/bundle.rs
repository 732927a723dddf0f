use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::content::*;

/// Content produced by one generation run, held in memory until accepted.
///
/// Each category is an immutable shared sequence. Replacing one category
/// (see [`Self::with_category`]) swaps that `Arc` only, so the other three
/// remain the very same allocation before and after a regeneration.
///
/// `id` identifies the run's output and doubles as the acceptance
/// idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedContentBundle {
    pub id: Uuid,
    #[serde(default)]
    pub products: Arc<Vec<Product>>,
    #[serde(default)]
    pub providers: Arc<Vec<Provider>>,
    #[serde(default)]
    pub training_programs: Arc<Vec<TrainingProgram>>,
    #[serde(default)]
    pub before_afters: Arc<Vec<BeforeAfter>>,
}

impl StagedContentBundle {
    pub fn new(
        products: Vec<Product>,
        providers: Vec<Provider>,
        training_programs: Vec<TrainingProgram>,
        before_afters: Vec<BeforeAfter>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            products: Arc::new(products),
            providers: Arc::new(providers),
            training_programs: Arc::new(training_programs),
            before_afters: Arc::new(before_afters),
        }
    }

    /// Owned copy of one category's entities.
    pub fn category(&self, category: ContentCategory) -> CategoryContent {
        match category {
            ContentCategory::Products => CategoryContent::Products(self.products.to_vec()),
            ContentCategory::Providers => CategoryContent::Providers(self.providers.to_vec()),
            ContentCategory::Training => {
                CategoryContent::Training(self.training_programs.to_vec())
            }
            ContentCategory::BeforeAfter => {
                CategoryContent::BeforeAfter(self.before_afters.to_vec())
            }
        }
    }

    /// Replace the category matching `content`, keeping the other three untouched.
    pub fn set_category(&mut self, content: CategoryContent) {
        match content {
            CategoryContent::Products(v) => self.products = Arc::new(v),
            CategoryContent::Providers(v) => self.providers = Arc::new(v),
            CategoryContent::Training(v) => self.training_programs = Arc::new(v),
            CategoryContent::BeforeAfter(v) => self.before_afters = Arc::new(v),
        }
    }

    pub fn with_category(&self, content: CategoryContent) -> Self {
        let mut next = self.clone();
        next.set_category(content);
        next
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
