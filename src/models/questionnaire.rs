use serde::{Deserialize, Serialize};

/// Inclusive price bounds in whole currency units.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceRange {
    pub min: u32,
    pub max: u32,
}

impl PriceRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// A range is usable once `min` is strictly below `max`.
    pub fn is_ordered(&self) -> bool {
        self.min < self.max
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= f64::from(self.min) && price <= f64::from(self.max)
    }
}

/// The brand questionnaire: everything generation needs to know about a brand.
///
/// Every list field deserializes to an empty vector when absent, so downstream
/// code never has to distinguish "missing" from "empty".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Questionnaire {
    #[serde(default)]
    pub brand_overview: BrandOverview,
    #[serde(default)]
    pub products: ProductRequirements,
    #[serde(default)]
    pub training: TrainingRequirements,
    #[serde(default)]
    pub before_after: BeforeAfterRequirements,
    #[serde(default)]
    pub providers: ProviderRequirements,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BrandOverview {
    #[serde(default)]
    pub vision: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub unique_selling_points: Vec<String>,
    #[serde(default)]
    pub current_products: Option<String>,
    #[serde(default)]
    pub inspiration: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductRequirements {
    #[serde(default)]
    pub description: String,
    /// Image references (URLs or storage keys); upload is handled elsewhere.
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub price_range: PriceRange,
    #[serde(default)]
    pub ingredients: Option<String>,
    #[serde(default)]
    pub benefits: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRequirements {
    #[serde(default)]
    pub goals: String,
    #[serde(default)]
    pub target_learners: String,
    #[serde(default)]
    pub certification_types: Vec<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub price_range: Option<PriceRange>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BeforeAfterRequirements {
    #[serde(default)]
    pub transformation_goals: String,
    #[serde(default)]
    pub treatment_types: Vec<String>,
    #[serde(default)]
    pub expected_duration: String,
    #[serde(default)]
    pub target_concerns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRequirements {
    #[serde(default)]
    pub specialties_needed: Vec<String>,
    #[serde(default)]
    pub certification_levels: Vec<String>,
    #[serde(default)]
    pub location_preferences: String,
    #[serde(default)]
    pub experience_level: Option<String>,
}

impl Questionnaire {
    /// Required-field check shared by manual entry and the requirements file.
    ///
    /// Each missing field yields exactly one message, named by its
    /// requirements-file key. Checks never short-circuit.
    pub fn missing_required_fields(&self) -> Vec<String> {
        let mut errors = Vec::new();

        require_text(&mut errors, "brand.vision", &self.brand_overview.vision);
        require_text(
            &mut errors,
            "brand.target_audience",
            &self.brand_overview.target_audience,
        );
        require_list(
            &mut errors,
            "brand.unique_selling_points",
            &self.brand_overview.unique_selling_points,
        );

        require_text(&mut errors, "products.description", &self.products.description);
        require_list(&mut errors, "products.categories", &self.products.categories);

        require_text(&mut errors, "training.goals", &self.training.goals);
        require_text(
            &mut errors,
            "training.target_learners",
            &self.training.target_learners,
        );
        require_list(
            &mut errors,
            "training.certification_types",
            &self.training.certification_types,
        );

        require_text(
            &mut errors,
            "before_after.transformation_goals",
            &self.before_after.transformation_goals,
        );
        require_list(
            &mut errors,
            "before_after.treatment_types",
            &self.before_after.treatment_types,
        );
        require_text(
            &mut errors,
            "before_after.expected_duration",
            &self.before_after.expected_duration,
        );

        require_list(
            &mut errors,
            "providers.specialties_needed",
            &self.providers.specialties_needed,
        );
        require_list(
            &mut errors,
            "providers.certification_levels",
            &self.providers.certification_levels,
        );
        require_text(
            &mut errors,
            "providers.location_preferences",
            &self.providers.location_preferences,
        );

        errors
    }

    /// Full validation for manually entered questionnaires.
    ///
    /// Adds price-range ordering on top of [`Self::missing_required_fields`].
    /// An all-zero product range is treated as "not provided".
    pub fn validate(&self) -> Vec<String> {
        let mut errors = self.missing_required_fields();

        let range = self.products.price_range;
        if range != PriceRange::default() && !range.is_ordered() {
            errors.push(format!(
                "products.price_range: min ({}) must be less than max ({})",
                range.min, range.max
            ));
        }
        if let Some(range) = self.training.price_range {
            if !range.is_ordered() {
                errors.push(format!(
                    "training.price_range: min ({}) must be less than max ({})",
                    range.min, range.max
                ));
            }
        }

        errors
    }
}

fn require_text(errors: &mut Vec<String>, key: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(format!("{} is required", key));
    }
}

fn require_list(errors: &mut Vec<String>, key: &str, values: &[String]) {
    if !values.iter().any(|v| !v.trim().is_empty()) {
        errors.push(format!("{} requires at least one entry", key));
    }
}
