//! Requirements file ingestion.
//!
//! A requirements file is an alternative to filling in the questionnaire by
//! hand. The format is line oriented:
//!
//! ```text
//! # Comments and blank lines are ignored
//! brand.vision = Clean, clinical skincare for everyone
//! products.categories = skincare, body care
//! products.price_range = 20-200
//! ```
//!
//! Keys are section-namespaced. Lists are comma separated (entries trimmed,
//! empty entries dropped). Price ranges are `<min>-<max>` with `min < max`.
//! Unknown keys are ignored. Errors accumulate; a file either parses into a
//! complete [`Questionnaire`] or yields every problem found.

use serde::{Deserialize, Serialize};

use crate::models::{PriceRange, Questionnaire};

/// Result of parsing a requirements file.
///
/// `success` is true exactly when `errors` is absent; `data` is present only
/// on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Questionnaire>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl ParseOutcome {
    fn ok(data: Questionnaire) -> Self {
        Self {
            success: true,
            data: Some(data),
            errors: None,
        }
    }

    fn failed(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            errors: Some(errors),
        }
    }

    pub fn error_list(&self) -> &[String] {
        self.errors.as_deref().unwrap_or(&[])
    }
}

/// Parse requirements text into a questionnaire.
pub fn parse(text: &str) -> ParseOutcome {
    let mut questionnaire = Questionnaire::default();
    let mut errors = Vec::new();

    let text = text.trim_start_matches('\u{feff}');
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            errors.push(format!("line {}: expected `key = value`", index + 1));
            continue;
        };

        let key = key.trim();
        let value = unquote(value.trim());
        if let Err(e) = apply(&mut questionnaire, key, value) {
            errors.push(format!("line {}: {}", index + 1, e));
        }
    }

    errors.extend(questionnaire.missing_required_fields());

    if errors.is_empty() {
        tracing::debug!("Requirements file parsed successfully");
        ParseOutcome::ok(questionnaire)
    } else {
        tracing::warn!("Requirements file rejected with {} error(s)", errors.len());
        ParseOutcome::failed(errors)
    }
}

/// Parse a `<min>-<max>` price range.
///
/// Both bounds are non-negative integers and `min` must be strictly below `max`.
pub fn parse_price_range(value: &str) -> Result<PriceRange, String> {
    let (min, max) = value
        .split_once('-')
        .ok_or_else(|| format!("invalid price range '{}': expected <min>-<max>", value))?;

    let parse_bound = |s: &str| {
        s.trim()
            .parse::<u32>()
            .map_err(|_| format!("invalid price range '{}': expected <min>-<max>", value))
    };
    let min = parse_bound(min)?;
    let max = parse_bound(max)?;

    if min >= max {
        return Err(format!(
            "invalid price range '{}': min must be less than max",
            value
        ));
    }

    Ok(PriceRange::new(min, max))
}

/// Split a comma separated list, trimming entries and dropping empty ones.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .trim()
}

fn apply(q: &mut Questionnaire, key: &str, value: &str) -> Result<(), String> {
    match key {
        "brand.vision" => q.brand_overview.vision = value.to_string(),
        "brand.target_audience" => q.brand_overview.target_audience = value.to_string(),
        "brand.unique_selling_points" => {
            q.brand_overview.unique_selling_points = parse_list(value)
        }
        "brand.current_products" => q.brand_overview.current_products = optional(value),
        "brand.inspiration" => q.brand_overview.inspiration = optional(value),

        "products.description" => q.products.description = value.to_string(),
        "products.images" => q.products.images = parse_list(value),
        "products.categories" => q.products.categories = parse_list(value),
        "products.price_range" => q.products.price_range = parse_price_range(value)?,
        "products.ingredients" => q.products.ingredients = optional(value),
        "products.benefits" => q.products.benefits = optional(value),

        "training.goals" => q.training.goals = value.to_string(),
        "training.target_learners" => q.training.target_learners = value.to_string(),
        "training.certification_types" => q.training.certification_types = parse_list(value),
        "training.duration" => q.training.duration = optional(value),
        "training.price_range" => q.training.price_range = Some(parse_price_range(value)?),

        "before_after.transformation_goals" => {
            q.before_after.transformation_goals = value.to_string()
        }
        "before_after.treatment_types" => q.before_after.treatment_types = parse_list(value),
        "before_after.expected_duration" => q.before_after.expected_duration = value.to_string(),
        "before_after.target_concerns" => q.before_after.target_concerns = parse_list(value),

        "providers.specialties_needed" => q.providers.specialties_needed = parse_list(value),
        "providers.certification_levels" => {
            q.providers.certification_levels = parse_list(value)
        }
        "providers.location_preferences" => {
            q.providers.location_preferences = value.to_string()
        }
        "providers.experience_level" => q.providers.experience_level = optional(value),

        other => tracing::trace!("Ignoring unknown requirements key '{}'", other),
    }
    Ok(())
}
