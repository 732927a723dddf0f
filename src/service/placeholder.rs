//! Deterministic offline content derived from the questionnaire.
//!
//! Used for `--offline` CLI runs and, when degraded mode is switched on, in
//! place of a failed service call.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::*;
use crate::models::*;

const REVIEW_AUTHORS: &[&str] = &["Maya R.", "Jordan T.", "Priya S.", "Alex K."];

#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderService;

impl PlaceholderService {
    pub fn new() -> Self {
        Self
    }

    /// Build typed placeholder content for a questionnaire.
    pub fn content_for(&self, request: &GenerationRequest) -> StagedContentBundle {
        let q = &request.questionnaire;
        StagedContentBundle::new(
            products(&request.brand_name, q),
            providers(q),
            training_programs(q),
            before_afters(q),
        )
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Price for the `index`-th of `count` products, strictly inside an ordered range.
fn price_in_range(range: PriceRange, index: usize, count: usize) -> f64 {
    if !range.is_ordered() {
        return f64::from(range.min.max(range.max));
    }
    let span = f64::from(range.max - range.min);
    let step = span / (count as f64 + 1.0);
    (f64::from(range.min) + step * (index as f64 + 1.0)).round()
}

fn products(brand_name: &str, q: &Questionnaire) -> Vec<Product> {
    let categories = &q.products.categories;
    let ingredients = q
        .products
        .ingredients
        .as_deref()
        .map(crate::requirements::parse_list)
        .unwrap_or_default();
    let benefits = q
        .products
        .benefits
        .as_deref()
        .map(crate::requirements::parse_list)
        .unwrap_or_default();

    categories
        .iter()
        .enumerate()
        .map(|(i, category)| {
            let id = new_id();
            let review = Review {
                id: new_id(),
                product_id: id.clone(),
                author: REVIEW_AUTHORS[i % REVIEW_AUTHORS.len()].to_string(),
                rating: 5,
                comment: format!("My go-to {} product from {}.", category, brand_name),
            };
            Product {
                name: format!("{} Signature {}", brand_name, title_case(category)),
                description: format!("{} {}", q.products.description, q.brand_overview.vision)
                    .trim()
                    .to_string(),
                category: category.clone(),
                price: price_in_range(q.products.price_range, i, categories.len()),
                ingredients: ingredients.clone(),
                benefits: benefits.clone(),
                images: q.products.images.clone(),
                reviews: vec![review],
                id,
            }
        })
        .collect()
}

fn providers(q: &Questionnaire) -> Vec<Provider> {
    let levels = &q.providers.certification_levels;
    q.providers
        .specialties_needed
        .iter()
        .enumerate()
        .map(|(i, specialty)| Provider {
            id: new_id(),
            name: format!("{} Specialist {}", title_case(specialty), i + 1),
            specialty: specialty.clone(),
            certification_level: levels
                .get(i % levels.len().max(1))
                .cloned()
                .unwrap_or_else(|| "certified".to_string()),
            location: q.providers.location_preferences.clone(),
            experience_years: Some(5 + i as u32),
            bio: q.providers.experience_level.clone(),
        })
        .collect()
}

fn training_programs(q: &Questionnaire) -> Vec<TrainingProgram> {
    let t = &q.training;
    t.certification_types
        .iter()
        .enumerate()
        .map(|(i, certification)| TrainingProgram {
            id: new_id(),
            title: format!("{} Certification", title_case(certification)),
            description: format!("{} For {}.", t.goals, t.target_learners),
            certification_type: certification.clone(),
            duration: t.duration.clone().unwrap_or_else(|| "6 weeks".to_string()),
            price: t
                .price_range
                .map(|range| price_in_range(range, i, t.certification_types.len())),
        })
        .collect()
}

fn before_afters(q: &Questionnaire) -> Vec<BeforeAfter> {
    let b = &q.before_after;
    b.treatment_types
        .iter()
        .map(|treatment| BeforeAfter {
            id: new_id(),
            title: format!("{} Transformation", title_case(treatment)),
            treatment_type: treatment.clone(),
            description: b.transformation_goals.clone(),
            duration: b.expected_duration.clone(),
            concerns: b.target_concerns.clone(),
            before_image: None,
            after_image: None,
        })
        .collect()
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn to_raw<T: Serialize>(items: &[T]) -> Result<Vec<Value>, ServiceError> {
    items
        .iter()
        .map(|item| serde_json::to_value(item).map_err(|e| ServiceError::Malformed(e.to_string())))
        .collect()
}

/// Give a regenerated entity a fresh id and fold the feedback into its text.
fn revise(mut value: Value, feedback: &str) -> Value {
    let Some(obj) = value.as_object_mut() else {
        return value;
    };

    let id = new_id();
    obj.insert("id".to_string(), Value::String(id.clone()));

    // Providers carry no description; their bio takes the feedback instead.
    if let Some(Value::String(description)) = obj.get_mut("description") {
        *description = format!("{} (Revised: {})", description, feedback);
    } else {
        let bio = match obj.get("bio") {
            Some(Value::String(bio)) if !bio.trim().is_empty() => {
                format!("{} (Revised: {})", bio, feedback)
            }
            _ => format!("Revised: {}", feedback),
        };
        obj.insert("bio".to_string(), Value::String(bio));
    }

    if let Some(Value::Array(reviews)) = obj.get_mut("reviews") {
        for review in reviews.iter_mut().filter_map(Value::as_object_mut) {
            review.insert("id".to_string(), Value::String(new_id()));
            review.insert("productId".to_string(), Value::String(id.clone()));
        }
    }

    value
}

#[async_trait]
impl GenerationService for PlaceholderService {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedContent, ServiceError> {
        let bundle = self.content_for(request);
        Ok(GeneratedContent {
            products: to_raw(&bundle.products)?,
            providers: to_raw(&bundle.providers)?,
            training_programs: to_raw(&bundle.training_programs)?,
            before_afters: to_raw(&bundle.before_afters)?,
        })
    }

    async fn regenerate(&self, request: &RegenerationRequest) -> Result<Vec<Value>, ServiceError> {
        Ok(request
            .current_content
            .iter()
            .cloned()
            .map(|value| revise(value, &request.feedback))
            .collect())
    }
}
