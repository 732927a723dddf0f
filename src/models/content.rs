use std::collections::HashSet;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One of the four kinds of generated content.
///
/// The wire name (used by the generation service and the HTTP API) and the
/// field name (used by [`super::StagedContentBundle`] and [`super::Brand`])
/// differ for two categories; [`CATEGORY_TABLE`] is the only place that
/// mapping lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentCategory {
    #[serde(rename = "products")]
    Products,
    #[serde(rename = "providers")]
    Providers,
    #[serde(rename = "training")]
    Training,
    #[serde(rename = "beforeAfter")]
    BeforeAfter,
}

/// `(category, wire name, bundle field name)`
pub const CATEGORY_TABLE: &[(ContentCategory, &str, &str)] = &[
    (ContentCategory::Products, "products", "products"),
    (ContentCategory::Providers, "providers", "providers"),
    (ContentCategory::Training, "training", "trainingPrograms"),
    (ContentCategory::BeforeAfter, "beforeAfter", "beforeAfters"),
];

impl ContentCategory {
    pub const ALL: [ContentCategory; 4] = [
        ContentCategory::Products,
        ContentCategory::Providers,
        ContentCategory::Training,
        ContentCategory::BeforeAfter,
    ];

    fn entry(&self) -> &'static (ContentCategory, &'static str, &'static str) {
        CATEGORY_TABLE
            .iter()
            .find(|(c, _, _)| c == self)
            .unwrap_or(&CATEGORY_TABLE[0])
    }

    pub fn as_str(&self) -> &'static str {
        self.entry().1
    }

    pub fn field_name(&self) -> &'static str {
        self.entry().2
    }

    pub fn from_str(s: &str) -> Option<Self> {
        CATEGORY_TABLE
            .iter()
            .find(|(_, wire, _)| *wire == s)
            .map(|(c, _, _)| *c)
    }
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A service response for one category that could not be accepted.
#[derive(Debug, Clone, Error)]
#[error("invalid {category} content: {}", problems.join("; "))]
pub struct ContentError {
    pub category: ContentCategory,
    pub problems: Vec<String>,
}

/// Field-level checks every category entity provides.
pub trait ContentEntity: Serialize + DeserializeOwned + Clone {
    fn id(&self) -> &str;

    /// Push one message per violated constraint. `path` prefixes each message.
    fn check(&self, path: &str, problems: &mut Vec<String>);
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: f64,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub benefits: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

/// A customer review. Belongs to the product named by `product_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub product_id: String,
    pub author: String,
    pub rating: u8,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub specialty: String,
    pub certification_level: String,
    pub location: String,
    #[serde(default)]
    pub experience_years: Option<u32>,
    #[serde(default)]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrainingProgram {
    pub id: String,
    pub title: String,
    pub description: String,
    pub certification_type: String,
    pub duration: String,
    #[serde(default)]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BeforeAfter {
    pub id: String,
    pub title: String,
    pub treatment_type: String,
    pub description: String,
    pub duration: String,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub before_image: Option<String>,
    #[serde(default)]
    pub after_image: Option<String>,
}

impl ContentEntity for Product {
    fn id(&self) -> &str {
        &self.id
    }

    fn check(&self, path: &str, problems: &mut Vec<String>) {
        non_blank(problems, path, "id", &self.id);
        non_blank(problems, path, "name", &self.name);
        non_blank(problems, path, "description", &self.description);
        non_blank(problems, path, "category", &self.category);
        valid_price(problems, path, "price", self.price);
        for (i, review) in self.reviews.iter().enumerate() {
            let review_path = format!("{}.reviews[{}]", path, i);
            non_blank(problems, &review_path, "id", &review.id);
            non_blank(problems, &review_path, "author", &review.author);
            non_blank(problems, &review_path, "comment", &review.comment);
            if !(1..=5).contains(&review.rating) {
                problems.push(format!(
                    "{}.rating must be between 1 and 5, got {}",
                    review_path, review.rating
                ));
            }
        }
    }
}

impl ContentEntity for Provider {
    fn id(&self) -> &str {
        &self.id
    }

    fn check(&self, path: &str, problems: &mut Vec<String>) {
        non_blank(problems, path, "id", &self.id);
        non_blank(problems, path, "name", &self.name);
        non_blank(problems, path, "specialty", &self.specialty);
        non_blank(problems, path, "certificationLevel", &self.certification_level);
        non_blank(problems, path, "location", &self.location);
    }
}

impl ContentEntity for TrainingProgram {
    fn id(&self) -> &str {
        &self.id
    }

    fn check(&self, path: &str, problems: &mut Vec<String>) {
        non_blank(problems, path, "id", &self.id);
        non_blank(problems, path, "title", &self.title);
        non_blank(problems, path, "description", &self.description);
        non_blank(problems, path, "certificationType", &self.certification_type);
        non_blank(problems, path, "duration", &self.duration);
        if let Some(price) = self.price {
            valid_price(problems, path, "price", price);
        }
    }
}

impl ContentEntity for BeforeAfter {
    fn id(&self) -> &str {
        &self.id
    }

    fn check(&self, path: &str, problems: &mut Vec<String>) {
        non_blank(problems, path, "id", &self.id);
        non_blank(problems, path, "title", &self.title);
        non_blank(problems, path, "treatmentType", &self.treatment_type);
        non_blank(problems, path, "description", &self.description);
        non_blank(problems, path, "duration", &self.duration);
    }
}

fn non_blank(problems: &mut Vec<String>, path: &str, field: &str, value: &str) {
    if value.trim().is_empty() {
        problems.push(format!("{}.{} is required", path, field));
    }
}

fn valid_price(problems: &mut Vec<String>, path: &str, field: &str, value: f64) {
    if !value.is_finite() || value < 0.0 {
        problems.push(format!("{}.{} must be a non-negative number", path, field));
    }
}

/// Decode raw service output for one category into typed entities.
///
/// Every element is decoded and checked; all problems are collected before
/// failing. Ids must be unique within the category.
pub fn decode_entities<T: ContentEntity>(
    category: ContentCategory,
    values: Vec<Value>,
) -> Result<Vec<T>, ContentError> {
    let mut problems = Vec::new();
    let mut entities = Vec::with_capacity(values.len());
    let mut seen = HashSet::new();

    for (i, value) in values.into_iter().enumerate() {
        let path = format!("{}[{}]", category.field_name(), i);
        match serde_json::from_value::<T>(value) {
            Ok(entity) => {
                entity.check(&path, &mut problems);
                if !entity.id().trim().is_empty() && !seen.insert(entity.id().to_string()) {
                    problems.push(format!("{}.id '{}' is duplicated", path, entity.id()));
                }
                entities.push(entity);
            }
            Err(e) => problems.push(format!("{}: {}", path, e)),
        }
    }

    if problems.is_empty() {
        Ok(entities)
    } else {
        Err(ContentError { category, problems })
    }
}

/// Every review must point back at the product that carries it.
pub fn check_review_links(products: &[Product]) -> Result<(), ContentError> {
    let problems: Vec<String> = products
        .iter()
        .enumerate()
        .flat_map(|(i, product)| {
            product
                .reviews
                .iter()
                .enumerate()
                .filter(move |(_, review)| review.product_id != product.id)
                .map(move |(j, review)| {
                    format!(
                        "products[{}].reviews[{}].productId '{}' does not match product '{}'",
                        i, j, review.product_id, product.id
                    )
                })
        })
        .collect();

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ContentError {
            category: ContentCategory::Products,
            problems,
        })
    }
}

/// A single category's entities, tagged with their category.
#[derive(Debug, Clone, PartialEq)]
pub enum CategoryContent {
    Products(Vec<Product>),
    Providers(Vec<Provider>),
    Training(Vec<TrainingProgram>),
    BeforeAfter(Vec<BeforeAfter>),
}

impl CategoryContent {
    /// Decode and fully validate one category, including review links for products.
    pub fn decode(category: ContentCategory, values: Vec<Value>) -> Result<Self, ContentError> {
        Ok(match category {
            ContentCategory::Products => {
                let products = decode_entities::<Product>(category, values)?;
                check_review_links(&products)?;
                Self::Products(products)
            }
            ContentCategory::Providers => Self::Providers(decode_entities(category, values)?),
            ContentCategory::Training => Self::Training(decode_entities(category, values)?),
            ContentCategory::BeforeAfter => Self::BeforeAfter(decode_entities(category, values)?),
        })
    }

    pub fn category(&self) -> ContentCategory {
        match self {
            Self::Products(_) => ContentCategory::Products,
            Self::Providers(_) => ContentCategory::Providers,
            Self::Training(_) => ContentCategory::Training,
            Self::BeforeAfter(_) => ContentCategory::BeforeAfter,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Products(v) => v.len(),
            Self::Providers(v) => v.len(),
            Self::Training(v) => v.len(),
            Self::BeforeAfter(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw JSON form, as sent to the generation service.
    pub fn to_values(&self) -> serde_json::Result<Vec<Value>> {
        match self {
            Self::Products(v) => to_values(v),
            Self::Providers(v) => to_values(v),
            Self::Training(v) => to_values(v),
            Self::BeforeAfter(v) => to_values(v),
        }
    }
}

fn to_values<T: Serialize>(items: &[T]) -> serde_json::Result<Vec<Value>> {
    items.iter().map(serde_json::to_value).collect()
}
