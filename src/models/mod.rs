//! Domain models for brandkit.
//!
//! # Core Concepts
//!
//! ## Input
//!
//! - [`Questionnaire`]: Structured description of a brand across five domains
//!   (overview, products, training, transformations, providers). Immutable once
//!   a generation run starts.
//!
//! ## Staged Entities
//!
//! These live in memory between a generation run and its acceptance:
//!
//! - [`StagedContentBundle`]: Four category sequences produced by one run.
//! - [`GenerationStep`]: Progress of a single named stage within a run.
//!
//! ## Permanent Entities
//!
//! - [`Brand`]: The persisted aggregate that accepted content is merged into.
//! - [`Product`], [`Provider`], [`TrainingProgram`], [`BeforeAfter`]: Category
//!   entities. Cross-references (a [`Review`]'s `product_id`) are by id only.

mod brand;
mod bundle;
mod content;
mod questionnaire;
mod step;

pub use brand::*;
pub use bundle::*;
pub use content::*;
pub use questionnaire::*;
pub use step::*;
