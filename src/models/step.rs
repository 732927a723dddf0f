use serde::{Deserialize, Serialize};

/// One named stage of a generation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationStep {
    pub id: String,
    pub label: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The status of a stage.
///
/// - `Pending`: Not started
/// - `Processing`: The single active stage
/// - `Completed`: Finished; never reverts
/// - `Error`: Failed; halts the run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Terminal statuses never change again within a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Stage ids in execution order.
pub const STAGE_SAVE_INPUT: &str = "save-input";
pub const STAGE_PRODUCTS: &str = "generate-products";
pub const STAGE_PROVIDERS: &str = "generate-providers";
pub const STAGE_TRAINING: &str = "generate-training";
pub const STAGE_TRANSFORMATIONS: &str = "generate-transformations";
pub const STAGE_REVIEWS: &str = "generate-reviews";
pub const STAGE_FINALIZE: &str = "finalize";

/// `(id, label)` for every stage, in declared order.
pub const GENERATION_STAGES: &[(&str, &str)] = &[
    (STAGE_SAVE_INPUT, "Saving questionnaire"),
    (STAGE_PRODUCTS, "Generating products"),
    (STAGE_PROVIDERS, "Matching providers"),
    (STAGE_TRAINING, "Designing training programs"),
    (STAGE_TRANSFORMATIONS, "Creating transformations"),
    (STAGE_REVIEWS, "Writing reviews"),
    (STAGE_FINALIZE, "Finalizing content"),
];

impl GenerationStep {
    pub fn pending(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            status: StepStatus::Pending,
            error: None,
        }
    }

    /// Fresh step list for a new run, every stage `Pending`.
    pub fn initial_steps() -> Vec<Self> {
        GENERATION_STAGES
            .iter()
            .map(|(id, label)| Self::pending(id, label))
            .collect()
    }
}
