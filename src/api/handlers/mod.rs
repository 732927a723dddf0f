use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::error::PipelineError;
use crate::models::*;
use crate::pipeline::{RunRequest, RunSnapshot};
use crate::requirements::{self, ParseOutcome};

type ApiError = (StatusCode, String);

// ============================================================
// Error Handling
// ============================================================

/// Log an internal error and return a sanitized response to the client.
fn internal_error(e: impl std::fmt::Display) -> ApiError {
    tracing::error!("Internal error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

/// Map pipeline failures onto HTTP statuses.
///
/// Caller-fixable problems are returned verbatim; store failures are logged
/// and sanitized.
fn pipeline_error(e: PipelineError) -> ApiError {
    let status = match &e {
        PipelineError::Validation(_) | PipelineError::Precondition(_) => {
            Some(StatusCode::BAD_REQUEST)
        }
        PipelineError::NotFound(_) => Some(StatusCode::NOT_FOUND),
        PipelineError::Conflict(_) | PipelineError::Discarded => Some(StatusCode::CONFLICT),
        PipelineError::Stage { .. }
        | PipelineError::Regeneration { .. }
        | PipelineError::InvalidContent(_) => Some(StatusCode::BAD_GATEWAY),
        PipelineError::Commit { .. } | PipelineError::Store(_) => None,
    };
    let Some(status) = status else {
        return internal_error(e);
    };
    tracing::warn!("Request failed: {}", e);
    (status, e.to_string())
}

fn brand_not_found() -> ApiError {
    (StatusCode::NOT_FOUND, "Brand not found".to_string())
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Brands
// ============================================================

pub async fn list_brands(
    State(state): State<AppState>,
) -> Result<Json<Vec<BrandSummary>>, ApiError> {
    let brands = state.db.get_all_brands().map_err(internal_error)?;
    Ok(Json(brands.into_iter().map(Into::into).collect()))
}

pub async fn get_brand(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Brand>, ApiError> {
    state
        .db
        .get_brand(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(brand_not_found)
}

pub async fn create_brand(
    State(state): State<AppState>,
    Json(input): Json<CreateBrandInput>,
) -> Result<(StatusCode, Json<Brand>), ApiError> {
    if input.name.trim().is_empty() || input.user_id.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Brand name and user id are required".to_string(),
        ));
    }
    state
        .db
        .create_brand(input)
        .map(|b| (StatusCode::CREATED, Json(b)))
        .map_err(internal_error)
}

pub async fn delete_brand(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.db.delete_brand(id).map_err(internal_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(brand_not_found())
    }
}

/// Save a manually entered questionnaire after full validation.
pub async fn save_questionnaire(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(questionnaire): Json<Questionnaire>,
) -> Result<StatusCode, ApiError> {
    let errors = questionnaire.validate();
    if !errors.is_empty() {
        return Err(pipeline_error(PipelineError::Validation(errors)));
    }
    if state
        .db
        .save_questionnaire(id, &questionnaire)
        .map_err(internal_error)?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(brand_not_found())
    }
}

// ============================================================
// Requirements files
// ============================================================

pub async fn parse_requirements(body: String) -> Json<ParseOutcome> {
    Json(requirements::parse(&body))
}

// ============================================================
// Generation runs
// ============================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGenerationInput {
    /// Questionnaire to generate from. Defaults to the brand's saved one.
    #[serde(default)]
    pub questionnaire: Option<Questionnaire>,
    /// Identity the run is issued under. Defaults to the brand owner.
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGenerationResponse {
    pub run_id: Uuid,
}

pub async fn start_generation(
    State(state): State<AppState>,
    Path(brand_id): Path<Uuid>,
    Json(input): Json<StartGenerationInput>,
) -> Result<(StatusCode, Json<StartGenerationResponse>), ApiError> {
    let brand = state
        .db
        .get_brand(brand_id)
        .map_err(internal_error)?
        .ok_or_else(brand_not_found)?;

    let mut context = BrandContext::from(&brand);
    if let Some(user_id) = input.user_id {
        context.user_id = user_id;
    }

    let questionnaire = input
        .questionnaire
        .or(brand.questionnaire)
        .ok_or_else(|| {
            pipeline_error(PipelineError::validation(
                "questionnaire is required: submit one or save it on the brand first",
            ))
        })?;

    let request = RunRequest {
        brand: context,
        questionnaire,
    };
    state
        .orchestrator
        .check_preconditions(&request)
        .map_err(pipeline_error)?;

    let run = state.staging.start(state.orchestrator.clone(), request);
    tracing::info!(run_id = %run.id(), %brand_id, "Generation run started");

    Ok((
        StatusCode::ACCEPTED,
        Json(StartGenerationResponse { run_id: run.id() }),
    ))
}

pub async fn get_generation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunSnapshot>, ApiError> {
    let run = state
        .staging
        .get(id)
        .ok_or((StatusCode::NOT_FOUND, "Generation run not found".to_string()))?;
    Ok(Json(run.snapshot().await))
}

pub async fn discard_generation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.staging.discard(id).await.map_err(pipeline_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegenerateInput {
    pub category: ContentCategory,
    pub feedback: String,
}

pub async fn regenerate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<RegenerateInput>,
) -> Result<Json<StagedContentBundle>, ApiError> {
    state
        .staging
        .regenerate(id, &state.regenerator, input.category, &input.feedback)
        .await
        .map(Json)
        .map_err(pipeline_error)
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptResponse {
    pub success: bool,
    pub already_accepted: bool,
    pub version: i64,
}

pub async fn accept(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AcceptResponse>, ApiError> {
    let outcome = state
        .staging
        .accept(id, &state.committer)
        .await
        .map_err(pipeline_error)?;
    Ok(Json(AcceptResponse {
        success: true,
        already_accepted: outcome.already_accepted,
        version: outcome.version,
    }))
}
