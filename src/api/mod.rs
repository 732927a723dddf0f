mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::db::{BrandStore, Database};
use crate::pipeline::{
    AcceptanceCommitter, GenerationOrchestrator, RegenerationController, StagingArea,
};
use crate::service::GenerationService;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub orchestrator: GenerationOrchestrator,
    pub regenerator: RegenerationController,
    pub committer: AcceptanceCommitter,
    pub staging: StagingArea,
}

impl AppState {
    pub fn new(db: Database, service: Arc<dyn GenerationService>, config: Config) -> Self {
        let store: Arc<dyn BrandStore> = Arc::new(db.clone());
        Self {
            orchestrator: GenerationOrchestrator::new(
                service.clone(),
                store.clone(),
                config.clone(),
            ),
            regenerator: RegenerationController::new(service, &config),
            committer: AcceptanceCommitter::new(store, config.accept_retries),
            staging: StagingArea::new(),
            db,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Brands
        .route("/brands", get(handlers::list_brands).post(handlers::create_brand))
        .route(
            "/brands/{id}",
            get(handlers::get_brand).delete(handlers::delete_brand),
        )
        .route("/brands/{id}/questionnaire", put(handlers::save_questionnaire))
        .route("/brands/{id}/generations", post(handlers::start_generation))
        // Requirements files
        .route("/requirements/parse", post(handlers::parse_requirements))
        // Generation runs
        .route(
            "/generations/{id}",
            get(handlers::get_generation).delete(handlers::discard_generation),
        )
        .route("/generations/{id}/regenerate", post(handlers::regenerate))
        .route("/generations/{id}/accept", post(handlers::accept))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
