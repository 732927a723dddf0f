use std::sync::Arc;

use crate::config::Config;
use crate::db::BrandStore;
use crate::error::{PipelineError, Result};
use crate::models::*;
use crate::service::{GeneratedContent, GenerationRequest, GenerationService, PlaceholderService};

use super::progress::{ProgressReporter, StepTracker, TransitionError};
use super::require_content;

/// Everything a run needs: the questionnaire and who it is for.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub brand: BrandContext,
    pub questionnaire: Questionnaire,
}

/// Drives a generation run through its stages.
///
/// One service call produces all four categories; the stages after it decode
/// and validate that single result one category at a time, so a malformed
/// category fails at its own stage and earlier stages stay completed.
#[derive(Clone)]
pub struct GenerationOrchestrator {
    service: Arc<dyn GenerationService>,
    store: Arc<dyn BrandStore>,
    fallback: PlaceholderService,
    config: Config,
}

impl GenerationOrchestrator {
    pub fn new(
        service: Arc<dyn GenerationService>,
        store: Arc<dyn BrandStore>,
        config: Config,
    ) -> Self {
        Self {
            service,
            store,
            fallback: PlaceholderService::new(),
            config,
        }
    }

    /// Reject a run that cannot start. Performs no writes and no service calls.
    pub fn check_preconditions(&self, request: &RunRequest) -> Result<()> {
        let brand = &request.brand;
        if brand.brand_id.is_nil() {
            return Err(PipelineError::Precondition("brand id is required".into()));
        }
        if brand.brand_name.trim().is_empty() {
            return Err(PipelineError::Precondition("brand name is required".into()));
        }
        if brand.user_id.trim().is_empty() {
            return Err(PipelineError::Precondition("user id is required".into()));
        }

        let stored = self
            .store
            .get_brand(brand.brand_id)?
            .ok_or_else(|| {
                PipelineError::Precondition(format!("brand {} does not exist", brand.brand_id))
            })?;
        if stored.user_id != brand.user_id {
            return Err(PipelineError::Precondition(format!(
                "user {} is not associated with brand {}",
                brand.user_id, brand.brand_id
            )));
        }

        let errors = request.questionnaire.validate();
        if !errors.is_empty() {
            return Err(PipelineError::Validation(errors));
        }

        Ok(())
    }

    /// Run every stage and return the staged bundle.
    ///
    /// Progress is published through `progress`; the reporter is dropped when
    /// this returns, which closes the stream.
    pub async fn run(
        &self,
        request: RunRequest,
        progress: ProgressReporter,
    ) -> Result<StagedContentBundle> {
        self.check_preconditions(&request)?;

        let brand_id = request.brand.brand_id;
        tracing::info!(%brand_id, "Starting generation run");
        let mut tracker = StepTracker::new(GenerationStep::initial_steps(), progress);

        // save-input
        self.begin(&mut tracker, STAGE_SAVE_INPUT)?;
        let saved = self
            .store
            .save_questionnaire(brand_id, &request.questionnaire)
            .map_err(|e| e.to_string())
            .and_then(|found| {
                found
                    .then_some(())
                    .ok_or_else(|| format!("brand {} disappeared", brand_id))
            });
        self.settle(&mut tracker, STAGE_SAVE_INPUT, saved).await?;

        // generate-products: the only external call of the run
        self.begin(&mut tracker, STAGE_PRODUCTS)?;
        let mut generated = match self.call_service(&request).await {
            Ok(generated) => generated,
            Err(message) => return Err(self.abort(&mut tracker, STAGE_PRODUCTS, message)),
        };
        let products = self.decode_stage(
            &mut tracker,
            STAGE_PRODUCTS,
            ContentCategory::Products,
            &mut generated,
        )?;
        self.settle(&mut tracker, STAGE_PRODUCTS, Ok(())).await?;

        self.begin(&mut tracker, STAGE_PROVIDERS)?;
        let providers = self.decode_stage(
            &mut tracker,
            STAGE_PROVIDERS,
            ContentCategory::Providers,
            &mut generated,
        )?;
        self.settle(&mut tracker, STAGE_PROVIDERS, Ok(())).await?;

        self.begin(&mut tracker, STAGE_TRAINING)?;
        let training = self.decode_stage(
            &mut tracker,
            STAGE_TRAINING,
            ContentCategory::Training,
            &mut generated,
        )?;
        self.settle(&mut tracker, STAGE_TRAINING, Ok(())).await?;

        self.begin(&mut tracker, STAGE_TRANSFORMATIONS)?;
        let before_afters = self.decode_stage(
            &mut tracker,
            STAGE_TRANSFORMATIONS,
            ContentCategory::BeforeAfter,
            &mut generated,
        )?;
        self.settle(&mut tracker, STAGE_TRANSFORMATIONS, Ok(())).await?;

        self.begin(&mut tracker, STAGE_REVIEWS)?;
        let links = check_review_links(&products).map_err(|e| e.to_string());
        self.settle(&mut tracker, STAGE_REVIEWS, links).await?;

        self.begin(&mut tracker, STAGE_FINALIZE)?;
        let bundle = StagedContentBundle::new(products, providers, training, before_afters);
        self.settle(&mut tracker, STAGE_FINALIZE, Ok(())).await?;

        tracing::info!(
            %brand_id,
            bundle_id = %bundle.id,
            products = bundle.products.len(),
            providers = bundle.providers.len(),
            training_programs = bundle.training_programs.len(),
            before_afters = bundle.before_afters.len(),
            "Generation run finished"
        );
        Ok(bundle)
    }

    async fn call_service(
        &self,
        request: &RunRequest,
    ) -> std::result::Result<GeneratedContent, String> {
        let service_request = GenerationRequest {
            brand_id: request.brand.brand_id,
            brand_name: request.brand.brand_name.clone(),
            user_id: request.brand.user_id.clone(),
            questionnaire: request.questionnaire.clone(),
        };

        match self.service.generate(&service_request).await {
            Ok(generated) => Ok(generated),
            Err(e) if self.config.degraded_mode => {
                tracing::warn!(error = %e, "Generation service failed, using placeholder content");
                self.fallback
                    .generate(&service_request)
                    .await
                    .map_err(|e| e.to_string())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    fn decode_stage<T: ContentEntity>(
        &self,
        tracker: &mut StepTracker,
        stage: &str,
        category: ContentCategory,
        generated: &mut GeneratedContent,
    ) -> Result<Vec<T>> {
        let decoded = decode_entities::<T>(category, generated.take(category))
            .map_err(|e| e.to_string())
            .and_then(|entities| {
                require_content(category, entities.len()).map_err(|e| e.to_string())?;
                Ok(entities)
            });

        decoded.map_err(|message| self.abort(tracker, stage, message))
    }

    fn begin(&self, tracker: &mut StepTracker, stage: &str) -> Result<()> {
        tracker.start(stage).map_err(transition_error)
    }

    /// Complete `stage` on success (then pace), or fail it and stop the run.
    async fn settle(
        &self,
        tracker: &mut StepTracker,
        stage: &str,
        outcome: std::result::Result<(), String>,
    ) -> Result<()> {
        if let Err(message) = outcome {
            return Err(self.abort(tracker, stage, message));
        }
        tracker.complete(stage).map_err(transition_error)?;
        if !self.config.stage_pacing.is_zero() {
            tokio::time::sleep(self.config.stage_pacing).await;
        }
        Ok(())
    }

    fn abort(&self, tracker: &mut StepTracker, stage: &str, message: String) -> PipelineError {
        if let Err(e) = tracker.fail(stage, message.clone()) {
            return transition_error(e);
        }
        PipelineError::stage(stage, message)
    }
}

fn transition_error(e: TransitionError) -> PipelineError {
    PipelineError::stage(&e.stage, e.to_string())
}
