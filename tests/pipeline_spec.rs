//! Generation pipeline integration tests.
//!
//! Tests are organized by component:
//! - Orchestration: stage progression, failures, preconditions
//! - Regeneration: single-category replacement
//! - Acceptance: append-only merge into the brand store
//! - Staging: runs held between generation and acceptance

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;
use uuid::Uuid;

use brandkit::config::Config;
use brandkit::db::{BrandStore, CommitResult, Database};
use brandkit::error::PipelineError;
use brandkit::models::*;
use brandkit::pipeline::*;
use brandkit::service::*;

// ============================================================
// Fixtures
// ============================================================

fn questionnaire() -> Questionnaire {
    Questionnaire {
        brand_overview: BrandOverview {
            vision: "Clinical skincare that feels like a spa day".to_string(),
            target_audience: "Women 30-55".to_string(),
            unique_selling_points: vec!["dermatologist formulated".to_string()],
            ..Default::default()
        },
        products: ProductRequirements {
            description: "Targeted serums".to_string(),
            categories: vec!["skincare".to_string()],
            price_range: PriceRange::new(20, 200),
            ..Default::default()
        },
        training: TrainingRequirements {
            goals: "Certify estheticians".to_string(),
            target_learners: "Licensed estheticians".to_string(),
            certification_types: vec!["Advanced Facial".to_string()],
            ..Default::default()
        },
        before_after: BeforeAfterRequirements {
            transformation_goals: "Reduce fine lines".to_string(),
            treatment_types: vec!["chemical peel".to_string()],
            expected_duration: "12 weeks".to_string(),
            ..Default::default()
        },
        providers: ProviderRequirements {
            specialties_needed: vec!["dermatology".to_string(), "esthetics".to_string()],
            certification_levels: vec!["board certified".to_string()],
            location_preferences: "Austin, TX".to_string(),
            ..Default::default()
        },
    }
}

fn setup_db() -> Database {
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");
    db
}

fn create_brand(db: &Database) -> Brand {
    db.create_brand(CreateBrandInput {
        name: "Glow Lab".to_string(),
        user_id: "user-1".to_string(),
    })
    .expect("Failed to create brand")
}

fn run_request(brand: &Brand) -> RunRequest {
    RunRequest {
        brand: BrandContext::from(brand),
        questionnaire: questionnaire(),
    }
}

/// Valid raw service output for the fixture questionnaire.
async fn placeholder_content(brand: &Brand) -> GeneratedContent {
    PlaceholderService::new()
        .generate(&GenerationRequest {
            brand_id: brand.id,
            brand_name: brand.name.clone(),
            user_id: brand.user_id.clone(),
            questionnaire: questionnaire(),
        })
        .await
        .expect("Placeholder generation failed")
}

fn product(id: &str) -> Product {
    Product {
        id: id.to_string(),
        name: format!("Product {}", id),
        description: "Daily serum".to_string(),
        category: "skincare".to_string(),
        price: 45.0,
        ingredients: vec![],
        benefits: vec![],
        images: vec![],
        reviews: vec![],
    }
}

fn products_bundle(ids: &[&str]) -> StagedContentBundle {
    StagedContentBundle::new(ids.iter().map(|id| product(id)).collect(), vec![], vec![], vec![])
}

fn product_ids(products: &[Product]) -> Vec<String> {
    products.iter().map(|p| p.id.clone()).collect()
}

/// Generation service double: fixed answers, optional gate, call counting.
#[derive(Default)]
struct MockService {
    generated: Option<GeneratedContent>,
    regenerated: Option<Vec<Value>>,
    gate: Option<Arc<Notify>>,
    generate_calls: AtomicUsize,
    regenerate_calls: AtomicUsize,
    last_regeneration: Mutex<Option<RegenerationRequest>>,
}

impl MockService {
    fn failing() -> Self {
        Self::default()
    }

    fn generating(content: GeneratedContent) -> Self {
        Self {
            generated: Some(content),
            ..Default::default()
        }
    }

    fn regenerating(values: Vec<Value>) -> Self {
        Self {
            regenerated: Some(values),
            ..Default::default()
        }
    }

    fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl GenerationService for MockService {
    async fn generate(&self, _request: &GenerationRequest) -> Result<GeneratedContent, ServiceError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.generated
            .clone()
            .ok_or_else(|| ServiceError::Unavailable("mock outage".to_string()))
    }

    async fn regenerate(&self, request: &RegenerationRequest) -> Result<Vec<Value>, ServiceError> {
        self.regenerate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_regeneration.lock().unwrap() = Some(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.regenerated
            .clone()
            .ok_or_else(|| ServiceError::Unavailable("mock outage".to_string()))
    }
}

fn orchestrator(service: Arc<dyn GenerationService>, db: &Database, config: Config) -> GenerationOrchestrator {
    GenerationOrchestrator::new(service, Arc::new(db.clone()), config)
}

/// Run to completion and collect every published snapshot.
async fn run_collecting(
    orchestrator: &GenerationOrchestrator,
    request: RunRequest,
) -> (Result<StagedContentBundle, PipelineError>, Vec<Vec<GenerationStep>>) {
    let (reporter, mut stream) = progress_channel();
    let result = orchestrator.run(request, reporter).await;
    let mut snapshots = Vec::new();
    while let Some(snapshot) = stream.recv().await {
        snapshots.push(snapshot);
    }
    (result, snapshots)
}

fn statuses(steps: &[GenerationStep]) -> Vec<StepStatus> {
    steps.iter().map(|s| s.status).collect()
}

fn status_of(steps: &[GenerationStep], id: &str) -> StepStatus {
    steps
        .iter()
        .find(|s| s.id == id)
        .map(|s| s.status)
        .expect("Unknown stage")
}

// ============================================================
// Orchestration
// ============================================================

mod orchestration {
    use super::*;

    #[tokio::test]
    async fn completes_every_stage_in_declared_order() {
        let db = setup_db();
        let brand = create_brand(&db);
        let orch = orchestrator(Arc::new(PlaceholderService::new()), &db, Config::for_tests());

        let (result, snapshots) = run_collecting(&orch, run_request(&brand)).await;
        let bundle = result.expect("Run failed");

        let last = snapshots.last().expect("No snapshots");
        let ids: Vec<&str> = last.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "save-input",
                "generate-products",
                "generate-providers",
                "generate-training",
                "generate-transformations",
                "generate-reviews",
                "finalize",
            ]
        );
        assert!(last.iter().all(|s| s.status == StepStatus::Completed));

        // initial snapshot + start/complete per stage
        assert_eq!(snapshots.len(), 1 + 2 * 7);

        for p in bundle.products.iter() {
            assert!(p.price >= 20.0 && p.price <= 200.0);
        }
        assert!(!bundle.products.is_empty());
        assert!(!bundle.providers.is_empty());
        assert!(!bundle.training_programs.is_empty());
    }

    #[tokio::test]
    async fn statuses_never_move_backwards() {
        let db = setup_db();
        let brand = create_brand(&db);
        let orch = orchestrator(Arc::new(PlaceholderService::new()), &db, Config::for_tests());

        let (_, snapshots) = run_collecting(&orch, run_request(&brand)).await;

        for pair in snapshots.windows(2) {
            for (before, after) in statuses(&pair[0]).iter().zip(statuses(&pair[1]).iter()) {
                assert!(after >= before, "status regressed from {:?} to {:?}", before, after);
            }
        }
        for snapshot in &snapshots {
            let processing = snapshot
                .iter()
                .filter(|s| s.status == StepStatus::Processing)
                .count();
            assert!(processing <= 1);
        }
    }

    #[tokio::test]
    async fn saves_the_questionnaire_without_touching_content() {
        let db = setup_db();
        let brand = create_brand(&db);
        let orch = orchestrator(Arc::new(PlaceholderService::new()), &db, Config::for_tests());

        let (result, _) = run_collecting(&orch, run_request(&brand)).await;
        result.expect("Run failed");

        let stored = db.get_brand(brand.id).unwrap().unwrap();
        assert_eq!(stored.questionnaire, Some(questionnaire()));
        assert!(stored.content.products.is_empty());
        assert_eq!(stored.version, 0);
    }

    #[tokio::test]
    async fn service_failure_errors_the_active_stage_only() {
        let db = setup_db();
        let brand = create_brand(&db);
        let orch = orchestrator(Arc::new(MockService::failing()), &db, Config::for_tests());

        let (result, snapshots) = run_collecting(&orch, run_request(&brand)).await;

        match result {
            Err(PipelineError::Stage { stage, message }) => {
                assert_eq!(stage, "generate-products");
                assert!(message.contains("mock outage"));
            }
            other => panic!("expected stage error, got {:?}", other.map(|b| b.id)),
        }

        let last = snapshots.last().unwrap();
        assert_eq!(status_of(last, "save-input"), StepStatus::Completed);
        assert_eq!(status_of(last, "generate-products"), StepStatus::Error);
        assert_eq!(status_of(last, "generate-providers"), StepStatus::Pending);
        assert_eq!(status_of(last, "finalize"), StepStatus::Pending);
        assert!(last[1].error.as_deref().unwrap().contains("mock outage"));
    }

    #[tokio::test]
    async fn degraded_mode_falls_back_to_placeholder_content() {
        let db = setup_db();
        let brand = create_brand(&db);
        let service = Arc::new(MockService::failing());
        let orch = orchestrator(service.clone(), &db, Config::for_tests().with_degraded_mode(true));

        let (result, snapshots) = run_collecting(&orch, run_request(&brand)).await;

        let bundle = result.expect("Degraded run should succeed");
        assert_eq!(service.generate_calls.load(Ordering::SeqCst), 1);
        assert_eq!(bundle.products.len(), 1);
        assert!(snapshots.last().unwrap().iter().all(|s| s.status == StepStatus::Completed));
    }

    #[tokio::test]
    async fn malformed_category_fails_at_its_own_stage() {
        let db = setup_db();
        let brand = create_brand(&db);
        let mut content = placeholder_content(&brand).await;
        content.providers = vec![json!({"id": "prov-1", "name": "No Specialty"})];
        let orch = orchestrator(Arc::new(MockService::generating(content)), &db, Config::for_tests());

        let (result, snapshots) = run_collecting(&orch, run_request(&brand)).await;

        assert!(matches!(result, Err(PipelineError::Stage { ref stage, .. }) if stage == "generate-providers"));
        let last = snapshots.last().unwrap();
        assert_eq!(status_of(last, "generate-products"), StepStatus::Completed);
        assert_eq!(status_of(last, "generate-providers"), StepStatus::Error);
        assert_eq!(status_of(last, "generate-training"), StepStatus::Pending);
    }

    #[tokio::test]
    async fn empty_products_are_rejected() {
        let db = setup_db();
        let brand = create_brand(&db);
        let mut content = placeholder_content(&brand).await;
        content.products.clear();
        let orch = orchestrator(Arc::new(MockService::generating(content)), &db, Config::for_tests());

        let (result, _) = run_collecting(&orch, run_request(&brand)).await;

        match result {
            Err(PipelineError::Stage { stage, message }) => {
                assert_eq!(stage, "generate-products");
                assert!(message.contains("must not be empty"));
            }
            other => panic!("expected stage error, got {:?}", other.map(|b| b.id)),
        }
    }

    #[tokio::test]
    async fn empty_transformations_are_allowed() {
        let db = setup_db();
        let brand = create_brand(&db);
        let mut content = placeholder_content(&brand).await;
        content.before_afters.clear();
        let orch = orchestrator(Arc::new(MockService::generating(content)), &db, Config::for_tests());

        let (result, _) = run_collecting(&orch, run_request(&brand)).await;
        assert!(result.expect("Run failed").before_afters.is_empty());
    }

    #[tokio::test]
    async fn mismatched_review_links_fail_the_review_stage() {
        let db = setup_db();
        let brand = create_brand(&db);
        let mut content = placeholder_content(&brand).await;
        content.products[0]["reviews"][0]["productId"] = json!("someone-else");
        let orch = orchestrator(Arc::new(MockService::generating(content)), &db, Config::for_tests());

        let (result, snapshots) = run_collecting(&orch, run_request(&brand)).await;

        assert!(matches!(result, Err(PipelineError::Stage { ref stage, .. }) if stage == "generate-reviews"));
        let last = snapshots.last().unwrap();
        assert_eq!(status_of(last, "generate-transformations"), StepStatus::Completed);
        assert_eq!(status_of(last, "generate-reviews"), StepStatus::Error);
        assert_eq!(status_of(last, "finalize"), StepStatus::Pending);
    }

    #[tokio::test]
    async fn missing_identity_fails_before_any_call() {
        let db = setup_db();
        let brand = create_brand(&db);
        let service = Arc::new(MockService::failing());
        let orch = orchestrator(service.clone(), &db, Config::for_tests());

        let mut no_user = run_request(&brand);
        no_user.brand.user_id = "  ".to_string();
        let (result, snapshots) = run_collecting(&orch, no_user).await;
        assert!(matches!(result, Err(PipelineError::Precondition(_))));
        assert!(snapshots.is_empty());

        let mut no_brand = run_request(&brand);
        no_brand.brand.brand_id = Uuid::nil();
        let (result, _) = run_collecting(&orch, no_brand).await;
        assert!(matches!(result, Err(PipelineError::Precondition(_))));

        assert_eq!(service.generate_calls.load(Ordering::SeqCst), 0);
        assert!(db.get_brand(brand.id).unwrap().unwrap().questionnaire.is_none());
    }

    #[tokio::test]
    async fn unknown_brand_or_foreign_user_is_a_precondition_error() {
        let db = setup_db();
        let brand = create_brand(&db);
        let orch = orchestrator(Arc::new(MockService::failing()), &db, Config::for_tests());

        let mut unknown = run_request(&brand);
        unknown.brand.brand_id = Uuid::new_v4();
        assert!(matches!(orch.check_preconditions(&unknown), Err(PipelineError::Precondition(_))));

        let mut foreign = run_request(&brand);
        foreign.brand.user_id = "user-2".to_string();
        assert!(matches!(orch.check_preconditions(&foreign), Err(PipelineError::Precondition(_))));
    }

    #[tokio::test]
    async fn invalid_questionnaire_is_rejected_up_front() {
        let db = setup_db();
        let brand = create_brand(&db);
        let service = Arc::new(MockService::failing());
        let orch = orchestrator(service.clone(), &db, Config::for_tests());

        let mut request = run_request(&brand);
        request.questionnaire.brand_overview.vision.clear();
        request.questionnaire.training.goals.clear();

        let (result, snapshots) = run_collecting(&orch, request).await;
        match result {
            Err(PipelineError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other.map(|b| b.id)),
        }
        assert!(snapshots.is_empty());
        assert_eq!(service.generate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn end_to_end_skincare_prices_stay_in_range() {
        let db = setup_db();
        let brand = create_brand(&db);
        let mut request = run_request(&brand);
        request.questionnaire.products.categories = vec!["skincare".to_string()];
        request.questionnaire.products.price_range = PriceRange::new(20, 200);
        let orch = orchestrator(Arc::new(PlaceholderService::new()), &db, Config::for_tests());

        let (result, snapshots) = run_collecting(&orch, request).await;
        let bundle = result.expect("Run failed");

        assert!(snapshots.last().unwrap().iter().all(|s| s.status == StepStatus::Completed));
        assert!(!bundle.products.is_empty());
        for p in bundle.products.iter() {
            assert_eq!(p.category, "skincare");
            assert!((20.0..=200.0).contains(&p.price));
            assert!(p.reviews.iter().all(|r| r.product_id == p.id));
        }
    }
}

// ============================================================
// Regeneration
// ============================================================

mod regeneration {
    use super::*;

    fn staged_bundle(brand: &Brand) -> StagedContentBundle {
        PlaceholderService::new().content_for(&GenerationRequest {
            brand_id: brand.id,
            brand_name: brand.name.clone(),
            user_id: brand.user_id.clone(),
            questionnaire: questionnaire(),
        })
    }

    #[tokio::test]
    async fn replaces_only_the_requested_category() {
        let db = setup_db();
        let brand = create_brand(&db);
        let bundle = staged_bundle(&brand);
        let replacement = vec![
            serde_json::to_value(product("new-1")).unwrap(),
            serde_json::to_value(product("new-2")).unwrap(),
        ];
        let service = Arc::new(MockService::regenerating(replacement));
        let controller = RegenerationController::new(service.clone(), &Config::for_tests());

        let updated = controller
            .regenerate(brand.id, &bundle, ContentCategory::Products, "more anti-aging")
            .await
            .expect("Regeneration failed");

        assert_eq!(product_ids(&updated.products), vec!["new-1", "new-2"]);
        assert!(Arc::ptr_eq(&bundle.providers, &updated.providers));
        assert!(Arc::ptr_eq(&bundle.training_programs, &updated.training_programs));
        assert!(Arc::ptr_eq(&bundle.before_afters, &updated.before_afters));
        assert_eq!(updated.id, bundle.id);

        let sent = service.last_regeneration.lock().unwrap().clone().unwrap();
        assert_eq!(sent.content_type, ContentCategory::Products);
        assert_eq!(sent.feedback, "more anti-aging");
        assert_eq!(sent.current_content.len(), bundle.products.len());
    }

    #[tokio::test]
    async fn blank_feedback_is_rejected_without_a_call() {
        let db = setup_db();
        let brand = create_brand(&db);
        let bundle = staged_bundle(&brand);
        let service = Arc::new(MockService::regenerating(vec![]));
        let controller = RegenerationController::new(service.clone(), &Config::for_tests());

        let result = controller
            .regenerate(brand.id, &bundle, ContentCategory::Providers, "   ")
            .await;

        assert!(matches!(result, Err(PipelineError::Validation(_))));
        assert_eq!(service.regenerate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn service_failure_leaves_the_bundle_usable() {
        let db = setup_db();
        let brand = create_brand(&db);
        let bundle = staged_bundle(&brand);
        let before = product_ids(&bundle.products);
        let controller = RegenerationController::new(Arc::new(MockService::failing()), &Config::for_tests());

        let result = controller
            .regenerate(brand.id, &bundle, ContentCategory::Products, "brighter")
            .await;

        assert!(matches!(
            result,
            Err(PipelineError::Regeneration { category: ContentCategory::Products, .. })
        ));
        assert_eq!(product_ids(&bundle.products), before);
    }

    #[tokio::test]
    async fn malformed_replacement_is_rejected() {
        let db = setup_db();
        let brand = create_brand(&db);
        let bundle = staged_bundle(&brand);
        let service = Arc::new(MockService::regenerating(vec![json!({"id": "t1", "title": "No duration"})]));
        let controller = RegenerationController::new(service, &Config::for_tests());

        let result = controller
            .regenerate(brand.id, &bundle, ContentCategory::Training, "shorter")
            .await;

        assert!(matches!(result, Err(PipelineError::InvalidContent(ref e)) if e.category == ContentCategory::Training));
    }

    #[tokio::test]
    async fn empty_replacement_for_required_category_is_rejected() {
        let db = setup_db();
        let brand = create_brand(&db);
        let bundle = staged_bundle(&brand);
        let controller = RegenerationController::new(
            Arc::new(MockService::regenerating(vec![])),
            &Config::for_tests(),
        );

        let result = controller
            .regenerate(brand.id, &bundle, ContentCategory::Providers, "fewer")
            .await;
        assert!(matches!(result, Err(PipelineError::InvalidContent(_))));
    }

    #[tokio::test]
    async fn categories_regenerate_independently_and_repeatedly() {
        let db = setup_db();
        let brand = create_brand(&db);
        let bundle = staged_bundle(&brand);
        let controller = RegenerationController::new(Arc::new(PlaceholderService::new()), &Config::for_tests());

        let once = controller
            .regenerate(brand.id, &bundle, ContentCategory::Training, "add pricing")
            .await
            .expect("First regeneration failed");
        let twice = controller
            .regenerate(brand.id, &once, ContentCategory::Training, "shorter")
            .await
            .expect("Second regeneration failed");
        let other = controller
            .regenerate(brand.id, &twice, ContentCategory::BeforeAfter, "more dramatic")
            .await
            .expect("Third regeneration failed");

        assert_ne!(once.training_programs[0].id, bundle.training_programs[0].id);
        assert_ne!(twice.training_programs[0].id, once.training_programs[0].id);
        assert!(twice.training_programs[0].description.contains("(Revised: shorter)"));
        assert!(Arc::ptr_eq(&twice.training_programs, &other.training_programs));
        assert!(Arc::ptr_eq(&bundle.products, &other.products));
        assert!(other.before_afters[0].description.contains("more dramatic"));
    }
}

// ============================================================
// Acceptance
// ============================================================

/// Store whose content writes always fail.
struct FailingCommitStore {
    inner: Database,
}

impl BrandStore for FailingCommitStore {
    fn get_brand(&self, id: Uuid) -> anyhow::Result<Option<Brand>> {
        self.inner.get_brand(id)
    }

    fn save_questionnaire(&self, id: Uuid, q: &Questionnaire) -> anyhow::Result<bool> {
        self.inner.save_questionnaire(id, q)
    }

    fn commit_content(&self, _: Uuid, _: &BrandContent, _: &[Uuid], _: i64) -> anyhow::Result<CommitResult> {
        Err(anyhow::anyhow!("disk full"))
    }
}

/// Store where another writer sneaks in just before the first content write.
struct RacingStore {
    inner: Database,
    raced: AtomicBool,
    intruder: StagedContentBundle,
}

impl BrandStore for RacingStore {
    fn get_brand(&self, id: Uuid) -> anyhow::Result<Option<Brand>> {
        self.inner.get_brand(id)
    }

    fn save_questionnaire(&self, id: Uuid, q: &Questionnaire) -> anyhow::Result<bool> {
        self.inner.save_questionnaire(id, q)
    }

    fn commit_content(
        &self,
        id: Uuid,
        content: &BrandContent,
        accepted: &[Uuid],
        expected_version: i64,
    ) -> anyhow::Result<CommitResult> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            AcceptanceCommitter::new(Arc::new(self.inner.clone()), 1)
                .accept(id, &self.intruder)
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        }
        self.inner.commit_content(id, content, accepted, expected_version)
    }
}

/// Store that always loses the version race.
struct AlwaysStaleStore {
    inner: Database,
    attempts: AtomicUsize,
}

impl BrandStore for AlwaysStaleStore {
    fn get_brand(&self, id: Uuid) -> anyhow::Result<Option<Brand>> {
        self.inner.get_brand(id)
    }

    fn save_questionnaire(&self, id: Uuid, q: &Questionnaire) -> anyhow::Result<bool> {
        self.inner.save_questionnaire(id, q)
    }

    fn commit_content(&self, _: Uuid, _: &BrandContent, _: &[Uuid], _: i64) -> anyhow::Result<CommitResult> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Ok(CommitResult::VersionConflict)
    }
}

mod acceptance {
    use super::*;

    fn committer(db: &Database) -> AcceptanceCommitter {
        AcceptanceCommitter::new(Arc::new(db.clone()), 3)
    }

    #[tokio::test]
    async fn appends_after_existing_content_in_order() {
        let db = setup_db();
        let brand = create_brand(&db);
        committer(&db)
            .accept(brand.id, &products_bundle(&["a", "b", "c"]))
            .expect("Seeding failed");

        let outcome = committer(&db)
            .accept(brand.id, &products_bundle(&["d", "e", "f", "g", "h"]))
            .expect("Accept failed");

        assert!(!outcome.already_accepted);
        assert_eq!(outcome.version, 2);
        let stored = db.get_brand(brand.id).unwrap().unwrap();
        assert_eq!(
            product_ids(&stored.content.products),
            vec!["a", "b", "c", "d", "e", "f", "g", "h"]
        );
    }

    #[tokio::test]
    async fn does_not_deduplicate_entity_ids() {
        let db = setup_db();
        let brand = create_brand(&db);
        committer(&db).accept(brand.id, &products_bundle(&["a"])).unwrap();
        committer(&db).accept(brand.id, &products_bundle(&["a"])).unwrap();

        let stored = db.get_brand(brand.id).unwrap().unwrap();
        assert_eq!(product_ids(&stored.content.products), vec!["a", "a"]);
    }

    #[tokio::test]
    async fn failed_commit_changes_nothing_and_bundle_can_be_retried() {
        let db = setup_db();
        let brand = create_brand(&db);
        committer(&db).accept(brand.id, &products_bundle(&["a", "b", "c"])).unwrap();
        let bundle = products_bundle(&["d", "e"]);

        let failing = AcceptanceCommitter::new(Arc::new(FailingCommitStore { inner: db.clone() }), 3);
        let result = failing.accept(brand.id, &bundle);
        assert!(matches!(result, Err(PipelineError::Commit { .. })));

        let stored = db.get_brand(brand.id).unwrap().unwrap();
        assert_eq!(product_ids(&stored.content.products), vec!["a", "b", "c"]);
        assert_eq!(stored.version, 1);

        committer(&db).accept(brand.id, &bundle).expect("Retry failed");
        let stored = db.get_brand(brand.id).unwrap().unwrap();
        assert_eq!(product_ids(&stored.content.products), vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn accepting_the_same_bundle_twice_appends_once() {
        let db = setup_db();
        let brand = create_brand(&db);
        let bundle = products_bundle(&["a", "b"]);

        committer(&db).accept(brand.id, &bundle).unwrap();
        let second = committer(&db).accept(brand.id, &bundle).unwrap();

        assert!(second.already_accepted);
        assert_eq!(second.version, 1);
        let stored = db.get_brand(brand.id).unwrap().unwrap();
        assert_eq!(stored.content.products.len(), 2);
    }

    #[tokio::test]
    async fn remerges_after_a_concurrent_acceptance() {
        let db = setup_db();
        let brand = create_brand(&db);
        let store = RacingStore {
            inner: db.clone(),
            raced: AtomicBool::new(false),
            intruder: products_bundle(&["x"]),
        };

        AcceptanceCommitter::new(Arc::new(store), 3)
            .accept(brand.id, &products_bundle(&["a", "b"]))
            .expect("Accept failed");

        let stored = db.get_brand(brand.id).unwrap().unwrap();
        assert_eq!(product_ids(&stored.content.products), vec!["x", "a", "b"]);
        assert_eq!(stored.version, 2);
        assert_eq!(stored.accepted_bundles.len(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_bounded_conflicts() {
        let db = setup_db();
        let brand = create_brand(&db);
        let store = Arc::new(AlwaysStaleStore {
            inner: db.clone(),
            attempts: AtomicUsize::new(0),
        });

        let result = AcceptanceCommitter::new(store.clone(), 3).accept(brand.id, &products_bundle(&["a"]));

        assert!(matches!(result, Err(PipelineError::Commit { .. })));
        assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
        assert!(db.get_brand(brand.id).unwrap().unwrap().content.products.is_empty());
    }

    #[tokio::test]
    async fn unknown_brand_is_not_found() {
        let db = setup_db();
        let result = committer(&db).accept(Uuid::new_v4(), &products_bundle(&["a"]));
        assert!(matches!(result, Err(PipelineError::NotFound(_))));
    }
}

// ============================================================
// Staging
// ============================================================

mod staging {
    use super::*;

    async fn wait_for(run: &StagedRun, status: RunStatus) -> RunSnapshot {
        for _ in 0..200 {
            let snapshot = run.snapshot().await;
            if snapshot.status == status {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run never reached {:?}", status);
    }

    #[tokio::test]
    async fn run_regenerate_accept_lifecycle() {
        let db = setup_db();
        let brand = create_brand(&db);
        let service: Arc<dyn GenerationService> = Arc::new(PlaceholderService::new());
        let config = Config::for_tests();
        let orch = orchestrator(service.clone(), &db, config.clone());
        let controller = RegenerationController::new(service, &config);
        let committer = AcceptanceCommitter::new(Arc::new(db.clone()), 3);
        let area = StagingArea::new();

        let run = area.start(orch, run_request(&brand));
        let ready = wait_for(&run, RunStatus::Ready).await;
        assert!(ready.steps.iter().all(|s| s.status == StepStatus::Completed));
        let staged = ready.bundle.expect("Ready run has no bundle");

        let updated = area
            .regenerate(run.id(), &controller, ContentCategory::Products, "more anti-aging")
            .await
            .expect("Regeneration failed");
        assert_ne!(updated.products[0].id, staged.products[0].id);
        assert_eq!(updated.providers, staged.providers);

        area.accept(run.id(), &committer).await.expect("Accept failed");
        assert!(area.is_empty());

        let stored = db.get_brand(brand.id).unwrap().unwrap();
        assert_eq!(product_ids(&stored.content.products), product_ids(&updated.products));
        assert_eq!(stored.content.providers.len(), staged.providers.len());

        let again = area.accept(run.id(), &committer).await;
        assert!(matches!(again, Err(PipelineError::NotFound(_))));
    }

    #[tokio::test]
    async fn failed_accept_keeps_the_run_staged() {
        let db = setup_db();
        let brand = create_brand(&db);
        let orch = orchestrator(Arc::new(PlaceholderService::new()), &db, Config::for_tests());
        let area = StagingArea::new();

        let run = area.start(orch, run_request(&brand));
        wait_for(&run, RunStatus::Ready).await;

        let failing = AcceptanceCommitter::new(Arc::new(FailingCommitStore { inner: db.clone() }), 3);
        assert!(area.accept(run.id(), &failing).await.is_err());
        assert_eq!(area.len(), 1);

        let working = AcceptanceCommitter::new(Arc::new(db.clone()), 3);
        area.accept(run.id(), &working).await.expect("Retry failed");
        assert!(!db.get_brand(brand.id).unwrap().unwrap().content.products.is_empty());
    }

    #[tokio::test]
    async fn cannot_discard_while_running() {
        let db = setup_db();
        let brand = create_brand(&db);
        let content = placeholder_content(&brand).await;
        let gate = Arc::new(Notify::new());
        let service = Arc::new(MockService::generating(content).gated(gate.clone()));
        let orch = orchestrator(service, &db, Config::for_tests());
        let area = StagingArea::new();

        let run = area.start(orch, run_request(&brand));
        let result = area.discard(run.id()).await;
        assert!(matches!(result, Err(PipelineError::Conflict(_))));

        gate.notify_one();
        wait_for(&run, RunStatus::Ready).await;
        area.discard(run.id()).await.expect("Discard failed");
        assert!(area.get(run.id()).is_none());
    }

    #[tokio::test]
    async fn failed_run_reports_its_error_and_can_be_dismissed() {
        let db = setup_db();
        let brand = create_brand(&db);
        let orch = orchestrator(Arc::new(MockService::failing()), &db, Config::for_tests());
        let controller = RegenerationController::new(Arc::new(PlaceholderService::new()), &Config::for_tests());
        let area = StagingArea::new();

        let run = area.start(orch, run_request(&brand));
        let failed = wait_for(&run, RunStatus::Failed).await;

        assert!(failed.bundle.is_none());
        assert!(failed.error.unwrap().contains("generate-products"));
        assert_eq!(status_of(&failed.steps, "generate-products"), StepStatus::Error);

        let regen = area
            .regenerate(run.id(), &controller, ContentCategory::Products, "again")
            .await;
        assert!(matches!(regen, Err(PipelineError::Conflict(_))));

        area.discard(run.id()).await.expect("Dismiss failed");
    }

    #[tokio::test]
    async fn regeneration_finishing_after_discard_is_dropped() {
        let db = setup_db();
        let brand = create_brand(&db);
        let orch = orchestrator(Arc::new(PlaceholderService::new()), &db, Config::for_tests());
        let gate = Arc::new(Notify::new());
        let regen_service = Arc::new(
            MockService::regenerating(vec![serde_json::to_value(product("late")).unwrap()])
                .gated(gate.clone()),
        );
        let controller = RegenerationController::new(regen_service.clone(), &Config::for_tests());
        let area = StagingArea::new();

        let run = area.start(orch, run_request(&brand));
        wait_for(&run, RunStatus::Ready).await;

        let pending = {
            let run = run.clone();
            tokio::spawn(async move {
                run.regenerate(&controller, ContentCategory::Products, "later").await
            })
        };
        while regen_service.regenerate_calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        area.discard(run.id()).await.expect("Discard failed");
        gate.notify_one();

        let result = pending.await.expect("Task panicked");
        assert!(matches!(result, Err(PipelineError::Discarded)));
        assert!(run.is_discarded());
    }

    #[tokio::test]
    async fn idle_finished_runs_are_evicted() {
        let db = setup_db();
        let brand = create_brand(&db);
        let orch = orchestrator(Arc::new(PlaceholderService::new()), &db, Config::for_tests());
        let area = StagingArea::new();

        let run = area.start(orch, run_request(&brand));
        wait_for(&run, RunStatus::Ready).await;

        assert_eq!(area.evict_idle(Duration::from_secs(3600)), 0);
        assert_eq!(area.len(), 1);

        assert_eq!(area.evict_idle(Duration::ZERO), 1);
        assert!(area.is_empty());
        assert!(run.is_discarded());
        assert!(area.get(run.id()).is_none());
    }

    #[tokio::test]
    async fn running_runs_are_never_evicted() {
        let db = setup_db();
        let brand = create_brand(&db);
        let content = placeholder_content(&brand).await;
        let gate = Arc::new(Notify::new());
        let service = Arc::new(MockService::generating(content).gated(gate.clone()));
        let orch = orchestrator(service, &db, Config::for_tests());
        let area = StagingArea::new();

        let run = area.start(orch, run_request(&brand));
        assert_eq!(area.evict_idle(Duration::ZERO), 0);
        assert_eq!(area.len(), 1);

        gate.notify_one();
        wait_for(&run, RunStatus::Ready).await;
        assert!(!run.is_discarded());
    }

    #[tokio::test]
    async fn sweeper_clears_abandoned_runs() {
        let db = setup_db();
        let brand = create_brand(&db);
        let orch = orchestrator(Arc::new(MockService::failing()), &db, Config::for_tests());
        let area = StagingArea::new();

        let run = area.start(orch, run_request(&brand));
        wait_for(&run, RunStatus::Failed).await;

        let sweeper = area.spawn_sweeper(Duration::from_millis(20));
        for _ in 0..500 {
            if area.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        sweeper.abort();

        assert!(area.is_empty());
    }

    #[tokio::test]
    async fn concurrent_regenerations_of_different_categories_both_land() {
        let db = setup_db();
        let brand = create_brand(&db);
        let service: Arc<dyn GenerationService> = Arc::new(PlaceholderService::new());
        let orch = orchestrator(service.clone(), &db, Config::for_tests());
        let controller = RegenerationController::new(service, &Config::for_tests());
        let area = StagingArea::new();

        let run = area.start(orch, run_request(&brand));
        let staged = wait_for(&run, RunStatus::Ready).await.bundle.unwrap();

        let (products, providers) = tokio::join!(
            run.regenerate(&controller, ContentCategory::Products, "bolder"),
            run.regenerate(&controller, ContentCategory::Providers, "closer"),
        );
        products.expect("Products regeneration failed");
        providers.expect("Providers regeneration failed");

        let current = run.snapshot().await.bundle.unwrap();
        assert_ne!(current.products[0].id, staged.products[0].id);
        assert_ne!(current.providers[0].id, staged.providers[0].id);
        assert_eq!(current.training_programs[0].id, staged.training_programs[0].id);
    }
}
