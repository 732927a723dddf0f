//! In-memory home of generation runs and their staged bundles.
//!
//! A run is registered when it starts and removed when its bundle is
//! accepted or discarded, or when it sits finished and untouched for longer
//! than the staging TTL. Nothing here survives a restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::models::*;

use super::acceptance::{AcceptOutcome, AcceptanceCommitter};
use super::orchestrator::{GenerationOrchestrator, RunRequest};
use super::progress::progress_channel;
use super::regeneration::RegenerationController;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Ready,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

/// Point-in-time view of a run, as served to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub run_id: Uuid,
    pub brand_id: Uuid,
    pub status: RunStatus,
    pub steps: Vec<GenerationStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<StagedContentBundle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug)]
struct RunState {
    status: RunStatus,
    steps: Vec<GenerationStep>,
    bundle: Option<StagedContentBundle>,
    error: Option<String>,
    /// Last time the run finished or a client touched it.
    touched: Instant,
}

impl RunState {
    fn ready_bundle(&mut self) -> Result<&mut StagedContentBundle> {
        match self.status {
            RunStatus::Running => Err(PipelineError::Conflict(
                "generation is still running".to_string(),
            )),
            RunStatus::Failed => Err(PipelineError::Conflict(
                "generation failed; there is no staged content".to_string(),
            )),
            RunStatus::Ready => self
                .bundle
                .as_mut()
                .ok_or_else(|| PipelineError::Conflict("no staged content".to_string())),
        }
    }
}

/// One generation run and, once it succeeds, its staged bundle.
///
/// The state lock is the critical section for bundle mutation: it is held
/// to snapshot a category and to swap its replacement in, never across a
/// service call, so regenerations of different categories overlap freely.
#[derive(Debug)]
pub struct StagedRun {
    id: Uuid,
    brand: BrandContext,
    state: tokio::sync::Mutex<RunState>,
    discarded: AtomicBool,
}

impl StagedRun {
    fn new(brand: BrandContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            brand,
            state: tokio::sync::Mutex::new(RunState {
                status: RunStatus::Running,
                steps: GenerationStep::initial_steps(),
                bundle: None,
                error: None,
                touched: Instant::now(),
            }),
            discarded: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn brand(&self) -> &BrandContext {
        &self.brand
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_discarded() {
            Err(PipelineError::Discarded)
        } else {
            Ok(())
        }
    }

    pub async fn snapshot(&self) -> RunSnapshot {
        let mut state = self.state.lock().await;
        state.touched = Instant::now();
        RunSnapshot {
            run_id: self.id,
            brand_id: self.brand.brand_id,
            status: state.status,
            steps: state.steps.clone(),
            bundle: state.bundle.clone(),
            error: state.error.clone(),
        }
    }

    async fn record_steps(&self, steps: Vec<GenerationStep>) {
        self.state.lock().await.steps = steps;
    }

    async fn finish(&self, result: Result<StagedContentBundle>) {
        let mut state = self.state.lock().await;
        state.touched = Instant::now();
        match result {
            Ok(bundle) => {
                state.status = RunStatus::Ready;
                state.bundle = Some(bundle);
            }
            Err(e) => {
                tracing::warn!(run_id = %self.id, error = %e, "Generation run failed");
                state.status = RunStatus::Failed;
                state.error = Some(e.to_string());
            }
        }
    }

    /// Regenerate one category in place and return the updated bundle.
    pub async fn regenerate(
        &self,
        controller: &RegenerationController,
        category: ContentCategory,
        feedback: &str,
    ) -> Result<StagedContentBundle> {
        let current = {
            let mut state = self.state.lock().await;
            self.ensure_live()?;
            state.touched = Instant::now();
            state.ready_bundle()?.category(category)
        };

        let replacement = controller
            .regenerate_category(self.brand.brand_id, &current, feedback)
            .await?;

        let mut state = self.state.lock().await;
        state.touched = Instant::now();
        if self.is_discarded() {
            tracing::warn!(run_id = %self.id, %category, "Dropping regeneration for discarded run");
            return Err(PipelineError::Discarded);
        }
        let bundle = state.ready_bundle()?;
        bundle.set_category(replacement);
        Ok(bundle.clone())
    }

    /// Commit the staged bundle. On failure the run stays staged for a retry.
    pub async fn accept(&self, committer: &AcceptanceCommitter) -> Result<AcceptOutcome> {
        let mut state = self.state.lock().await;
        self.ensure_live()?;
        state.touched = Instant::now();
        let bundle = state.ready_bundle()?;
        let outcome = committer.accept(self.brand.brand_id, bundle)?;
        self.discarded.store(true, Ordering::SeqCst);
        Ok(outcome)
    }

    async fn discard(&self) -> Result<()> {
        let state = self.state.lock().await;
        if state.status == RunStatus::Running {
            return Err(PipelineError::Conflict(
                "generation is still running".to_string(),
            ));
        }
        self.discarded.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StagingArea {
    runs: Arc<Mutex<HashMap<Uuid, Arc<StagedRun>>>>,
}

impl StagingArea {
    pub fn new() -> Self {
        Self::default()
    }

    /// The map holds no invariant a panicking holder could break, so a
    /// poisoned lock is recovered rather than propagated.
    fn runs(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<StagedRun>>> {
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a run and drive it on a background task.
    ///
    /// Call [`GenerationOrchestrator::check_preconditions`] first so callers
    /// get precondition failures synchronously.
    pub fn start(
        &self,
        orchestrator: GenerationOrchestrator,
        request: RunRequest,
    ) -> Arc<StagedRun> {
        let run = Arc::new(StagedRun::new(request.brand.clone()));
        self.runs().insert(run.id, run.clone());

        let task_run = run.clone();
        tokio::spawn(async move {
            let (reporter, mut stream) = progress_channel();
            let forward = async {
                while let Some(steps) = stream.recv().await {
                    task_run.record_steps(steps).await;
                }
            };
            let (result, ()) = tokio::join!(orchestrator.run(request, reporter), forward);
            task_run.finish(result).await;
        });

        run
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<StagedRun>> {
        self.runs().get(&id).cloned()
    }

    fn require(&self, id: Uuid) -> Result<Arc<StagedRun>> {
        self.get(id)
            .ok_or_else(|| PipelineError::NotFound(format!("generation run {}", id)))
    }

    fn remove(&self, id: Uuid) {
        self.runs().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.runs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn regenerate(
        &self,
        id: Uuid,
        controller: &RegenerationController,
        category: ContentCategory,
        feedback: &str,
    ) -> Result<StagedContentBundle> {
        self.require(id)?
            .regenerate(controller, category, feedback)
            .await
    }

    /// Accept a run's bundle and drop the run once committed.
    pub async fn accept(&self, id: Uuid, committer: &AcceptanceCommitter) -> Result<AcceptOutcome> {
        let run = self.require(id)?;
        let outcome = run.accept(committer).await?;
        self.remove(id);
        Ok(outcome)
    }

    /// Abandon a run. Only allowed once it has failed or finished.
    pub async fn discard(&self, id: Uuid) -> Result<()> {
        let run = self.require(id)?;
        run.discard().await?;
        self.remove(id);
        tracing::info!(run_id = %id, "Discarded generation run");
        Ok(())
    }

    /// Drop finished runs nobody has touched for `ttl`. Returns how many were evicted.
    ///
    /// Running runs and runs busy with a snapshot, regeneration swap or
    /// acceptance are skipped. Evicted runs are marked discarded so an
    /// in-flight regeneration drops its result.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let candidates: Vec<Arc<StagedRun>> = self.runs().values().cloned().collect();

        let mut evicted = Vec::new();
        for run in candidates {
            let Ok(state) = run.state.try_lock() else {
                continue;
            };
            if state.status != RunStatus::Running && state.touched.elapsed() >= ttl {
                run.discarded.store(true, Ordering::SeqCst);
                evicted.push(run.id);
            }
        }

        if !evicted.is_empty() {
            let mut runs = self.runs();
            for id in &evicted {
                runs.remove(id);
            }
            tracing::info!(count = evicted.len(), "Evicted idle generation runs");
        }
        evicted.len()
    }

    /// Periodically evict idle runs on a background task.
    pub fn spawn_sweeper(&self, ttl: Duration) -> JoinHandle<()> {
        let area = self.clone();
        let period = ttl.clamp(Duration::from_secs(1), Duration::from_secs(60));
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            loop {
                tick.tick().await;
                area.evict_idle(ttl);
            }
        })
    }
}
