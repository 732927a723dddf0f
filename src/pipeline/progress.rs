//! Stage tracking for a generation run.
//!
//! [`StepTracker`] owns the step list and enforces the stage state machine:
//! stages start strictly in declared order, at most one is `Processing`, and
//! once a stage is `Error` nothing else moves. Every accepted transition
//! publishes a full snapshot to the run's [`ProgressStream`].

use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::{GenerationStep, StepStatus};

/// Receiving end of a run's progress: one snapshot per status change.
///
/// The stream closes when the run finishes (successfully or not).
pub type ProgressStream = mpsc::UnboundedReceiver<Vec<GenerationStep>>;

/// Sending end of a run's progress.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<Vec<GenerationStep>>>,
}

impl ProgressReporter {
    /// A reporter that drops every snapshot.
    pub fn silent() -> Self {
        Self { tx: None }
    }

    fn publish(&self, steps: &[GenerationStep]) {
        if let Some(tx) = &self.tx {
            // A dropped receiver means nobody is watching; the run carries on.
            let _ = tx.send(steps.to_vec());
        }
    }
}

pub fn progress_channel() -> (ProgressReporter, ProgressStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressReporter { tx: Some(tx) }, rx)
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot {action} stage '{stage}': {reason}")]
pub struct TransitionError {
    pub action: &'static str,
    pub stage: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct StepTracker {
    steps: Vec<GenerationStep>,
    reporter: ProgressReporter,
}

impl StepTracker {
    /// Start tracking `steps` (all expected `Pending`) and publish the initial snapshot.
    pub fn new(steps: Vec<GenerationStep>, reporter: ProgressReporter) -> Self {
        let tracker = Self { steps, reporter };
        tracker.reporter.publish(&tracker.steps);
        tracker
    }

    pub fn steps(&self) -> &[GenerationStep] {
        &self.steps
    }

    /// Id of the stage currently `Processing`, if any.
    pub fn active(&self) -> Option<&str> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::Processing)
            .map(|s| s.id.as_str())
    }

    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Completed)
    }

    pub fn has_failed(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Error)
    }

    fn position(&self, action: &'static str, stage: &str) -> Result<usize, TransitionError> {
        self.steps
            .iter()
            .position(|s| s.id == stage)
            .ok_or_else(|| TransitionError {
                action,
                stage: stage.to_string(),
                reason: "unknown stage".to_string(),
            })
    }

    pub fn start(&mut self, stage: &str) -> Result<(), TransitionError> {
        let idx = self.position("start", stage)?;
        let reject = |reason: String| TransitionError {
            action: "start",
            stage: stage.to_string(),
            reason,
        };

        if self.has_failed() {
            return Err(reject("run has already failed".to_string()));
        }
        if let Some(active) = self.active() {
            return Err(reject(format!("stage '{}' is still processing", active)));
        }
        if self.steps[idx].status != StepStatus::Pending {
            return Err(reject(format!(
                "stage is {}",
                self.steps[idx].status.as_str()
            )));
        }
        if let Some(earlier) = self.steps[..idx]
            .iter()
            .find(|s| s.status != StepStatus::Completed)
        {
            return Err(reject(format!("stage '{}' has not completed", earlier.id)));
        }

        self.steps[idx].status = StepStatus::Processing;
        tracing::info!(stage, "Stage started");
        self.reporter.publish(&self.steps);
        Ok(())
    }

    pub fn complete(&mut self, stage: &str) -> Result<(), TransitionError> {
        let idx = self.position("complete", stage)?;
        if self.steps[idx].status != StepStatus::Processing {
            return Err(TransitionError {
                action: "complete",
                stage: stage.to_string(),
                reason: format!("stage is {}", self.steps[idx].status.as_str()),
            });
        }

        self.steps[idx].status = StepStatus::Completed;
        tracing::info!(stage, "Stage completed");
        self.reporter.publish(&self.steps);
        Ok(())
    }

    /// Mark the processing stage as failed. Completed stages are left as they are.
    pub fn fail(&mut self, stage: &str, error: impl Into<String>) -> Result<(), TransitionError> {
        let idx = self.position("fail", stage)?;
        if self.steps[idx].status != StepStatus::Processing {
            return Err(TransitionError {
                action: "fail",
                stage: stage.to_string(),
                reason: format!("stage is {}", self.steps[idx].status.as_str()),
            });
        }

        let error = error.into();
        tracing::error!(stage, error = %error, "Stage failed");
        self.steps[idx].status = StepStatus::Error;
        self.steps[idx].error = Some(error);
        self.reporter.publish(&self.steps);
        Ok(())
    }
}
