//! Committable step sequences
//!
//! A multi-step remote operation is an ordered list of steps, each with a
//! declared compensating action. Steps run in order and stop at the first
//! failure. Committed steps are then compensated in reverse order. When a
//! committed step cannot be undone, or its compensation fails, the two
//! systems no longer agree and the failure is reported as a partial failure
//! naming the object left behind.

use crate::error::{Error, Result};
use async_trait::async_trait;
use tracing::{error, info, warn};

/// One remote commit step
#[async_trait]
pub trait Step: Send + Sync {
    /// State name while the step runs, e.g. `cloning`
    fn name(&self) -> &str;

    /// The remote object this step creates or removes, for error reports
    fn resource(&self) -> String;

    async fn apply(&self) -> Result<()>;

    /// Whether `compensate` can undo a committed `apply`
    fn reversible(&self) -> bool {
        false
    }

    async fn compensate(&self) -> Result<()> {
        Ok(())
    }
}

/// Ordered steps of one operation
pub struct StepSequence<'a> {
    operation: String,
    steps: Vec<Box<dyn Step + 'a>>,
}

impl<'a> StepSequence<'a> {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step
    pub fn then(mut self, step: impl Step + 'a) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Run every step, unwinding committed steps on the first failure
    pub async fn run(&self) -> Result<()> {
        for (index, step) in self.steps.iter().enumerate() {
            info!(operation = %self.operation, step = step.name(), "entering step");

            if let Err(err) = step.apply().await {
                error!(
                    operation = %self.operation,
                    step = step.name(),
                    error = %err,
                    "step failed"
                );
                return Err(self.unwind(&self.steps[..index], step.as_ref(), err).await);
            }
        }
        Ok(())
    }

    async fn unwind(&self, committed: &[Box<dyn Step + 'a>], failed: &dyn Step, err: Error) -> Error {
        for step in committed.iter().rev() {
            if !step.reversible() {
                return Error::PartialFailure {
                    operation: self.operation.clone(),
                    step: failed.name().to_string(),
                    orphan: failed.resource(),
                    reason: err.to_string(),
                };
            }

            warn!(operation = %self.operation, step = step.name(), "rolling back step");
            if let Err(rollback) = step.compensate().await {
                error!(
                    operation = %self.operation,
                    step = step.name(),
                    error = %rollback,
                    "rollback failed"
                );
                return Error::PartialFailure {
                    operation: self.operation.clone(),
                    step: step.name().to_string(),
                    orphan: step.resource(),
                    reason: format!("{}; rollback failed: {}", err, rollback),
                };
            }
        }
        err
    }
}
