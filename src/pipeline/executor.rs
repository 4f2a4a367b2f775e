// ABOUTME: Runs stages in order and unwinds completed ones on failure or cancellation.
// ABOUTME: Rollback failures are logged and never replace the original error.

use super::error::{CancelledSnafu, PipelineError};
use super::stage::Stage;
use super::state::{DeploymentState, ProgressStatus};
use tokio_util::sync::CancellationToken;

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Cancellation is observed between stages only.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        state: &mut DeploymentState,
    ) -> Result<(), PipelineError> {
        for (i, stage) in self.stages.iter().enumerate() {
            let name = stage.name();

            if cancel.is_cancelled() {
                tracing::warn!(site = %state.site_id(), stage = name, "deployment cancelled");
                let err = CancelledSnafu { stage: name }.build();
                state.error = Some(err.to_string());
                rollback(&self.stages[..i], state).await;
                return Err(err);
            }

            state.current_stage = Some(name);
            state.emit(name, ProgressStatus::Started, format!("Starting {name}"));
            tracing::info!(site = %state.site_id(), stage = name, "stage started");

            if let Err(source) = stage.execute(state).await {
                state.emit(name, ProgressStatus::Failed, format!("Failed: {source}"));
                let err = PipelineError::StageFailed {
                    stage: name,
                    source,
                };
                tracing::error!(site = %state.site_id(), error = %err, "stage failed");
                state.error = Some(err.to_string());
                rollback(&self.stages[..i], state).await;
                return Err(err);
            }

            state.completed_stages.push(name);
            state.emit(name, ProgressStatus::Completed, format!("Completed {name}"));
            tracing::info!(site = %state.site_id(), stage = name, "stage completed");
        }
        Ok(())
    }
}

async fn rollback(completed: &[Box<dyn Stage>], state: &mut DeploymentState) {
    for stage in completed.iter().rev() {
        let name = stage.name();
        state.emit(name, ProgressStatus::Rollback, format!("Rolling back {name}"));
        if let Err(e) = stage.rollback(state).await {
            tracing::warn!(site = %state.site_id(), stage = name, error = %e, "rollback failed");
        }
    }
}
