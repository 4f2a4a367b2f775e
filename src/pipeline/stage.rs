// ABOUTME: The unit of work the pipeline runs and undoes.
// ABOUTME: Rollback is only called for stages whose execute succeeded.

use super::error::StageError;
use super::state::DeploymentState;
use async_trait::async_trait;

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, state: &mut DeploymentState) -> Result<(), StageError>;

    /// Best-effort undo. Errors are logged by the pipeline and never surfaced.
    async fn rollback(&self, _state: &mut DeploymentState) -> Result<(), StageError> {
        Ok(())
    }
}
