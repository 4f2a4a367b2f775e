// ABOUTME: Rollback-capable deployment pipeline.
// ABOUTME: Stages run in order; completed ones are undone in reverse when a later one fails.

pub mod dns;
mod error;
mod executor;
mod stage;
pub mod stages;
mod state;

pub use dns::{DnsResolver, SystemResolver, wait_for_dns};
pub use error::{PipelineError, StageError};
pub use executor::Pipeline;
pub use stage::Stage;
pub use stages::{StageContext, standard_pipeline};
pub use state::{DeploymentState, ProgressCallback, ProgressEvent, ProgressStatus};
