// ABOUTME: Stage failures and the pipeline error that wraps them with the stage name.
// ABOUTME: Both classify into ErrorKind for callers.

use crate::certs::CertError;
use crate::compose::ComposeError;
use crate::container::{OrchestrationError, PortConflict};
use crate::error::ErrorKind;
use crate::proxy::ProxyError;
use snafu::Snafu;
use std::time::Duration;

fn conflict_list(conflicts: &[PortConflict]) -> String {
    conflicts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("{0}")]
    Validation(String),

    #[error("port conflicts detected: {}", conflict_list(.0))]
    PortConflict(Vec<PortConflict>),

    #[error("DNS propagation timeout for {domain} after {waited:?}")]
    DnsTimeout { domain: String, waited: Duration },

    #[error("failed to obtain SSL certificate: {0}")]
    Certificate(#[from] CertError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error(transparent)]
    Container(#[from] OrchestrationError),

    #[error(transparent)]
    Compose(#[from] ComposeError),
}

impl StageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::Validation(_) => ErrorKind::Validation,
            StageError::PortConflict(_) => ErrorKind::Conflict,
            StageError::DnsTimeout { .. } => ErrorKind::Timeout,
            StageError::Certificate(e) => e.kind(),
            StageError::Proxy(e) => e.kind(),
            StageError::Container(e) => e.kind(),
            StageError::Compose(_) => ErrorKind::ExternalTool,
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    #[snafu(display("stage {stage} failed: {source}"))]
    StageFailed {
        stage: &'static str,
        source: StageError,
    },

    #[snafu(display("deployment cancelled before stage {stage}"))]
    Cancelled { stage: &'static str },
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::StageFailed { source, .. } => source.kind(),
            PipelineError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// The stage that failed or never ran.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::StageFailed { stage, .. } | PipelineError::Cancelled { stage } => stage,
        }
    }
}
