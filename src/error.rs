// ABOUTME: Application-wide error type and the failure taxonomy.
// ABOUTME: Component errors convert into Error; ErrorKind classifies them for callers.

use std::path::PathBuf;
use thiserror::Error;

use crate::certs::CertError;
use crate::compose::{ComposeError, ParsePortsError};
use crate::container::OrchestrationError;
use crate::lock::LockError;
use crate::pipeline::PipelineError;
use crate::proxy::ProxyError;
use crate::runtime::RuntimeError;
use crate::types::SiteId;

/// Failure classes surfaced to the fleet-management client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request or configuration is malformed.
    Validation,
    /// A port, lock, or name is already taken.
    Conflict,
    /// certbot, a proxy binary, or the compose CLI failed.
    ExternalTool,
    ResourceNotFound,
    Timeout,
    Cancelled,
    /// The container engine or the filesystem failed.
    Runtime,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("site not found: {0}")]
    SiteNotFound(SiteId),

    #[error("domain {0:?} is not a valid hostname")]
    InvalidDomain(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error(transparent)]
    Ports(#[from] ParsePortsError),

    #[error(transparent)]
    Certificate(#[from] CertError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ConfigNotFound(_) => ErrorKind::ResourceNotFound,
            Error::MissingEnvVar(_) | Error::InvalidConfig(_) => ErrorKind::Validation,
            Error::SiteNotFound(_) => ErrorKind::ResourceNotFound,
            Error::InvalidDomain(_) => ErrorKind::Validation,
            Error::Pipeline(e) => e.kind(),
            Error::Runtime(_) => ErrorKind::Runtime,
            Error::Orchestration(e) => e.kind(),
            Error::Compose(_) => ErrorKind::ExternalTool,
            Error::Ports(_) => ErrorKind::Validation,
            Error::Certificate(e) => e.kind(),
            Error::Proxy(e) => e.kind(),
            Error::Lock(e) => e.kind(),
            Error::Io(_) => ErrorKind::Runtime,
            Error::Yaml(_) | Error::Json(_) => ErrorKind::Validation,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::DetectionError;

    #[test]
    fn engine_failures_classify_as_runtime() {
        let err = Error::from(RuntimeError::from(DetectionError::SocketMissing(
            "/run/podman/podman.sock".into(),
        )));
        assert_eq!(err.kind(), ErrorKind::Runtime);
        assert_eq!(
            err.to_string(),
            "runtime detection failed: configured socket does not exist: /run/podman/podman.sock"
        );
    }

    #[test]
    fn malformed_domain_is_a_validation_error() {
        let err = Error::InvalidDomain("../etc".into());
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "domain \"../etc\" is not a valid hostname");
    }
}
