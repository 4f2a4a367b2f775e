// ABOUTME: Finds the local container engine socket.
// ABOUTME: Docker first, then rootful and rootless Podman.

use super::types::{RuntimeEndpoint, RuntimeType};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("no container runtime found (checked Docker and Podman sockets)")]
    NoRuntimeFound,

    #[error("configured socket does not exist: {0}")]
    SocketMissing(String),
}

const DOCKER_SOCKET: &str = "/var/run/docker.sock";
const ROOTFUL_PODMAN: &str = "/run/podman/podman.sock";

/// Use the configured socket when given, else check the well-known locations.
pub fn resolve_endpoint(configured: Option<&str>) -> Result<RuntimeEndpoint, DetectionError> {
    match configured {
        Some(path) if Path::new(path).exists() => Ok(RuntimeEndpoint::from_socket(path)),
        Some(path) => Err(DetectionError::SocketMissing(path.to_string())),
        None => detect_local(),
    }
}

pub fn detect_local() -> Result<RuntimeEndpoint, DetectionError> {
    let mut candidates = vec![
        (RuntimeType::Docker, DOCKER_SOCKET.to_string()),
        (RuntimeType::Podman, ROOTFUL_PODMAN.to_string()),
    ];
    if let Some(uid) = current_uid() {
        candidates.push((
            RuntimeType::Podman,
            format!("/run/user/{uid}/podman/podman.sock"),
        ));
    }

    candidates
        .into_iter()
        .find(|(_, path)| Path::new(path).exists())
        .map(|(runtime_type, socket_path)| RuntimeEndpoint {
            runtime_type,
            socket_path,
        })
        .ok_or(DetectionError::NoRuntimeFound)
}

fn current_uid() -> Option<String> {
    std::env::var("UID").ok().or_else(|| {
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|status| {
                status
                    .lines()
                    .find(|l| l.starts_with("Uid:"))
                    .and_then(|l| l.split_whitespace().nth(1))
                    .map(str::to_string)
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_configured_socket_is_reported() {
        let err = resolve_endpoint(Some("/nonexistent/archon.sock")).unwrap_err();
        assert!(matches!(err, DetectionError::SocketMissing(_)));
    }

    #[test]
    fn existing_configured_socket_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("podman.sock");
        std::fs::write(&path, "").unwrap();
        let ep = resolve_endpoint(path.to_str()).unwrap();
        assert_eq!(ep.runtime_type, RuntimeType::Podman);
    }
}
