// ABOUTME: Engine flavour and socket location.
// ABOUTME: Docker and Podman both speak the Docker-compatible API.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeType {
    Docker,
    Podman,
}

impl std::fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeType::Docker => write!(f, "docker"),
            RuntimeType::Podman => write!(f, "podman"),
        }
    }
}

/// Where to reach the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEndpoint {
    pub runtime_type: RuntimeType,
    pub socket_path: String,
}

impl RuntimeEndpoint {
    /// Guess the flavour from a configured socket path.
    pub fn from_socket(path: &str) -> Self {
        let runtime_type = if path.contains("podman") {
            RuntimeType::Podman
        } else {
            RuntimeType::Docker
        };
        Self {
            runtime_type,
            socket_path: path.to_string(),
        }
    }
}
