// ABOUTME: Value types passed across the runtime traits.
// ABOUTME: Container and network creation specs, published ports, credentials, metadata.

use crate::types::ImageRef;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// What the agent asks the engine to create for a container site.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub name: String,
    pub image: ImageRef,
    pub env: Vec<(String, String)>,
    pub labels: HashMap<String, String>,
    pub ports: Vec<PortMapping>,
    pub volumes: Vec<VolumeMount>,
    pub restart_policy: RestartPolicy,
    /// Network joined at creation.
    pub network: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
    pub protocol: Protocol,
    pub host_ip: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    No,
    Always,
    #[default]
    UnlessStopped,
}

/// A port a running container holds on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishedPort {
    pub container_port: u16,
    /// None when the port is only exposed.
    pub host_port: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub name: String,
    pub driver: Option<String>,
    pub labels: HashMap<String, String>,
}

#[derive(Clone)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    /// Registry host, e.g. `ghcr.io`. None means Docker Hub.
    pub server: Option<String>,
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeMetadata {
    pub name: String,
    pub version: String,
    pub api_version: String,
    pub os: String,
    pub arch: String,
}
