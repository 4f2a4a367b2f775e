// ABOUTME: Deploy request payload sent by the fleet-management client.
// ABOUTME: Describes a container or compose site, its domains, TLS material, and config files.

use crate::types::{RESOURCE_PREFIX, SiteId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteType {
    #[default]
    Container,
    Compose,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerSpec {
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<RegistryCredentials>,
}

/// A public domain routed to a container port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainMapping {
    pub domain: String,
    /// Port the application listens on inside the container.
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,
}

impl DomainMapping {
    pub fn new(domain: impl Into<String>, port: u16) -> Self {
        Self {
            domain: domain.into(),
            port,
            host_port: None,
        }
    }

    /// Port published on the host, which is also where the proxy connects.
    pub fn published_port(&self) -> u16 {
        self.host_port.filter(|p| *p > 0).unwrap_or(self.port)
    }
}

/// A file written on the host and mounted read-only into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub name: String,
    pub content: String,
    pub container_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub id: SiteId,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type", alias = "site_type")]
    pub site_type: SiteType,
    #[serde(default)]
    pub docker: DockerSpec,
    #[serde(default)]
    pub compose_content: String,
    #[serde(default)]
    pub environment_vars: BTreeMap<String, String>,
    #[serde(default)]
    pub domain_mappings: Vec<DomainMapping>,
    #[serde(default)]
    pub ssl_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_key: Option<String>,
    #[serde(default)]
    pub config_files: Vec<ConfigFile>,
    /// Extra routing labels supplied by the client; they win over generated ones.
    #[serde(default, alias = "traefik_labels")]
    pub proxy_labels: BTreeMap<String, String>,
}

impl DeployRequest {
    pub fn container(id: SiteId, name: &str, image: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            site_type: SiteType::Container,
            docker: DockerSpec {
                image: image.to_string(),
                credentials: None,
            },
            compose_content: String::new(),
            environment_vars: BTreeMap::new(),
            domain_mappings: Vec::new(),
            ssl_enabled: false,
            ssl_email: None,
            ssl_cert: None,
            ssl_key: None,
            config_files: Vec::new(),
            proxy_labels: BTreeMap::new(),
        }
    }

    pub fn compose(id: SiteId, name: &str, document: &str) -> Self {
        Self {
            site_type: SiteType::Compose,
            docker: DockerSpec::default(),
            compose_content: document.to_string(),
            ..Self::container(id, name, "")
        }
    }

    pub fn with_domain(mut self, mapping: DomainMapping) -> Self {
        self.domain_mappings.push(mapping);
        self
    }

    /// First mapped domain; keys the proxy configuration file.
    pub fn primary_domain(&self) -> Option<&str> {
        self.domain_mappings.first().map(|m| m.domain.as_str())
    }

    pub fn domains(&self) -> Vec<String> {
        self.domain_mappings.iter().map(|m| m.domain.clone()).collect()
    }

    /// `archon-<name>`, shared by the container and the compose project.
    pub fn resource_name(&self) -> String {
        format!("{RESOURCE_PREFIX}{}", self.name)
    }

    pub fn ssl_email(&self) -> Option<&str> {
        self.ssl_email.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }
}
