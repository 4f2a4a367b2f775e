// ABOUTME: Single-container site orchestration over the runtime traits.
// ABOUTME: Pull, replace, start, stop, remove, logs, and host-port conflict queries.

use crate::error::ErrorKind;
use crate::runtime::{
    ContainerConfig, ContainerError, ContainerFilters, ContainerRuntime, ContainerSummary,
    ImageError, LogError, LogOptions, NetworkConfig, NetworkError, PortMapping, Protocol,
    RegistryAuth, RestartPolicy, VolumeMount,
};
use crate::site::DeployRequest;
use crate::types::{ContainerId, ImageRef, ParseImageRefError, SiteId};
use futures::StreamExt;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const LABEL_SITE_ID: &str = "archon.site.id";
pub const LABEL_SITE_NAME: &str = "archon.site.name";
pub const LABEL_SITE_DOMAIN: &str = "archon.site.domain";
pub const LABEL_MANAGED: &str = "archon.managed";
/// Set by `docker compose` on every service container.
pub const LABEL_COMPOSE_PROJECT: &str = "com.docker.compose.project";

/// Labels identifying the runtime objects that belong to a site.
pub fn site_labels(request: &DeployRequest) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_MANAGED.to_string(), "true".to_string()),
        (LABEL_SITE_ID.to_string(), request.id.to_string()),
        (LABEL_SITE_NAME.to_string(), request.name.clone()),
        (
            LABEL_SITE_DOMAIN.to_string(),
            request.primary_domain().unwrap_or_default().to_string(),
        ),
    ])
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Logs(#[from] LogError),

    #[error(transparent)]
    InvalidImage(#[from] ParseImageRefError),

    #[error("config file name must be a plain file name: {0}")]
    InvalidConfigFile(String),

    #[error("failed to write config file {}: {source}", .path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no container found for site {0}")]
    SiteNotFound(SiteId),
}

impl OrchestrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestrationError::InvalidImage(_) | OrchestrationError::InvalidConfigFile(_) => {
                ErrorKind::Validation
            }
            OrchestrationError::SiteNotFound(_)
            | OrchestrationError::Image(ImageError::NotFound(_))
            | OrchestrationError::Container(ContainerError::NotFound(_))
            | OrchestrationError::Container(ContainerError::ImageNotFound(_)) => {
                ErrorKind::ResourceNotFound
            }
            OrchestrationError::Container(ContainerError::AlreadyExists(_))
            | OrchestrationError::Network(NetworkError::AlreadyExists(_)) => ErrorKind::Conflict,
            _ => ErrorKind::Runtime,
        }
    }
}

/// A requested host port already held by another site's container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConflict {
    pub port: u16,
    pub container: String,
}

impl fmt::Display for PortConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port {} (used by {})", self.port, self.container)
    }
}

pub struct ContainerClient {
    runtime: Arc<dyn ContainerRuntime>,
    network: String,
    sites_dir: PathBuf,
    stop_timeout: Duration,
}

impl ContainerClient {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        network: impl Into<String>,
        sites_dir: PathBuf,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            runtime,
            network: network.into(),
            sites_dir,
            stop_timeout,
        }
    }

    pub fn site_dir(&self, site: &SiteId) -> PathBuf {
        self.sites_dir.join(site.to_string())
    }

    async fn ensure_network(&self) -> Result<(), OrchestrationError> {
        if self.runtime.network_exists(&self.network).await? {
            return Ok(());
        }
        let config = NetworkConfig {
            name: self.network.clone(),
            driver: Some("bridge".to_string()),
            labels: HashMap::from([(LABEL_MANAGED.to_string(), "true".to_string())]),
        };
        match self.runtime.create_network(&config).await {
            Ok(id) => {
                tracing::info!(network = %self.network, id = %id.short(), "created network");
                Ok(())
            }
            Err(NetworkError::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_config_files(&self, request: &DeployRequest) -> Result<Vec<VolumeMount>, OrchestrationError> {
        if request.config_files.is_empty() {
            return Ok(Vec::new());
        }

        let dir = self.site_dir(&request.id);
        std::fs::create_dir_all(&dir).map_err(|source| OrchestrationError::ConfigFile {
            path: dir.clone(),
            source,
        })?;

        request
            .config_files
            .iter()
            .map(|file| {
                let plain = Path::new(&file.name).file_name().and_then(|n| n.to_str());
                if plain != Some(file.name.as_str()) {
                    return Err(OrchestrationError::InvalidConfigFile(file.name.clone()));
                }
                let path = dir.join(&file.name);
                std::fs::write(&path, &file.content).map_err(|source| {
                    OrchestrationError::ConfigFile {
                        path: path.clone(),
                        source,
                    }
                })?;
                Ok(VolumeMount {
                    source: path.to_string_lossy().into_owned(),
                    target: file.container_path.clone(),
                    read_only: true,
                })
            })
            .collect()
    }

    /// Replace the site's container with a fresh one built from `request`.
    pub async fn deploy_site(
        &self,
        request: &DeployRequest,
        routing_labels: &BTreeMap<String, String>,
    ) -> Result<ContainerId, OrchestrationError> {
        let image = ImageRef::parse(&request.docker.image)?;
        let name = request.resource_name();

        self.ensure_network().await?;

        let auth = request.docker.credentials.as_ref().map(|c| RegistryAuth {
            username: c.username.clone(),
            password: c.password.clone(),
            server: image.registry().map(str::to_string),
        });
        tracing::info!(%image, "pulling image");
        self.runtime.pull_image(&image, auth.as_ref()).await?;

        let volumes = self.write_config_files(request)?;

        let mut labels: HashMap<String, String> = routing_labels.clone().into_iter().collect();
        labels.extend(site_labels(request));

        let ports = request
            .domain_mappings
            .iter()
            .map(|m| PortMapping {
                container_port: m.port,
                host_port: m.published_port(),
                protocol: Protocol::Tcp,
                host_ip: Some("0.0.0.0".to_string()),
            })
            .collect();

        let config = ContainerConfig {
            name: name.clone(),
            image,
            env: request
                .environment_vars
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            labels,
            ports,
            volumes,
            restart_policy: RestartPolicy::UnlessStopped,
            network: Some(self.network.clone()),
        };

        self.remove_named(&name).await?;

        let id = self.runtime.create_container(&config).await?;
        self.runtime.start_container(&id).await?;
        tracing::info!(container = %name, id = %id.short(), "container started");
        Ok(id)
    }

    /// Stop and remove any container holding `name`.
    async fn remove_named(&self, name: &str) -> Result<(), OrchestrationError> {
        let filters = ContainerFilters {
            name: Some(name.to_string()),
            ..Default::default()
        }
        .including_stopped();

        // The engine's name filter matches substrings.
        for existing in self
            .runtime
            .list_containers(&filters)
            .await?
            .into_iter()
            .filter(|c| c.name == name)
        {
            tracing::info!(container = %name, id = %existing.id.short(), "replacing existing container");
            self.stop_quietly(&existing.id).await?;
            match self.runtime.remove_container(&existing.id, true).await {
                Ok(()) | Err(ContainerError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn stop_quietly(&self, id: &ContainerId) -> Result<(), OrchestrationError> {
        match self.runtime.stop_container(id, self.stop_timeout).await {
            Ok(()) | Err(ContainerError::NotRunning(_)) | Err(ContainerError::NotFound(_)) => {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Every container labelled with the site id, stopped ones included.
    pub async fn site_containers(
        &self,
        site: &SiteId,
    ) -> Result<Vec<ContainerSummary>, OrchestrationError> {
        let filters = ContainerFilters::default()
            .label(LABEL_SITE_ID, &site.to_string())
            .including_stopped();
        Ok(self.runtime.list_containers(&filters).await?)
    }

    async fn site_container(&self, site: &SiteId) -> Result<ContainerSummary, OrchestrationError> {
        self.site_containers(site)
            .await?
            .into_iter()
            .next()
            .ok_or(OrchestrationError::SiteNotFound(*site))
    }

    pub async fn stop(&self, site: &SiteId) -> Result<(), OrchestrationError> {
        let container = self.site_container(site).await?;
        self.stop_quietly(&container.id).await
    }

    pub async fn restart(&self, site: &SiteId) -> Result<(), OrchestrationError> {
        let container = self.site_container(site).await?;
        self.stop_quietly(&container.id).await?;
        match self.runtime.start_container(&container.id).await {
            Ok(()) | Err(ContainerError::AlreadyRunning(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Stop and force-remove the site's containers. Missing containers are fine.
    pub async fn remove_site(&self, site: &SiteId) -> Result<(), OrchestrationError> {
        for container in self.site_containers(site).await? {
            self.stop_quietly(&container.id).await?;
            match self.runtime.remove_container(&container.id, true).await {
                Ok(()) | Err(ContainerError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
            tracing::info!(%site, container = %container.name, "removed container");
        }
        Ok(())
    }

    pub async fn logs(&self, site: &SiteId, tail: u64) -> Result<Vec<String>, OrchestrationError> {
        let container = self.site_container(site).await?;
        let mut stream = self
            .runtime
            .container_logs(&container.id, &LogOptions::tail(tail))
            .await?;

        let mut lines = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            lines.extend(chunk.content.lines().map(str::to_string));
        }
        Ok(lines)
    }

    /// Host ports in `ports` held by running managed containers of other sites.
    pub async fn check_port_conflicts(
        &self,
        ports: &BTreeSet<u16>,
        exclude: &SiteId,
    ) -> Result<Vec<PortConflict>, OrchestrationError> {
        let filters = ContainerFilters::default().label(LABEL_MANAGED, "true");
        let exclude = exclude.to_string();

        let mut conflicts: Vec<PortConflict> = self
            .runtime
            .list_containers(&filters)
            .await?
            .into_iter()
            .filter(|c| c.label(LABEL_SITE_ID) != Some(exclude.as_str()))
            .flat_map(|c| {
                c.ports
                    .iter()
                    .filter_map(|p| p.host_port)
                    .filter(|p| ports.contains(p))
                    .map(|port| PortConflict {
                        port,
                        container: c.name.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        conflicts.sort_by(|a, b| a.port.cmp(&b.port).then(a.container.cmp(&b.container)));
        conflicts.dedup();
        Ok(conflicts)
    }
}
