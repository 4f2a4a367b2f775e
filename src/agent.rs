// ABOUTME: The node agent: deploys sites through the pipeline and manages them afterwards.
// ABOUTME: Owns the runtime, proxy, certificate, and compose collaborators plus per-site status.

use crate::certs::CertificateManager;
use crate::compose::ComposeExecutor;
use crate::config::AgentConfig;
use crate::container::{ContainerClient, LABEL_COMPOSE_PROJECT, LABEL_SITE_DOMAIN};
use crate::error::{Error, Result};
use crate::lock::SiteLock;
use crate::pipeline::{
    DeploymentState, DnsResolver, Pipeline, ProgressCallback, StageContext, SystemResolver,
    stages, standard_pipeline,
};
use crate::process::{CommandRunner, SystemCommandRunner};
use crate::proxy::{self, ProxyInfo, ProxyManager};
use crate::runtime::{
    BollardRuntime, ContainerRuntime, ContainerSummary, RuntimeError, RuntimeInfo,
    RuntimeMetadata, resolve_endpoint,
};
use crate::site::{DeployRequest, DeployResponse, SiteStatus, SiteStatusResponse};
use crate::types::SiteId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
struct Tracked {
    status: SiteStatus,
    message: String,
}

/// How a site is running on this node.
enum SiteHandle {
    Container(Vec<ContainerSummary>),
    Compose {
        project: String,
        containers: Vec<ContainerSummary>,
    },
}

impl SiteHandle {
    fn containers(&self) -> &[ContainerSummary] {
        match self {
            SiteHandle::Container(containers) | SiteHandle::Compose { containers, .. } => {
                containers
            }
        }
    }
}

pub struct Agent {
    config: AgentConfig,
    runtime_info: Option<Arc<dyn RuntimeInfo>>,
    containers: Arc<ContainerClient>,
    compose: Arc<ComposeExecutor>,
    certs: Arc<CertificateManager>,
    proxy: Arc<dyn ProxyManager>,
    pipeline: Pipeline,
    tracker: RwLock<HashMap<SiteId, Tracked>>,
}

impl Agent {
    /// Connect to the local engine and wire up the real tools.
    pub async fn connect(config: AgentConfig) -> Result<Self> {
        let endpoint =
            resolve_endpoint(config.docker.socket.as_deref()).map_err(RuntimeError::from)?;
        let runtime = Arc::new(BollardRuntime::connect(&endpoint).map_err(RuntimeError::from)?);
        runtime.ping().await.map_err(RuntimeError::from)?;
        tracing::info!(
            runtime = %endpoint.runtime_type,
            socket = %endpoint.socket_path,
            "connected to container runtime"
        );

        let agent = Self::with_components(
            config,
            runtime.clone(),
            Arc::new(SystemCommandRunner),
            Arc::new(SystemResolver),
        )?;
        Ok(agent.with_runtime_info(runtime))
    }

    pub fn with_components(
        config: AgentConfig,
        runtime: Arc<dyn ContainerRuntime>,
        runner: Arc<dyn CommandRunner>,
        resolver: Arc<dyn DnsResolver>,
    ) -> Result<Self> {
        config.check()?;

        let proxy = proxy::build(
            &config.proxy,
            config.ssl.mode,
            &config.ssl.webroot,
            runner.clone(),
        );
        let certs = Arc::new(CertificateManager::new(
            &config.ssl,
            config.default_email()?,
            Some(config.proxy.kind),
            runner.clone(),
        ));
        let containers = Arc::new(ContainerClient::new(
            runtime,
            config.docker.network.clone(),
            config.sites_dir(),
            config.timeouts.stop_timeout,
        ));
        let compose = Arc::new(ComposeExecutor::new(runner, config.compose_dir()));

        let pipeline = standard_pipeline(&StageContext {
            containers: containers.clone(),
            compose: compose.clone(),
            certs: certs.clone(),
            proxy: proxy.clone(),
            resolver,
            timeouts: config.timeouts.clone(),
        });

        Ok(Self {
            config,
            runtime_info: None,
            containers,
            compose,
            certs,
            proxy,
            pipeline,
            tracker: RwLock::new(HashMap::new()),
        })
    }

    pub fn with_runtime_info(mut self, info: Arc<dyn RuntimeInfo>) -> Self {
        self.runtime_info = Some(info);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn track(&self, site: SiteId, status: SiteStatus, message: impl Into<String>) {
        self.tracker.write().insert(
            site,
            Tracked {
                status,
                message: message.into(),
            },
        );
    }

    fn lock(&self, site: &SiteId) -> Result<SiteLock> {
        Ok(SiteLock::acquire(&self.config.locks_dir(), site)?)
    }

    /// Run the full pipeline for `request`. On failure completed stages are rolled back
    /// and the site is marked failed.
    pub async fn deploy(
        &self,
        request: DeployRequest,
        cancel: &CancellationToken,
        progress: Option<ProgressCallback>,
    ) -> Result<DeployResponse> {
        let site = request.id;
        let _lock = self.lock(&site)?;
        self.track(site, SiteStatus::Deploying, "deployment in progress");
        tracing::info!(%site, name = %request.name, kind = ?request.site_type, "deploying site");

        let mut state = DeploymentState::new(request, self.config.data_dir.clone());
        if let Some(callback) = progress {
            state = state.with_progress(callback);
        }

        match self.pipeline.execute(cancel, &mut state).await {
            Ok(()) => {
                let message = match &state.compose_project {
                    Some(project) => format!("compose project {project} deployed"),
                    None => "site deployed".to_string(),
                };
                let response = DeployResponse {
                    site_id: site,
                    status: SiteStatus::Running,
                    container_id: state.container_id.take().map(|id| id.into_inner()),
                    message,
                };
                self.track(site, SiteStatus::Running, &response.message);
                tracing::info!(%site, "deployment finished");
                state.response = Some(response.clone());
                Ok(response)
            }
            Err(e) => {
                self.track(site, SiteStatus::Failed, e.to_string());
                Err(e.into())
            }
        }
    }

    async fn locate(&self, site: &SiteId) -> Result<Option<SiteHandle>> {
        let containers = self.containers.site_containers(site).await?;
        if containers.is_empty() {
            return Ok(None);
        }
        let project = containers
            .iter()
            .find_map(|c| c.label(LABEL_COMPOSE_PROJECT))
            .map(str::to_string);
        Ok(Some(match project {
            Some(project) => SiteHandle::Compose {
                project,
                containers,
            },
            None => SiteHandle::Container(containers),
        }))
    }

    async fn require(&self, site: &SiteId) -> Result<SiteHandle> {
        self.locate(site).await?.ok_or(Error::SiteNotFound(*site))
    }

    pub async fn status(&self, site: &SiteId) -> Result<SiteStatusResponse> {
        let tracked = self.tracker.read().get(site).cloned();

        match self.locate(site).await? {
            Some(SiteHandle::Compose { project, .. }) => {
                let services = self.compose.status(&project).await?;
                let running = services.iter().filter(|s| s.is_running()).count();
                let is_running = running > 0;
                Ok(SiteStatusResponse {
                    site_id: *site,
                    status: if is_running {
                        SiteStatus::Running
                    } else {
                        SiteStatus::Stopped
                    },
                    container_id: None,
                    is_running,
                    message: format!("{running}/{} services running", services.len()),
                })
            }
            Some(SiteHandle::Container(containers)) => {
                let container = &containers[0];
                let is_running = container.is_running();
                Ok(SiteStatusResponse {
                    site_id: *site,
                    status: if is_running {
                        SiteStatus::Running
                    } else {
                        SiteStatus::Stopped
                    },
                    container_id: Some(container.id.to_string()),
                    is_running,
                    message: container.status.clone(),
                })
            }
            None => Ok(match tracked {
                Some(t) if matches!(t.status, SiteStatus::Failed | SiteStatus::Deploying) => {
                    SiteStatusResponse {
                        site_id: *site,
                        status: t.status,
                        container_id: None,
                        is_running: false,
                        message: t.message,
                    }
                }
                _ => SiteStatusResponse::inactive(*site, "Container not found"),
            }),
        }
    }

    pub async fn stop(&self, site: &SiteId) -> Result<()> {
        let _lock = self.lock(site)?;
        match self.require(site).await? {
            SiteHandle::Compose { project, .. } => self.compose.stop(&project).await?,
            SiteHandle::Container(_) => self.containers.stop(site).await?,
        }
        self.track(*site, SiteStatus::Stopped, "stopped");
        tracing::info!(%site, "site stopped");
        Ok(())
    }

    pub async fn restart(&self, site: &SiteId) -> Result<()> {
        let _lock = self.lock(site)?;
        match self.require(site).await? {
            SiteHandle::Compose { project, .. } => self.compose.restart(&project).await?,
            SiteHandle::Container(_) => self.containers.restart(site).await?,
        }
        self.track(*site, SiteStatus::Running, "restarted");
        tracing::info!(%site, "site restarted");
        Ok(())
    }

    /// Remove the site's containers, proxy config, certificate, and config files.
    /// `domain` keys the proxy config; it defaults to the domain recorded on the container.
    pub async fn delete(&self, site: &SiteId, domain: Option<&str>) -> Result<()> {
        if let Some(domain) = domain.filter(|d| !stages::is_hostname(d)) {
            return Err(Error::InvalidDomain(domain.to_string()));
        }
        let _lock = self.lock(site)?;

        let handle = self.locate(site).await?;
        let recorded = handle.as_ref().and_then(|h| {
            h.containers()
                .iter()
                .find_map(|c| c.label(LABEL_SITE_DOMAIN))
                .filter(|d| stages::is_hostname(d))
                .map(str::to_string)
        });

        match handle {
            Some(SiteHandle::Compose { project, .. }) => self.compose.remove(&project).await?,
            Some(SiteHandle::Container(_)) => self.containers.remove_site(site).await?,
            None => tracing::info!(%site, "no containers to remove"),
        }

        if let Some(domain) = domain.map(str::to_string).or(recorded) {
            self.proxy.remove(site, &domain).await?;
            if let Err(e) = self.proxy.reload().await {
                tracing::warn!(%site, error = %e, "proxy reload after delete failed");
            }
        }

        self.certs.remove_certificate(site)?;

        let files = self.containers.site_dir(site);
        match std::fs::remove_dir_all(&files) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        self.tracker.write().remove(site);
        tracing::info!(%site, "site deleted");
        Ok(())
    }

    pub async fn logs(&self, site: &SiteId, tail: u64) -> Result<Vec<String>> {
        match self.require(site).await? {
            SiteHandle::Compose { project, .. } => Ok(self.compose.logs(&project, tail).await?),
            SiteHandle::Container(_) => Ok(self.containers.logs(site, tail).await?),
        }
    }

    /// Renew every certbot lineage and reload the proxy so it picks them up.
    pub async fn renew_certificates(&self) -> Result<()> {
        self.certs.renew_all().await?;
        self.proxy.reload().await?;
        Ok(())
    }

    pub async fn proxy_info(&self) -> Result<ProxyInfo> {
        Ok(self.proxy.info().await?)
    }

    /// None when the agent was built without an engine connection.
    pub async fn runtime_info(&self) -> Result<Option<RuntimeMetadata>> {
        match &self.runtime_info {
            Some(info) => Ok(Some(info.info().await.map_err(RuntimeError::from)?)),
            None => Ok(None),
        }
    }
}
