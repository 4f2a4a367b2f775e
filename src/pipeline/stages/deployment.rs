// ABOUTME: Starts the site as a single container or a compose project.
// ABOUTME: Routing labels from the proxy are merged with the request's own labels.

use crate::compose::ComposeExecutor;
use crate::container::ContainerClient;
use crate::pipeline::{DeploymentState, Stage, StageError};
use crate::proxy::ProxyManager;
use crate::site::{DeployRequest, SiteType};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct DeploymentStage {
    containers: Arc<ContainerClient>,
    compose: Arc<ComposeExecutor>,
    proxy: Arc<dyn ProxyManager>,
}

impl DeploymentStage {
    pub fn new(
        containers: Arc<ContainerClient>,
        compose: Arc<ComposeExecutor>,
        proxy: Arc<dyn ProxyManager>,
    ) -> Self {
        Self {
            containers,
            compose,
            proxy,
        }
    }

    /// Request labels override generated ones on key collisions.
    pub fn routing_labels(&self, request: &DeployRequest) -> BTreeMap<String, String> {
        let mut labels = self.proxy.deployment_labels(request);
        labels.extend(request.proxy_labels.clone());
        labels
    }
}

#[async_trait]
impl Stage for DeploymentStage {
    fn name(&self) -> &'static str {
        "deployment"
    }

    async fn execute(&self, state: &mut DeploymentState) -> Result<(), StageError> {
        let labels = self.routing_labels(&state.request);
        match state.request.site_type {
            SiteType::Container => {
                let id = self.containers.deploy_site(&state.request, &labels).await?;
                state.container_id = Some(id);
            }
            SiteType::Compose => {
                let project = self.compose.deploy(&state.request, &labels).await?;
                state.compose_project = Some(project);
            }
        }
        Ok(())
    }

    async fn rollback(&self, state: &mut DeploymentState) -> Result<(), StageError> {
        match state.request.site_type {
            SiteType::Container => {
                self.containers.remove_site(&state.request.id).await?;
                state.container_id = None;
            }
            SiteType::Compose => {
                let project = state
                    .compose_project
                    .take()
                    .unwrap_or_else(|| state.request.resource_name());
                self.compose.remove(&project).await?;
            }
        }
        Ok(())
    }
}
