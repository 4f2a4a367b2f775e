// ABOUTME: Points the reverse proxy at the deployed site and reloads it.

use crate::pipeline::{DeploymentState, Stage, StageError};
use crate::proxy::ProxyManager;
use async_trait::async_trait;
use std::sync::Arc;

pub struct ProxyStage {
    proxy: Arc<dyn ProxyManager>,
}

impl ProxyStage {
    pub fn new(proxy: Arc<dyn ProxyManager>) -> Self {
        Self { proxy }
    }
}

#[async_trait]
impl Stage for ProxyStage {
    fn name(&self) -> &'static str {
        "proxy-config"
    }

    async fn execute(&self, state: &mut DeploymentState) -> Result<(), StageError> {
        tracing::info!(
            site = %state.request.id,
            domains = state.request.domain_mappings.len(),
            proxy = %self.proxy.kind(),
            "configuring proxy"
        );
        self.proxy
            .configure(&state.request, state.certificate.as_ref())
            .await?;
        self.proxy.reload().await?;
        Ok(())
    }

    async fn rollback(&self, state: &mut DeploymentState) -> Result<(), StageError> {
        let Some(domain) = state.request.primary_domain() else {
            return Ok(());
        };
        if let Err(e) = self.proxy.remove(&state.request.id, domain).await {
            tracing::warn!(domain, error = %e, "failed to remove proxy config");
        }
        if let Err(e) = self.proxy.reload().await {
            tracing::warn!(error = %e, "proxy reload failed during rollback");
        }
        Ok(())
    }
}
