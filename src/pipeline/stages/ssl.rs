// ABOUTME: Obtains the site certificate when TLS is enabled.
// ABOUTME: Installs challenge config, waits for DNS, then asks the certificate manager.

use crate::certs::{CertificateManager, CertificatePaths};
use crate::pipeline::dns::{DnsResolver, wait_for_dns};
use crate::pipeline::{DeploymentState, Stage, StageError};
use crate::proxy::ProxyManager;
use crate::site::DeployRequest;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub struct SslStage {
    certs: Arc<CertificateManager>,
    proxy: Arc<dyn ProxyManager>,
    resolver: Arc<dyn DnsResolver>,
    dns_timeout: Duration,
    dns_poll: Duration,
}

impl SslStage {
    pub fn new(
        certs: Arc<CertificateManager>,
        proxy: Arc<dyn ProxyManager>,
        resolver: Arc<dyn DnsResolver>,
        dns_timeout: Duration,
        dns_poll: Duration,
    ) -> Self {
        Self {
            certs,
            proxy,
            resolver,
            dns_timeout,
            dns_poll,
        }
    }

    async fn obtain(
        &self,
        request: &DeployRequest,
    ) -> Result<Option<CertificatePaths>, StageError> {
        self.proxy.configure_for_validation(request).await?;
        self.proxy.reload().await?;

        for domain in &request.domains() {
            wait_for_dns(
                self.resolver.as_ref(),
                domain,
                self.dns_poll,
                self.dns_timeout,
            )
            .await?;
        }

        Ok(self.certs.ensure_certificate(request).await?)
    }

    /// Take down the challenge config and bring back the site config it replaced.
    async fn withdraw_validation(&self, request: &DeployRequest) {
        if let Err(e) = self.proxy.remove_validation(request).await {
            tracing::warn!(site = %request.id, error = %e, "could not remove validation config");
            return;
        }
        if let Err(e) = self.proxy.reload().await {
            tracing::warn!(site = %request.id, error = %e, "proxy reload after validation cleanup failed");
        }
    }
}

#[async_trait]
impl Stage for SslStage {
    fn name(&self) -> &'static str {
        "ssl-setup"
    }

    async fn execute(&self, state: &mut DeploymentState) -> Result<(), StageError> {
        let request = &state.request;
        if !request.ssl_enabled {
            return Ok(());
        }

        tracing::info!(site = %request.id, domains = ?request.domains(), "setting up certificate");

        let certificate = match self.obtain(request).await {
            Ok(certificate) => certificate,
            Err(e) => {
                self.withdraw_validation(request).await;
                return Err(e);
            }
        };
        if let Some(paths) = &certificate {
            tracing::info!(cert = %paths.cert.display(), "certificate ready");
        }
        state.certificate = certificate;
        Ok(())
    }

    async fn rollback(&self, state: &mut DeploymentState) -> Result<(), StageError> {
        if state.request.ssl_enabled {
            self.withdraw_validation(&state.request).await;
        }
        if state.certificate.take().is_some() {
            self.certs.remove_certificate(&state.request.id)?;
        }
        Ok(())
    }
}
