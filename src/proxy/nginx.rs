// ABOUTME: nginx backend writing one server file per site into the config directory.
// ABOUTME: Every change is checked with `nginx -t` before nginx is reloaded.

use super::templates::{NGINX_SITE, NGINX_VALIDATION};
use super::{
    ProxyError, ProxyInfo, ProxyManager, SiteView, count_conf_files, first_line, primary,
    read_config, remove_config, render, required_certificate, restore_config, run_checked,
    run_shell_checked, write_config,
};
use crate::certs::CertificatePaths;
use crate::config::{ProxyKind, SslMode};
use crate::process::{CommandRunner, argv};
use crate::site::DeployRequest;
use crate::types::SiteId;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

pub struct NginxManager {
    config_dir: PathBuf,
    reload_command: String,
    ssl_mode: SslMode,
    webroot: PathBuf,
    runner: Arc<dyn CommandRunner>,
    /// Site configs set aside while a validation config serves the domain.
    parked: Mutex<HashMap<String, String>>,
}

impl NginxManager {
    pub fn new(
        config_dir: PathBuf,
        reload_command: String,
        ssl_mode: SslMode,
        webroot: PathBuf,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            config_dir,
            reload_command,
            ssl_mode,
            webroot,
            runner,
            parked: Mutex::new(HashMap::new()),
        }
    }

    pub fn site_config(&self, domain: &str) -> PathBuf {
        self.config_dir.join(format!("{domain}.conf"))
    }

    pub fn validation_config(&self, domain: &str) -> PathBuf {
        self.config_dir.join(format!("{domain}-validation.conf"))
    }

    async fn test_config(&self) -> Result<(), ProxyError> {
        run_checked(self.runner.as_ref(), "nginx", &argv(["-t"]))
            .await
            .map(drop)
    }
}

#[async_trait]
impl ProxyManager for NginxManager {
    fn kind(&self) -> ProxyKind {
        ProxyKind::Nginx
    }

    async fn configure_for_validation(&self, request: &DeployRequest) -> Result<(), ProxyError> {
        if self.ssl_mode != SslMode::Letsencrypt || !request.ssl_enabled {
            return Ok(());
        }
        let domain = primary(request)?;

        std::fs::create_dir_all(&self.webroot).map_err(|source| ProxyError::Io {
            path: self.webroot.clone(),
            source,
        })?;

        // A TLS config from an earlier deploy may point at a certificate that is gone.
        let live = self.site_config(domain);
        if let Some(previous) = read_config(&live)? {
            self.parked.lock().insert(domain.to_string(), previous);
        }
        remove_config(&live)?;

        let view = SiteView::new(request, None).with_webroot(&self.webroot);
        write_config(&self.validation_config(domain), &render(NGINX_VALIDATION, &view)?)?;
        tracing::info!(domain, "installed ACME validation config");

        // No `nginx -t` here: other sites may still reference certificates being replaced.
        run_shell_checked(self.runner.as_ref(), &self.reload_command).await
    }

    async fn configure(
        &self,
        request: &DeployRequest,
        certificate: Option<&CertificatePaths>,
    ) -> Result<(), ProxyError> {
        let domain = primary(request)?;
        let certificate = required_certificate(request, certificate)?;

        let view = SiteView::new(request, certificate);
        let content = render(NGINX_SITE, &view)?;
        let path = self.site_config(domain);
        let parked = self.parked.lock().remove(domain);
        let previous = match parked {
            Some(previous) => Some(previous),
            None => read_config(&path)?,
        };

        write_config(&path, &content)?;
        remove_config(&self.validation_config(domain))?;
        tracing::info!(domain, path = %path.display(), tls = certificate.is_some(), "wrote nginx config");

        if let Err(e) = self.test_config().await {
            if let Err(restore) = restore_config(&path, previous.as_deref()) {
                tracing::warn!(domain, error = %restore, "could not restore nginx config");
            } else {
                tracing::info!(domain, restored = previous.is_some(), "reverted rejected nginx config");
            }
            return Err(e);
        }
        Ok(())
    }

    async fn remove_validation(&self, request: &DeployRequest) -> Result<(), ProxyError> {
        let domain = primary(request)?;
        remove_config(&self.validation_config(domain))?;
        let parked = self.parked.lock().remove(domain);
        if let Some(previous) = parked {
            write_config(&self.site_config(domain), &previous)?;
            tracing::info!(domain, "restored site config after validation");
        }
        Ok(())
    }

    async fn remove(&self, site: &SiteId, domain: &str) -> Result<(), ProxyError> {
        self.parked.lock().remove(domain);
        remove_config(&self.site_config(domain))?;
        remove_config(&self.validation_config(domain))?;
        tracing::info!(%site, domain, "removed nginx config");
        Ok(())
    }

    async fn reload(&self) -> Result<(), ProxyError> {
        self.test_config().await?;
        run_shell_checked(self.runner.as_ref(), &self.reload_command).await
    }

    async fn info(&self) -> Result<ProxyInfo, ProxyError> {
        // nginx prints its version on stderr.
        let version = match self.runner.run("nginx", &argv(["-v"])).await {
            Ok(out) => first_line(&out.combined()),
            Err(e) => {
                tracing::debug!(error = %e, "nginx -v failed");
                String::new()
            }
        };
        let count = count_conf_files(&self.config_dir)?;
        Ok(ProxyInfo {
            kind: ProxyKind::Nginx,
            version,
            routers: count,
            services: count,
        })
    }
}
