// ABOUTME: apache backend writing virtual hosts into sites-available and enabling them.
// ABOUTME: Uses apache2ctl, a2ensite and a2dissite from the Debian packaging.

use super::templates::{APACHE_SITE, APACHE_VALIDATION};
use super::{
    ProxyError, ProxyInfo, ProxyManager, SiteView, count_conf_files, first_line, primary,
    read_config, remove_config, render, required_certificate, run_checked, run_shell_checked,
    write_config,
};
use crate::certs::CertificatePaths;
use crate::config::{ProxyKind, SslMode};
use crate::process::{CommandOutput, CommandRunner, argv};
use crate::site::DeployRequest;
use crate::types::SiteId;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// `apache2ctl configtest` can exit non-zero on a valid configuration
/// (for example on AH00558 warnings); trust its `Syntax OK` verdict.
pub fn configtest_passed(output: &CommandOutput) -> bool {
    output.success() || output.combined().contains("Syntax OK")
}

pub struct ApacheManager {
    config_dir: PathBuf,
    reload_command: String,
    ssl_mode: SslMode,
    runner: Arc<dyn CommandRunner>,
    /// Vhosts overwritten by a validation vhost, keyed by domain.
    parked: Mutex<HashMap<String, String>>,
}

impl ApacheManager {
    pub fn new(
        config_dir: PathBuf,
        reload_command: String,
        ssl_mode: SslMode,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            config_dir,
            reload_command,
            ssl_mode,
            runner,
            parked: Mutex::new(HashMap::new()),
        }
    }

    pub fn site_config(&self, domain: &str) -> PathBuf {
        self.config_dir.join(format!("{domain}.conf"))
    }

    async fn configtest(&self) -> Result<(), ProxyError> {
        let output = self
            .runner
            .run("apache2ctl", &argv(["configtest"]))
            .await?;
        if configtest_passed(&output) {
            Ok(())
        } else {
            Err(ProxyError::Command {
                command: "apache2ctl configtest".to_string(),
                output: output.combined(),
            })
        }
    }

    /// Write, check, enable, and reload. A vhost that fails the check or
    /// cannot be enabled is replaced by `previous`.
    async fn install(
        &self,
        domain: &str,
        content: &str,
        previous: Option<&str>,
    ) -> Result<(), ProxyError> {
        let path = self.site_config(domain);
        write_config(&path, content)?;
        tracing::info!(domain, path = %path.display(), "wrote apache vhost");

        if let Err(e) = self.enable(domain).await {
            self.restore(domain, previous).await;
            return Err(e);
        }
        self.reload().await
    }

    async fn enable(&self, domain: &str) -> Result<(), ProxyError> {
        self.configtest().await?;
        run_checked(
            self.runner.as_ref(),
            "a2ensite",
            &[format!("{domain}.conf")],
        )
        .await
        .map(drop)
    }

    async fn disable(&self, domain: &str) {
        match self.runner.run("a2dissite", &[format!("{domain}.conf")]).await {
            Ok(out) if !out.success() => {
                tracing::debug!(domain, output = %out.combined(), "a2dissite failed");
            }
            Err(e) => tracing::debug!(domain, error = %e, "a2dissite unavailable"),
            Ok(_) => {}
        }
    }

    /// Put back the vhost that was in place, or disable and delete ours.
    async fn restore(&self, domain: &str, previous: Option<&str>) {
        let path = self.site_config(domain);
        let result = match previous {
            Some(content) => write_config(&path, content),
            None => {
                self.disable(domain).await;
                remove_config(&path)
            }
        };
        match result {
            Ok(()) => tracing::info!(domain, restored = previous.is_some(), "reverted apache vhost"),
            Err(e) => tracing::warn!(domain, error = %e, "could not restore apache vhost"),
        }
    }
}

#[async_trait]
impl ProxyManager for ApacheManager {
    fn kind(&self) -> ProxyKind {
        ProxyKind::Apache
    }

    async fn configure_for_validation(&self, request: &DeployRequest) -> Result<(), ProxyError> {
        if self.ssl_mode != SslMode::Letsencrypt || !request.ssl_enabled {
            return Ok(());
        }
        let domain = primary(request)?;
        let view = SiteView::new(request, None);
        let content = render(APACHE_VALIDATION, &view)?;
        let previous = read_config(&self.site_config(domain))?;
        if let Some(previous) = &previous {
            self.parked.lock().insert(domain.to_string(), previous.clone());
        }
        self.install(domain, &content, previous.as_deref()).await
    }

    async fn remove_validation(&self, request: &DeployRequest) -> Result<(), ProxyError> {
        if self.ssl_mode != SslMode::Letsencrypt || !request.ssl_enabled {
            return Ok(());
        }
        let domain = primary(request)?;
        let parked = self.parked.lock().remove(domain);
        self.restore(domain, parked.as_deref()).await;
        Ok(())
    }

    async fn configure(
        &self,
        request: &DeployRequest,
        certificate: Option<&CertificatePaths>,
    ) -> Result<(), ProxyError> {
        let domain = primary(request)?;
        let certificate = required_certificate(request, certificate)?;
        let view = SiteView::new(request, certificate);
        let content = render(APACHE_SITE, &view)?;
        let parked = self.parked.lock().remove(domain);
        let previous = match parked {
            Some(previous) => Some(previous),
            None => read_config(&self.site_config(domain))?,
        };
        self.install(domain, &content, previous.as_deref()).await
    }

    async fn remove(&self, site: &SiteId, domain: &str) -> Result<(), ProxyError> {
        self.parked.lock().remove(domain);
        self.disable(domain).await;
        remove_config(&self.site_config(domain))?;
        tracing::info!(%site, domain, "removed apache vhost");
        Ok(())
    }

    async fn reload(&self) -> Result<(), ProxyError> {
        run_shell_checked(self.runner.as_ref(), &self.reload_command).await
    }

    async fn info(&self) -> Result<ProxyInfo, ProxyError> {
        let version = match self.runner.run("apache2", &argv(["-v"])).await {
            Ok(out) => {
                let line = first_line(&out.combined());
                line.strip_prefix("Server version:")
                    .map(|v| v.trim().to_string())
                    .unwrap_or(line)
            }
            Err(e) => {
                tracing::debug!(error = %e, "apache2 -v failed");
                String::new()
            }
        };
        let count = count_conf_files(&self.config_dir)?;
        Ok(ProxyInfo {
            kind: ProxyKind::Apache,
            version,
            routers: count,
            services: count,
        })
    }
}
