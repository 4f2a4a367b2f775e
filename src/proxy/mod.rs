// ABOUTME: Reverse-proxy configuration behind a single trait.
// ABOUTME: nginx and apache are file-templated; traefik is driven by container labels.

mod apache;
mod nginx;
mod templates;
mod traefik;

pub use apache::{ApacheManager, configtest_passed};
pub use nginx::NginxManager;
pub use traefik::{TraefikManager, traefik_labels};

use crate::certs::CertificatePaths;
use crate::config::{ProxyKind, ProxySettings, SslMode};
use crate::error::ErrorKind;
use crate::process::{CommandError, CommandOutput, CommandRunner};
use crate::site::DeployRequest;
use crate::types::SiteId;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("at least one domain mapping is required")]
    NoDomains,

    #[error("SSL enabled but no certificate available for {0}")]
    MissingCertificate(String),

    #[error("failed to render proxy config: {0}")]
    Render(#[from] tera::Error),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed: {output}")]
    Command { command: String, output: String },

    #[error(transparent)]
    Spawn(#[from] CommandError),

    #[error("traefik API error: {0}")]
    Api(String),
}

impl ProxyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::NoDomains | ProxyError::Render(_) => ErrorKind::Validation,
            ProxyError::MissingCertificate(_) => ErrorKind::ResourceNotFound,
            ProxyError::Io { .. } => ErrorKind::Runtime,
            ProxyError::Command { .. } | ProxyError::Spawn(_) | ProxyError::Api(_) => {
                ErrorKind::ExternalTool
            }
        }
    }
}

/// What the proxy reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyInfo {
    pub kind: ProxyKind,
    pub version: String,
    pub routers: usize,
    pub services: usize,
}

#[async_trait]
pub trait ProxyManager: Send + Sync {
    fn kind(&self) -> ProxyKind;

    /// Serve HTTP-01 challenges for the request's domains before issuance.
    async fn configure_for_validation(&self, request: &DeployRequest) -> Result<(), ProxyError>;

    /// Undo `configure_for_validation`: drop the challenge config and put back
    /// whatever site config it displaced. Nothing installed is fine.
    async fn remove_validation(&self, _request: &DeployRequest) -> Result<(), ProxyError> {
        Ok(())
    }

    /// Route the request's domains to the site, with TLS when `certificate` is given.
    async fn configure(
        &self,
        request: &DeployRequest,
        certificate: Option<&CertificatePaths>,
    ) -> Result<(), ProxyError>;

    /// Drop the configuration keyed by `domain`. Missing configuration is fine.
    async fn remove(&self, site: &SiteId, domain: &str) -> Result<(), ProxyError>;

    async fn reload(&self) -> Result<(), ProxyError>;

    async fn info(&self) -> Result<ProxyInfo, ProxyError>;

    /// Labels the deployed containers must carry for routing.
    fn deployment_labels(&self, _request: &DeployRequest) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// The manager for the configured backend.
pub fn build(
    settings: &ProxySettings,
    ssl_mode: SslMode,
    webroot: &Path,
    runner: Arc<dyn CommandRunner>,
) -> Arc<dyn ProxyManager> {
    match settings.kind {
        ProxyKind::Nginx => Arc::new(NginxManager::new(
            settings.config_dir(),
            settings.reload_command(),
            ssl_mode,
            webroot.to_path_buf(),
            runner,
        )),
        ProxyKind::Apache => Arc::new(ApacheManager::new(
            settings.config_dir(),
            settings.reload_command(),
            ssl_mode,
            runner,
        )),
        ProxyKind::Traefik => Arc::new(TraefikManager::new(settings.api_url.clone())),
    }
}

#[derive(Serialize)]
struct DomainView<'a> {
    name: &'a str,
    port: u16,
}

/// Template context shared by the file-based backends.
#[derive(Serialize)]
struct SiteView<'a> {
    domains: Vec<DomainView<'a>>,
    ssl: bool,
    cert: String,
    key: String,
    webroot: String,
}

impl<'a> SiteView<'a> {
    fn new(request: &'a DeployRequest, certificate: Option<&CertificatePaths>) -> Self {
        Self {
            domains: request
                .domain_mappings
                .iter()
                .map(|m| DomainView {
                    name: &m.domain,
                    port: m.published_port(),
                })
                .collect(),
            ssl: certificate.is_some(),
            cert: certificate
                .map(|c| c.cert.to_string_lossy().into_owned())
                .unwrap_or_default(),
            key: certificate
                .map(|c| c.key.to_string_lossy().into_owned())
                .unwrap_or_default(),
            webroot: String::new(),
        }
    }

    fn with_webroot(mut self, webroot: &Path) -> Self {
        self.webroot = webroot.to_string_lossy().into_owned();
        self
    }
}

fn render(template: &str, view: &SiteView<'_>) -> Result<String, ProxyError> {
    let context = tera::Context::from_serialize(view)?;
    Ok(tera::Tera::one_off(template, &context, false)?)
}

fn primary(request: &DeployRequest) -> Result<&str, ProxyError> {
    request.primary_domain().ok_or(ProxyError::NoDomains)
}

/// Certificate the request needs, if any.
fn required_certificate<'c>(
    request: &DeployRequest,
    certificate: Option<&'c CertificatePaths>,
) -> Result<Option<&'c CertificatePaths>, ProxyError> {
    match (request.ssl_enabled, certificate) {
        (true, None) => Err(ProxyError::MissingCertificate(
            primary(request)?.to_string(),
        )),
        (true, cert) => Ok(cert),
        (false, _) => Ok(None),
    }
}

fn write_config(path: &Path, content: &str) -> Result<(), ProxyError> {
    let io = |source: std::io::Error| ProxyError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(io)?;
    }
    std::fs::write(path, content).map_err(io)
}

/// Current contents of a config file, None when there is none.
fn read_config(path: &Path) -> Result<Option<String>, ProxyError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ProxyError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Put `previous` back at `path`, or delete the file if there was nothing before.
fn restore_config(path: &Path, previous: Option<&str>) -> Result<(), ProxyError> {
    match previous {
        Some(content) => write_config(path, content),
        None => remove_config(path),
    }
}

fn remove_config(path: &Path) -> Result<(), ProxyError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ProxyError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Run a tool and fail with its output on a non-zero exit.
async fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[String],
) -> Result<CommandOutput, ProxyError> {
    let output = runner.run(program, args).await?;
    if !output.success() {
        return Err(ProxyError::Command {
            command: std::iter::once(program.to_string())
                .chain(args.iter().cloned())
                .collect::<Vec<_>>()
                .join(" "),
            output: output.combined(),
        });
    }
    Ok(output)
}

async fn run_shell_checked(runner: &dyn CommandRunner, script: &str) -> Result<(), ProxyError> {
    let output = runner.run_shell(script).await?;
    if !output.success() {
        return Err(ProxyError::Command {
            command: script.to_string(),
            output: output.combined(),
        });
    }
    Ok(())
}

fn count_conf_files(dir: &Path) -> Result<usize, ProxyError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(source) => {
            return Err(ProxyError::Io {
                path: dir.to_path_buf(),
                source,
            });
        }
    };
    Ok(entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "conf"))
        .count())
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().trim().to_string()
}
