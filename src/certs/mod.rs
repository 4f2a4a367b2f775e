// ABOUTME: TLS certificate provisioning for deployed sites.
// ABOUTME: Manual uploads, certbot-issued SAN certificates, or delegation to traefik.

mod letsencrypt;

pub use letsencrypt::{Authenticator, certonly_args, covers_all, lineage_dirs, parse_san_output};

use crate::config::{ProxyKind, SslMode, SslSettings};
use crate::error::ErrorKind;
use crate::process::{CommandError, CommandRunner, argv};
use crate::site::DeployRequest;
use crate::types::SiteId;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use nonempty::NonEmpty;
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CERT_FILE: &str = "cert.pem";
pub const KEY_FILE: &str = "key.pem";

/// Certificate chain and private key handed to the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum CertError {
    #[error("at least one domain is required")]
    NoDomains,

    #[error("manual SSL mode requires certificate and key")]
    MissingMaterial,

    #[error("failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    #[error("email is required for Let's Encrypt")]
    MissingEmail,

    #[error("{0} is not installed")]
    ToolMissing(&'static str),

    #[error("traefik issues its own certificates; use ssl.mode traefik-auto")]
    UnsupportedProxy,

    #[error("certbot failed: {0}")]
    Certbot(String),

    #[error("certificate not found for domain {domain} in {}", .live_dir.display())]
    NotFound { domain: String, live_dir: PathBuf },

    #[error("no certificate for {domain} covers {}", .missing.join(", "))]
    Uncovered { domain: String, missing: Vec<String> },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Spawn(#[from] CommandError),
}

impl CertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CertError::NoDomains
            | CertError::MissingMaterial
            | CertError::Decode { .. }
            | CertError::MissingEmail
            | CertError::UnsupportedProxy => ErrorKind::Validation,
            CertError::ToolMissing(_) | CertError::Certbot(_) | CertError::Spawn(_) => {
                ErrorKind::ExternalTool
            }
            CertError::NotFound { .. } => ErrorKind::ResourceNotFound,
            CertError::Uncovered { .. } => ErrorKind::ExternalTool,
            CertError::Io { .. } => ErrorKind::Runtime,
        }
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CertError + '_ {
    move |source| CertError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub struct CertificateManager {
    mode: SslMode,
    cert_dir: PathBuf,
    live_dir: PathBuf,
    webroot: PathBuf,
    default_email: Option<String>,
    proxy: Option<ProxyKind>,
    runner: Arc<dyn CommandRunner>,
}

impl CertificateManager {
    pub fn new(
        settings: &SslSettings,
        default_email: Option<String>,
        proxy: Option<ProxyKind>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            mode: settings.mode,
            cert_dir: settings.cert_dir.clone(),
            live_dir: settings.live_dir.clone(),
            webroot: settings.webroot.clone(),
            default_email: default_email.filter(|e| !e.trim().is_empty()),
            proxy,
            runner,
        }
    }

    pub fn mode(&self) -> SslMode {
        self.mode
    }

    pub fn site_dir(&self, site: &SiteId) -> PathBuf {
        self.cert_dir.join(site.to_string())
    }

    /// Provision a certificate covering every mapped domain.
    /// None means the proxy obtains certificates on its own.
    pub async fn ensure_certificate(
        &self,
        request: &DeployRequest,
    ) -> Result<Option<CertificatePaths>, CertError> {
        let domains = NonEmpty::from_vec(request.domains()).ok_or(CertError::NoDomains)?;

        match self.mode {
            SslMode::Manual => self
                .store_manual(
                    &request.id,
                    request.ssl_cert.as_deref(),
                    request.ssl_key.as_deref(),
                )
                .map(Some),
            SslMode::Letsencrypt => {
                let email = request
                    .ssl_email()
                    .map(str::to_string)
                    .or_else(|| self.default_email.clone())
                    .ok_or(CertError::MissingEmail)?;
                self.issue(&domains, &email).await.map(Some)
            }
            SslMode::TraefikAuto => {
                tracing::debug!(site = %request.id, "certificates delegated to traefik");
                Ok(None)
            }
        }
    }

    fn store_manual(
        &self,
        site: &SiteId,
        cert: Option<&str>,
        key: Option<&str>,
    ) -> Result<CertificatePaths, CertError> {
        let (Some(cert), Some(key)) = (
            cert.map(str::trim).filter(|s| !s.is_empty()),
            key.map(str::trim).filter(|s| !s.is_empty()),
        ) else {
            return Err(CertError::MissingMaterial);
        };

        let cert = STANDARD.decode(cert).map_err(|source| CertError::Decode {
            what: "certificate",
            source,
        })?;
        let key = STANDARD.decode(key).map_err(|source| CertError::Decode {
            what: "key",
            source,
        })?;

        let dir = self.site_dir(site);
        std::fs::create_dir_all(&dir).map_err(io_err(&dir))?;

        let paths = CertificatePaths {
            cert: dir.join(CERT_FILE),
            key: dir.join(KEY_FILE),
        };
        write_with_mode(&paths.cert, &cert, 0o644)?;
        write_with_mode(&paths.key, &key, 0o600)?;

        tracing::info!(%site, cert = %paths.cert.display(), "stored uploaded certificate");
        Ok(paths)
    }

    async fn issue(
        &self,
        domains: &NonEmpty<String>,
        email: &str,
    ) -> Result<CertificatePaths, CertError> {
        if !self.runner.has_program("certbot").await {
            return Err(CertError::ToolMissing("certbot"));
        }

        let all: Vec<String> = domains.iter().cloned().collect();
        if let Some(paths) = self.existing_covering(&domains.head, &all).await {
            tracing::info!(domain = %domains.head, cert = %paths.cert.display(), "reusing existing certificate");
            return Ok(paths);
        }

        let authenticator =
            Authenticator::for_proxy(self.proxy).ok_or(CertError::UnsupportedProxy)?;
        if authenticator == Authenticator::Webroot {
            std::fs::create_dir_all(&self.webroot).map_err(io_err(&self.webroot))?;
        }

        let args = certonly_args(email, authenticator, &self.webroot, &all);
        tracing::info!(domains = ?all, "requesting certificate from Let's Encrypt");
        let output = self.runner.run("certbot", &args).await?;
        if !output.success() {
            return Err(CertError::Certbot(output.combined()));
        }

        if let Some(paths) = self.existing_covering(&domains.head, &all).await {
            tracing::info!(domain = %domains.head, cert = %paths.cert.display(), "certificate issued");
            return Ok(paths);
        }
        // certbot reported success but no lineage holds every name.
        let issued = self.find(&domains.head)?;
        tracing::warn!(domain = %domains.head, cert = %issued.cert.display(), "issued certificate lacks requested names");
        Err(CertError::Uncovered {
            domain: domains.head.clone(),
            missing: self.missing_names(&issued, &all).await,
        })
    }

    /// Requested names absent from the certificate at `paths`.
    async fn missing_names(&self, paths: &CertificatePaths, domains: &[String]) -> Vec<String> {
        let sans = match self.runner.run("openssl", &san_args(&paths.cert)).await {
            Ok(out) if out.success() => parse_san_output(&out.stdout),
            _ => Vec::new(),
        };
        domains
            .iter()
            .filter(|d| !sans.iter().any(|s| s.eq_ignore_ascii_case(d)))
            .cloned()
            .collect()
    }

    /// First lineage for `primary` whose SANs include every domain.
    async fn existing_covering(&self, primary: &str, domains: &[String]) -> Option<CertificatePaths> {
        for dir in lineage_dirs(&self.live_dir, primary) {
            let fullchain = dir.join(letsencrypt::FULLCHAIN);
            match self.runner.run("openssl", &san_args(&fullchain)).await {
                Ok(out) if out.success() => {
                    let sans = parse_san_output(&out.stdout);
                    if covers_all(&sans, domains) {
                        return Some(lineage_paths(&dir));
                    }
                    tracing::debug!(dir = %dir.display(), ?sans, "existing certificate does not cover all domains");
                }
                Ok(out) => {
                    tracing::debug!(dir = %dir.display(), output = %out.combined(), "could not read certificate SANs");
                }
                Err(e) => {
                    tracing::debug!(error = %e, "openssl unavailable, not reusing certificates");
                    return None;
                }
            }
        }
        None
    }

    /// Locate the issued lineage for `primary`.
    pub fn find(&self, primary: &str) -> Result<CertificatePaths, CertError> {
        lineage_dirs(&self.live_dir, primary)
            .first()
            .map(|dir| lineage_paths(dir))
            .ok_or_else(|| CertError::NotFound {
                domain: primary.to_string(),
                live_dir: self.live_dir.clone(),
            })
    }

    /// Delete the site's stored certificate. A missing directory is fine.
    pub fn remove_certificate(&self, site: &SiteId) -> Result<(), CertError> {
        let dir = self.site_dir(site);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::info!(%site, "removed certificate directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&dir)(e)),
        }
    }

    /// `certbot renew` for every lineage. Nothing to do outside letsencrypt mode.
    pub async fn renew_all(&self) -> Result<(), CertError> {
        if self.mode != SslMode::Letsencrypt {
            tracing::debug!(mode = %self.mode, "no certificates to renew");
            return Ok(());
        }
        if !self.runner.has_program("certbot").await {
            return Err(CertError::ToolMissing("certbot"));
        }

        let output = self
            .runner
            .run("certbot", &argv(["renew", "--non-interactive"]))
            .await?;
        if !output.success() {
            return Err(CertError::Certbot(output.combined()));
        }
        tracing::info!("certificate renewal finished");
        Ok(())
    }
}

fn san_args(fullchain: &Path) -> Vec<String> {
    let mut args = argv(["x509", "-noout", "-ext", "subjectAltName", "-in"]);
    args.push(fullchain.to_string_lossy().into_owned());
    args
}

fn lineage_paths(dir: &Path) -> CertificatePaths {
    CertificatePaths {
        cert: dir.join(letsencrypt::FULLCHAIN),
        key: dir.join(letsencrypt::PRIVKEY),
    }
}

fn write_with_mode(path: &Path, data: &[u8], mode: u32) -> Result<(), CertError> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
        .map_err(io_err(path))?;
    file.write_all(data).map_err(io_err(path))?;
    // The file may predate this call with looser bits.
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(io_err(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::SystemCommandRunner;
    use crate::site::DomainMapping;

    fn manager(mode: SslMode, dir: &Path) -> CertificateManager {
        let settings = SslSettings {
            mode,
            cert_dir: dir.join("ssl"),
            live_dir: dir.join("live"),
            webroot: dir.join("webroot"),
            ..Default::default()
        };
        CertificateManager::new(
            &settings,
            None,
            Some(ProxyKind::Nginx),
            Arc::new(SystemCommandRunner),
        )
    }

    fn request() -> DeployRequest {
        DeployRequest::container(SiteId::new(), "blog", "nginx:latest")
            .with_domain(DomainMapping::new("blog.example.com", 80))
    }

    #[tokio::test]
    async fn manual_mode_writes_files_with_modes() {
        let tmp = tempfile::tempdir().unwrap();
        let certs = manager(SslMode::Manual, tmp.path());
        let mut req = request();
        req.ssl_cert = Some(STANDARD.encode("CERT"));
        req.ssl_key = Some(STANDARD.encode("KEY"));

        let paths = certs.ensure_certificate(&req).await.unwrap().unwrap();
        assert_eq!(paths.cert, certs.site_dir(&req.id).join("cert.pem"));
        assert_eq!(std::fs::read_to_string(&paths.key).unwrap(), "KEY");

        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&paths.cert), 0o644);
        assert_eq!(mode(&paths.key), 0o600);
    }

    #[tokio::test]
    async fn manual_mode_rejects_bad_base64_before_touching_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let certs = manager(SslMode::Manual, tmp.path());
        let mut req = request();
        req.ssl_cert = Some(STANDARD.encode("CERT"));
        req.ssl_key = Some("%%% not base64".into());

        let err = certs.ensure_certificate(&req).await.unwrap_err();
        assert!(matches!(err, CertError::Decode { what: "key", .. }));
        assert!(!certs.site_dir(&req.id).exists());
    }

    #[tokio::test]
    async fn manual_mode_requires_both_blobs() {
        let tmp = tempfile::tempdir().unwrap();
        let certs = manager(SslMode::Manual, tmp.path());
        let mut req = request();
        req.ssl_cert = Some(STANDARD.encode("CERT"));

        let err = certs.ensure_certificate(&req).await.unwrap_err();
        assert!(matches!(err, CertError::MissingMaterial));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn traefik_auto_returns_no_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let certs = manager(SslMode::TraefikAuto, tmp.path());
        assert_eq!(certs.ensure_certificate(&request()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn letsencrypt_requires_an_email() {
        let tmp = tempfile::tempdir().unwrap();
        let certs = manager(SslMode::Letsencrypt, tmp.path());
        let err = certs.ensure_certificate(&request()).await.unwrap_err();
        assert!(matches!(err, CertError::MissingEmail));
    }

    #[tokio::test]
    async fn no_domains_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let certs = manager(SslMode::TraefikAuto, tmp.path());
        let req = DeployRequest::container(SiteId::new(), "blog", "nginx");
        assert!(matches!(
            certs.ensure_certificate(&req).await,
            Err(CertError::NoDomains)
        ));
    }

    #[test]
    fn removing_a_missing_certificate_is_fine() {
        let tmp = tempfile::tempdir().unwrap();
        let certs = manager(SslMode::Manual, tmp.path());
        certs.remove_certificate(&SiteId::new()).unwrap();
    }

    #[tokio::test]
    async fn renew_is_a_no_op_outside_letsencrypt() {
        let tmp = tempfile::tempdir().unwrap();
        manager(SslMode::Manual, tmp.path()).renew_all().await.unwrap();
    }
}
