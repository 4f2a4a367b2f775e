// ABOUTME: traefik backend; routing lives in container labels read by traefik's docker provider.
// ABOUTME: Optionally queries the traefik API for version and router counts.

use super::{ProxyError, ProxyInfo, ProxyManager};
use crate::certs::CertificatePaths;
use crate::config::ProxyKind;
use crate::site::DeployRequest;
use crate::types::SiteId;
use async_trait::async_trait;
use http_body_util::BodyExt;
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use tokio::net::TcpStream;

/// Router, service, and redirect labels for every mapped domain.
///
/// The first domain's router is named after the site; later ones get an index
/// suffix. With TLS each router gains a `-secure` twin on `websecure` and the
/// plain router redirects to it.
pub fn traefik_labels(request: &DeployRequest) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::from([("traefik.enable".to_string(), "true".to_string())]);

    for (i, mapping) in request.domain_mappings.iter().enumerate() {
        let router = if i == 0 {
            request.name.clone()
        } else {
            format!("{}-{i}", request.name)
        };
        let rule = format!("Host(`{}`)", mapping.domain);

        labels.insert(format!("traefik.http.routers.{router}.rule"), rule.clone());
        labels.insert(
            format!("traefik.http.routers.{router}.entrypoints"),
            "web".to_string(),
        );
        labels.insert(
            format!("traefik.http.services.{router}.loadbalancer.server.port"),
            mapping.port.to_string(),
        );

        if request.ssl_enabled {
            let secure = format!("{router}-secure");
            labels.insert(format!("traefik.http.routers.{secure}.rule"), rule);
            labels.insert(
                format!("traefik.http.routers.{secure}.entrypoints"),
                "websecure".to_string(),
            );
            labels.insert(
                format!("traefik.http.routers.{secure}.tls"),
                "true".to_string(),
            );
            labels.insert(
                format!("traefik.http.routers.{secure}.tls.certresolver"),
                "letsencrypt".to_string(),
            );
            labels.insert(
                format!("traefik.http.routers.{router}.middlewares"),
                format!("redirect-{router}"),
            );
            labels.insert(
                format!("traefik.http.middlewares.redirect-{router}.redirectscheme.scheme"),
                "https".to_string(),
            );
            labels.insert(
                format!("traefik.http.middlewares.redirect-{router}.redirectscheme.permanent"),
                "true".to_string(),
            );
        }
    }
    labels
}

pub struct TraefikManager {
    api_url: Option<String>,
}

#[derive(Deserialize)]
struct VersionResponse {
    #[serde(rename = "Version")]
    version: String,
}

impl TraefikManager {
    pub fn new(api_url: Option<String>) -> Self {
        Self { api_url }
    }

    async fn get_json<T: DeserializeOwned>(&self, base: &str, path: &str) -> Result<T, ProxyError> {
        let uri: hyper::Uri = base
            .parse()
            .map_err(|e| ProxyError::Api(format!("invalid API address {base}: {e}")))?;
        if uri.scheme_str().is_some_and(|s| s != "http") {
            return Err(ProxyError::Api(format!(
                "only http:// API addresses are supported, got {base}"
            )));
        }
        let host = uri
            .host()
            .ok_or_else(|| ProxyError::Api(format!("API address has no host: {base}")))?;
        let port = uri.port_u16().unwrap_or(80);
        let prefix = uri.path().trim_end_matches('/');

        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| ProxyError::Api(format!("failed to connect to {host}:{port}: {e}")))?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| ProxyError::Api(format!("HTTP handshake failed: {e}")))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "traefik API connection closed");
            }
        });

        let req = hyper::Request::builder()
            .method("GET")
            .uri(format!("{prefix}{path}"))
            .header("Host", format!("{host}:{port}"))
            .header("Accept", "application/json")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|e| ProxyError::Api(format!("failed to build request: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ProxyError::Api(format!("request to {path} failed: {e}")))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ProxyError::Api(format!("failed to read {path}: {e}")))?
            .to_bytes();

        if !status.is_success() {
            return Err(ProxyError::Api(format!(
                "{path} returned {status}: {}",
                String::from_utf8_lossy(&body)
            )));
        }
        serde_json::from_slice(&body)
            .map_err(|e| ProxyError::Api(format!("unexpected {path} response: {e}")))
    }
}

#[async_trait]
impl ProxyManager for TraefikManager {
    fn kind(&self) -> ProxyKind {
        ProxyKind::Traefik
    }

    async fn configure_for_validation(&self, _request: &DeployRequest) -> Result<(), ProxyError> {
        Ok(())
    }

    async fn configure(
        &self,
        request: &DeployRequest,
        _certificate: Option<&CertificatePaths>,
    ) -> Result<(), ProxyError> {
        tracing::debug!(site = %request.id, "traefik routes via container labels");
        Ok(())
    }

    async fn remove(&self, _site: &SiteId, _domain: &str) -> Result<(), ProxyError> {
        Ok(())
    }

    async fn reload(&self) -> Result<(), ProxyError> {
        Ok(())
    }

    async fn info(&self) -> Result<ProxyInfo, ProxyError> {
        let Some(base) = self.api_url.as_deref() else {
            return Ok(ProxyInfo {
                kind: ProxyKind::Traefik,
                version: "2.x (auto-configured)".to_string(),
                routers: 0,
                services: 0,
            });
        };

        let version: VersionResponse = self.get_json(base, "/api/version").await?;
        let routers: Vec<serde_json::Value> = self.get_json(base, "/api/http/routers").await?;
        let services: Vec<serde_json::Value> = self.get_json(base, "/api/http/services").await?;
        Ok(ProxyInfo {
            kind: ProxyKind::Traefik,
            version: version.version,
            routers: routers.len(),
            services: services.len(),
        })
    }

    fn deployment_labels(&self, request: &DeployRequest) -> BTreeMap<String, String> {
        traefik_labels(request)
    }
}
