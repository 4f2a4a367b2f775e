// ABOUTME: Certificate acquisition mode and storage locations.
// ABOUTME: manual, letsencrypt (certbot), or traefik-auto (delegated to the proxy).

use super::EnvValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Manual,
    #[default]
    Letsencrypt,
    TraefikAuto,
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SslMode::Manual => "manual",
            SslMode::Letsencrypt => "letsencrypt",
            SslMode::TraefikAuto => "traefik-auto",
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SslSettings {
    #[serde(default)]
    pub mode: SslMode,

    /// Fallback ACME contact when a request carries none.
    #[serde(default)]
    pub email: Option<EnvValue>,

    #[serde(default = "default_cert_dir")]
    pub cert_dir: PathBuf,

    /// Where certbot keeps issued lineages.
    #[serde(default = "default_live_dir")]
    pub live_dir: PathBuf,

    /// Webroot served for HTTP-01 challenges.
    #[serde(default = "default_webroot")]
    pub webroot: PathBuf,
}

impl Default for SslSettings {
    fn default() -> Self {
        Self {
            mode: SslMode::default(),
            email: None,
            cert_dir: default_cert_dir(),
            live_dir: default_live_dir(),
            webroot: default_webroot(),
        }
    }
}

fn default_cert_dir() -> PathBuf {
    PathBuf::from("/etc/archon/ssl")
}

fn default_live_dir() -> PathBuf {
    PathBuf::from("/etc/letsencrypt/live")
}

fn default_webroot() -> PathBuf {
    PathBuf::from("/var/www/certbot")
}
