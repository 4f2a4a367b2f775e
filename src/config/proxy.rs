// ABOUTME: Reverse-proxy backend selection and its on-disk locations.
// ABOUTME: Defaults follow the stock Debian layouts of nginx and apache.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    #[default]
    Nginx,
    Apache,
    Traefik,
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProxyKind::Nginx => "nginx",
            ProxyKind::Apache => "apache",
            ProxyKind::Traefik => "traefik",
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxySettings {
    #[serde(default, rename = "type")]
    pub kind: ProxyKind,

    /// Directory holding per-site configuration files.
    #[serde(default)]
    pub config_dir: Option<PathBuf>,

    /// Shell command run by `reload`.
    #[serde(default)]
    pub reload_command: Option<String>,

    /// Traefik API address, e.g. `http://127.0.0.1:8080`.
    #[serde(default)]
    pub api_url: Option<String>,
}

impl ProxySettings {
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone().unwrap_or_else(|| {
            PathBuf::from(match self.kind {
                ProxyKind::Nginx => "/etc/nginx/sites-enabled",
                ProxyKind::Apache => "/etc/apache2/sites-available",
                ProxyKind::Traefik => "/etc/traefik/dynamic",
            })
        })
    }

    pub fn reload_command(&self) -> String {
        self.reload_command.clone().unwrap_or_else(|| {
            match self.kind {
                ProxyKind::Nginx => "nginx -s reload",
                ProxyKind::Apache => "systemctl reload apache2",
                ProxyKind::Traefik => "true",
            }
            .to_string()
        })
    }
}
