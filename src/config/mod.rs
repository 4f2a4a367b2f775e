// ABOUTME: Agent configuration loaded from YAML.
// ABOUTME: Data directory, proxy backend, engine connection, TLS mode, and timeouts.

mod deserialize;
mod env_value;
mod proxy;
mod ssl;

pub use env_value::EnvValue;
pub use proxy::{ProxyKind, ProxySettings};
pub use ssl::{SslMode, SslSettings};

use crate::error::{Error, Result};
use deserialize::{deserialize_network_name, deserialize_socket};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming a config file when `--config` is absent.
pub const CONFIG_ENV: &str = "ARCHON_AGENT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/archon/agent.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub proxy: ProxySettings,

    #[serde(default)]
    pub docker: DockerSettings,

    #[serde(default)]
    pub ssl: SslSettings,

    #[serde(default)]
    pub timeouts: Timeouts,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DockerSettings {
    /// Engine socket; detected when unset.
    #[serde(default, alias = "host", deserialize_with = "deserialize_socket")]
    pub socket: Option<String>,

    /// Bridge network every site container joins.
    #[serde(
        default = "default_network",
        deserialize_with = "deserialize_network_name"
    )]
    pub network: String,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            socket: None,
            network: default_network(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_dns_timeout", with = "humantime_serde")]
    pub dns_timeout: Duration,

    #[serde(default = "default_dns_poll", with = "humantime_serde")]
    pub dns_poll_interval: Duration,

    #[serde(default = "default_stop_timeout", with = "humantime_serde")]
    pub stop_timeout: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            dns_timeout: default_dns_timeout(),
            dns_poll_interval: default_dns_poll(),
            stop_timeout: default_stop_timeout(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/archon")
}

fn default_network() -> String {
    "archon-net".to_string()
}

fn default_dns_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_dns_poll() -> Duration {
    Duration::from_secs(2)
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            proxy: ProxySettings::default(),
            docker: DockerSettings::default(),
            ssl: SslSettings::default(),
            timeouts: Timeouts::default(),
        }
    }
}

impl AgentConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        config.check()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::ConfigNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
        Self::from_yaml(&content)
    }

    /// Explicit path, then `ARCHON_AGENT_CONFIG`, then the system path, then defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV)
            && !path.is_empty()
        {
            return Self::load(Path::new(&path));
        }
        let system = Path::new(DEFAULT_CONFIG_PATH);
        if system.exists() {
            return Self::load(system);
        }
        tracing::debug!("no agent config found, using defaults");
        Ok(Self::default())
    }

    /// Reject proxy and TLS combinations that cannot work together.
    pub fn check(&self) -> Result<()> {
        match (self.proxy.kind, self.ssl.mode) {
            (ProxyKind::Traefik, SslMode::Letsencrypt) => Err(Error::InvalidConfig(
                "traefik obtains certificates itself; use ssl.mode traefik-auto".to_string(),
            )),
            (ProxyKind::Nginx | ProxyKind::Apache, SslMode::TraefikAuto) => {
                Err(Error::InvalidConfig(format!(
                    "ssl.mode traefik-auto requires the traefik proxy, not {}",
                    self.proxy.kind
                )))
            }
            _ => Ok(()),
        }?;

        if self.timeouts.dns_poll_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "timeouts.dns_poll_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Agent-wide ACME contact, if configured.
    pub fn default_email(&self) -> Result<Option<String>> {
        self.ssl.email.as_ref().map(EnvValue::resolve).transpose()
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.data_dir.join("locks")
    }

    pub fn sites_dir(&self) -> PathBuf {
        self.data_dir.join("sites")
    }

    pub fn compose_dir(&self) -> PathBuf {
        self.data_dir.join("compose")
    }
}
