// ABOUTME: Extracts exposed ports from a compose document.
// ABOUTME: Handles short, numeric, and long port syntax; skips entries it cannot read.

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortProtocol {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for PortProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PortProtocol::Tcp => "tcp",
            PortProtocol::Udp => "udp",
        })
    }
}

/// One port declaration from a compose service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedPort {
    pub service: String,
    pub container_port: u16,
    /// 0 when the port is not published on the host.
    pub host_port: u16,
    pub protocol: PortProtocol,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid compose document: {0}")]
pub struct ParsePortsError(#[from] serde_yaml::Error);

#[derive(Deserialize)]
struct ComposeDocument {
    services: Mapping,
}

fn services(document: &str) -> Result<Mapping, ParsePortsError> {
    let doc: ComposeDocument = serde_yaml::from_str(document)?;
    Ok(doc.services)
}

/// Every readable port of every service, services in document order.
pub fn parse_ports(document: &str) -> Result<Vec<DetectedPort>, ParsePortsError> {
    let services = services(document)?;
    let mut ports = Vec::new();

    for (name, service) in &services {
        let Some(name) = name.as_str() else { continue };
        let Some(entries) = service.get("ports").and_then(Value::as_sequence) else {
            continue;
        };

        for entry in entries {
            let parsed = match entry {
                Value::Number(n) => n
                    .as_u64()
                    .and_then(port_in_range)
                    .map(|container_port| DetectedPort {
                        service: name.to_string(),
                        container_port,
                        host_port: 0,
                        protocol: PortProtocol::Tcp,
                    }),
                Value::String(s) => parse_short(name, s),
                Value::Mapping(m) => parse_long(name, m),
                _ => None,
            };
            match parsed {
                Some(port) => ports.push(port),
                None => tracing::debug!(service = name, ?entry, "skipping unreadable port entry"),
            }
        }
    }

    Ok(ports)
}

/// Service names in document order.
pub fn service_names(document: &str) -> Result<Vec<String>, ParsePortsError> {
    Ok(services(document)?
        .keys()
        .filter_map(|k| k.as_str().map(str::to_string))
        .collect())
}

/// Container port of the first entry, or 0 when there is none.
pub fn first_port(ports: &[DetectedPort]) -> u16 {
    ports.first().map(|p| p.container_port).unwrap_or(0)
}

fn port_in_range(n: u64) -> Option<u16> {
    u16::try_from(n).ok().filter(|p| *p > 0)
}

/// A single port or the first port of a `start-end` range.
fn parse_port_text(raw: &str) -> Option<u16> {
    let first = raw.split('-').next()?.trim();
    first.parse::<u64>().ok().and_then(port_in_range)
}

/// `C`, `H:C`, or `IP:H:C`, each optionally suffixed with `/tcp` or `/udp`.
fn parse_short(service: &str, raw: &str) -> Option<DetectedPort> {
    let raw = raw.trim();
    let (spec, protocol) = match raw.rsplit_once('/') {
        Some((spec, "udp")) => (spec, PortProtocol::Udp),
        Some((spec, "tcp")) => (spec, PortProtocol::Tcp),
        Some(_) => return None,
        None => (raw, PortProtocol::Tcp),
    };

    let parts: Vec<&str> = spec.split(':').collect();
    let (host, container) = match parts.as_slice() {
        [container] => (None, *container),
        [host, container] => (Some(*host), *container),
        [_ip, host, container] => (Some(*host), *container),
        _ => return None,
    };

    Some(DetectedPort {
        service: service.to_string(),
        container_port: parse_port_text(container)?,
        host_port: host.and_then(parse_port_text).unwrap_or(0),
        protocol,
    })
}

fn parse_long(service: &str, entry: &Mapping) -> Option<DetectedPort> {
    let port_value = |key: &str| match entry.get(key)? {
        Value::Number(n) => n.as_u64().and_then(port_in_range),
        Value::String(s) => parse_port_text(s),
        _ => None,
    };

    let protocol = match entry.get("protocol").and_then(Value::as_str) {
        Some(p) if p.eq_ignore_ascii_case("udp") => PortProtocol::Udp,
        _ => PortProtocol::Tcp,
    };

    Some(DetectedPort {
        service: service.to_string(),
        container_port: port_value("target")?,
        host_port: port_value("published").unwrap_or(0),
        protocol,
    })
}
