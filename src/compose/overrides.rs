// ABOUTME: Generates the compose override file that labels a site's services.
// ABOUTME: Site labels go on every service; routing labels go on services owning a mapped port.

use super::parser::{DetectedPort, ParsePortsError, parse_ports, service_names};
use crate::container::site_labels;
use crate::site::DeployRequest;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

/// Services that publish one of the request's mapped container ports.
fn routed_services(request: &DeployRequest, ports: &[DetectedPort]) -> Vec<String> {
    let mut routed: Vec<String> = Vec::new();
    for mapping in &request.domain_mappings {
        for port in ports.iter().filter(|p| p.container_port == mapping.port) {
            if !routed.contains(&port.service) {
                routed.push(port.service.clone());
            }
        }
    }
    routed
}

/// Render the override document for `request`.
pub fn render_override(
    request: &DeployRequest,
    routing_labels: &BTreeMap<String, String>,
) -> Result<String, ParsePortsError> {
    let names = service_names(&request.compose_content)?;
    let ports = parse_ports(&request.compose_content)?;
    let routed = routed_services(request, &ports);
    let base = site_labels(request);

    let mut services = Mapping::new();
    for name in names {
        let mut labels = Mapping::new();
        for (k, v) in &base {
            labels.insert(Value::from(k.as_str()), Value::from(v.as_str()));
        }
        if routed.contains(&name) {
            for (k, v) in routing_labels {
                labels.insert(Value::from(k.as_str()), Value::from(v.as_str()));
            }
        }

        let mut service = Mapping::new();
        service.insert(Value::from("labels"), Value::Mapping(labels));
        services.insert(Value::from(name), Value::Mapping(service));
    }

    let mut root = Mapping::new();
    root.insert(Value::from("services"), Value::Mapping(services));
    Ok(serde_yaml::to_string(&Value::Mapping(root))?)
}
