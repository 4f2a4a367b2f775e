// ABOUTME: Fails a deploy whose host ports are held by another managed site.
// ABOUTME: The site's own containers are excluded so redeploys pass.

use crate::compose::parse_ports;
use crate::container::ContainerClient;
use crate::pipeline::{DeploymentState, Stage, StageError};
use crate::site::{DeployRequest, SiteType};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct PortCheckStage {
    containers: Arc<ContainerClient>,
}

impl PortCheckStage {
    pub fn new(containers: Arc<ContainerClient>) -> Self {
        Self { containers }
    }
}

/// Host ports the deploy will bind.
pub fn requested_host_ports(request: &DeployRequest) -> Result<BTreeSet<u16>, StageError> {
    let mut ports: BTreeSet<u16> = request
        .domain_mappings
        .iter()
        .map(|m| m.published_port())
        .collect();

    if request.site_type == SiteType::Compose {
        let declared = parse_ports(&request.compose_content)
            .map_err(|e| StageError::Validation(e.to_string()))?;
        ports.extend(declared.iter().map(|p| p.host_port).filter(|p| *p != 0));
    }
    Ok(ports)
}

#[async_trait]
impl Stage for PortCheckStage {
    fn name(&self) -> &'static str {
        "port-check"
    }

    async fn execute(&self, state: &mut DeploymentState) -> Result<(), StageError> {
        let ports = requested_host_ports(&state.request)?;
        tracing::debug!(site = %state.request.id, ?ports, "checking host ports");

        let conflicts = self
            .containers
            .check_port_conflicts(&ports, &state.request.id)
            .await?;
        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(StageError::PortConflict(conflicts))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::DomainMapping;
    use crate::types::SiteId;

    #[test]
    fn host_override_wins_over_container_port() {
        let mut mapping = DomainMapping::new("a.example.com", 3000);
        mapping.host_port = Some(8081);
        let req = DeployRequest::container(SiteId::new(), "a", "nginx")
            .with_domain(mapping)
            .with_domain(DomainMapping::new("b.example.com", 4000));
        assert_eq!(
            requested_host_ports(&req).unwrap(),
            BTreeSet::from([4000, 8081])
        );
    }

    #[test]
    fn compose_adds_published_ports() {
        let doc = "services:\n  web:\n    ports: [\"8080:80\", \"9000\"]\n  db:\n    ports: [\"15432:5432\"]\n";
        let req = DeployRequest::compose(SiteId::new(), "shop", doc)
            .with_domain(DomainMapping::new("shop.example.com", 8080));
        assert_eq!(
            requested_host_ports(&req).unwrap(),
            BTreeSet::from([8080, 15432])
        );
    }
}
