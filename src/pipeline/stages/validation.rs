// ABOUTME: Rejects malformed requests before anything touches the host.
// ABOUTME: Pure checks; nothing to roll back.

use crate::compose::parse_ports;
use crate::pipeline::{DeploymentState, Stage, StageError};
use crate::site::{DeployRequest, SiteType};
use crate::types::{ImageRef, SiteName};
use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct ValidationStage;

const MAX_HOSTNAME: usize = 253;
const MAX_LABEL: usize = 63;

/// Dot-separated labels of ASCII letters, digits and inner hyphens.
/// Domains become file names and proxy directives, so nothing else passes.
pub fn is_hostname(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > MAX_HOSTNAME {
        return false;
    }
    domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    })
}

/// Every reason `request` cannot be deployed, first failure only.
pub fn validate(request: &DeployRequest) -> Result<(), StageError> {
    let invalid = |msg: String| StageError::Validation(msg);

    SiteName::new(&request.name).map_err(|e| invalid(e.to_string()))?;

    if request.domain_mappings.is_empty() {
        return Err(invalid("at least one domain mapping is required".into()));
    }
    for mapping in &request.domain_mappings {
        if mapping.domain.trim().is_empty() {
            return Err(invalid("domain mapping has an empty domain".into()));
        }
        if !is_hostname(&mapping.domain) {
            return Err(invalid(format!(
                "domain {:?} is not a valid hostname",
                mapping.domain
            )));
        }
        if mapping.port == 0 {
            return Err(invalid(format!(
                "domain mapping for {} has no container port",
                mapping.domain
            )));
        }
    }

    match request.site_type {
        SiteType::Compose => {
            if request.compose_content.trim().is_empty() {
                return Err(invalid(
                    "compose content is required for compose deployments".into(),
                ));
            }
            parse_ports(&request.compose_content).map_err(|e| invalid(e.to_string()))?;
        }
        SiteType::Container => {
            ImageRef::parse(&request.docker.image).map_err(|e| invalid(e.to_string()))?;
        }
    }
    Ok(())
}

#[async_trait]
impl Stage for ValidationStage {
    fn name(&self) -> &'static str {
        "validation"
    }

    async fn execute(&self, state: &mut DeploymentState) -> Result<(), StageError> {
        validate(&state.request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::DomainMapping;
    use crate::types::SiteId;

    fn container() -> DeployRequest {
        DeployRequest::container(SiteId::new(), "blog", "nginx:1.27")
            .with_domain(DomainMapping::new("blog.example.com", 80))
    }

    fn message(request: &DeployRequest) -> String {
        validate(request).unwrap_err().to_string()
    }

    #[test]
    fn accepts_a_complete_container_request() {
        validate(&container()).unwrap();
    }

    #[test]
    fn name_is_required() {
        let mut req = container();
        req.name.clear();
        assert_eq!(message(&req), "site name is required");
    }

    #[test]
    fn name_must_be_a_resource_name() {
        let mut req = container();
        req.name = "My Blog".into();
        assert!(message(&req).contains("site name"));
    }

    #[test]
    fn a_domain_is_required() {
        let mut req = container();
        req.domain_mappings.clear();
        assert_eq!(message(&req), "at least one domain mapping is required");
    }

    #[test]
    fn domains_must_be_hostnames() {
        for bad in [
            "../pwned",
            "a.example.com;",
            "x\nserver {",
            "a..example.com",
            "-a.example.com",
            "a-.example.com",
            " blog.example.com",
        ] {
            let req = DeployRequest::container(SiteId::new(), "blog", "nginx")
                .with_domain(DomainMapping::new(bad, 80));
            assert!(
                message(&req).contains("is not a valid hostname"),
                "{bad:?} was accepted"
            );
        }
    }

    #[test]
    fn hostname_limits() {
        assert!(is_hostname("localhost"));
        assert!(is_hostname("xn--bcher-kva.example"));
        assert!(is_hostname(&format!("{}.io", "a".repeat(63))));
        assert!(!is_hostname(&format!("{}.io", "a".repeat(64))));
        let long = vec!["abcdefghi"; 26].join(".");
        assert_eq!(long.len(), 259);
        assert!(!is_hostname(&long));
    }

    #[test]
    fn port_zero_is_rejected() {
        let req = DeployRequest::container(SiteId::new(), "blog", "nginx")
            .with_domain(DomainMapping::new("blog.example.com", 0));
        assert!(message(&req).contains("no container port"));
    }

    #[test]
    fn container_needs_an_image() {
        let mut req = container();
        req.docker.image = String::new();
        assert_eq!(
            message(&req),
            "docker image is required for container deployments"
        );
    }

    #[test]
    fn compose_needs_a_document() {
        let req = DeployRequest::compose(SiteId::new(), "shop", "  ")
            .with_domain(DomainMapping::new("shop.example.com", 80));
        assert_eq!(
            message(&req),
            "compose content is required for compose deployments"
        );
    }

    #[test]
    fn compose_document_must_parse() {
        let req = DeployRequest::compose(SiteId::new(), "shop", "version: '3'\n")
            .with_domain(DomainMapping::new("shop.example.com", 80));
        assert!(message(&req).starts_with("invalid compose document"));
    }
}
