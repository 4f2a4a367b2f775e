// ABOUTME: Site-level request and response payloads.
// ABOUTME: The wire contract between the fleet-management client and the agent.

mod request;
mod response;

pub use request::{
    ConfigFile, DeployRequest, DockerSpec, DomainMapping, RegistryCredentials, SiteType,
};
pub use response::{DeployResponse, SiteStatus, SiteStatusResponse};
