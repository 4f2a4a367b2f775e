// ABOUTME: The five deploy stages and the standard pipeline built from them.
// ABOUTME: Validation, port-check, ssl-setup, deployment, proxy-config.

mod deployment;
mod port_check;
mod proxy;
mod ssl;
mod validation;

pub use deployment::DeploymentStage;
pub use port_check::{PortCheckStage, requested_host_ports};
pub use proxy::ProxyStage;
pub use ssl::SslStage;
pub use validation::{ValidationStage, is_hostname, validate};

use super::Pipeline;
use super::dns::DnsResolver;
use crate::certs::CertificateManager;
use crate::compose::ComposeExecutor;
use crate::config::Timeouts;
use crate::container::ContainerClient;
use crate::proxy::ProxyManager;
use std::sync::Arc;

/// Collaborators the stages share.
#[derive(Clone)]
pub struct StageContext {
    pub containers: Arc<ContainerClient>,
    pub compose: Arc<ComposeExecutor>,
    pub certs: Arc<CertificateManager>,
    pub proxy: Arc<dyn ProxyManager>,
    pub resolver: Arc<dyn DnsResolver>,
    pub timeouts: Timeouts,
}

/// Cheap checks first, side effects last.
pub fn standard_pipeline(ctx: &StageContext) -> Pipeline {
    Pipeline::new(vec![
        Box::new(ValidationStage),
        Box::new(PortCheckStage::new(ctx.containers.clone())),
        Box::new(SslStage::new(
            ctx.certs.clone(),
            ctx.proxy.clone(),
            ctx.resolver.clone(),
            ctx.timeouts.dns_timeout,
            ctx.timeouts.dns_poll_interval,
        )),
        Box::new(DeploymentStage::new(
            ctx.containers.clone(),
            ctx.compose.clone(),
            ctx.proxy.clone(),
        )),
        Box::new(ProxyStage::new(ctx.proxy.clone())),
    ])
}
