// ABOUTME: Compose document parsing and the compose CLI executor.
// ABOUTME: Multi-service sites are run as `archon-<name>` projects.

mod executor;
mod overrides;
mod parser;

pub use executor::{
    COMPOSE_FILE, ComposeError, ComposeExecutor, ComposeService, OVERRIDE_FILE, parse_ps_output,
};
pub use overrides::render_override;
pub use parser::{
    DetectedPort, ParsePortsError, PortProtocol, first_port, parse_ports, service_names,
};
