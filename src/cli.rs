// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines the agent subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "archon-agent")]
#[command(about = "Deploy containers and compose stacks behind nginx, apache, or traefik")]
#[command(version)]
pub struct Cli {
    /// Agent config file (defaults to $ARCHON_AGENT_CONFIG, then /etc/archon/agent.yml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy a site from a JSON request ("-" reads stdin)
    Deploy { request: PathBuf },

    /// Show a site's status
    Status { site: String },

    /// Stop a site's containers
    Stop { site: String },

    /// Restart a site's containers
    Restart { site: String },

    /// Remove a site's containers, proxy config, certificate, and files
    Delete {
        site: String,

        /// Domain whose proxy config should be removed
        #[arg(short, long)]
        domain: Option<String>,
    },

    /// Print a site's recent log lines
    Logs {
        site: String,

        #[arg(short = 'n', long, default_value_t = 100)]
        tail: u64,
    },

    /// Renew certbot certificates and reload the proxy
    RenewCerts,

    /// Print the ports declared in a compose file as JSON
    Ports { file: PathBuf },

    /// Validate the agent configuration
    CheckConfig,

    /// Show proxy and container runtime details
    Info,
}
