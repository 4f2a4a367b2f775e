// ABOUTME: Entry point for the archon-agent CLI.
// ABOUTME: Parses arguments, sets up tracing, and dispatches to the Agent.

mod cli;

use archon_agent::Agent;
use archon_agent::compose::parse_ports;
use archon_agent::config::AgentConfig;
use archon_agent::error::{Error, Result};
use archon_agent::pipeline::{ProgressCallback, ProgressEvent};
use archon_agent::site::DeployRequest;
use archon_agent::types::SiteId;
use clap::Parser;
use cli::{Cli, Commands};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AgentConfig::discover(cli.config.as_deref())?;

    match cli.command {
        Commands::Ports { file } => {
            let document = read_input(&file)?;
            let ports = parse_ports(&document)?;
            println!("{}", serde_json::to_string_pretty(&ports)?);
            Ok(())
        }
        Commands::CheckConfig => {
            config.check()?;
            config.default_email()?;
            println!(
                "config ok: proxy={} ssl={} data_dir={}",
                config.proxy.kind,
                config.ssl.mode,
                config.data_dir.display()
            );
            Ok(())
        }
        Commands::Deploy { request } => {
            let request: DeployRequest = serde_json::from_str(&read_input(&request)?)?;
            let agent = Agent::connect(config).await?;
            deploy(&agent, request).await
        }
        Commands::Status { site } => {
            let agent = Agent::connect(config).await?;
            let status = agent.status(&parse_site(&site)?).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Commands::Stop { site } => {
            let agent = Agent::connect(config).await?;
            agent.stop(&parse_site(&site)?).await?;
            println!("stopped {site}");
            Ok(())
        }
        Commands::Restart { site } => {
            let agent = Agent::connect(config).await?;
            agent.restart(&parse_site(&site)?).await?;
            println!("restarted {site}");
            Ok(())
        }
        Commands::Delete { site, domain } => {
            let agent = Agent::connect(config).await?;
            agent.delete(&parse_site(&site)?, domain.as_deref()).await?;
            println!("deleted {site}");
            Ok(())
        }
        Commands::Logs { site, tail } => {
            let agent = Agent::connect(config).await?;
            for line in agent.logs(&parse_site(&site)?, tail).await? {
                println!("{line}");
            }
            Ok(())
        }
        Commands::RenewCerts => {
            let agent = Agent::connect(config).await?;
            agent.renew_certificates().await?;
            println!("certificates renewed");
            Ok(())
        }
        Commands::Info => {
            let agent = Agent::connect(config).await?;
            let proxy = agent.proxy_info().await?;
            let runtime = agent.runtime_info().await?;
            let info = serde_json::json!({ "proxy": proxy, "runtime": runtime });
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
    }
}

/// Run one deployment, cancelling it on Ctrl-C.
async fn deploy(agent: &Agent, request: DeployRequest) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupt received, cancelling deployment");
            on_signal.cancel();
        }
    });

    let progress: ProgressCallback = Arc::new(|event: &ProgressEvent| {
        eprintln!("  → [{}] {} {}", event.stage, event.status, event.message);
    });

    let response = agent.deploy(request, &cancel, Some(progress)).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn parse_site(raw: &str) -> Result<SiteId> {
    raw.parse()
        .map_err(|e| Error::InvalidConfig(format!("invalid site id {raw:?}: {e}")))
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    Ok(std::fs::read_to_string(path)?)
}
