// ABOUTME: Test support utilities.
// ABOUTME: In-memory container runtime, scripted command runner, and a fixed DNS resolver.

#![allow(dead_code)]

use archon_agent::pipeline::DnsResolver;
use archon_agent::process::{CommandError, CommandOutput, CommandRunner};
use archon_agent::runtime::{
    ContainerConfig, ContainerError, ContainerFilters, ContainerOps, ContainerSummary, ImageError,
    ImageOps, LogError, LogLine, LogOps, LogOptions, LogSource, LogStream, NetworkConfig,
    NetworkError, NetworkOps, PublishedPort, RegistryAuth,
};
use archon_agent::types::{ContainerId, ImageRef, NetworkId};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("archon_agent=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub summary: ContainerSummary,
    pub config: Option<ContainerConfig>,
}

/// Container engine kept in memory. Records pulls and network creation.
#[derive(Default)]
pub struct FakeRuntime {
    containers: Mutex<Vec<FakeContainer>>,
    networks: Mutex<HashSet<String>>,
    pulls: Mutex<Vec<(String, Option<String>)>>,
    logs: Mutex<String>,
    next_id: AtomicUsize,
    fail_pull: Mutex<Option<String>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a container as if another site had started it.
    pub fn add_container(&self, name: &str, state: &str, labels: &[(&str, &str)], host_ports: &[u16]) {
        let id = format!("existing{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.containers.lock().push(FakeContainer {
            summary: ContainerSummary {
                id: ContainerId::new(id),
                name: name.to_string(),
                image: "nginx:latest".to_string(),
                state: state.to_string(),
                status: format!("{state} for a while"),
                labels: labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                ports: host_ports
                    .iter()
                    .map(|p| PublishedPort {
                        container_port: 80,
                        host_port: Some(*p),
                    })
                    .collect(),
            },
            config: None,
        });
    }

    pub fn containers(&self) -> Vec<FakeContainer> {
        self.containers.lock().clone()
    }

    pub fn networks(&self) -> Vec<String> {
        self.networks.lock().iter().cloned().collect()
    }

    /// Image and registry server of every pull, in order.
    pub fn pulls(&self) -> Vec<(String, Option<String>)> {
        self.pulls.lock().clone()
    }

    pub fn set_logs(&self, text: &str) {
        *self.logs.lock() = text.to_string();
    }

    pub fn fail_pulls_with(&self, message: &str) {
        *self.fail_pull.lock() = Some(message.to_string());
    }

    fn set_state(&self, id: &ContainerId, state: &str) -> Result<String, ContainerError> {
        let mut containers = self.containers.lock();
        let container = containers
            .iter_mut()
            .find(|c| &c.summary.id == id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        let previous = std::mem::replace(&mut container.summary.state, state.to_string());
        container.summary.status = state.to_string();
        Ok(previous)
    }
}

#[async_trait]
impl ContainerOps for FakeRuntime {
    async fn create_container(
        &self,
        config: &ContainerConfig,
    ) -> Result<ContainerId, ContainerError> {
        let mut containers = self.containers.lock();
        if containers.iter().any(|c| c.summary.name == config.name) {
            return Err(ContainerError::AlreadyExists(config.name.clone()));
        }
        let id = ContainerId::new(format!(
            "c{:0>15}",
            self.next_id.fetch_add(1, Ordering::SeqCst)
        ));
        containers.push(FakeContainer {
            summary: ContainerSummary {
                id: id.clone(),
                name: config.name.clone(),
                image: config.image.to_string(),
                state: "created".to_string(),
                status: "created".to_string(),
                labels: config.labels.clone(),
                ports: config
                    .ports
                    .iter()
                    .map(|p| PublishedPort {
                        container_port: p.container_port,
                        host_port: Some(p.host_port),
                    })
                    .collect(),
            },
            config: Some(config.clone()),
        });
        Ok(id)
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        match self.set_state(id, "running")?.as_str() {
            "running" => Err(ContainerError::AlreadyRunning(id.to_string())),
            _ => Ok(()),
        }
    }

    async fn stop_container(&self, id: &ContainerId, _timeout: Duration) -> Result<(), ContainerError> {
        match self.set_state(id, "exited")?.as_str() {
            "running" => Ok(()),
            _ => Err(ContainerError::NotRunning(id.to_string())),
        }
    }

    async fn remove_container(&self, id: &ContainerId, _force: bool) -> Result<(), ContainerError> {
        let mut containers = self.containers.lock();
        let before = containers.len();
        containers.retain(|c| &c.summary.id != id);
        if containers.len() == before {
            return Err(ContainerError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        Ok(self
            .containers
            .lock()
            .iter()
            .map(|c| &c.summary)
            .filter(|c| filters.all || c.is_running())
            .filter(|c| {
                filters
                    .labels
                    .iter()
                    .all(|(k, v)| c.labels.get(k) == Some(v))
            })
            .filter(|c| {
                filters
                    .name
                    .as_ref()
                    .is_none_or(|n| c.name.contains(n.as_str()))
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ImageOps for FakeRuntime {
    async fn pull_image(
        &self,
        reference: &ImageRef,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), ImageError> {
        if let Some(message) = self.fail_pull.lock().clone() {
            return Err(ImageError::PullFailed(message));
        }
        self.pulls.lock().push((
            reference.to_string(),
            auth.and_then(|a| a.server.clone()),
        ));
        Ok(())
    }
}

#[async_trait]
impl NetworkOps for FakeRuntime {
    async fn create_network(&self, config: &NetworkConfig) -> Result<NetworkId, NetworkError> {
        if !self.networks.lock().insert(config.name.clone()) {
            return Err(NetworkError::AlreadyExists(config.name.clone()));
        }
        Ok(NetworkId::new(format!("net-{}", config.name)))
    }

    async fn network_exists(&self, name: &str) -> Result<bool, NetworkError> {
        Ok(self.networks.lock().contains(name))
    }
}

#[async_trait]
impl LogOps for FakeRuntime {
    async fn container_logs(
        &self,
        id: &ContainerId,
        _opts: &LogOptions,
    ) -> Result<LogStream, LogError> {
        if !self.containers.lock().iter().any(|c| &c.summary.id == id) {
            return Err(LogError::ContainerNotFound(id.to_string()));
        }
        let chunk = LogLine {
            content: self.logs.lock().clone(),
            source: LogSource::Stdout,
        };
        Ok(Box::pin(futures::stream::iter(vec![Ok(chunk)])))
    }
}

/// Answers commands from a prefix script and records every invocation.
///
/// Invocations are recorded as `program arg1 arg2 ...`. The first rule whose
/// prefix matches wins; unmatched commands succeed with empty output.
#[derive(Default)]
pub struct RecordingRunner {
    rules: Mutex<Vec<(String, CommandOutput)>>,
    effects: Mutex<Vec<(String, Box<dyn Fn() + Send + Sync>)>>,
    calls: Mutex<Vec<String>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, prefix: &str, output: CommandOutput) {
        self.rules.lock().push((prefix.to_string(), output));
    }

    /// Run `effect` whenever a command starting with `prefix` is invoked,
    /// standing in for what the real tool would leave on disk.
    pub fn on_call(&self, prefix: &str, effect: impl Fn() + Send + Sync + 'static) {
        self.effects.lock().push((prefix.to_string(), Box::new(effect)));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn called(&self, prefix: &str) -> bool {
        self.calls.lock().iter().any(|c| c.starts_with(prefix))
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, CommandError> {
        let mut line = program.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.calls.lock().push(line.clone());
        for (prefix, effect) in self.effects.lock().iter() {
            if line.starts_with(prefix.as_str()) {
                effect();
            }
        }

        let output = self
            .rules
            .lock()
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_else(|| CommandOutput::ok(""));
        Ok(output)
    }
}

/// Resolves exactly the configured names.
pub struct StaticResolver {
    known: HashSet<String>,
}

impl StaticResolver {
    pub fn resolving(domains: &[&str]) -> Self {
        Self {
            known: domains.iter().map(|d| d.to_string()).collect(),
        }
    }
}

#[async_trait]
impl DnsResolver for StaticResolver {
    async fn resolves(&self, domain: &str) -> bool {
        self.known.contains(domain)
    }
}
