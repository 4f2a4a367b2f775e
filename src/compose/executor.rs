// ABOUTME: Runs multi-service sites through the `docker compose` CLI.
// ABOUTME: Writes the document to a per-site work dir, replaces the project, and cleans up.

use super::overrides::render_override;
use super::parser::ParsePortsError;
use crate::process::{CommandError, CommandRunner, argv};
use crate::site::DeployRequest;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const COMPOSE_FILE: &str = "docker-compose.yml";
pub const OVERRIDE_FILE: &str = "archon.override.yml";

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Document(#[from] ParsePortsError),

    #[error(transparent)]
    Spawn(#[from] CommandError),

    #[error("docker compose {action} failed for {project}: {output}")]
    CommandFailed {
        action: &'static str,
        project: String,
        output: String,
    },

    #[error("unreadable docker compose ps output: {0}")]
    Status(String),
}

/// One service container as reported by `docker compose ps`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ComposeService {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Service", default)]
    pub service: String,
    #[serde(rename = "State", default)]
    pub state: String,
}

impl ComposeService {
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}

pub struct ComposeExecutor {
    runner: Arc<dyn CommandRunner>,
    work_dir: PathBuf,
}

impl ComposeExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>, work_dir: PathBuf) -> Self {
        Self { runner, work_dir }
    }

    pub fn site_dir(&self, request: &DeployRequest) -> PathBuf {
        self.work_dir.join(request.id.to_string())
    }

    async fn compose(
        &self,
        action: &'static str,
        project: &str,
        args: Vec<String>,
    ) -> Result<String, ComposeError> {
        let mut full = argv(["compose"]);
        full.extend(args);
        let output = self.runner.run("docker", &full).await?;
        if !output.success() {
            return Err(ComposeError::CommandFailed {
                action,
                project: project.to_string(),
                output: output.combined(),
            });
        }
        Ok(output.stdout)
    }

    /// Replace the site's project with the request's document. Returns the project name.
    pub async fn deploy(
        &self,
        request: &DeployRequest,
        routing_labels: &BTreeMap<String, String>,
    ) -> Result<String, ComposeError> {
        let project = request.resource_name();
        let dir = self.site_dir(request);
        let compose_path = dir.join(COMPOSE_FILE);
        let override_path = dir.join(OVERRIDE_FILE);

        let overrides = render_override(request, routing_labels)?;
        write_file(&dir, &compose_path, &request.compose_content)?;
        write_file(&dir, &override_path, &overrides)?;

        if let Err(e) = self.down(&project, false).await {
            tracing::debug!(%project, error = %e, "no previous project to tear down");
        }

        let files = [path_arg(&compose_path), path_arg(&override_path)];
        let up = vec![
            "-f".to_string(),
            files[0].clone(),
            "-f".to_string(),
            files[1].clone(),
            "-p".to_string(),
            project.clone(),
            "up".to_string(),
            "-d".to_string(),
            "--remove-orphans".to_string(),
        ];
        if let Err(e) = self.compose("up", &project, up).await {
            // Services started before the failure must not outlive the attempt.
            if let Err(down) = self.down(&project, true).await {
                tracing::warn!(%project, error = %down, "teardown after failed up failed");
            }
            return Err(e);
        }
        tracing::info!(%project, "compose project started");

        if let Err(e) = std::fs::remove_dir_all(&dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to clean compose work dir");
        }
        Ok(project)
    }

    async fn down(&self, project: &str, purge: bool) -> Result<(), ComposeError> {
        let mut args = vec!["-p".to_string(), project.to_string(), "down".to_string()];
        if purge {
            args.extend(argv(["--volumes", "--remove-orphans"]));
        }
        self.compose("down", project, args).await.map(drop)
    }

    /// Tear the project down including its volumes.
    pub async fn remove(&self, project: &str) -> Result<(), ComposeError> {
        self.down(project, true).await
    }

    pub async fn stop(&self, project: &str) -> Result<(), ComposeError> {
        self.compose("stop", project, argv(["-p", project, "stop"]))
            .await
            .map(drop)
    }

    pub async fn restart(&self, project: &str) -> Result<(), ComposeError> {
        self.compose("restart", project, argv(["-p", project, "restart"]))
            .await
            .map(drop)
    }

    pub async fn status(&self, project: &str) -> Result<Vec<ComposeService>, ComposeError> {
        let out = self
            .compose(
                "ps",
                project,
                argv(["-p", project, "ps", "--all", "--format", "json"]),
            )
            .await?;
        parse_ps_output(&out)
    }

    pub async fn logs(&self, project: &str, tail: u64) -> Result<Vec<String>, ComposeError> {
        let tail = tail.to_string();
        let out = self
            .compose(
                "logs",
                project,
                argv(["-p", project, "logs", "--no-color", "--tail", tail.as_str()]),
            )
            .await?;
        Ok(out.lines().map(str::to_string).collect())
    }
}

fn write_file(dir: &Path, path: &Path, content: &str) -> Result<(), ComposeError> {
    std::fs::create_dir_all(dir)
        .and_then(|()| std::fs::write(path, content))
        .map_err(|source| ComposeError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Newer compose prints one JSON object per line, older releases a single array.
pub fn parse_ps_output(out: &str) -> Result<Vec<ComposeService>, ComposeError> {
    let trimmed = out.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|e| ComposeError::Status(e.to_string()));
    }
    trimmed
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(|e| ComposeError::Status(e.to_string())))
        .collect()
}
