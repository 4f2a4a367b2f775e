// ABOUTME: Per-attempt deployment state threaded through the stages.
// ABOUTME: Holds the request, intermediate results, and the progress callback.

use crate::certs::CertificatePaths;
use crate::site::{DeployRequest, DeployResponse};
use crate::types::{ContainerId, SiteId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Started,
    Completed,
    Failed,
    Rollback,
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProgressStatus::Started => "started",
            ProgressStatus::Completed => "completed",
            ProgressStatus::Failed => "failed",
            ProgressStatus::Rollback => "rollback",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub stage: String,
    pub status: ProgressStatus,
    pub message: String,
}

pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Single-use: created for one deploy attempt and dropped afterwards.
pub struct DeploymentState {
    pub request: DeployRequest,
    pub work_dir: PathBuf,
    pub current_stage: Option<&'static str>,
    /// Completed stage names in execution order.
    pub completed_stages: Vec<&'static str>,
    pub certificate: Option<CertificatePaths>,
    pub container_id: Option<ContainerId>,
    pub compose_project: Option<String>,
    pub response: Option<DeployResponse>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    progress: Option<ProgressCallback>,
}

impl DeploymentState {
    pub fn new(request: DeployRequest, work_dir: PathBuf) -> Self {
        Self {
            request,
            work_dir,
            current_stage: None,
            completed_stages: Vec::new(),
            certificate: None,
            container_id: None,
            compose_project: None,
            response: None,
            error: None,
            started_at: Utc::now(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn site_id(&self) -> SiteId {
        self.request.id
    }

    pub fn emit(&self, stage: &str, status: ProgressStatus, message: impl Into<String>) {
        if let Some(callback) = &self.progress {
            callback(&ProgressEvent {
                stage: stage.to_string(),
                status,
                message: message.into(),
            });
        }
    }
}

impl fmt::Debug for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentState")
            .field("site", &self.request.id)
            .field("current_stage", &self.current_stage)
            .field("completed_stages", &self.completed_stages)
            .field("container_id", &self.container_id)
            .field("compose_project", &self.compose_project)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}
