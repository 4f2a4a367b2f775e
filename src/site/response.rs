// ABOUTME: Responses returned to the fleet-management client.
// ABOUTME: Site status values and the deploy and status payloads.

use crate::types::SiteId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    Inactive,
    Deploying,
    Running,
    Failed,
    Stopped,
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SiteStatus::Inactive => "inactive",
            SiteStatus::Deploying => "deploying",
            SiteStatus::Running => "running",
            SiteStatus::Failed => "failed",
            SiteStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployResponse {
    pub site_id: SiteId,
    pub status: SiteStatus,
    /// Empty for compose sites.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteStatusResponse {
    pub site_id: SiteId,
    pub status: SiteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    pub is_running: bool,
    pub message: String,
}

impl SiteStatusResponse {
    pub fn inactive(site_id: SiteId, message: impl Into<String>) -> Self {
        Self {
            site_id,
            status: SiteStatus::Inactive,
            container_id: None,
            is_running: false,
            message: message.into(),
        }
    }
}
