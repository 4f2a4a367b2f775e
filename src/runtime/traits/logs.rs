// ABOUTME: Log retrieval from containers.
// ABOUTME: Streams stdout and stderr chunks, optionally limited to the last N lines.

use crate::types::ContainerId;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

pub type LogStream = Pin<Box<dyn Stream<Item = Result<LogLine, LogError>> + Send>>;

#[async_trait]
pub trait LogOps: Send + Sync {
    async fn container_logs(&self, id: &ContainerId, opts: &LogOptions)
    -> Result<LogStream, LogError>;
}

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub stdout: bool,
    pub stderr: bool,
    pub timestamps: bool,
    /// Lines from the end; None means everything.
    pub tail: Option<u64>,
}

impl LogOptions {
    pub fn tail(n: u64) -> Self {
        Self {
            stdout: true,
            stderr: true,
            timestamps: false,
            tail: Some(n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSource {
    Stdout,
    Stderr,
}

/// One chunk as delivered by the engine. It may hold several lines.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub content: String,
    pub source: LogSource,
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("stream error: {0}")]
    StreamError(String),
}
