// ABOUTME: External command execution with captured output.
// ABOUTME: Every tool the agent shells out to (certbot, nginx, docker compose) goes through CommandRunner.

use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use tokio::process::Command;

/// Exit status and captured streams of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// None when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: &str) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: &str) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout and stderr joined, for error messages and loose matching.
    pub fn combined(&self) -> String {
        let out = self.stdout.trim();
        let err = self.stderr.trim();
        match (out.is_empty(), err.is_empty()) {
            (true, _) => err.to_string(),
            (false, true) => out.to_string(),
            (false, false) => format!("{out}\n{err}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to run {program}: {source}")]
pub struct CommandError {
    pub program: String,
    #[source]
    pub source: std::io::Error,
}

/// Runs a program to completion. A non-zero exit is not an error at this level.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, CommandError>;

    async fn run_shell(&self, script: &str) -> Result<CommandOutput, CommandError> {
        self.run("sh", &["-c".to_string(), script.to_string()])
            .await
    }

    /// Whether `program` resolves on PATH.
    async fn has_program(&self, program: &str) -> bool {
        self.run_shell(&format!("command -v {program}"))
            .await
            .map(|out| out.success())
            .unwrap_or(false)
    }
}

/// Spawns real processes with stdin closed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, CommandError> {
        tracing::debug!(program, args = %Argv(args), "running command");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| CommandError {
                program: program.to_string(),
                source,
            })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() {
            tracing::debug!(program, code = ?result.code, "command exited unsuccessfully");
        }
        Ok(result)
    }
}

/// Build an owned argument vector.
pub fn argv<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

struct Argv<'a>(&'a [String]);

impl fmt::Display for Argv<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}
