//! Agent backed by an external command.
//!
//! The instruction is written to the command's stdin. Stdout is parsed as a
//! JSON object `{"output": ..., "cost": ..., "tokens": ...}`; any other
//! non-empty stdout is taken as the answer text with zero cost.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{Agent, AgentError, AgentResponse};

/// Agent that runs any command-line program once per instruction.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    name: String,
    command: String,
    args: Vec<String>,
    env_vars: Vec<(String, String)>,
    timeout: Duration,
}

impl CommandAgent {
    /// Creates an agent for the given command.
    pub fn new(command: impl Into<String>) -> Self {
        let command = command.into();
        Self {
            name: command.clone(),
            command,
            args: Vec::new(),
            env_vars: Vec::new(),
            timeout: Duration::from_secs(600),
        }
    }

    /// Parses a shell-style command line (whitespace separated).
    pub fn from_command_line(line: &str) -> Result<Self, AgentError> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let command = parts
            .next()
            .ok_or_else(|| AgentError::ExecutionFailed("empty agent command".to_string()))?;
        Ok(Self::new(command).with_args(parts.collect()))
    }

    /// Sets the arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Adds an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Sets the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Interprets captured stdout.
fn parse_stdout(stdout: &str) -> Result<AgentResponse, AgentError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(AgentError::EmptyOutput);
    }
    if trimmed.starts_with('{') {
        if let Ok(response) = serde_json::from_str::<AgentResponse>(trimmed) {
            return Ok(response);
        }
    }
    Ok(AgentResponse::new(trimmed, 0.0, 0))
}

#[async_trait]
impl Agent for CommandAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&mut self, instruction: &str) -> Result<AgentResponse, AgentError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .envs(self.env_vars.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            AgentError::ExecutionFailed(format!("Failed to spawn {}: {}", self.command, e))
        })?;

        // A command that exits without reading stdin is judged by its exit status.
        let stdin = child.stdin.take();
        let name = self.name.as_str();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(instruction.as_bytes()).await {
                    debug!(agent = %name, error = %e, "Failed to write instruction");
                }
                stdin.shutdown().await.ok();
            }
        };

        // Feeding stdin counts against the deadline too: a command that never
        // reads a large instruction would otherwise block the write forever.
        let (_, output) = tokio::time::timeout(self.timeout, async {
            tokio::join!(feed, child.wait_with_output())
        })
        .await
        .map_err(|_| AgentError::Timeout(self.timeout))?;
        let output = output?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last = stderr.lines().last().unwrap_or("").trim().to_string();
            return Err(AgentError::ExecutionFailed(format!(
                "{} exited with {}: {}",
                self.command, output.status, last
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(agent = %self.name, bytes = stdout.len(), "Command agent finished");
        parse_stdout(&stdout)
    }

    fn fork(&self) -> Box<dyn Agent> {
        Box::new(self.clone())
    }
}
