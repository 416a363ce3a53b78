//! The agent under test.
//!
//! An agent takes one textual instruction and returns text plus cost and
//! token metadata. The pipeline forks one independent copy per work item,
//! so implementations may keep per-run scratch state (conversation history,
//! working directories) without synchronization.

pub mod command;
pub mod llm;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

pub use command::CommandAgent;
pub use llm::LlmAgent;

/// What an agent returns for one instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Final answer text.
    pub output: String,
    /// Dollar cost of producing the answer.
    #[serde(default)]
    pub cost: f64,
    /// Tokens consumed producing the answer.
    #[serde(default)]
    pub tokens: u64,
}

impl AgentResponse {
    /// Creates a response.
    pub fn new(output: impl Into<String>, cost: f64, tokens: u64) -> Self {
        Self {
            output: output.into(),
            cost,
            tokens,
        }
    }
}

/// Capability under evaluation.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Human-readable agent name, used in logs.
    fn name(&self) -> &str;

    /// Answers one instruction.
    async fn run(&mut self, instruction: &str) -> Result<AgentResponse, AgentError>;

    /// Produces an independent copy with fresh scratch state.
    fn fork(&self) -> Box<dyn Agent>;

    /// Clears scratch state before a run.
    fn reset(&mut self) {}
}

/// Error type for agent operations.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Agent timed out after {0:?}")]
    Timeout(Duration),

    #[error("Agent returned no output")]
    EmptyOutput,

    #[error("Agent LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parses_with_defaults() {
        let parsed: AgentResponse = serde_json::from_str(r#"{"output": "42"}"#).unwrap();
        assert_eq!(parsed, AgentResponse::new("42", 0.0, 0));
    }

    #[test]
    fn test_error_display() {
        let err = AgentError::Timeout(Duration::from_secs(3));
        assert_eq!(err.to_string(), "Agent timed out after 3s");
    }
}
