//! Outcomes of the two evaluation stages.

use serde::{Deserialize, Serialize};

use crate::grader::GraderKind;
use crate::sandbox::SandboxOutcome;

/// Text recorded in place of an answer when the agent failed.
pub const AGENT_FAILED: &str = "Agent failed";

/// Result of running the agent on one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub text: String,
    pub cost: f64,
    pub tokens: u64,
    /// Seconds spent inside the agent call.
    pub latency: f64,
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentOutcome {
    /// A successful generation.
    pub fn succeeded(text: impl Into<String>, cost: f64, tokens: u64, latency: f64) -> Self {
        Self {
            text: text.into(),
            cost,
            tokens,
            latency,
            failed: false,
            error: None,
        }
    }

    /// A failed generation. Cost and tokens are zero.
    pub fn failed(latency: f64) -> Self {
        Self {
            text: AGENT_FAILED.to_string(),
            cost: 0.0,
            tokens: 0,
            latency,
            failed: true,
            error: None,
        }
    }

    /// Attaches the failure reason.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// How a grade was reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum GradeDetail {
    /// The generation failed, nothing was graded.
    Skipped,
    /// The answer could not be turned into a runnable program.
    InvalidProgram { reason: String },
    /// The assembled program ran in the sandbox.
    Sandbox { outcome: SandboxOutcome },
    /// An LLM judge answered.
    Grader { grader: GraderKind, output: String },
    /// The LLM judge call failed.
    GraderFailed { grader: GraderKind, error: String },
    /// The grading work item panicked.
    Panicked { reason: String },
}

/// Result of grading one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeOutcome {
    /// In [0, 1].
    pub score: f64,
    /// Dollar cost of grading.
    pub cost: f64,
    pub detail: GradeDetail,
}

impl GradeOutcome {
    /// A grade with the given score and cost.
    pub fn new(score: f64, cost: f64, detail: GradeDetail) -> Self {
        Self {
            score: score.clamp(0.0, 1.0),
            cost,
            detail,
        }
    }

    /// A zero grade that cost nothing.
    pub fn zero(detail: GradeDetail) -> Self {
        Self::new(0.0, 0.0, detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_outcome_is_zeroed() {
        let outcome = AgentOutcome::failed(1.2).with_error("boom");
        assert!(outcome.failed);
        assert_eq!(outcome.text, AGENT_FAILED);
        assert_eq!(outcome.cost, 0.0);
        assert_eq!(outcome.tokens, 0);
        assert_eq!(outcome.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_grade_score_is_clamped() {
        assert_eq!(GradeOutcome::new(1.7, 0.0, GradeDetail::Skipped).score, 1.0);
        assert_eq!(GradeOutcome::zero(GradeDetail::Skipped).cost, 0.0);
    }

    #[test]
    fn test_detail_serialization() {
        let detail = GradeDetail::Sandbox {
            outcome: SandboxOutcome::Timeout,
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["via"], "sandbox");
        assert_eq!(json["outcome"]["status"], "timeout");
    }
}
