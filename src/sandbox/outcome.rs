//! Classification of a single sandboxed execution.

use serde::{Deserialize, Serialize};

/// Result of running one program in the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum SandboxOutcome {
    /// The program exited cleanly before its deadline.
    Pass,
    /// The program was still running at its deadline, or ran out of CPU time.
    Timeout,
    /// The program raised, crashed or exited with a nonzero status.
    Fail(String),
}

impl SandboxOutcome {
    /// Returns true only for [`SandboxOutcome::Pass`].
    pub fn is_pass(&self) -> bool {
        matches!(self, SandboxOutcome::Pass)
    }

    /// Short tag used for metrics labels.
    pub fn tag(&self) -> &'static str {
        match self {
            SandboxOutcome::Pass => "pass",
            SandboxOutcome::Timeout => "timeout",
            SandboxOutcome::Fail(_) => "fail",
        }
    }
}

impl std::fmt::Display for SandboxOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxOutcome::Pass => write!(f, "passed"),
            SandboxOutcome::Timeout => write!(f, "timed out"),
            SandboxOutcome::Fail(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_keeps_pass_tag_only_for_pass() {
        assert!(SandboxOutcome::Pass.to_string().contains("pass"));
        assert!(!SandboxOutcome::Timeout.to_string().contains("pass"));
        assert!(!SandboxOutcome::Fail("boom".into()).to_string().contains("pass"));
    }

    #[test]
    fn test_serializes_with_tag() {
        let json = serde_json::to_string(&SandboxOutcome::Fail("ZeroDivisionError".into())).unwrap();
        assert_eq!(json, r#"{"status":"fail","reason":"ZeroDivisionError"}"#);

        let json = serde_json::to_string(&SandboxOutcome::Timeout).unwrap();
        assert_eq!(json, r#"{"status":"timeout"}"#);
    }
}
