//! Graders: LLM judges of agent answers.
//!
//! Four grading conventions exist, resolved once per category into a
//! [`GraderKind`]:
//!
//! | Kind | Inputs | Output convention |
//! |------|--------|-------------------|
//! | gate | task, ground truth, prediction | `passed` / `failed` |
//! | score | task, ground truth, prediction | integer 0-100 |
//! | instructed | eval instruction, message | `safe` / `unsafe` |
//! | dojo | task, left, right | `left` / `right` / `tie` |
//!
//! The [`Grader`] is constructed with its LLM provider injected; nothing in
//! this module holds a shared default instance.

pub mod judge;
pub mod prompts;
pub mod verdict;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use judge::{BatchGrade, Grader, GraderOutput};
pub use verdict::{gate_score, instructed_score, parse_batch, parse_dojo, parse_score, DojoVerdict};

/// Grading convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraderKind {
    Gate,
    Score,
    Instructed,
    Dojo,
}

impl GraderKind {
    /// Whether this kind turns one answer into a score on its own.
    pub fn scores_single_answer(&self) -> bool {
        !matches!(self, GraderKind::Dojo)
    }
}

impl std::fmt::Display for GraderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraderKind::Gate => write!(f, "gate"),
            GraderKind::Score => write!(f, "score"),
            GraderKind::Instructed => write!(f, "instructed"),
            GraderKind::Dojo => write!(f, "dojo"),
        }
    }
}

impl FromStr for GraderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gate" => Ok(GraderKind::Gate),
            "score" => Ok(GraderKind::Score),
            "instructed" => Ok(GraderKind::Instructed),
            "dojo" => Ok(GraderKind::Dojo),
            other => Err(format!("Unknown grader kind: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grader_kind_round_trip() {
        for kind in [
            GraderKind::Gate,
            GraderKind::Score,
            GraderKind::Instructed,
            GraderKind::Dojo,
        ] {
            assert_eq!(kind.to_string().parse::<GraderKind>().unwrap(), kind);
        }
        assert!("vibes".parse::<GraderKind>().is_err());
    }

    #[test]
    fn test_only_dojo_needs_a_pair() {
        assert!(GraderKind::Gate.scores_single_answer());
        assert!(!GraderKind::Dojo.scores_single_answer());
    }
}
