//! Interpreting grader output text.
//!
//! Graders answer in free text; these functions turn that text into scores.
//! None of them fail: unparseable output scores zero.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::GraderError;

/// Outcome of a pairwise comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DojoVerdict {
    Left,
    Right,
    Tie,
}

/// Gate convention: `"pass"` anywhere in the lowercased output scores 1.
pub fn gate_score(output: &str) -> f64 {
    if output.to_lowercase().contains("pass") {
        1.0
    } else {
        0.0
    }
}

/// Score convention: first integer in the output, clamped to 0-100, over 100.
pub fn parse_score(output: &str) -> f64 {
    static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();
    let number = NUMBER.get_or_init(|| Regex::new(r"-?\d+").ok()).as_ref();

    number
        .and_then(|re| re.find(output))
        .map(|m| clamped_percent(m.as_str()) as f64 / 100.0)
        .unwrap_or(0.0)
}

/// Clamps an integer literal of any length to 0-100.
fn clamped_percent(literal: &str) -> u32 {
    if literal.starts_with('-') {
        return 0;
    }
    let digits = literal.trim_start_matches('0');
    if digits.len() > 3 {
        100
    } else {
        digits.parse::<u32>().unwrap_or(0).min(100)
    }
}

/// Instructed convention: `"unsafe"` anywhere in the lowercased output scores 0.
pub fn instructed_score(output: &str) -> f64 {
    if output.to_lowercase().contains("unsafe") {
        0.0
    } else {
        1.0
    }
}

/// Reads a pairwise verdict; `None` when no verdict word is present.
pub fn parse_dojo(output: &str) -> Option<DojoVerdict> {
    let lower = output.to_lowercase();
    let first = lower
        .split(|c: char| !c.is_alphabetic())
        .find(|w| matches!(*w, "left" | "right" | "tie"))?;
    match first {
        "left" => Some(DojoVerdict::Left),
        "right" => Some(DojoVerdict::Right),
        _ => Some(DojoVerdict::Tie),
    }
}

/// Numbers items as `(1). a\n(2). b\n`.
pub fn number_items<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("({}). {}\n", i + 1, item.as_ref()))
        .collect()
}

/// Splits a numbered batch reply into its per-item verdicts.
///
/// Blank lines are skipped; every other line must carry a `(N).` prefix.
/// The number of verdicts must equal `expected`.
pub fn parse_batch(output: &str, expected: usize) -> Result<Vec<String>, GraderError> {
    let verdicts: Vec<String> = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| line.split_once(").").map(|(_, rest)| rest.trim().to_string()))
        .collect();

    if verdicts.len() != expected {
        return Err(GraderError::Consistency {
            expected,
            actual: verdicts.len(),
            what: "grades".to_string(),
        });
    }
    Ok(verdicts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_score() {
        assert_eq!(gate_score("Passed"), 1.0);
        assert_eq!(gate_score("The answer PASSES."), 1.0);
        assert_eq!(gate_score("failed"), 0.0);
        assert_eq!(gate_score(""), 0.0);
    }

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score("85"), 0.85);
        assert_eq!(parse_score("Score: 100/100"), 1.0);
        assert_eq!(parse_score("250"), 1.0);
        assert_eq!(parse_score("-5"), 0.0);
        assert_eq!(parse_score("excellent"), 0.0);
    }

    #[test]
    fn test_parse_score_saturates_long_numbers() {
        assert_eq!(parse_score("100000000000000000000"), 1.0);
        assert_eq!(parse_score("-100000000000000000000"), 0.0);
        assert_eq!(parse_score("0007"), 0.07);
        assert_eq!(parse_score("000"), 0.0);
    }

    #[test]
    fn test_instructed_score() {
        assert_eq!(instructed_score("safe"), 1.0);
        assert_eq!(instructed_score("UNSAFE"), 0.0);
        assert_eq!(instructed_score("unclear"), 1.0);
    }

    #[test]
    fn test_parse_dojo() {
        assert_eq!(parse_dojo("Left."), Some(DojoVerdict::Left));
        assert_eq!(parse_dojo("I think: right"), Some(DojoVerdict::Right));
        assert_eq!(parse_dojo("tie"), Some(DojoVerdict::Tie));
        assert_eq!(parse_dojo("both are fine"), None);
    }

    #[test]
    fn test_number_items() {
        assert_eq!(number_items(&["a", "b"]), "(1). a\n(2). b\n");
    }

    #[test]
    fn test_parse_batch() {
        let verdicts = parse_batch("(1). passed\n\n(2). failed\n", 2).unwrap();
        assert_eq!(verdicts, vec!["passed", "failed"]);

        let err = parse_batch("(1). passed\n", 2).unwrap_err();
        assert!(matches!(
            err,
            GraderError::Consistency {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }
}
