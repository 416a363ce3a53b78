//! Category system for benchmark runs.
//!
//! The taxonomy maps `(class, subclass)` pairs to an evaluator and a
//! default grading strategy; the registry resolves one [`EvalConfig`]
//! against it before a run starts.
//!
//! [`EvalConfig`]: crate::pipeline::EvalConfig

mod registry;
mod taxonomy;

use serde::{Deserialize, Serialize};

use crate::grader::GraderKind;

pub use registry::{CategoryEntry, CategoryRegistry};
pub use taxonomy::Category;

/// How answers of one subclass are graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "grader")]
pub enum GradingStrategy {
    /// Run the answer with its tests in the sandbox.
    Sandbox,
    /// Ask an LLM judge.
    Llm(GraderKind),
}

impl GradingStrategy {
    /// Metrics label.
    pub fn label(&self) -> String {
        match self {
            GradingStrategy::Sandbox => "sandbox".to_string(),
            GradingStrategy::Llm(kind) => kind.to_string(),
        }
    }
}

impl std::fmt::Display for GradingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
