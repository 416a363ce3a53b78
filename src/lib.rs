//! bench-forge: agent benchmarking harness.
//!
//! Samples weighted benchmark tasks per category, runs the agent under
//! test on each of them and grades the answers, either by executing code in
//! a resource-limited sandbox or with an LLM judge. Generation and grading
//! run as two bounded concurrent stages.

// Core modules
pub mod agents;
pub mod bench;
pub mod categories;
pub mod cli;
pub mod error;
pub mod evaluation;
pub mod grader;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod sandbox;

// Re-export commonly used error types
pub use error::{ConfigError, EvalError, GraderError, LlmError, StoreError};

pub use pipeline::{EvalConfig, EvalPipelineResult, EvalResult, Orchestrator, PipelineConfig};
