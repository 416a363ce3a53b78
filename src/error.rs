//! Error types for bench-forge operations.
//!
//! Defines the error types shared across subsystems:
//! - Evaluation configuration and registry construction
//! - Benchmark store loading
//! - LLM API interactions
//! - Grader invocation and batch consistency
//! - Whole-run orchestration
//!
//! Errors local to a single component (sandbox, agents, worker pools) live
//! next to that component.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating an evaluation configuration.
///
/// All of these are fatal and are raised before any work item is dispatched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unsupported evaluation feature requested: {feature}")]
    UnsupportedFeature { feature: String },

    #[error("No evaluator is registered for '{category}/{subclass}'")]
    UnknownCategory { category: String, subclass: String },

    #[error("Grader '{grader}' cannot score single answers for '{category}/{subclass}'")]
    UnsupportedGrader {
        category: String,
        subclass: String,
        grader: String,
    },

    #[error("'{key}' needs {requested} tasks but only {available} are available")]
    InsufficientTasks {
        key: String,
        available: usize,
        requested: usize,
    },

    #[error("'{key}' is graded by an LLM but no grader is configured")]
    MissingGrader { key: String },

    #[error("Worker pool '{pool}' must have at least one worker")]
    InvalidPoolWidth { pool: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur while reading the benchmark store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Benchmark directory not found: {0}")]
    NotFound(PathBuf),

    #[error("Malformed task in '{path}': {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Unknown code dataset '{0}'")]
    UnknownDataset(String),

    #[error("JSON parse error in '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: LITELLM_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Errors raised by a grader call.
///
/// Single-answer grading absorbs these into a zero score; only batch
/// grading surfaces [`GraderError::Consistency`] to its caller.
#[derive(Debug, Error)]
pub enum GraderError {
    #[error("Grader LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Grader returned an empty response")]
    EmptyResponse,

    #[error("Batch size mismatch: expected {expected} {what}, got {actual}")]
    Consistency {
        expected: usize,
        actual: usize,
        what: String,
    },

    #[error("Prompt rendering failed: {0}")]
    Template(#[from] tera::Error),
}

/// Errors that abort a whole evaluation run.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Benchmark store error: {0}")]
    Store(#[from] StoreError),

    #[error("Evaluation run was cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consistency_error_message() {
        let err = GraderError::Consistency {
            expected: 3,
            actual: 2,
            what: "verdicts".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Batch size mismatch: expected 3 verdicts, got 2"
        );
    }

    #[test]
    fn test_eval_error_wraps_config_error() {
        let err: EvalError = ConfigError::UnsupportedFeature {
            feature: "memory".to_string(),
        }
        .into();
        assert!(matches!(err, EvalError::Config(_)));
        assert!(err.to_string().contains("memory"));
    }
}
