//! Prometheus-based metrics for evaluation runs.
//!
//! Tracks generations, gradings, sandbox outcomes and LLM usage. Recording
//! is a no-op until [`init_metrics`] has been called, so library users that
//! never export metrics pay nothing for them.
//!
//! # Example
//!
//! ```ignore
//! use bench_forge::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics()?;
//!
//! let collector = MetricsCollector::new();
//! collector.record_sandbox_outcome("pass");
//!
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::{MetricsCollector, TokenUsage};
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    GENERATIONS_TOTAL, GENERATION_LATENCY, GRADER_COST, GRADINGS_TOTAL, LLM_LATENCY,
    LLM_REQUESTS_TOTAL, LLM_TOKENS_TOTAL, REGISTRY, SANDBOX_OUTCOMES_TOTAL, WORK_IN_FLIGHT,
};
