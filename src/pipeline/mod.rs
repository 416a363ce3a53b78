//! Concurrent evaluation pipeline.
//!
//! # Architecture
//!
//! - **Config**: which subclasses to evaluate and how wide each pool is
//! - **Worker pools**: bounded tokio task sets, one per stage
//! - **Orchestrator**: feeds work items from generation to grading and
//!   merges partial results as each stage completes
//! - **Result**: per-category averages and the weighted aggregate
//!
//! # Pipeline Flow
//!
//! 1. **Registry**: configured subclasses are resolved to evaluators; bad
//!    configurations fail here
//! 2. **Sampling**: `weight` tasks are drawn per subclass with a fixed seed
//! 3. **Generation**: a forked agent answers each task (8 at a time by default)
//! 4. **Grading**: answers are scored by the sandbox or an LLM judge
//!    (12 at a time by default)
//! 5. **Aggregation**: each subclass is averaged over its weight, then all
//!    subclasses are combined by weight
//!
//! # Example
//!
//! ```rust,ignore
//! use bench_forge::bench::JsonTaskStore;
//! use bench_forge::pipeline::{EvalConfig, Orchestrator, PipelineConfig};
//!
//! let eval = EvalConfig::from_file("eval.yaml")?;
//! let orchestrator = Orchestrator::new(
//!     &eval,
//!     PipelineConfig::from_env()?,
//!     Arc::new(JsonTaskStore::new("benchmarks")),
//!     Some(grader),
//! )?;
//!
//! let run = orchestrator.run(&mut agent).await?;
//! println!("{}", run.result.report());
//! ```

pub mod config;
pub mod orchestrator;
pub mod progress;
pub mod result;
pub mod worker_pool;

pub use config::{EvalConfig, PipelineConfig};
pub use orchestrator::{
    GenerationTrace, GradingRecord, IllegalTransition, LogEntry, Orchestrator, PipelineRun,
    WorkStage,
};
pub use progress::{ProgressCounters, ProgressMonitor, ProgressSnapshot};
pub use result::{EvalPipelineResult, EvalResult};
pub use worker_pool::{Completed, PoolError, PoolStats, WorkerPool};
