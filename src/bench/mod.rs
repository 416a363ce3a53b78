//! Benchmark task store.
//!
//! Tasks live on disk partitioned by visibility, class and subclass:
//!
//! ```text
//! <root>/public/<class>/<subclass>/*.json
//! <root>/private/<class>/<subclass>/*.json
//! ```
//!
//! The evaluator only ever reads [`Task`] values; loading and deterministic
//! sampling are handled here.

pub mod store;
pub mod task;

pub use store::{sample, JsonTaskStore, MemoryTaskStore, TaskStore};
pub use task::{CodeDataset, Task, TaskKind};
