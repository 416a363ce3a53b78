//! Sandboxed execution of untrusted, agent-generated programs.
//!
//! Every execution runs in its own OS process with a fresh scratch directory,
//! an empty environment and kernel resource limits. By default the child is
//! also pivoted into that directory inside its own user, mount and network
//! namespaces. A hard wall-clock deadline is enforced by killing the child's
//! whole process group, and a run only passes when its driver recorded that
//! the program returned normally.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use bench_forge::sandbox::{SandboxConfig, SandboxExecutor, SandboxOutcome};
//!
//! let executor = SandboxExecutor::new(SandboxConfig::default());
//! let outcome = executor.execute("assert 1 + 1 == 2", Duration::from_secs(3)).await;
//! assert_eq!(outcome, SandboxOutcome::Pass);
//! ```

pub mod config;
pub mod driver;
pub mod executor;
#[cfg(unix)]
mod isolation;
pub mod limits;
pub mod outcome;

pub use config::{Isolation, ResourceLimits, SandboxConfig};
pub use driver::ProgramDriver;
pub use executor::{SandboxError, SandboxExecutor};
pub use outcome::SandboxOutcome;
