//! Sandbox configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::driver::ProgramDriver;

/// How the child is confined beyond resource limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
    /// Fresh user, mount and network namespaces with a read-only root and a
    /// writable `/work`. Execution fails if the kernel refuses them.
    #[default]
    Namespaces,
    /// Resource limits, a wiped environment and a scratch cwd only.
    Off,
}

/// Kernel resource limits applied to the sandboxed child before `exec`.
///
/// `None` leaves the corresponding limit inherited from the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Maximum virtual address space in bytes (RLIMIT_AS).
    pub max_memory_bytes: Option<u64>,
    /// Maximum CPU seconds (RLIMIT_CPU). Derived from the deadline when unset.
    pub max_cpu_seconds: Option<u64>,
    /// Maximum open file descriptors (RLIMIT_NOFILE).
    pub max_open_files: Option<u64>,
    /// Maximum size of any file the child writes (RLIMIT_FSIZE).
    pub max_file_size_bytes: Option<u64>,
    /// Maximum number of processes for the child's user (RLIMIT_NPROC).
    pub max_processes: Option<u64>,
    /// Disable core dumps (RLIMIT_CORE = 0).
    pub disable_core_dumps: bool,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory_bytes: Some(1024 * 1024 * 1024), // 1GB
            max_cpu_seconds: None,
            max_open_files: Some(64),
            max_file_size_bytes: Some(16 * 1024 * 1024), // 16MB
            max_processes: Some(0),
            disable_core_dumps: true,
        }
    }
}

impl ResourceLimits {
    /// No limits at all. Useful when the interpreter needs a large address space.
    pub fn unlimited() -> Self {
        Self {
            max_memory_bytes: None,
            max_cpu_seconds: None,
            max_open_files: None,
            max_file_size_bytes: None,
            max_processes: None,
            disable_core_dumps: false,
        }
    }

    /// Sets the memory limit in MB.
    pub fn with_memory_mb(mut self, mb: u64) -> Self {
        self.max_memory_bytes = Some(mb * 1024 * 1024);
        self
    }

    /// Sets the CPU time limit.
    pub fn with_cpu_seconds(mut self, seconds: u64) -> Self {
        self.max_cpu_seconds = Some(seconds);
        self
    }

    /// Sets the process limit.
    pub fn with_max_processes(mut self, count: Option<u64>) -> Self {
        self.max_processes = count;
        self
    }

    /// CPU seconds to enforce for an execution with the given wall-clock window.
    pub fn effective_cpu_seconds(&self, window: Duration) -> u64 {
        self.max_cpu_seconds
            .unwrap_or_else(|| window.as_secs_f64().ceil().max(1.0) as u64)
    }
}

/// Configuration for the sandbox executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Interpreter used to run the program.
    pub interpreter: String,
    /// Arguments placed before the program file.
    pub interpreter_args: Vec<String>,
    /// Wraps the program and records its completion.
    pub driver: ProgramDriver,
    /// Default deadline for an execution.
    pub timeout: Duration,
    /// Extra time after the deadline before the child is force-killed.
    pub grace: Duration,
    /// `PATH` exposed to the child. Nothing else from the supervisor's
    /// environment is inherited.
    pub path_env: String,
    /// Maximum bytes of stderr kept for the failure reason.
    pub max_stderr_bytes: usize,
    /// Kernel resource limits.
    pub limits: ResourceLimits,
    /// Filesystem and network confinement.
    pub isolation: Isolation,
    /// Host paths visible read-only inside an isolated child.
    pub read_only_paths: Vec<PathBuf>,
}

fn default_read_only_paths() -> Vec<PathBuf> {
    ["/usr", "/bin", "/sbin", "/lib", "/lib32", "/lib64", "/etc"]
        .into_iter()
        .map(PathBuf::from)
        .collect()
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            // Isolated mode ignores PYTHON* variables and the user site dir.
            interpreter_args: vec!["-I".to_string(), "-B".to_string()],
            driver: ProgramDriver::Python,
            timeout: Duration::from_secs(5),
            grace: Duration::from_secs(1),
            path_env: "/usr/local/bin:/usr/bin:/bin".to_string(),
            max_stderr_bytes: 64 * 1024,
            limits: ResourceLimits::default(),
            isolation: Isolation::default(),
            read_only_paths: default_read_only_paths(),
        }
    }
}

impl SandboxConfig {
    /// Creates a configuration for the given interpreter with no extra
    /// arguments. The driver is inferred from the interpreter name.
    pub fn new(interpreter: impl Into<String>) -> Self {
        let interpreter = interpreter.into();
        Self {
            driver: ProgramDriver::for_interpreter(&interpreter),
            interpreter,
            interpreter_args: Vec::new(),
            ..Default::default()
        }
    }

    /// Sets the interpreter arguments.
    pub fn with_interpreter_args(mut self, args: Vec<String>) -> Self {
        self.interpreter_args = args;
        self
    }

    /// Sets the program driver.
    pub fn with_driver(mut self, driver: ProgramDriver) -> Self {
        self.driver = driver;
        self
    }

    /// Sets the isolation mode.
    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// Adds a host path exposed read-only to isolated children.
    pub fn with_read_only_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.read_only_paths.push(path.into());
        self
    }

    /// Sets the default timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the grace window.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Sets the resource limits.
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SandboxConfig::default();
        assert_eq!(config.interpreter, "python3");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.grace, Duration::from_secs(1));
        assert_eq!(config.limits.max_processes, Some(0));
        assert_eq!(config.driver, ProgramDriver::Python);
        assert_eq!(config.isolation, Isolation::Namespaces);
        assert!(config.read_only_paths.contains(&PathBuf::from("/usr")));
    }

    #[test]
    fn test_builder() {
        let config = SandboxConfig::new("/bin/sh")
            .with_isolation(Isolation::Off)
            .with_timeout(Duration::from_millis(500))
            .with_grace(Duration::from_millis(200))
            .with_limits(ResourceLimits::unlimited());

        assert!(config.interpreter_args.is_empty());
        assert_eq!(config.driver, ProgramDriver::Shell);
        assert_eq!(config.isolation, Isolation::Off);
        assert_eq!(config.timeout, Duration::from_millis(500));
        assert!(config.limits.max_memory_bytes.is_none());
    }

    #[test]
    fn test_effective_cpu_seconds_rounds_up() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.effective_cpu_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(limits.effective_cpu_seconds(Duration::from_millis(10)), 1);

        let limits = limits.with_cpu_seconds(7);
        assert_eq!(limits.effective_cpu_seconds(Duration::from_secs(1)), 7);
    }
}
