//! Platform-specific process confinement.

use tokio::process::Command;

use super::config::ResourceLimits;

/// Resolved limits copied into the `pre_exec` closure.
#[derive(Debug, Clone, Copy)]
struct RawLimits {
    memory: Option<u64>,
    cpu: u64,
    files: Option<u64>,
    file_size: Option<u64>,
    processes: Option<u64>,
    no_core: bool,
}

/// Apply Unix resource limits and put the child in its own process group.
#[cfg(unix)]
pub(super) fn apply_unix_limits(cmd: &mut Command, limits: &ResourceLimits, cpu_seconds: u64) {
    let raw = RawLimits {
        memory: limits.max_memory_bytes,
        cpu: cpu_seconds,
        files: limits.max_open_files,
        file_size: limits.max_file_size_bytes,
        processes: limits.max_processes,
        no_core: limits.disable_core_dumps,
    };

    cmd.process_group(0);

    // SAFETY: pre_exec runs between fork() and exec() in the child process.
    // The closure only calls setrlimit, which is async-signal-safe, on Copy
    // values moved into it. The parent process is not affected.
    unsafe {
        cmd.pre_exec(move || {
            set_limit(libc::RLIMIT_CPU, Some(raw.cpu));
            set_limit(libc::RLIMIT_AS, raw.memory);
            set_limit(libc::RLIMIT_NOFILE, raw.files);
            set_limit(libc::RLIMIT_FSIZE, raw.file_size);
            set_limit(libc::RLIMIT_NPROC, raw.processes);
            if raw.no_core {
                set_limit(libc::RLIMIT_CORE, Some(0));
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
pub(super) fn apply_unix_limits(_cmd: &mut Command, _limits: &ResourceLimits, _cpu_seconds: u64) {
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
type Resource = libc::__rlimit_resource_t;

#[cfg(all(unix, not(all(target_os = "linux", target_env = "gnu"))))]
type Resource = libc::c_int;

#[cfg(unix)]
fn set_limit(resource: Resource, value: Option<u64>) {
    if let Some(value) = value {
        let limit = libc::rlimit {
            rlim_cur: value as libc::rlim_t,
            rlim_max: value as libc::rlim_t,
        };
        // SAFETY: `limit` is a valid, initialized rlimit for the call duration.
        unsafe {
            libc::setrlimit(resource, &limit);
        }
    }
}

/// Send SIGKILL to every process in the group led by `pid`.
#[cfg(unix)]
pub(super) fn kill_process_group(pid: u32) {
    // SAFETY: kill(2) with a negative pid targets a process group and has no
    // memory-safety preconditions.
    unsafe {
        libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
pub(super) fn kill_process_group(_pid: u32) {}
