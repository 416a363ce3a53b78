//! Driver scripts that run a program and record its completion.
//!
//! The executor writes a fresh token to the child's stdin. The driver runs
//! the program with stdin detached and, only when the program returns
//! normally, writes the token to [`RESULT_FILE`]. An early `exit`, an
//! `os._exit` or a crash leaves no record behind.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// File the driver writes the completion token to, relative to the work dir.
pub const RESULT_FILE: &str = ".bench-result";

const PYTHON_DRIVER: &str = r#"import os
import sys
import traceback


def _run():
    token = sys.stdin.readline().strip()
    record = os.path.abspath(".bench-result")
    sys.stdin = open(os.devnull)
    with open("solution.py") as handle:
        source = handle.read()
    namespace = {"__name__": "__main__", "__file__": "solution.py"}
    try:
        exec(compile(source, "solution.py", "exec"), namespace)
    except BaseException:
        traceback.print_exc(file=sys.__stderr__)
        sys.__stderr__.flush()
        os._exit(1)
    with open(record, "w") as handle:
        handle.write(token)
    os._exit(0)


_run()
"#;

const SHELL_DRIVER: &str = r#"set -e
bench_record="$PWD/.bench-result"
. ./solution.sh </dev/null
IFS= read -r bench_token
printf '%s' "$bench_token" > "$bench_record"
"#;

/// How a program is wrapped for execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgramDriver {
    /// Python source run through `exec`; any `BaseException`, `SystemExit`
    /// included, is a failure.
    Python,
    /// POSIX shell script sourced under `set -e`.
    Shell,
}

impl ProgramDriver {
    /// Picks a driver from the interpreter name.
    pub fn for_interpreter(interpreter: &str) -> Self {
        let name = Path::new(interpreter)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(interpreter);
        match name {
            "sh" | "bash" | "dash" | "ash" | "ksh" | "zsh" => Self::Shell,
            _ => Self::Python,
        }
    }

    /// File the driver script is written to and the interpreter runs.
    pub fn entry_file(&self) -> &'static str {
        match self {
            Self::Python => "main.py",
            Self::Shell => "main.sh",
        }
    }

    /// File the untrusted program is written to.
    pub fn solution_file(&self) -> &'static str {
        match self {
            Self::Python => "solution.py",
            Self::Shell => "solution.sh",
        }
    }

    /// Source of the driver script.
    pub fn script(&self) -> &'static str {
        match self {
            Self::Python => PYTHON_DRIVER,
            Self::Shell => SHELL_DRIVER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_from_interpreter() {
        assert_eq!(ProgramDriver::for_interpreter("/bin/sh"), ProgramDriver::Shell);
        assert_eq!(ProgramDriver::for_interpreter("bash"), ProgramDriver::Shell);
        assert_eq!(ProgramDriver::for_interpreter("python3"), ProgramDriver::Python);
        assert_eq!(
            ProgramDriver::for_interpreter("/usr/bin/python3.12"),
            ProgramDriver::Python
        );
    }

    #[test]
    fn test_scripts_reference_their_files() {
        for driver in [ProgramDriver::Python, ProgramDriver::Shell] {
            assert!(driver.script().contains(driver.solution_file()));
            assert!(driver.script().contains(RESULT_FILE));
        }
    }
}
