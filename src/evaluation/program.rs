//! Assembling runnable programs from agent answers and test specs.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::bench::{CodeDataset, Task};

/// Why a code task could not be turned into a program.
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("Task has no test spec")]
    MissingTestSpec,

    #[error("Task has no code dataset")]
    MissingDataset,

    #[error("Invalid apps test spec: {0}")]
    InvalidAppsSpec(String),
}

fn fence_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_+\-]*[ \t]*\r?\n(.*?)```").ok())
        .as_ref()
}

/// Returns the body of the first Markdown code fence, or the whole text
/// when there is none.
pub fn strip_code_fence(text: &str) -> &str {
    match fence_regex()
        .and_then(|re| re.captures(text))
        .and_then(|c| c.get(1))
    {
        Some(body) => body.as_str(),
        None => text,
    }
}

/// Builds the program the sandbox runs for one code task.
///
/// - humaneval, mbpp: the solution followed by the test harness
/// - apps: a driver that runs the solution once per case with the case
///   input on stdin and raises on the first output mismatch
pub fn assemble_program(answer: &str, task: &Task) -> Result<String, ProgramError> {
    let test_spec = task.test_spec.as_deref().ok_or(ProgramError::MissingTestSpec)?;
    let solution = strip_code_fence(answer);
    match task.dataset.ok_or(ProgramError::MissingDataset)? {
        CodeDataset::HumanEval | CodeDataset::Mbpp => Ok(format!("{}\n{}", solution, test_spec)),
        CodeDataset::Apps => apps_program(solution, test_spec),
    }
}

const APPS_DRIVER: &str = r#"import io
import json
import sys

cases = json.loads(CASES)
inputs, outputs = cases["inputs"], cases["outputs"]
code = compile(SOLUTION, "solution.py", "exec")


def as_text(value):
    if isinstance(value, list):
        return "\n".join(str(v) for v in value)
    return str(value)


for index, (given, expected) in enumerate(zip(inputs, outputs)):
    sys.stdin = io.StringIO(as_text(given))
    captured = io.StringIO()
    sys.stdout = captured
    try:
        exec(code, {"__name__": "__main__"})
    except SystemExit:
        pass
    finally:
        sys.stdout = sys.__stdout__
        sys.stdin = sys.__stdin__
    actual = captured.getvalue().strip()
    wanted = as_text(expected).strip()
    if actual != wanted:
        raise AssertionError("case %d: expected %r, got %r" % (index, wanted, actual))
"#;

fn apps_program(solution: &str, test_spec: &str) -> Result<String, ProgramError> {
    let spec: Value =
        serde_json::from_str(test_spec).map_err(|e| ProgramError::InvalidAppsSpec(e.to_string()))?;
    let inputs = spec
        .get("inputs")
        .and_then(Value::as_array)
        .ok_or_else(|| ProgramError::InvalidAppsSpec("missing 'inputs' list".to_string()))?;
    let outputs = spec
        .get("outputs")
        .and_then(Value::as_array)
        .ok_or_else(|| ProgramError::InvalidAppsSpec("missing 'outputs' list".to_string()))?;
    if inputs.is_empty() || inputs.len() != outputs.len() {
        return Err(ProgramError::InvalidAppsSpec(format!(
            "{} inputs for {} outputs",
            inputs.len(),
            outputs.len()
        )));
    }

    // JSON string literals are valid Python string literals.
    let solution_literal = Value::String(solution.to_string()).to_string();
    let cases_literal = Value::String(spec.to_string()).to_string();
    Ok(format!(
        "SOLUTION = {}\nCASES = {}\n{}",
        solution_literal, cases_literal, APPS_DRIVER
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```python\nprint(1)\n```"), "print(1)\n");
        assert_eq!(
            strip_code_fence("Here you go:\n```\nx = 1\n```\nDone."),
            "x = 1\n"
        );
        assert_eq!(strip_code_fence("print(2)"), "print(2)");
    }

    #[test]
    fn test_mbpp_appends_tests() {
        let task = Task::code("r", "c", "p", "assert f() == 1", CodeDataset::Mbpp);
        let program = assemble_program("```python\ndef f():\n    return 1\n```", &task).unwrap();
        assert_eq!(program, "def f():\n    return 1\n\nassert f() == 1");
    }

    #[test]
    fn test_apps_embeds_solution_and_cases() {
        let spec = r#"{"inputs": ["1 2\n"], "outputs": ["3\n"]}"#;
        let task = Task::code("r", "c", "p", spec, CodeDataset::Apps);
        let program = assemble_program("a, b = map(int, input().split())\nprint(a + b)", &task).unwrap();

        assert!(program.starts_with("SOLUTION = \"a, b = map(int, input().split())\\nprint(a + b)\""));
        assert!(program.contains("CASES = \""));
        assert!(program.contains("raise AssertionError"));
    }

    #[test]
    fn test_apps_rejects_bad_spec() {
        let task = Task::code("r", "c", "p", r#"{"inputs": ["1"], "outputs": []}"#, CodeDataset::Apps);
        assert!(matches!(
            assemble_program("print(1)", &task),
            Err(ProgramError::InvalidAppsSpec(_))
        ));

        let task = Task::code("r", "c", "p", "not json", CodeDataset::Apps);
        assert!(assemble_program("print(1)", &task).is_err());
    }

    #[test]
    fn test_qa_task_has_no_program() {
        let task = Task::qa("k", "w", "p", "a");
        assert!(matches!(
            assemble_program("x", &task),
            Err(ProgramError::MissingTestSpec)
        ));
    }
}
