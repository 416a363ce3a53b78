//! Benchmark task records.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::StoreError;

/// How a task's answer is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Question with a reference answer, judged by an LLM grader.
    Qa,
    /// Program synthesis, checked by running tests in the sandbox.
    Code,
    /// Free-form response judged against an evaluation instruction.
    Instructed,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Qa => write!(f, "qa"),
            TaskKind::Code => write!(f, "code"),
            TaskKind::Instructed => write!(f, "instructed"),
        }
    }
}

/// Source dataset of a code task. Decides how the test harness is merged
/// with the agent's program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeDataset {
    /// Stdin/stdout problems with input/output case lists.
    Apps,
    /// Function completion with a `check` style harness.
    HumanEval,
    /// Function synthesis with assert-based tests.
    Mbpp,
}

impl FromStr for CodeDataset {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "apps" => Ok(CodeDataset::Apps),
            "humaneval" => Ok(CodeDataset::HumanEval),
            "mbpp" => Ok(CodeDataset::Mbpp),
            other => Err(StoreError::UnknownDataset(other.to_string())),
        }
    }
}

impl std::fmt::Display for CodeDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeDataset::Apps => write!(f, "apps"),
            CodeDataset::HumanEval => write!(f, "humaneval"),
            CodeDataset::Mbpp => write!(f, "mbpp"),
        }
    }
}

/// One benchmark task. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Stable content hash of category, subclass and prompt.
    pub id: String,
    pub category: String,
    pub subclass: String,
    /// Text shown to the agent (before instruction templating).
    pub prompt: String,
    /// Ground truth for qa tasks, evaluation instruction for instructed tasks.
    pub reference: Option<String>,
    /// Test harness for code tasks.
    pub test_spec: Option<String>,
    pub kind: TaskKind,
    /// Present for code tasks only.
    pub dataset: Option<CodeDataset>,
}

impl Task {
    /// Creates a question/answer task.
    pub fn qa(
        category: impl Into<String>,
        subclass: impl Into<String>,
        problem: impl Into<String>,
        solution: impl Into<String>,
    ) -> Self {
        Self::build(
            category.into(),
            subclass.into(),
            problem.into(),
            Some(solution.into()),
            None,
            TaskKind::Qa,
            None,
        )
    }

    /// Creates a code task.
    pub fn code(
        category: impl Into<String>,
        subclass: impl Into<String>,
        problem: impl Into<String>,
        test_case: impl Into<String>,
        dataset: CodeDataset,
    ) -> Self {
        Self::build(
            category.into(),
            subclass.into(),
            problem.into(),
            None,
            Some(test_case.into()),
            TaskKind::Code,
            Some(dataset),
        )
    }

    /// Creates an instructed task judged against `eval_instruction`.
    pub fn instructed(
        category: impl Into<String>,
        subclass: impl Into<String>,
        prompt: impl Into<String>,
        eval_instruction: impl Into<String>,
    ) -> Self {
        Self::build(
            category.into(),
            subclass.into(),
            prompt.into(),
            Some(eval_instruction.into()),
            None,
            TaskKind::Instructed,
            None,
        )
    }

    fn build(
        category: String,
        subclass: String,
        prompt: String,
        reference: Option<String>,
        test_spec: Option<String>,
        kind: TaskKind,
        dataset: Option<CodeDataset>,
    ) -> Self {
        let id = task_id(&category, &subclass, &prompt);
        Self {
            id,
            category,
            subclass,
            prompt,
            reference,
            test_spec,
            kind,
            dataset,
        }
    }

    /// Parses one raw JSON task object, inferring the kind from its keys.
    ///
    /// - `problem` + `test_case` + `dataset` is a code task
    /// - `problem` + `solution` is a qa task
    /// - `prompt` + `eval_instruction` is an instructed task
    pub fn from_json(
        category: &str,
        subclass: &str,
        value: &Value,
        path: &Path,
    ) -> Result<Self, StoreError> {
        let malformed = |reason: &str| StoreError::Malformed {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        let obj = value
            .as_object()
            .ok_or_else(|| malformed("task is not a JSON object"))?;

        if let (Some(problem), Some(test_case)) = (obj.get("problem"), obj.get("test_case")) {
            let dataset = obj
                .get("dataset")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("code task without a 'dataset' string"))?
                .parse::<CodeDataset>()?;
            return Ok(Task::code(
                category,
                subclass,
                text_field(problem),
                text_field(test_case),
                dataset,
            ));
        }

        if let (Some(problem), Some(solution)) = (obj.get("problem"), obj.get("solution")) {
            return Ok(Task::qa(
                category,
                subclass,
                text_field(problem),
                text_field(solution),
            ));
        }

        if let (Some(prompt), Some(instruction)) = (obj.get("prompt"), obj.get("eval_instruction"))
        {
            return Ok(Task::instructed(
                category,
                subclass,
                text_field(prompt),
                text_field(instruction),
            ));
        }

        Err(malformed(
            "expected keys problem/solution, problem/test_case/dataset or prompt/eval_instruction",
        ))
    }

    /// Category key, `class/subclass`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.category, self.subclass)
    }
}

/// Strings are taken verbatim; any other JSON value is kept in serialized form.
fn text_field(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn task_id(category: &str, subclass: &str, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(category.as_bytes());
    hasher.update([0u8]);
    hasher.update(subclass.as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt.as_bytes());
    hex::encode(&hasher.finalize()[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path() -> &'static Path {
        Path::new("task.json")
    }

    #[test]
    fn test_infers_qa_task() {
        let value = json!({"problem": "What is 2+2?", "solution": "4"});
        let task = Task::from_json("reasoning", "math", &value, path()).unwrap();
        assert_eq!(task.kind, TaskKind::Qa);
        assert_eq!(task.reference.as_deref(), Some("4"));
        assert_eq!(task.key(), "reasoning/math");
    }

    #[test]
    fn test_infers_code_task() {
        let value = json!({
            "problem": "def add(a, b):",
            "test_case": "assert add(1, 2) == 3",
            "dataset": "mbpp"
        });
        let task = Task::from_json("reasoning", "coding", &value, path()).unwrap();
        assert_eq!(task.kind, TaskKind::Code);
        assert_eq!(task.dataset, Some(CodeDataset::Mbpp));
        assert_eq!(task.test_spec.as_deref(), Some("assert add(1, 2) == 3"));
    }

    #[test]
    fn test_non_string_test_case_is_serialized() {
        let value = json!({
            "problem": "read and echo",
            "test_case": {"inputs": ["1\n"], "outputs": ["1\n"]},
            "dataset": "apps"
        });
        let task = Task::from_json("reasoning", "coding", &value, path()).unwrap();
        let spec: Value = serde_json::from_str(task.test_spec.as_deref().unwrap()).unwrap();
        assert_eq!(spec["inputs"][0], "1\n");
    }

    #[test]
    fn test_infers_instructed_task() {
        let value = json!({"prompt": "Say hi", "eval_instruction": "Must be polite"});
        let task = Task::from_json("safety", "integrity", &value, path()).unwrap();
        assert_eq!(task.kind, TaskKind::Instructed);
        assert_eq!(task.reference.as_deref(), Some("Must be polite"));
    }

    #[test]
    fn test_rejects_unknown_shape_and_dataset() {
        let value = json!({"question": "?"});
        assert!(matches!(
            Task::from_json("a", "b", &value, path()),
            Err(StoreError::Malformed { .. })
        ));

        let value = json!({"problem": "p", "test_case": "t", "dataset": "leetcode"});
        assert!(matches!(
            Task::from_json("a", "b", &value, path()),
            Err(StoreError::UnknownDataset(_))
        ));
    }

    #[test]
    fn test_id_is_stable_and_content_based() {
        let a = Task::qa("c", "s", "p", "x");
        let b = Task::qa("c", "s", "p", "y");
        let c = Task::qa("c", "s", "q", "x");
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(a.id.len(), 16);
    }

    #[test]
    fn test_dataset_parse_is_case_insensitive() {
        assert_eq!("HumanEval".parse::<CodeDataset>().unwrap(), CodeDataset::HumanEval);
        assert_eq!(CodeDataset::Apps.to_string(), "apps");
    }
}
