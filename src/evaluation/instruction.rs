//! Agent instructions built from tasks.

use tera::Context;
use tracing::warn;

use crate::bench::{CodeDataset, Task, TaskKind};

const CODE_PREAMBLE: &str = r#"# Language: Python 3
# Task: Synthesize program

"""
Contains programming exercises for single functions specified by their doc-strings and with solutions in simple code and with a lot of comments that explain what is done and why and how it is related to the specification. The solutions of all examples have a similar structure and are written in a similar style.
"""
"#;

/// Stdin/stdout program synthesis.
pub const APPS_TEMPLATE: &str = r#"{{ preamble }}
# Example 1.

"""
Given an array of integers, find the sum of all the positive integers in the array.
Your function should return the sum of all the positive integers present in the array.


-----Input-----

The first line contains a list of integers.


-----Output-----

Output the sum of all positive integers.


-----Examples-----
Input
1 2 3 -1

Output
6

Input
-1 -2 -3 -4

Output
0
"""

# Solution:
ls = list(map(int, input().split()))
result = sum([i for i in ls if i > 0])
print(result)

# Example 2.

"""

{{ problem }}

"""

# Solution:
"#;

/// Function completion from a signature and docstring.
pub const HUMANEVAL_TEMPLATE: &str = r#"{{ preamble }}
# Example 1.

def sum_positive(ls):

    """
    Given an array of integers, find the sum of all the positive integers in the array.
    Your function should return the sum of all the positive integers present in the array.
    Examples:
    For ls = [1, 2, 3, -1], the output should be 6.
    For ls = [-1, -2, -3, -4], the output should be 0.
    """

# Solution:
def sum_positive(ls):
    result = sum([i for i in ls if i > 0])
    return result

# Example 2.

{{ problem }}

# Solution:
"#;

/// Function synthesis against assert-based tests.
pub const MBPP_TEMPLATE: &str = r#"{{ preamble }}
# Example 1.

"""

Given an array of integers, find the sum of all the positive integers in the array.
Your function should return the sum of all the positive integers present in the array.

Your code should pass these tests:

assert sum_positive([1, 2, 3, -1]) == 6
assert sum_positive([-1, -2, -3, -4]) == 0

"""

# Solution:
def sum_positive(ls):
    result = sum([i for i in ls if i > 0])
    return result

# Example 2.

"""

{{ problem }}

"""

# Solution:
"#;

/// Builds the instruction handed to the agent.
///
/// Qa and instructed tasks pass the prompt through unchanged. Code tasks
/// are wrapped in a few-shot template for their dataset.
pub fn build_instruction(task: &Task) -> String {
    if task.kind != TaskKind::Code {
        return task.prompt.clone();
    }
    let template = match task.dataset {
        Some(CodeDataset::Apps) => APPS_TEMPLATE,
        Some(CodeDataset::HumanEval) => HUMANEVAL_TEMPLATE,
        Some(CodeDataset::Mbpp) => MBPP_TEMPLATE,
        None => return task.prompt.clone(),
    };

    let mut context = Context::new();
    context.insert("preamble", CODE_PREAMBLE);
    context.insert("problem", &task.prompt);
    match tera::Tera::one_off(template, &context, false) {
        Ok(rendered) => rendered,
        Err(e) => {
            warn!(task_id = %task.id, error = %e, "Instruction template failed, using raw prompt");
            task.prompt.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qa_prompt_passes_through() {
        let task = Task::qa("k", "w", "Capital of France?", "Paris");
        assert_eq!(build_instruction(&task), "Capital of France?");
    }

    #[test]
    fn test_code_prompt_uses_dataset_template() {
        let task = Task::code("reasoning", "coding", "def add(a, b):", "assert add(1, 2) == 3", CodeDataset::Mbpp);
        let instruction = build_instruction(&task);
        assert!(instruction.starts_with("# Language: Python 3"));
        assert!(instruction.contains("Your code should pass these tests"));
        assert!(instruction.contains("def add(a, b):"));
        assert!(instruction.trim_end().ends_with("# Solution:"));
    }

    #[test]
    fn test_problem_text_is_not_escaped() {
        let task = Task::code("reasoning", "coding", "print(a < b and \"x\")", "", CodeDataset::Apps);
        assert!(build_instruction(&task).contains("print(a < b and \"x\")"));
    }
}
