//! Single-task evaluation.
//!
//! [`TaskEvaluator::generate`] runs the agent on a task and
//! [`TaskEvaluator::grade`] scores the answer, in the sandbox for code
//! tasks and with an LLM judge otherwise. The two halves run as separate
//! pipeline stages.

mod evaluator;
pub mod instruction;
mod outcome;
pub mod program;

pub use evaluator::TaskEvaluator;
pub use instruction::build_instruction;
pub use outcome::{AgentOutcome, GradeDetail, GradeOutcome, AGENT_FAILED};
pub use program::{assemble_program, strip_code_fence, ProgramError};
