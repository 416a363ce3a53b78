//! Single-task evaluation: one generation, one grading.

use std::time::Instant;

use tracing::{debug, warn};

use super::instruction::build_instruction;
use super::outcome::{AgentOutcome, GradeDetail, GradeOutcome};
use super::program::assemble_program;
use crate::agents::Agent;
use crate::bench::Task;
use crate::categories::GradingStrategy;
use crate::grader::{gate_score, instructed_score, parse_score, Grader, GraderKind};
use crate::metrics::MetricsCollector;
use crate::sandbox::SandboxExecutor;

/// Runs the generation and grading halves of one task.
///
/// Never returns an error: agent, grader and sandbox failures all become
/// zeroed outcomes.
#[derive(Debug, Clone)]
pub struct TaskEvaluator {
    grader: Option<Grader>,
    sandbox: SandboxExecutor,
    metrics: MetricsCollector,
}

impl TaskEvaluator {
    /// Creates an evaluator. `grader` may be `None` when only sandbox-graded
    /// subclasses are evaluated.
    pub fn new(grader: Option<Grader>, sandbox: SandboxExecutor) -> Self {
        Self {
            grader,
            sandbox,
            metrics: MetricsCollector::new(),
        }
    }

    /// Runs the agent on one task.
    ///
    /// Latency covers only the agent call. An error or an empty answer
    /// yields a failed outcome with zero cost and tokens.
    pub async fn generate(&self, agent: &mut dyn Agent, task: &Task, seed: u64) -> AgentOutcome {
        let instruction = build_instruction(task);

        let start = Instant::now();
        let result = agent.run(&instruction).await;
        let latency = start.elapsed().as_secs_f64();

        let outcome = match result {
            Ok(response) if !response.output.trim().is_empty() => {
                AgentOutcome::succeeded(response.output, response.cost, response.tokens, latency)
            }
            Ok(_) => AgentOutcome::failed(latency).with_error("empty output"),
            Err(e) => {
                debug!(agent = agent.name(), task_id = %task.id, error = %e, "Agent run failed");
                AgentOutcome::failed(latency).with_error(e.to_string())
            }
        };

        debug!(
            key = %task.key(),
            task_id = %task.id,
            seed = seed,
            failed = outcome.failed,
            latency_secs = latency,
            "Generation finished"
        );
        self.metrics
            .record_generation(&task.key(), outcome.failed, latency);
        outcome
    }

    /// Grades one generation with the subclass's strategy.
    ///
    /// A failed generation is not graded and scores zero.
    pub async fn grade(
        &self,
        outcome: &AgentOutcome,
        task: &Task,
        strategy: GradingStrategy,
    ) -> GradeOutcome {
        let grade = if outcome.failed {
            GradeOutcome::zero(GradeDetail::Skipped)
        } else {
            match strategy {
                GradingStrategy::Sandbox => self.grade_in_sandbox(outcome, task).await,
                GradingStrategy::Llm(kind) => self.grade_with_llm(outcome, task, kind).await,
            }
        };

        self.metrics
            .record_grading(&strategy.label(), grade.score, grade.cost);
        grade
    }

    async fn grade_in_sandbox(&self, outcome: &AgentOutcome, task: &Task) -> GradeOutcome {
        let program = match assemble_program(&outcome.text, task) {
            Ok(program) => program,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Cannot assemble program");
                return GradeOutcome::zero(GradeDetail::InvalidProgram {
                    reason: e.to_string(),
                });
            }
        };

        let result = self.sandbox.execute_default(&program).await;
        let score = if result.is_pass() { 1.0 } else { 0.0 };
        GradeOutcome::new(score, 0.0, GradeDetail::Sandbox { outcome: result })
    }

    async fn grade_with_llm(&self, outcome: &AgentOutcome, task: &Task, kind: GraderKind) -> GradeOutcome {
        let Some(grader) = &self.grader else {
            return GradeOutcome::zero(GradeDetail::GraderFailed {
                grader: kind,
                error: "no grader configured".to_string(),
            });
        };

        let reference = task.reference.as_deref().unwrap_or_default();
        let result = match kind {
            GraderKind::Gate => grader.gate(&task.prompt, reference, &outcome.text).await,
            GraderKind::Score => grader.score(&task.prompt, reference, &outcome.text).await,
            GraderKind::Instructed => grader.instructed(reference, &outcome.text).await,
            GraderKind::Dojo => {
                return GradeOutcome::zero(GradeDetail::GraderFailed {
                    grader: kind,
                    error: "dojo grading needs two answers".to_string(),
                });
            }
        };

        match result {
            Ok(output) => {
                let score = match kind {
                    GraderKind::Score => parse_score(&output.output),
                    GraderKind::Instructed => instructed_score(&output.output),
                    _ => gate_score(&output.output),
                };
                GradeOutcome::new(
                    score,
                    output.cost,
                    GradeDetail::Grader {
                        grader: kind,
                        output: output.output,
                    },
                )
            }
            Err(e) => {
                warn!(task_id = %task.id, grader = %kind, error = %e, "Grader call failed");
                GradeOutcome::zero(GradeDetail::GraderFailed {
                    grader: kind,
                    error: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::agents::{AgentError, AgentResponse};
    use crate::bench::CodeDataset;
    use crate::error::LlmError;
    use crate::llm::{
        Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, ModelPricing, Usage,
    };
    use crate::sandbox::{Isolation, ResourceLimits, SandboxConfig, SandboxOutcome};

    struct ScriptedAgent {
        reply: Result<&'static str, &'static str>,
    }

    #[async_trait]
    impl Agent for ScriptedAgent {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn run(&mut self, _instruction: &str) -> Result<AgentResponse, AgentError> {
            match self.reply {
                Ok(text) => Ok(AgentResponse::new(text, 0.5, 42)),
                Err(e) => Err(AgentError::ExecutionFailed(e.to_string())),
            }
        }

        fn fork(&self) -> Box<dyn Agent> {
            Box::new(ScriptedAgent { reply: self.reply })
        }
    }

    struct JudgeProvider {
        reply: Option<&'static str>,
    }

    #[async_trait]
    impl LlmProvider for JudgeProvider {
        async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
            let reply = self
                .reply
                .ok_or_else(|| LlmError::RequestFailed("down".to_string()))?;
            Ok(GenerationResponse {
                id: "j".to_string(),
                model: request.model,
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(reply),
                    finish_reason: None,
                }],
                usage: Usage {
                    prompt_tokens: 1_000_000,
                    completion_tokens: 0,
                    total_tokens: 1_000_000,
                },
            })
        }
    }

    fn evaluator(judge_reply: Option<&'static str>) -> TaskEvaluator {
        let grader = Grader::new(Arc::new(JudgeProvider { reply: judge_reply }), "judge")
            .with_pricing(ModelPricing::new(0.01, 0.0));
        let sandbox = SandboxConfig::new("/bin/sh")
            .with_isolation(Isolation::Off)
            .with_timeout(Duration::from_secs(2))
            .with_grace(Duration::from_millis(300))
            .with_limits(ResourceLimits::default().with_max_processes(None));
        TaskEvaluator::new(Some(grader), SandboxExecutor::new(sandbox))
    }

    #[tokio::test]
    async fn test_generate_success_and_failure() {
        let evaluator = evaluator(None);
        let task = Task::qa("k", "w", "2+2?", "4");

        let mut agent = ScriptedAgent { reply: Ok("4") };
        let outcome = evaluator.generate(&mut agent, &task, 0).await;
        assert!(!outcome.failed);
        assert_eq!(outcome.text, "4");
        assert_eq!(outcome.tokens, 42);

        let mut agent = ScriptedAgent { reply: Err("crashed") };
        let outcome = evaluator.generate(&mut agent, &task, 0).await;
        assert!(outcome.failed);
        assert_eq!(outcome.cost, 0.0);
        assert_eq!(outcome.tokens, 0);
        assert!(outcome.error.unwrap().contains("crashed"));

        let mut agent = ScriptedAgent { reply: Ok("  ") };
        assert!(evaluator.generate(&mut agent, &task, 0).await.failed);
    }

    #[tokio::test]
    async fn test_failed_generation_is_not_graded() {
        let evaluator = evaluator(Some("passed"));
        let task = Task::qa("k", "w", "2+2?", "4");
        let grade = evaluator
            .grade(&AgentOutcome::failed(0.1), &task, GradingStrategy::Llm(GraderKind::Gate))
            .await;
        assert_eq!(grade, GradeOutcome::zero(GradeDetail::Skipped));
    }

    #[tokio::test]
    async fn test_llm_grading_conventions() {
        let task = Task::qa("k", "w", "2+2?", "4");
        let answer = AgentOutcome::succeeded("4", 0.0, 1, 0.1);

        let grade = evaluator(Some("passed"))
            .grade(&answer, &task, GradingStrategy::Llm(GraderKind::Gate))
            .await;
        assert_eq!(grade.score, 1.0);
        assert!((grade.cost - 0.01).abs() < 1e-12);

        let grade = evaluator(Some("73"))
            .grade(&answer, &task, GradingStrategy::Llm(GraderKind::Score))
            .await;
        assert!((grade.score - 0.73).abs() < 1e-12);

        let grade = evaluator(Some("unsafe"))
            .grade(&answer, &task, GradingStrategy::Llm(GraderKind::Instructed))
            .await;
        assert_eq!(grade.score, 0.0);
    }

    #[tokio::test]
    async fn test_grader_failure_scores_zero_at_no_cost() {
        let task = Task::qa("k", "w", "2+2?", "4");
        let answer = AgentOutcome::succeeded("4", 0.0, 1, 0.1);
        let grade = evaluator(None)
            .grade(&answer, &task, GradingStrategy::Llm(GraderKind::Gate))
            .await;
        assert_eq!(grade.score, 0.0);
        assert_eq!(grade.cost, 0.0);
        assert!(matches!(grade.detail, GradeDetail::GraderFailed { .. }));
    }

    #[tokio::test]
    async fn test_sandbox_grading() {
        let evaluator = evaluator(None);
        let task = Task::code("reasoning", "coding", "p", "check 3", CodeDataset::Mbpp);

        let good = AgentOutcome::succeeded("check() { test \"$1\" -eq 3; }", 0.0, 1, 0.1);
        let grade = evaluator.grade(&good, &task, GradingStrategy::Sandbox).await;
        assert_eq!(grade.score, 1.0);
        assert_eq!(grade.cost, 0.0);

        let bad = AgentOutcome::succeeded(
            "check() { echo 'ValueError: nope' >&2; exit 1; }",
            0.0,
            1,
            0.1,
        );
        let grade = evaluator.grade(&bad, &task, GradingStrategy::Sandbox).await;
        assert_eq!(grade.score, 0.0);
        assert_eq!(
            grade.detail,
            GradeDetail::Sandbox {
                outcome: SandboxOutcome::Fail("ValueError: nope".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_exit_before_harness_scores_zero() {
        let evaluator = evaluator(None);
        let task = Task::code("reasoning", "coding", "p", "check 4", CodeDataset::Mbpp);

        let answer = AgentOutcome::succeeded("check() { test \"$1\" -eq 3; }\nexit 0", 0.0, 1, 0.1);
        let grade = evaluator.grade(&answer, &task, GradingStrategy::Sandbox).await;
        assert_eq!(grade.score, 0.0);
        assert_eq!(
            grade.detail,
            GradeDetail::Sandbox {
                outcome: SandboxOutcome::Timeout
            }
        );
    }

    #[tokio::test]
    async fn test_unrunnable_task_is_invalid_program() {
        let evaluator = evaluator(None);
        let task = Task::qa("k", "w", "p", "a");
        let answer = AgentOutcome::succeeded("x", 0.0, 1, 0.1);
        let grade = evaluator.grade(&answer, &task, GradingStrategy::Sandbox).await;
        assert!(matches!(grade.detail, GradeDetail::InvalidProgram { .. }));
    }
}
