//! LLM-backed grader.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tera::Context;
use tracing::debug;

use super::prompts::{BATCH_GATE_PROMPT, DOJO_PROMPT, GATE_PROMPT, INSTRUCTED_PROMPT, SCORE_PROMPT};
use super::verdict::{number_items, parse_batch, parse_dojo, DojoVerdict};
use crate::error::GraderError;
use crate::llm::{GenerationRequest, LlmProvider, Message, ModelPricing};

/// Raw output of one grader call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraderOutput {
    /// Text the grader answered with.
    pub output: String,
    /// Dollar cost of the call.
    pub cost: f64,
    /// Tokens used by the call.
    pub tokens: u64,
}

/// Output of one batch gate call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchGrade {
    /// One verdict per input item, in order.
    pub verdicts: Vec<String>,
    pub cost: f64,
    pub tokens: u64,
}

/// LLM judge. Cheap to clone; clones share the provider.
#[derive(Clone)]
pub struct Grader {
    provider: Arc<dyn LlmProvider>,
    model: String,
    pricing: ModelPricing,
}

impl std::fmt::Debug for Grader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grader")
            .field("model", &self.model)
            .field("pricing", &self.pricing)
            .finish()
    }
}

impl Grader {
    /// Creates a grader using `model` through `provider`.
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            provider,
            pricing: ModelPricing::for_model(&model),
            model,
        }
    }

    /// Overrides pricing.
    pub fn with_pricing(mut self, pricing: ModelPricing) -> Self {
        self.pricing = pricing;
        self
    }

    /// Model used for judgments.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Judges `prediction` as passed or failed against `ground_truth`.
    pub async fn gate(
        &self,
        task: &str,
        ground_truth: &str,
        prediction: &str,
    ) -> Result<GraderOutput, GraderError> {
        let mut context = Context::new();
        context.insert("task", task);
        context.insert("ground_truth", ground_truth);
        context.insert("prediction", prediction);
        self.complete(GATE_PROMPT, &context).await
    }

    /// Rates `prediction` from 0 to 100 against `ground_truth`.
    pub async fn score(
        &self,
        task: &str,
        ground_truth: &str,
        prediction: &str,
    ) -> Result<GraderOutput, GraderError> {
        let mut context = Context::new();
        context.insert("task", task);
        context.insert("ground_truth", ground_truth);
        context.insert("prediction", prediction);
        self.complete(SCORE_PROMPT, &context).await
    }

    /// Judges `message` as safe or unsafe under `eval_instruction`.
    pub async fn instructed(
        &self,
        eval_instruction: &str,
        message: &str,
    ) -> Result<GraderOutput, GraderError> {
        let mut context = Context::new();
        context.insert("eval_instruction", eval_instruction);
        context.insert("message", message);
        self.complete(INSTRUCTED_PROMPT, &context).await
    }

    /// Compares two answers to the same task.
    ///
    /// Returns the raw output with its parsed verdict, if any.
    pub async fn dojo(
        &self,
        task: &str,
        left: &str,
        right: &str,
    ) -> Result<(GraderOutput, Option<DojoVerdict>), GraderError> {
        let mut context = Context::new();
        context.insert("task", task);
        context.insert("left", left);
        context.insert("right", right);
        let output = self.complete(DOJO_PROMPT, &context).await?;
        let verdict = parse_dojo(&output.output);
        Ok((output, verdict))
    }

    /// Gate-grades several answers in a single call.
    ///
    /// # Errors
    ///
    /// [`GraderError::Consistency`] when the three input lists differ in
    /// length or the reply does not contain exactly one verdict per item.
    pub async fn batch_gate(
        &self,
        tasks: &[String],
        ground_truths: &[String],
        predictions: &[String],
    ) -> Result<BatchGrade, GraderError> {
        for (what, len) in [("ground truths", ground_truths.len()), ("predictions", predictions.len())] {
            if len != tasks.len() {
                return Err(GraderError::Consistency {
                    expected: tasks.len(),
                    actual: len,
                    what: what.to_string(),
                });
            }
        }

        let mut context = Context::new();
        context.insert("tasks", &number_items(tasks));
        context.insert("ground_truths", &number_items(ground_truths));
        context.insert("predictions", &number_items(predictions));
        let output = self.complete(BATCH_GATE_PROMPT, &context).await?;

        let verdicts = parse_batch(&output.output, tasks.len())?;
        Ok(BatchGrade {
            verdicts,
            cost: output.cost,
            tokens: output.tokens,
        })
    }

    async fn complete(&self, template: &str, context: &Context) -> Result<GraderOutput, GraderError> {
        let prompt = tera::Tera::one_off(template, context, false)?;
        let request = GenerationRequest::new(self.model.clone(), vec![Message::user(prompt)])
            .with_temperature(0.0);

        let response = self.provider.generate(request).await?;
        let output = response
            .first_content()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(GraderError::EmptyResponse)?
            .to_string();

        let cost = self.pricing.cost(&response.usage);
        debug!(model = %self.model, output = %output, cost = cost, "Grader responded");
        Ok(GraderOutput {
            output,
            cost,
            tokens: response.usage.total_tokens as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{Choice, GenerationResponse, Usage};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies with a fixed string and records every prompt it receives.
    struct RecordingProvider {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingProvider {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for RecordingProvider {
        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            self.prompts
                .lock()
                .unwrap()
                .push(request.messages[0].content.clone());
            Ok(GenerationResponse {
                id: "g".to_string(),
                model: request.model,
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(self.reply.clone()),
                    finish_reason: None,
                }],
                usage: Usage {
                    prompt_tokens: 500_000,
                    completion_tokens: 500_000,
                    total_tokens: 1_000_000,
                },
            })
        }
    }

    fn grader(provider: Arc<RecordingProvider>) -> Grader {
        Grader::new(provider, "judge").with_pricing(ModelPricing::new(1.0, 3.0))
    }

    #[tokio::test]
    async fn test_gate_renders_prompt_and_prices_call() {
        let provider = RecordingProvider::new("passed");
        let output = grader(provider.clone())
            .gate("2+2?", "4", "four")
            .await
            .unwrap();

        assert_eq!(output.output, "passed");
        assert!((output.cost - 2.0).abs() < 1e-9);
        assert_eq!(output.tokens, 1_000_000);

        let prompts = provider.prompts.lock().unwrap();
        assert!(prompts[0].contains("2+2?"));
        assert!(prompts[0].contains("four"));
    }

    #[tokio::test]
    async fn test_empty_reply_is_error() {
        let provider = RecordingProvider::new("  ");
        let result = grader(provider).score("t", "g", "p").await;
        assert!(matches!(result, Err(GraderError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_dojo_parses_verdict() {
        let provider = RecordingProvider::new("right");
        let (_, verdict) = grader(provider).dojo("t", "a", "b").await.unwrap();
        assert_eq!(verdict, Some(DojoVerdict::Right));
    }

    #[tokio::test]
    async fn test_batch_gate_numbers_items() {
        let provider = RecordingProvider::new("(1). passed\n(2). failed");
        let tasks = vec!["t1".to_string(), "t2".to_string()];
        let truths = vec!["a".to_string(), "b".to_string()];
        let preds = vec!["a".to_string(), "c".to_string()];

        let batch = grader(provider.clone())
            .batch_gate(&tasks, &truths, &preds)
            .await
            .unwrap();
        assert_eq!(batch.verdicts, vec!["passed", "failed"]);
        assert!(provider.prompts.lock().unwrap()[0].contains("(2). t2"));
    }

    #[tokio::test]
    async fn test_batch_gate_rejects_mismatched_inputs_without_calling() {
        let provider = RecordingProvider::new("(1). passed");
        let tasks = vec!["t1".to_string(), "t2".to_string()];
        let truths = vec!["a".to_string()];
        let preds = vec!["a".to_string(), "b".to_string()];

        let err = grader(provider.clone())
            .batch_gate(&tasks, &truths, &preds)
            .await
            .unwrap_err();
        assert!(matches!(err, GraderError::Consistency { .. }));
        assert!(provider.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_gate_rejects_short_reply() {
        let provider = RecordingProvider::new("(1). passed");
        let items = vec!["x".to_string(), "y".to_string()];

        let err = grader(provider)
            .batch_gate(&items, &items, &items)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GraderError::Consistency {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }
}
