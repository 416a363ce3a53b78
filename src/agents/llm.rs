//! Single-model chat agent.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Agent, AgentError, AgentResponse};
use crate::llm::{GenerationRequest, LlmProvider, Message, ModelPricing};

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a capable assistant. Answer the user's task directly and completely.";

/// Agent that answers with one chat completion per instruction.
///
/// Conversation history is scratch state: each fork starts empty, and
/// [`Agent::reset`] clears it.
pub struct LlmAgent {
    provider: Arc<dyn LlmProvider>,
    model: String,
    system_prompt: String,
    pricing: ModelPricing,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    history: Vec<Message>,
}

impl LlmAgent {
    /// Creates an agent for `model`, priced from the known pricing table.
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            provider,
            pricing: ModelPricing::for_model(&model),
            model,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: None,
            max_tokens: None,
            history: Vec::new(),
        }
    }

    /// Sets the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Overrides pricing.
    pub fn with_pricing(mut self, pricing: ModelPricing) -> Self {
        self.pricing = pricing;
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the completion token cap.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Messages exchanged so far.
    pub fn history(&self) -> &[Message] {
        &self.history
    }
}

#[async_trait]
impl Agent for LlmAgent {
    fn name(&self) -> &str {
        &self.model
    }

    async fn run(&mut self, instruction: &str) -> Result<AgentResponse, AgentError> {
        self.history.push(Message::user(instruction));

        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.push(Message::system(self.system_prompt.clone()));
        messages.extend(self.history.iter().cloned());

        let mut request = GenerationRequest::new(self.model.clone(), messages);
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let response = self.provider.generate(request).await?;
        let content = response
            .first_content()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(AgentError::EmptyOutput)?
            .to_string();

        self.history.push(Message::assistant(content.clone()));
        Ok(AgentResponse::new(
            content,
            self.pricing.cost(&response.usage),
            response.usage.total_tokens as u64,
        ))
    }

    fn fork(&self) -> Box<dyn Agent> {
        Box::new(Self {
            provider: Arc::clone(&self.provider),
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            pricing: self.pricing,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            history: Vec::new(),
        })
    }

    fn reset(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{Choice, GenerationResponse, Usage};

    struct FixedProvider {
        reply: Option<String>,
    }

    #[async_trait]
    impl LlmProvider for FixedProvider {
        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            let reply = self
                .reply
                .clone()
                .ok_or_else(|| LlmError::RequestFailed("offline".to_string()))?;
            Ok(GenerationResponse {
                id: "r".to_string(),
                model: request.model,
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(reply),
                    finish_reason: Some("stop".to_string()),
                }],
                usage: Usage {
                    prompt_tokens: 1_000_000,
                    completion_tokens: 0,
                    total_tokens: 1_000_000,
                },
            })
        }
    }

    #[tokio::test]
    async fn test_run_returns_priced_answer_and_keeps_history() {
        let provider = Arc::new(FixedProvider {
            reply: Some(" 4 ".to_string()),
        });
        let mut agent = LlmAgent::new(provider, "m").with_pricing(ModelPricing::new(2.0, 0.0));

        let response = agent.run("2+2?").await.unwrap();
        assert_eq!(response.output, "4");
        assert!((response.cost - 2.0).abs() < 1e-9);
        assert_eq!(response.tokens, 1_000_000);
        assert_eq!(agent.history().len(), 2);

        let fork = agent.fork();
        assert_eq!(fork.name(), "m");

        agent.reset();
        assert!(agent.history().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_is_agent_error() {
        let provider = Arc::new(FixedProvider { reply: None });
        let mut agent = LlmAgent::new(provider, "m");
        assert!(matches!(agent.run("x").await, Err(AgentError::Llm(_))));
    }

    #[tokio::test]
    async fn test_blank_reply_is_empty_output() {
        let provider = Arc::new(FixedProvider {
            reply: Some("   ".to_string()),
        });
        let mut agent = LlmAgent::new(provider, "m");
        assert!(matches!(agent.run("x").await, Err(AgentError::EmptyOutput)));
    }
}
