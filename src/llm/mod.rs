//! LLM integration for bench-forge.
//!
//! Provides the [`LlmProvider`] seam used by graders and chat agents, an
//! OpenAI-compatible client, and per-model pricing.
//!
//! ```ignore
//! use bench_forge::llm::{LiteLlmClient, GenerationRequest, Message, LlmProvider};
//!
//! let client = LiteLlmClient::from_env()?;
//! let request = GenerationRequest::new("", vec![Message::user("2 + 2 = ?")]);
//! let response = client.generate(request).await?;
//! ```

pub mod cost;
pub mod litellm;

pub use cost::{calculate_cost, ModelPricing};
pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, Usage,
    DEFAULT_MODEL, OPENROUTER_API_BASE,
};
