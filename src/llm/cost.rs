//! Per-model token pricing.
//!
//! Agent and grader costs are reported in dollars as plain `f64`, matching
//! the fields of `EvalResult`.

use serde::{Deserialize, Serialize};

use super::litellm::Usage;

/// Price of a model per one million tokens, in dollars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Cost per 1M prompt tokens.
    pub input_per_1m: f64,
    /// Cost per 1M completion tokens.
    pub output_per_1m: f64,
}

/// Known prices, matched by model-name prefix after any `provider/` segment.
const KNOWN_PRICING: &[(&str, f64, f64)] = &[
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-4o", 2.50, 10.00),
    ("gpt-4-turbo", 10.00, 30.00),
    ("gpt-4", 30.00, 60.00),
    ("gpt-3.5-turbo", 0.50, 1.50),
    ("claude-3.5-sonnet", 3.00, 15.00),
    ("claude-3-haiku", 0.25, 1.25),
    ("claude-3-opus", 15.00, 75.00),
];

impl ModelPricing {
    /// Creates a pricing entry.
    pub fn new(input_per_1m: f64, output_per_1m: f64) -> Self {
        Self {
            input_per_1m,
            output_per_1m,
        }
    }

    /// Pricing that makes every call free.
    pub fn free() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Looks up a model's price; unknown models are free.
    pub fn for_model(model: &str) -> Self {
        let name = model.rsplit('/').next().unwrap_or(model);
        KNOWN_PRICING
            .iter()
            .find(|(prefix, _, _)| name.starts_with(prefix))
            .map(|&(_, input, output)| Self::new(input, output))
            .unwrap_or_else(Self::free)
    }

    /// Dollar cost of one call with the given usage.
    pub fn cost(&self, usage: &Usage) -> f64 {
        calculate_cost(
            usage.prompt_tokens as u64,
            usage.completion_tokens as u64,
            self.input_per_1m,
            self.output_per_1m,
        )
    }
}

/// Dollar cost for a token count at per-1M-token prices.
pub fn calculate_cost(
    input_tokens: u64,
    output_tokens: u64,
    cost_per_1m_input: f64,
    cost_per_1m_output: f64,
) -> f64 {
    (input_tokens as f64 / 1_000_000.0) * cost_per_1m_input
        + (output_tokens as f64 / 1_000_000.0) * cost_per_1m_output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_cost() {
        let cost = calculate_cost(1_000_000, 500_000, 3.0, 15.0);
        assert!((cost - 10.5).abs() < 1e-9);
    }

    #[test]
    fn test_for_model_strips_provider_and_prefers_specific_match() {
        let mini = ModelPricing::for_model("openai/gpt-4o-mini");
        assert_eq!(mini, ModelPricing::new(0.15, 0.60));

        let full = ModelPricing::for_model("gpt-4o-2024-08-06");
        assert_eq!(full, ModelPricing::new(2.50, 10.00));
    }

    #[test]
    fn test_unknown_model_is_free() {
        let pricing = ModelPricing::for_model("local/llama");
        let usage = Usage {
            prompt_tokens: 1000,
            completion_tokens: 1000,
            total_tokens: 2000,
        };
        assert_eq!(pricing.cost(&usage), 0.0);
    }
}
