//! High-level metric recording for evaluation runs.
//!
//! `MetricsCollector` wraps the raw Prometheus metrics and keeps labels
//! consistent. Every method silently does nothing when metrics have not
//! been initialized.

use super::prometheus::{
    GENERATIONS_TOTAL, GENERATION_LATENCY, GRADER_COST, GRADINGS_TOTAL, LLM_LATENCY,
    LLM_REQUESTS_TOTAL, LLM_TOKENS_TOTAL, SANDBOX_OUTCOMES_TOTAL, WORK_IN_FLIGHT,
};

/// Token usage information for LLM requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    /// Number of input/prompt tokens.
    pub input_tokens: u64,
    /// Number of output/completion tokens.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Create a new TokenUsage instance.
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Get the total number of tokens (input + output).
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Metrics collector for recording evaluation metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    /// Create a new MetricsCollector instance.
    pub fn new() -> Self {
        Self
    }

    /// Record one agent generation.
    ///
    /// # Arguments
    ///
    /// * `category` - Category key the task belongs to
    /// * `failed` - Whether the agent call failed
    /// * `latency_secs` - Wall-clock time around the agent call
    pub fn record_generation(&self, category: &str, failed: bool, latency_secs: f64) {
        let status = if failed { "failure" } else { "success" };

        if let Some(generations) = GENERATIONS_TOTAL.get() {
            generations.with_label_values(&[status]).inc();
        }

        if !failed {
            if let Some(latency) = GENERATION_LATENCY.get() {
                latency.with_label_values(&[category]).observe(latency_secs);
            }
        }

        tracing::trace!(
            category = category,
            status = status,
            latency_secs = latency_secs,
            "Recorded generation metric"
        );
    }

    /// Record one completed grading.
    pub fn record_grading(&self, strategy: &str, score: f64, cost: f64) {
        let result = if score > 0.0 { "pass" } else { "fail" };

        if let Some(gradings) = GRADINGS_TOTAL.get() {
            gradings.with_label_values(&[strategy, result]).inc();
        }

        if cost > 0.0 {
            if let Some(grader_cost) = GRADER_COST.get() {
                grader_cost.with_label_values(&[strategy]).inc_by(cost);
            }
        }

        tracing::trace!(
            strategy = strategy,
            score = score,
            cost = cost,
            "Recorded grading metric"
        );
    }

    /// Record one sandbox execution outcome (`pass`, `timeout` or `fail`).
    pub fn record_sandbox_outcome(&self, outcome: &str) {
        if let Some(outcomes) = SANDBOX_OUTCOMES_TOTAL.get() {
            outcomes.with_label_values(&[outcome]).inc();
        }
    }

    /// Record an LLM API request.
    pub fn record_llm_request(
        &self,
        model: &str,
        success: bool,
        latency_secs: f64,
        tokens: TokenUsage,
    ) {
        let status = if success { "success" } else { "failure" };

        if let Some(llm_requests) = LLM_REQUESTS_TOTAL.get() {
            llm_requests.with_label_values(&[model, status]).inc();
        }

        if let Some(llm_latency) = LLM_LATENCY.get() {
            llm_latency.with_label_values(&[model]).observe(latency_secs);
        }

        if let Some(llm_tokens) = LLM_TOKENS_TOTAL.get() {
            llm_tokens
                .with_label_values(&[model, "input"])
                .inc_by(tokens.input_tokens as f64);
            llm_tokens
                .with_label_values(&[model, "output"])
                .inc_by(tokens.output_tokens as f64);
        }

        tracing::trace!(
            model = model,
            status = status,
            latency_secs = latency_secs,
            input_tokens = tokens.input_tokens,
            output_tokens = tokens.output_tokens,
            "Recorded LLM request metric"
        );
    }

    /// Increment the in-flight gauge for a pool stage.
    pub fn inc_in_flight(&self, stage: &str) {
        if let Some(in_flight) = WORK_IN_FLIGHT.get() {
            in_flight.with_label_values(&[stage]).inc();
        }
    }

    /// Decrement the in-flight gauge for a pool stage.
    pub fn dec_in_flight(&self, stage: &str) {
        if let Some(in_flight) = WORK_IN_FLIGHT.get() {
            in_flight.with_label_values(&[stage]).dec();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{export_metrics, init_metrics};

    fn ensure_metrics_init() {
        let _ = init_metrics();
    }

    #[test]
    fn test_token_usage() {
        let usage = TokenUsage::new(1000, 500);
        assert_eq!(usage.total(), 1500);
        assert_eq!(TokenUsage::default().total(), 0);
    }

    #[test]
    fn test_record_generation_and_grading() {
        ensure_metrics_init();
        let collector = MetricsCollector::new();

        collector.record_generation("knowledge/world_knowledge", false, 1.5);
        collector.record_generation("knowledge/world_knowledge", true, 0.0);
        collector.record_grading("gate", 1.0, 0.002);
        collector.record_grading("sandbox", 0.0, 0.0);

        let text = export_metrics();
        assert!(text.contains("bench_forge_generations_total"));
    }

    #[test]
    fn test_record_sandbox_outcome() {
        ensure_metrics_init();
        let collector = MetricsCollector::new();

        collector.record_sandbox_outcome("pass");
        collector.record_sandbox_outcome("timeout");
        collector.record_sandbox_outcome("fail");
    }

    #[test]
    fn test_in_flight_gauge() {
        ensure_metrics_init();
        let collector = MetricsCollector::new();

        collector.inc_in_flight("generation");
        collector.dec_in_flight("generation");
    }
}
