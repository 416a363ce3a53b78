//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by bench_forge and provides
//! functions for initializing, registering, and exporting them.

use prometheus::{CounterVec, Encoder, GaugeVec, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all bench_forge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Agent generations, labeled by status (success/failure).
pub static GENERATIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Agent call latency in seconds, labeled by category.
pub static GENERATION_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Gradings, labeled by strategy and result (pass/fail).
pub static GRADINGS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Sandbox executions, labeled by outcome tag.
pub static SANDBOX_OUTCOMES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Grader spend in dollars, labeled by grader kind.
pub static GRADER_COST: OnceLock<CounterVec> = OnceLock::new();

/// Work items currently in a pool, labeled by stage.
pub static WORK_IN_FLIGHT: OnceLock<GaugeVec> = OnceLock::new();

/// Total LLM API requests, labeled by model and status.
pub static LLM_REQUESTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// LLM API request latency in seconds, labeled by model.
pub static LLM_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Total tokens used, labeled by model and type (input/output).
pub static LLM_TOKENS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Later calls leave the first registration in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due to
/// duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let generations_total = CounterVec::new(
        Opts::new("bench_forge_generations_total", "Agent generations"),
        &["status"],
    )?;

    let generation_latency = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "bench_forge_generation_latency_seconds",
            "Agent call latency in seconds",
        )
        .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]),
        &["category"],
    )?;

    let gradings_total = CounterVec::new(
        Opts::new("bench_forge_gradings_total", "Completed gradings"),
        &["strategy", "result"],
    )?;

    let sandbox_outcomes_total = CounterVec::new(
        Opts::new(
            "bench_forge_sandbox_outcomes_total",
            "Sandboxed executions by outcome",
        ),
        &["outcome"],
    )?;

    let grader_cost = CounterVec::new(
        Opts::new("bench_forge_grader_cost_dollars", "Grader spend in dollars"),
        &["grader"],
    )?;

    let work_in_flight = GaugeVec::new(
        Opts::new("bench_forge_work_in_flight", "Work items currently in a pool"),
        &["stage"],
    )?;

    let llm_requests_total = CounterVec::new(
        Opts::new("bench_forge_llm_requests_total", "Total LLM API requests"),
        &["model", "status"],
    )?;

    let llm_latency = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "bench_forge_llm_latency_seconds",
            "LLM API request latency in seconds",
        )
        .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["model"],
    )?;

    let llm_tokens_total = CounterVec::new(
        Opts::new("bench_forge_llm_tokens_total", "Total tokens used"),
        &["model", "type"],
    )?;

    registry.register(Box::new(generations_total.clone()))?;
    registry.register(Box::new(generation_latency.clone()))?;
    registry.register(Box::new(gradings_total.clone()))?;
    registry.register(Box::new(sandbox_outcomes_total.clone()))?;
    registry.register(Box::new(grader_cost.clone()))?;
    registry.register(Box::new(work_in_flight.clone()))?;
    registry.register(Box::new(llm_requests_total.clone()))?;
    registry.register(Box::new(llm_latency.clone()))?;
    registry.register(Box::new(llm_tokens_total.clone()))?;

    // Already-set cells mean metrics were initialized earlier.
    let _ = REGISTRY.set(registry);
    let _ = GENERATIONS_TOTAL.set(generations_total);
    let _ = GENERATION_LATENCY.set(generation_latency);
    let _ = GRADINGS_TOTAL.set(gradings_total);
    let _ = SANDBOX_OUTCOMES_TOTAL.set(sandbox_outcomes_total);
    let _ = GRADER_COST.set(grader_cost);
    let _ = WORK_IN_FLIGHT.set(work_in_flight);
    let _ = LLM_REQUESTS_TOTAL.set(llm_requests_total);
    let _ = LLM_LATENCY.set(llm_latency);
    let _ = LLM_TOKENS_TOTAL.set(llm_tokens_total);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns an explanatory comment line if the registry has not been
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
