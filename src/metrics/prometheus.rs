//! Prometheus metrics registration, recording and export.
//!
//! Recording functions are no-ops until [`init_metrics`] has run, so library
//! users that never initialize metrics pay nothing for them.

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all prompt-forge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total completion requests, labeled by model role and status.
pub static COMPLETION_REQUESTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Completion latency in seconds, labeled by model role.
pub static COMPLETION_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Optimization rounds, labeled by outcome.
pub static ROUNDS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Full-dataset evaluations performed.
pub static EVALUATIONS_TOTAL: OnceLock<Counter> = OnceLock::new();

/// Best accuracy of the most recent optimization run.
pub static BEST_ACCURACY: OnceLock<Gauge> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Calling it more than once is harmless: the first registry wins.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let completion_requests_total = CounterVec::new(
        Opts::new(
            "prompt_forge_completion_requests_total",
            "Total completion requests",
        ),
        &["role", "status"],
    )?;

    let completion_latency = HistogramVec::new(
        HistogramOpts::new(
            "prompt_forge_completion_latency_seconds",
            "Completion request latency in seconds",
        )
        .buckets(vec![0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 120.0]),
        &["role"],
    )?;

    let rounds_total = CounterVec::new(
        Opts::new("prompt_forge_rounds_total", "Optimization rounds by outcome"),
        &["outcome"],
    )?;

    let evaluations_total = Counter::new(
        "prompt_forge_evaluations_total",
        "Full-dataset prompt evaluations",
    )?;

    let best_accuracy = Gauge::new(
        "prompt_forge_best_accuracy",
        "Best accuracy of the most recent optimization run",
    )?;

    registry.register(Box::new(completion_requests_total.clone()))?;
    registry.register(Box::new(completion_latency.clone()))?;
    registry.register(Box::new(rounds_total.clone()))?;
    registry.register(Box::new(evaluations_total.clone()))?;
    registry.register(Box::new(best_accuracy.clone()))?;

    // A concurrent initializer may have won the race; its metrics stay.
    let _ = REGISTRY.set(registry);
    let _ = COMPLETION_REQUESTS_TOTAL.set(completion_requests_total);
    let _ = COMPLETION_LATENCY.set(completion_latency);
    let _ = ROUNDS_TOTAL.set(rounds_total);
    let _ = EVALUATIONS_TOTAL.set(evaluations_total);
    let _ = BEST_ACCURACY.set(best_accuracy);

    tracing::debug!("Prometheus metrics initialized");

    Ok(())
}

/// Record one completion call.
pub fn record_completion(role: &str, status: &str, latency_secs: f64) {
    if let Some(counter) = COMPLETION_REQUESTS_TOTAL.get() {
        counter.with_label_values(&[role, status]).inc();
    }
    if let Some(histogram) = COMPLETION_LATENCY.get() {
        histogram.with_label_values(&[role]).observe(latency_secs);
    }
}

/// Record the outcome of one optimization round.
pub fn record_round(outcome: &str) {
    if let Some(counter) = ROUNDS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Record one full-dataset evaluation.
pub fn record_evaluation() {
    if let Some(counter) = EVALUATIONS_TOTAL.get() {
        counter.inc();
    }
}

/// Publish the current best accuracy.
pub fn set_best_accuracy(accuracy: f64) {
    if let Some(gauge) = BEST_ACCURACY.get() {
        gauge.set(accuracy);
    }
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
