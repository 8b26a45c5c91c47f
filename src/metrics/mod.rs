//! Prometheus-based metrics for completion traffic and optimization rounds.
//!
//! ```ignore
//! use prompt_forge::metrics::{init_metrics, export_metrics};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! // ... run an optimization ...
//! println!("{}", export_metrics());
//! ```

pub mod prometheus;

pub use self::prometheus::{
    export_metrics, init_metrics, record_completion, record_evaluation, record_round,
    set_best_accuracy, BEST_ACCURACY, COMPLETION_LATENCY, COMPLETION_REQUESTS_TOTAL,
    EVALUATIONS_TOTAL, REGISTRY, ROUNDS_TOTAL,
};
