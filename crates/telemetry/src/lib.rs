//! Call monitoring for language-model APIs.
//!
//! Wraps every outbound model call with sliding-window rate limiting,
//! per-request cost accounting from a pricing table, running usage
//! analytics with a bounded history, failure classification, and structured
//! `tracing` events. Analytics can be exported as a JSON document.

pub mod classifier;
pub mod model;
pub mod monitor;
pub mod pricing;
pub mod ratelimit;
pub mod recorder;

pub use classifier::{Classification, ErrorAnalysis, ErrorCategory, ErrorClassifier};
pub use model::{
    AnalyticsExport, AnalyticsInsights, CallOutcome, ErrorInfo, RequestMetrics, UsageAnalytics,
};
pub use monitor::{CallPhase, Monitor, MonitorError, MonitoredProvider};
pub use pricing::{ModelPricing, PricingTable};
pub use ratelimit::RateLimiter;
pub use recorder::MetricsRecorder;

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to record metrics: {0}")]
    Recording(String),

    #[error("default pricing model has no entry: {0}")]
    UnknownDefaultModel(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
