//! Data model for per-request metrics, aggregated analytics, and exports.

use callmeter_core::{ProviderError, Usage};
use chrono::{DateTime, Local, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ── Per-request ───────────────────────────────────────────────────────────

/// Error details carried by a failed outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Machine-readable kind, used as the error counter key.
    pub kind: String,
    pub message: String,
}

impl From<&ProviderError> for ErrorInfo {
    fn from(error: &ProviderError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// What a finished call attempt reports to the recorder.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub request_id: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Wall-clock duration of the call in seconds.
    pub response_time: f64,
    pub success: bool,
    pub error: Option<ErrorInfo>,
    pub retry_count: u32,
}

impl CallOutcome {
    /// A successful call with the billed token counts.
    pub fn success(model: impl Into<String>, usage: Usage, response_time: f64) -> Self {
        Self {
            request_id: new_request_id(),
            model: model.into(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            response_time,
            success: true,
            error: None,
            retry_count: 0,
        }
    }

    /// A failed call. Token counts default to zero; use
    /// [`with_usage`](Self::with_usage) when partial usage is known.
    pub fn failure(model: impl Into<String>, error: ErrorInfo, response_time: f64) -> Self {
        Self {
            request_id: new_request_id(),
            model: model.into(),
            input_tokens: 0,
            output_tokens: 0,
            response_time,
            success: false,
            error: Some(error),
            retry_count: 0,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.input_tokens = usage.input_tokens;
        self.output_tokens = usage.output_tokens;
        self
    }

    pub fn with_retries(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}

/// Generate a request id (`req_<uuid>`).
pub fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().simple())
}

/// Metrics for a single completed call attempt. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestMetrics {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Seconds.
    pub response_time: f64,
    pub cost_usd: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

impl RequestMetrics {
    /// Total tokens (input + output).
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens as u64 + self.output_tokens as u64
    }

    /// Hour of day in the machine's local time zone.
    pub fn local_hour(&self) -> u32 {
        self.timestamp.with_timezone(&Local).hour()
    }
}

// ── Aggregate ─────────────────────────────────────────────────────────────

/// Running totals over every recorded call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UsageAnalytics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    /// Seconds.
    pub avg_response_time: f64,
    pub requests_by_model: HashMap<String, u64>,
    pub errors_by_type: HashMap<String, u64>,
    /// Local hour of day (0–23) → request count.
    pub hourly_usage: BTreeMap<u32, u64>,
}

impl UsageAnalytics {
    /// Fold one request into the totals.
    pub fn apply(&mut self, metrics: &RequestMetrics) {
        self.total_requests += 1;

        if metrics.success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
            if let Some(kind) = &metrics.error_type {
                *self.errors_by_type.entry(kind.clone()).or_insert(0) += 1;
            }
        }

        self.total_tokens += metrics.total_tokens();
        self.total_cost_usd += metrics.cost_usd;
        *self
            .requests_by_model
            .entry(metrics.model.clone())
            .or_insert(0) += 1;

        let n = self.total_requests as f64;
        self.avg_response_time = (self.avg_response_time * (n - 1.0) + metrics.response_time) / n;

        *self
            .hourly_usage
            .entry(metrics.local_hour())
            .or_insert(0) += 1;
    }

    /// Successful requests as a percentage of all requests.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / self.total_requests as f64 * 100.0
    }

    /// Average cost of one request.
    pub fn cost_per_request(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.total_cost_usd / self.total_requests as f64
    }

    /// Derived ratings for dashboards.
    pub fn insights(&self) -> AnalyticsInsights {
        AnalyticsInsights::from(self)
    }
}

/// Snapshot written by an export, with the time it was taken.
///
/// Field-for-field copy of [`UsageAnalytics`] plus `exported_at`, kept flat
/// so the document reads the same as the live aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsExport {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub avg_response_time: f64,
    pub requests_by_model: HashMap<String, u64>,
    pub errors_by_type: HashMap<String, u64>,
    pub hourly_usage: BTreeMap<u32, u64>,
    /// RFC 3339 timestamp.
    pub exported_at: String,
}

impl AnalyticsExport {
    pub fn new(analytics: UsageAnalytics, exported_at: DateTime<Utc>) -> Self {
        Self {
            total_requests: analytics.total_requests,
            successful_requests: analytics.successful_requests,
            failed_requests: analytics.failed_requests,
            total_tokens: analytics.total_tokens,
            total_cost_usd: analytics.total_cost_usd,
            avg_response_time: analytics.avg_response_time,
            requests_by_model: analytics.requests_by_model,
            errors_by_type: analytics.errors_by_type,
            hourly_usage: analytics.hourly_usage,
            exported_at: exported_at.to_rfc3339(),
        }
    }

    /// The analytics part of the document.
    pub fn analytics(&self) -> UsageAnalytics {
        UsageAnalytics {
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            failed_requests: self.failed_requests,
            total_tokens: self.total_tokens,
            total_cost_usd: self.total_cost_usd,
            avg_response_time: self.avg_response_time,
            requests_by_model: self.requests_by_model.clone(),
            errors_by_type: self.errors_by_type.clone(),
            hourly_usage: self.hourly_usage.clone(),
        }
    }
}

// ── Insights ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuccessRating {
    Excellent,
    Good,
    NeedsAttention,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LatencyRating {
    Fast,
    Normal,
    Slow,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CostRating {
    Low,
    Normal,
    High,
}

impl std::fmt::Display for SuccessRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Excellent => write!(f, "excellent"),
            Self::Good => write!(f, "good"),
            Self::NeedsAttention => write!(f, "needs attention"),
        }
    }
}

impl std::fmt::Display for LatencyRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Normal => write!(f, "normal"),
            Self::Slow => write!(f, "slow"),
        }
    }
}

impl std::fmt::Display for CostRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Performance summary derived from [`UsageAnalytics`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsInsights {
    /// Percent, 0–100.
    pub success_rate: f64,
    pub success: SuccessRating,
    pub avg_response_time: f64,
    pub latency: LatencyRating,
    pub cost_per_request: f64,
    pub cost: CostRating,
}

impl From<&UsageAnalytics> for AnalyticsInsights {
    fn from(analytics: &UsageAnalytics) -> Self {
        let success_rate = analytics.success_rate();
        let success = if success_rate >= 95.0 {
            SuccessRating::Excellent
        } else if success_rate >= 80.0 {
            SuccessRating::Good
        } else {
            SuccessRating::NeedsAttention
        };

        let avg = analytics.avg_response_time;
        let latency = if avg < 2.0 {
            LatencyRating::Fast
        } else if avg > 5.0 {
            LatencyRating::Slow
        } else {
            LatencyRating::Normal
        };

        let cost_per_request = analytics.cost_per_request();
        let cost = if cost_per_request < 0.01 {
            CostRating::Low
        } else if cost_per_request > 0.05 {
            CostRating::High
        } else {
            CostRating::Normal
        };

        Self {
            success_rate,
            success,
            avg_response_time: avg,
            latency,
            cost_per_request,
            cost,
        }
    }
}
