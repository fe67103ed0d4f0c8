//! Thread-safe metrics recorder — prices each call, folds it into the
//! running analytics, keeps a bounded history, and serves snapshots and
//! exports.

use crate::TelemetryError;
use crate::model::*;
use crate::pricing::PricingTable;
use chrono::Utc;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Default capacity of the request history.
pub const DEFAULT_HISTORY: usize = 1000;

/// The single owner of the analytics aggregate and request history.
///
/// Both live behind one `Mutex`, so every recorded call updates them as one
/// unit and readers never see a half-applied request.
pub struct MetricsRecorder {
    /// Pricing table for cost computation.
    pricing: Arc<PricingTable>,
    /// Maximum number of history entries.
    capacity: usize,
    state: Mutex<RecorderState>,
}

#[derive(Debug, Default)]
struct RecorderState {
    analytics: UsageAnalytics,
    /// Oldest first.
    history: VecDeque<RequestMetrics>,
}

impl MetricsRecorder {
    /// Create a recorder with the given pricing and history capacity.
    pub fn new(pricing: Arc<PricingTable>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pricing,
            capacity,
            state: Mutex::new(RecorderState {
                analytics: UsageAnalytics::default(),
                history: VecDeque::with_capacity(capacity),
            }),
        }
    }

    /// Recorder with the built-in pricing table and default capacity.
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(PricingTable::with_defaults()), DEFAULT_HISTORY)
    }

    /// Get a reference to the pricing table.
    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Maximum number of retained history entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record one finished call attempt.
    ///
    /// Cost is computed from whatever token counts the outcome carries,
    /// success or not.
    pub fn record(&self, outcome: CallOutcome) -> Result<RequestMetrics, TelemetryError> {
        let cost_usd =
            self.pricing
                .compute_cost(&outcome.model, outcome.input_tokens, outcome.output_tokens);
        let (error_type, error_message) = match outcome.error {
            Some(ErrorInfo { kind, message }) => (Some(kind), Some(message)),
            None => (None, None),
        };

        let mut state = self.state.lock().map_err(|_| {
            TelemetryError::Recording("metrics state lock poisoned".into())
        })?;

        let metrics = RequestMetrics {
            request_id: outcome.request_id,
            timestamp: Utc::now(),
            model: outcome.model,
            input_tokens: outcome.input_tokens,
            output_tokens: outcome.output_tokens,
            response_time: outcome.response_time.max(0.0),
            cost_usd,
            success: outcome.success,
            error_type,
            error_message,
            retry_count: outcome.retry_count,
        };

        state.analytics.apply(&metrics);
        if state.history.len() >= self.capacity {
            state.history.pop_front();
        }
        state.history.push_back(metrics.clone());

        Ok(metrics)
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// Copy of the current analytics.
    pub fn snapshot(&self) -> UsageAnalytics {
        self.read().analytics.clone()
    }

    /// Derived success/latency/cost ratings.
    pub fn insights(&self) -> AnalyticsInsights {
        self.snapshot().insights()
    }

    /// Most recent requests, newest first.
    pub fn recent(&self, limit: usize) -> Vec<RequestMetrics> {
        self.read().history.iter().rev().take(limit).cloned().collect()
    }

    /// The full retained history, oldest first.
    pub fn history(&self) -> Vec<RequestMetrics> {
        self.read().history.iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.read().history.len()
    }

    // ── Export ────────────────────────────────────────────────────────

    /// Snapshot stamped with the current time.
    pub fn export_snapshot(&self) -> AnalyticsExport {
        AnalyticsExport::new(self.snapshot(), Utc::now())
    }

    /// Pretty-printed JSON export document.
    pub fn export_json(&self) -> Result<String, TelemetryError> {
        Ok(serde_json::to_string_pretty(&self.export_snapshot())?)
    }

    /// Write the export document to `path`, returning what was written.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<AnalyticsExport, TelemetryError> {
        let path = path.as_ref();
        let export = self.export_snapshot();
        std::fs::write(path, serde_json::to_string_pretty(&export)?)?;
        tracing::info!(
            path = %path.display(),
            total_requests = export.total_requests,
            "Analytics exported"
        );
        Ok(export)
    }

    // Readers tolerate poisoning: every field is updated before the guard drops.
    fn read(&self) -> MutexGuard<'_, RecorderState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Poison the state lock, for exercising the recording-failure path.
    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let _ = std::thread::scope(|s| {
            s.spawn(|| {
                let _guard = self.state.lock();
                panic!("poisoning metrics state");
            })
            .join()
        });
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Read an export document written by [`MetricsRecorder::export`].
pub fn read_export(path: impl AsRef<Path>) -> Result<AnalyticsExport, TelemetryError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use callmeter_core::Usage;

    fn make_recorder(capacity: usize) -> MetricsRecorder {
        MetricsRecorder::new(Arc::new(PricingTable::with_defaults()), capacity)
    }

    fn ok(model: &str, tokens: (u32, u32), secs: f64) -> CallOutcome {
        CallOutcome::success(model, Usage::new(tokens.0, tokens.1), secs)
    }

    fn failed(kind: &str, secs: f64) -> CallOutcome {
        CallOutcome::failure(
            "claude-3-5-sonnet-20241022",
            ErrorInfo {
                kind: kind.into(),
                message: format!("{kind} happened"),
            },
            secs,
        )
    }

    #[test]
    fn counters_match_recorded_outcomes() {
        let recorder = make_recorder(100);
        for i in 0..25 {
            let outcome = if i % 5 == 0 {
                failed("network", 1.0)
            } else {
                ok("claude-3-5-haiku-20241022", (100, 10), 1.0)
            };
            recorder.record(outcome).unwrap();
        }

        let a = recorder.snapshot();
        assert_eq!(a.total_requests, 25);
        assert_eq!(a.successful_requests + a.failed_requests, 25);
        assert_eq!(a.failed_requests, 5);
        assert_eq!(a.errors_by_type["network"], 5);
        assert_eq!(a.requests_by_model.values().sum::<u64>(), 25);
        assert_eq!(a.hourly_usage.values().sum::<u64>(), 25);
        assert_eq!(a.total_tokens, 20 * 110);
    }

    #[test]
    fn running_average_is_arithmetic_mean() {
        let recorder = make_recorder(10);
        let times = [0.25, 1.0, 3.5, 0.75, 2.0];
        for t in times {
            recorder.record(ok("m", (1, 1), t)).unwrap();
        }
        let mean = times.iter().sum::<f64>() / times.len() as f64;
        assert!((recorder.snapshot().avg_response_time - mean).abs() < 1e-12);
    }

    #[test]
    fn history_is_fifo_at_capacity() {
        let recorder = make_recorder(5);
        let ids: Vec<String> = (0..8)
            .map(|i| {
                recorder
                    .record(ok("m", (1, 1), 0.1).with_request_id(format!("req_{i}")))
                    .unwrap()
                    .request_id
            })
            .collect();

        assert_eq!(recorder.history_len(), 5);
        let kept: Vec<String> = recorder.history().into_iter().map(|m| m.request_id).collect();
        assert_eq!(kept, ids[3..].to_vec());

        let recent = recorder.recent(2);
        assert_eq!(recent[0].request_id, "req_7");
        assert_eq!(recent[1].request_id, "req_6");

        // Aggregates still count evicted entries.
        assert_eq!(recorder.snapshot().total_requests, 8);
    }

    #[test]
    fn cost_uses_pricing_table() {
        let recorder = make_recorder(10);
        let m = recorder
            .record(ok("claude-3-5-sonnet-20241022", (1000, 1000), 1.0))
            .unwrap();
        assert!((m.cost_usd - 0.018).abs() < 1e-12);

        // Unknown model falls back to the default entry.
        let m = recorder.record(ok("mystery", (1000, 1000), 1.0)).unwrap();
        assert!((m.cost_usd - 0.018).abs() < 1e-12);
        assert!((recorder.snapshot().total_cost_usd - 0.036).abs() < 1e-12);
    }

    #[test]
    fn failed_call_cost_follows_tokens() {
        let recorder = make_recorder(10);
        let m = recorder.record(failed("timeout", 30.0)).unwrap();
        assert_eq!(m.cost_usd, 0.0);
        assert_eq!(m.error_type.as_deref(), Some("timeout"));

        let partial = failed("network", 2.0).with_usage(Usage::new(1000, 0));
        let m = recorder.record(partial).unwrap();
        assert!((m.cost_usd - 0.003).abs() < 1e-12);
        assert!(!m.success);
    }

    #[test]
    fn snapshot_is_detached() {
        let recorder = make_recorder(10);
        recorder.record(ok("m", (1, 1), 1.0)).unwrap();
        let before = recorder.snapshot();
        recorder.record(ok("m", (1, 1), 1.0)).unwrap();
        assert_eq!(before.total_requests, 1);
        assert_eq!(recorder.snapshot().total_requests, 2);
    }

    #[test]
    fn export_round_trip() {
        let recorder = make_recorder(10);
        recorder
            .record(ok("claude-3-opus-20240229", (1234, 567), 1.25))
            .unwrap();
        recorder.record(failed("rate_limited", 0.5)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analytics.json");
        let written = recorder.export(&path).unwrap();
        let snapshot = recorder.snapshot();

        let parsed = read_export(&path).unwrap();
        assert_eq!(parsed.exported_at, written.exported_at);
        assert!(chrono::DateTime::parse_from_rfc3339(&parsed.exported_at).is_ok());

        let a = parsed.analytics();
        assert_eq!(a.total_requests, snapshot.total_requests);
        assert_eq!(a.successful_requests, snapshot.successful_requests);
        assert_eq!(a.failed_requests, snapshot.failed_requests);
        assert_eq!(a.total_tokens, snapshot.total_tokens);
        assert_eq!(a.requests_by_model, snapshot.requests_by_model);
        assert_eq!(a.errors_by_type, snapshot.errors_by_type);
        assert_eq!(a.hourly_usage, snapshot.hourly_usage);
        assert!((a.total_cost_usd - snapshot.total_cost_usd).abs() < 1e-12);
        assert!((a.avg_response_time - snapshot.avg_response_time).abs() < 1e-12);
    }

    #[test]
    fn export_json_names_every_field() {
        let recorder = make_recorder(10);
        let json = recorder.export_json().unwrap();
        for field in [
            "total_requests",
            "successful_requests",
            "failed_requests",
            "total_tokens",
            "total_cost_usd",
            "avg_response_time",
            "requests_by_model",
            "errors_by_type",
            "hourly_usage",
            "exported_at",
        ] {
            assert!(json.contains(field), "missing {field}");
        }
    }

    #[test]
    fn thousand_threads_lose_no_updates() {
        let recorder = make_recorder(DEFAULT_HISTORY);
        let times: Vec<f64> = (0..1000).map(|i| (i % 10) as f64 * 0.1).collect();

        std::thread::scope(|s| {
            for &t in &times {
                let recorder = &recorder;
                s.spawn(move || {
                    recorder.record(ok("m", (2, 3), t)).unwrap();
                });
            }
        });

        let a = recorder.snapshot();
        assert_eq!(a.total_requests, 1000);
        assert_eq!(a.successful_requests, 1000);
        assert_eq!(a.total_tokens, 5000);
        assert_eq!(recorder.history_len(), 1000);
        let mean = times.iter().sum::<f64>() / 1000.0;
        assert!((a.avg_response_time - mean).abs() < 1e-9);
    }

    #[test]
    fn poisoned_state_reports_recording_failure() {
        let recorder = make_recorder(10);
        recorder.record(ok("m", (1, 1), 1.0)).unwrap();
        recorder.poison();

        let err = recorder.record(ok("m", (1, 1), 1.0)).unwrap_err();
        assert!(matches!(err, TelemetryError::Recording(_)));
        // Reads still work.
        assert_eq!(recorder.snapshot().total_requests, 1);
    }

    #[test]
    fn default_recorder() {
        let recorder = MetricsRecorder::default();
        assert_eq!(recorder.capacity(), DEFAULT_HISTORY);
        assert_eq!(recorder.history_len(), 0);
        assert_eq!(recorder.pricing().len(), 3);
    }
}
