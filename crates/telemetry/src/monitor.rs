//! Monitored model calls.
//!
//! [`Monitor::call`] admits a request through the rate limiter, runs the
//! caller's operation with no lock held, then records the outcome, classifies
//! any failure, and logs one line at start and one at completion.
//! [`MonitoredProvider`] does the same for any [`Provider`].

use crate::classifier::{ErrorAnalysis, ErrorClassifier};
use crate::model::{CallOutcome, ErrorInfo, new_request_id};
use crate::pricing::PricingTable;
use crate::ratelimit::RateLimiter;
use crate::recorder::MetricsRecorder;
use crate::TelemetryError;
use async_trait::async_trait;
use callmeter_config::AppConfig;
use callmeter_core::{Provider, ProviderError, ProviderRequest, ProviderResponse};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle of a single monitored call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Idle,
    Admitted,
    InFlight,
    Completed,
    Failed,
}

impl std::fmt::Display for CallPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Admitted => write!(f, "admitted"),
            Self::InFlight => write!(f, "in_flight"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Why a monitored call did not produce a response.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// The rate limiter still had no room after one wait cycle.
    #[error("rate limit reached, retry after {:.1}s", .retry_after.as_secs_f64())]
    AdmissionDenied { retry_after: Duration },

    /// The call itself failed. `source` is the untouched provider error.
    #[error("{source}")]
    Call {
        source: ProviderError,
        analysis: ErrorAnalysis,
    },
}

impl MonitorError {
    /// The provider error, if the call got as far as the provider.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::Call { source, .. } => Some(source),
            Self::AdmissionDenied { .. } => None,
        }
    }

    pub fn analysis(&self) -> Option<&ErrorAnalysis> {
        match self {
            Self::Call { analysis, .. } => Some(analysis),
            Self::AdmissionDenied { .. } => None,
        }
    }
}

/// Shared monitoring context: one limiter, one recorder, one classifier.
///
/// Build once and share behind an `Arc`.
pub struct Monitor {
    limiter: RateLimiter,
    recorder: MetricsRecorder,
    classifier: ErrorClassifier,
    call_timeout: Option<Duration>,
}

impl Monitor {
    /// Create a monitor with the default classifier and no call timeout.
    pub fn new(limiter: RateLimiter, recorder: MetricsRecorder) -> Self {
        Self {
            limiter,
            recorder,
            classifier: ErrorClassifier::new(),
            call_timeout: None,
        }
    }

    /// Build the limiter, pricing table and recorder from config.
    pub fn from_config(config: &AppConfig) -> Result<Self, TelemetryError> {
        let pricing = PricingTable::from_config(&config.pricing)?;
        let recorder = MetricsRecorder::new(Arc::new(pricing), config.telemetry.max_history);
        let monitor = Self::new(RateLimiter::from_config(&config.rate_limit), recorder)
            .with_timeout(config.call_timeout());

        info!(
            requests_per_minute = config.rate_limit.requests_per_minute,
            requests_per_hour = config.rate_limit.requests_per_hour,
            rate_limit_enabled = config.rate_limit.enabled,
            max_history = config.telemetry.max_history,
            "Monitor initialized"
        );
        Ok(monitor)
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Per-call time limit. `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn recorder(&self) -> &MetricsRecorder {
        &self.recorder
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }

    /// Run `op` as a monitored call.
    ///
    /// The response or provider error is returned unchanged; telemetry
    /// failures are logged and never replace the call's own result.
    pub async fn call<F, Fut>(
        &self,
        request: ProviderRequest,
        op: F,
    ) -> Result<ProviderResponse, MonitorError>
    where
        F: FnOnce(ProviderRequest) -> Fut,
        Fut: Future<Output = Result<ProviderResponse, ProviderError>>,
    {
        self.admit(&request.model).await?;

        let mut guard = InFlight::admitted(self, &request.model);
        guard.start(request.input.chars().count());

        let call = op(request);
        let result = match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                Err(ProviderError::Timeout(format!(
                    "no response after {}s",
                    limit.as_secs_f64()
                )))
            }),
            None => call.await,
        };

        match result {
            Ok(response) => {
                guard.complete(&response);
                Ok(response)
            }
            Err(source) => {
                let analysis = guard.fail(&source);
                Err(MonitorError::Call { source, analysis })
            }
        }
    }

    /// Idle → Admitted. Waits at most one cycle.
    async fn admit(&self, model: &str) -> Result<(), MonitorError> {
        let Err(wait) = self.limiter.try_acquire() else {
            return Ok(());
        };

        warn!(
            model = %model,
            wait_secs = wait.as_secs_f64(),
            "Rate limit reached, waiting before retry"
        );
        tokio::time::sleep(wait).await;

        self.limiter.try_acquire().map_err(|wait| {
            let retry_after = wait.max(self.limiter.retry_after());
            warn!(
                model = %model,
                retry_after_secs = retry_after.as_secs_f64(),
                "Rate limit still reached, request not admitted"
            );
            MonitorError::AdmissionDenied { retry_after }
        })
    }
}

/// Tracks one admitted call. Dropping it while in flight records the call
/// as cancelled.
struct InFlight<'a> {
    monitor: &'a Monitor,
    request_id: String,
    model: String,
    started: Instant,
    phase: CallPhase,
}

impl<'a> InFlight<'a> {
    fn admitted(monitor: &'a Monitor, model: &str) -> Self {
        Self {
            monitor,
            request_id: new_request_id(),
            model: model.to_string(),
            started: Instant::now(),
            phase: CallPhase::Admitted,
        }
    }

    fn transition(&mut self, next: CallPhase) {
        debug!(request_id = %self.request_id, from = %self.phase, to = %next, "Call phase");
        self.phase = next;
    }

    fn start(&mut self, input_chars: usize) {
        self.started = Instant::now();
        self.transition(CallPhase::InFlight);
        info!(
            request_id = %self.request_id,
            model = %self.model,
            input_chars,
            "Model call started"
        );
    }

    fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn complete(&mut self, response: &ProviderResponse) {
        let elapsed = self.elapsed();
        self.transition(CallPhase::Completed);

        let outcome = CallOutcome::success(&self.model, response.usage, elapsed)
            .with_request_id(&self.request_id);
        match self.monitor.recorder.record(outcome) {
            Ok(metrics) => info!(
                request_id = %self.request_id,
                model = %self.model,
                input_tokens = metrics.input_tokens,
                output_tokens = metrics.output_tokens,
                elapsed_secs = elapsed,
                cost_usd = metrics.cost_usd,
                "Model call completed"
            ),
            Err(e) => self.recording_failed(&e),
        }
    }

    fn fail(&mut self, error: &ProviderError) -> ErrorAnalysis {
        let elapsed = self.elapsed();
        self.transition(CallPhase::Failed);

        let outcome = CallOutcome::failure(&self.model, ErrorInfo::from(error), elapsed)
            .with_request_id(&self.request_id);
        let (input_tokens, output_tokens) = (outcome.input_tokens, outcome.output_tokens);
        if let Err(e) = self.monitor.recorder.record(outcome) {
            self.recording_failed(&e);
        }

        let analysis = self.monitor.classifier.analyze(error);
        warn!(
            request_id = %self.request_id,
            model = %self.model,
            input_tokens,
            output_tokens,
            elapsed_secs = elapsed,
            error_type = %analysis.error_type,
            category = %analysis.category,
            error = %analysis.message,
            suggestions = ?analysis.suggestions,
            "Model call failed"
        );
        analysis
    }

    fn recording_failed(&self, error: &TelemetryError) {
        warn!(
            request_id = %self.request_id,
            error = %error,
            "Failed to record call metrics"
        );
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.phase == CallPhase::InFlight {
            let error = ProviderError::Cancelled("call dropped before completion".into());
            self.fail(&error);
        }
    }
}

/// A provider whose every completion goes through a [`Monitor`].
pub struct MonitoredProvider {
    inner: Arc<dyn Provider>,
    monitor: Arc<Monitor>,
}

impl MonitoredProvider {
    pub fn new(inner: Arc<dyn Provider>, monitor: Arc<Monitor>) -> Self {
        Self { inner, monitor }
    }

    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }
}

#[async_trait]
impl Provider for MonitoredProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let inner = Arc::clone(&self.inner);
        self.monitor
            .call(request, move |req| async move { inner.complete(req).await })
            .await
            .map_err(|e| match e {
                MonitorError::AdmissionDenied { retry_after } => ProviderError::AdmissionDenied {
                    retry_after_secs: retry_after.as_secs()
                        + u64::from(retry_after.subsec_nanos() > 0),
                },
                MonitorError::Call { source, .. } => source,
            })
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}
