//! `callmeter simulate` — Exercise the monitor against a simulated provider.
//!
//! Every call goes through rate limiting, cost accounting and failure
//! classification exactly as a real client's would. Results are summarized
//! and exported as JSON.

use crate::commands::usage::print_summary;
use async_trait::async_trait;
use callmeter_config::AppConfig;
use callmeter_core::{Provider, ProviderError, ProviderRequest, ProviderResponse, Usage};
use callmeter_telemetry::{Monitor, MonitoredProvider};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

pub struct SimulateOptions {
    pub requests: usize,
    pub concurrency: usize,
    pub failure_every: usize,
    pub model: String,
    pub export: PathBuf,
}

/// What a simulation run observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationReport {
    pub requests: usize,
    pub failed: usize,
    /// Calls that got past admission and reached the provider.
    pub reached_provider: usize,
}

/// Deterministic stand-in for a model API.
pub struct SimulatedProvider {
    failure_every: usize,
    calls: AtomicUsize,
}

impl SimulatedProvider {
    pub fn new(failure_every: usize) -> Self {
        Self {
            failure_every,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for SimulatedProvider {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(40 + (n as u64 * 37) % 120)).await;

        if self.failure_every > 0 && n % self.failure_every == 0 {
            return Err(match (n / self.failure_every) % 3 {
                0 => ProviderError::RateLimited {
                    retry_after_secs: 30,
                },
                1 => ProviderError::Network("connection reset by peer".into()),
                _ => ProviderError::ApiError {
                    status_code: 529,
                    message: "upstream overloaded".into(),
                },
            });
        }

        let input_tokens = (request.input.chars().count() / 4).max(1) as u32;
        let output_tokens = request
            .max_tokens
            .unwrap_or(1024)
            .min(50 + (n as u32 * 13) % 400);

        Ok(ProviderResponse {
            output: format!("simulated reply #{n}"),
            usage: Usage::new(input_tokens, output_tokens),
            model: request.model,
        })
    }
}

pub async fn run(
    config: &AppConfig,
    options: SimulateOptions,
) -> Result<SimulationReport, Box<dyn std::error::Error>> {
    let monitor = Arc::new(Monitor::from_config(config)?);
    let simulated = Arc::new(SimulatedProvider::new(options.failure_every));
    let provider = MonitoredProvider::new(simulated.clone(), Arc::clone(&monitor));

    println!(
        "🚀 Simulating {} calls to {} ({} concurrent)",
        options.requests, options.model, options.concurrency
    );

    let results: Vec<_> = futures::stream::iter(0..options.requests)
        .map(|i| {
            let request = ProviderRequest::new(
                options.model.clone(),
                format!("Simulated prompt {i}: summarize the quarterly usage report."),
            )
            .with_max_tokens(512);
            provider.complete(request)
        })
        .buffer_unordered(options.concurrency.max(1))
        .collect()
        .await;

    let failed = results.iter().filter(|r| r.is_err()).count();
    let reached = simulated.calls();
    println!("   {} succeeded, {} failed", results.len() - failed, failed);
    if reached < results.len() {
        println!("   {} never reached the provider", results.len() - reached);
    }
    info!(
        requests = results.len(),
        reached_provider = reached,
        failed,
        "Simulation finished"
    );
    println!();

    print_summary(&monitor.recorder().snapshot());

    monitor
        .recorder()
        .export(&options.export)
        .map_err(|e| format!("Failed to export analytics: {e}"))?;
    info!(path = %options.export.display(), "Analytics exported");
    println!();
    println!("📁 Analytics exported to {}", options.export.display());

    Ok(SimulationReport {
        requests: results.len(),
        failed,
        reached_provider: reached,
    })
}
