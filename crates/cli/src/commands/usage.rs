//! CLI commands for pricing, cost estimates and exported analytics.

use callmeter_config::AppConfig;
use callmeter_telemetry::recorder::read_export;
use callmeter_telemetry::{AnalyticsInsights, PricingTable, UsageAnalytics};
use std::path::Path;

/// List model pricing from the built-in table plus config overrides.
pub async fn pricing(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let table = PricingTable::from_config(&config.pricing)?;
    let models = table.models();

    println!("💰 Model Pricing (per 1K tokens)");
    println!("─────────────────────────────────────────────────────");
    println!("{:<40} {:>10} {:>10}", "Model", "Input", "Output");
    println!("{:<40} {:>10} {:>10}", "─────", "─────", "──────");

    for name in &models {
        if let Some(p) = table.get(name) {
            let marker = if name == table.default_model() { " *" } else { "" };
            println!(
                "{:<40} ${:>8.5} ${:>8.5}{}",
                name, p.input_per_1k, p.output_per_1k, marker
            );
        }
    }

    println!();
    println!("  {} models with pricing data", models.len());
    println!("  * fallback for unknown models");

    Ok(())
}

/// Estimate cost for a given model and token counts.
pub async fn estimate(
    config: &AppConfig,
    model: &str,
    input_tokens: u32,
    output_tokens: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let table = PricingTable::from_config(&config.pricing)?;

    if !table.is_known(model) {
        println!(
            "⚠ Model '{}' not in pricing table, using {} prices.",
            model,
            table.default_model()
        );
        println!("  Use `callmeter usage pricing` to see available models.");
    }

    let cost = table.compute_cost(model, input_tokens, output_tokens);
    println!("💵 Cost estimate for {}", model);
    println!("   Input tokens:  {}", input_tokens);
    println!("   Output tokens: {}", output_tokens);
    println!("   Estimated cost: ${:.6}", cost);

    Ok(())
}

/// Summarize an analytics export written by `simulate` or a library user.
pub async fn show(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let export = read_export(path)
        .map_err(|e| format!("Failed to read export {}: {e}", path.display()))?;
    let analytics = export.analytics();

    println!("📊 Usage Analytics ({})", path.display());
    println!("   Exported at: {}", export.exported_at);
    print_summary(&analytics);

    Ok(())
}

/// Shared report used by `usage show` and `simulate`.
pub fn print_summary(analytics: &UsageAnalytics) {
    let insights = AnalyticsInsights::from(analytics);

    println!("─────────────────────────────────────");
    println!("  Requests:       {}", analytics.total_requests);
    println!("  Successful:     {}", analytics.successful_requests);
    println!("  Failed:         {}", analytics.failed_requests);
    println!("  Success rate:   {:.1}% ({})", insights.success_rate, insights.success);
    println!("  Total tokens:   {}", analytics.total_tokens);
    println!("  Total cost:     ${:.6}", analytics.total_cost_usd);
    println!("  Cost/request:   ${:.6} ({})", insights.cost_per_request, insights.cost);
    println!("  Avg latency:    {:.3}s ({})", analytics.avg_response_time, insights.latency);

    if !analytics.requests_by_model.is_empty() {
        println!();
        println!("  By model:");
        let mut models: Vec<_> = analytics.requests_by_model.iter().collect();
        models.sort();
        for (model, count) in models {
            println!("    {model}: {count}");
        }
    }

    if !analytics.errors_by_type.is_empty() {
        println!();
        println!("  Errors:");
        let mut errors: Vec<_> = analytics.errors_by_type.iter().collect();
        errors.sort();
        for (kind, count) in errors {
            println!("    {kind}: {count}");
        }
    }

    if !analytics.hourly_usage.is_empty() {
        println!();
        println!("  By hour (local):");
        for (hour, count) in &analytics.hourly_usage {
            println!("    {hour:02}:00  {count}");
        }
    }
}
