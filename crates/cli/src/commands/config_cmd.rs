//! `callmeter config` — Configuration management commands.

use callmeter_config::{AppConfig, ConfigError};

/// Report on an already attempted load; an invalid file is the case this
/// command exists for.
pub async fn validate(
    loaded: Result<AppConfig, ConfigError>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match loaded {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();

            if !config.rate_limit.enabled {
                warnings.push("Rate limiting is disabled");
            }

            if config.telemetry.log_file.is_none() {
                warnings.push("No log file configured; events go to stderr only");
            }

            if config.call_timeout().is_none() {
                warnings.push("call_timeout_secs = 0, calls may wait indefinitely");
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Model:       {}", config.default_model);
            println!(
                "   Rate limit:  {}/min, {}/hour",
                config.rate_limit.requests_per_minute, config.rate_limit.requests_per_hour
            );
            println!("   History:     {} requests", config.telemetry.max_history);
            println!("   Export:      {}", config.telemetry.export_path.display());
            println!("   Pricing:     {} custom entries", config.pricing.custom.len());
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", config.to_toml()?);
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}
