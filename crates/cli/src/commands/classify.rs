//! `callmeter classify` — Categorize an error message.

use callmeter_telemetry::{ErrorCategory, ErrorClassifier};

pub async fn run(message: &str) -> Result<(), Box<dyn std::error::Error>> {
    let classification = ErrorClassifier::new().classify(message);

    println!("🔎 Error category: {}", classification.category);
    if classification.category == ErrorCategory::Unknown {
        println!("   No matching pattern; check the provider's error documentation.");
        return Ok(());
    }

    println!();
    println!("   Suggestions:");
    for suggestion in &classification.suggestions {
        println!("   • {suggestion}");
    }

    Ok(())
}
