//! Built-in pricing table for the supported models.
//!
//! Prices are per 1,000 tokens. Each model has an input and an output price.
//! Lookups for unknown models fall back to a designated default entry, so
//! every call gets a cost estimate. Overrides can be applied at runtime from
//! TOML config.

use crate::TelemetryError;
use callmeter_config::PricingConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Model used as the fallback entry of the built-in table.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Per-thousand-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1K input tokens.
    pub input_per_1k: f64,
    /// Price per 1K output tokens.
    pub output_per_1k: f64,
}

impl ModelPricing {
    /// Create a new pricing entry.
    pub fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    /// Compute cost for the given token counts.
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 / 1000.0) * self.input_per_1k
            + (output_tokens as f64 / 1000.0) * self.output_per_1k
    }
}

/// Thread-safe pricing table with a mandatory default entry.
pub struct PricingTable {
    prices: RwLock<HashMap<String, ModelPricing>>,
    default_model: String,
}

impl PricingTable {
    /// Create a pricing table with the built-in model prices.
    pub fn with_defaults() -> Self {
        Self {
            prices: RwLock::new(builtin_prices()),
            default_model: DEFAULT_MODEL.into(),
        }
    }

    /// Create a table from explicit entries.
    ///
    /// Fails if `default_model` has no entry, since every lookup must be
    /// able to fall back to it.
    pub fn new(
        prices: HashMap<String, ModelPricing>,
        default_model: impl Into<String>,
    ) -> Result<Self, TelemetryError> {
        let default_model = default_model.into();
        if !prices.contains_key(&default_model) {
            return Err(TelemetryError::UnknownDefaultModel(default_model));
        }
        Ok(Self {
            prices: RwLock::new(prices),
            default_model,
        })
    }

    /// Build the built-in table, then apply config overrides and the
    /// configured default model.
    pub fn from_config(config: &PricingConfig) -> Result<Self, TelemetryError> {
        let mut prices = builtin_prices();
        for (model, custom) in &config.custom {
            prices.insert(
                model.clone(),
                ModelPricing::new(custom.input_per_1k, custom.output_per_1k),
            );
        }
        Self::new(prices, config.default_model.clone())
    }

    /// Look up pricing for a model. Returns None if not found.
    pub fn get(&self, model: &str) -> Option<ModelPricing> {
        let prices = self.prices.read().ok()?;
        prices.get(model).copied()
    }

    /// Add or update pricing for a model.
    pub fn set(&self, model: impl Into<String>, pricing: ModelPricing) {
        if let Ok(mut prices) = self.prices.write() {
            prices.insert(model.into(), pricing);
        }
    }

    /// Name of the fallback entry.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Whether the model has its own entry (no fallback needed).
    pub fn is_known(&self, model: &str) -> bool {
        self.get(model).is_some()
    }

    /// Compute cost for a model call.
    ///
    /// Unknown models are priced with the default entry.
    pub fn compute_cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        let Ok(prices) = self.prices.read() else {
            return 0.0;
        };

        prices
            .get(model)
            .or_else(|| prices.get(&self.default_model))
            .map(|p| p.cost(input_tokens, output_tokens))
            .unwrap_or(0.0)
    }

    /// List all known model names.
    pub fn models(&self) -> Vec<String> {
        let Ok(prices) = self.prices.read() else {
            return Vec::new();
        };
        let mut names: Vec<String> = prices.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of models in the pricing table.
    pub fn len(&self) -> usize {
        self.prices.read().map(|p| p.len()).unwrap_or(0)
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn builtin_prices() -> HashMap<String, ModelPricing> {
    let mut prices = HashMap::new();

    prices.insert(
        "claude-3-5-sonnet-20241022".into(),
        ModelPricing::new(0.003, 0.015),
    );
    prices.insert(
        "claude-3-5-haiku-20241022".into(),
        ModelPricing::new(0.00025, 0.00125),
    );
    prices.insert(
        "claude-3-opus-20240229".into(),
        ModelPricing::new(0.015, 0.075),
    );

    prices
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}
