//! Failure classification with remediation suggestions.
//!
//! Maps the text of a failure to one of a fixed set of categories by
//! lowercase substring matching. Categories are tested in table order and
//! the first one with a matching pattern wins.

use callmeter_core::ProviderError;
use serde::{Deserialize, Serialize};

/// Broad failure category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad or missing credentials.
    Authentication,
    /// The provider throttled the request.
    RateLimit,
    /// The requested model does not exist or is not usable.
    ModelError,
    /// Connectivity problems and timeouts.
    Network,
    /// Nothing matched.
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::ModelError => write!(f, "model_error"),
            Self::Network => write!(f, "network"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// One row of the classification table.
#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub category: ErrorCategory,
    /// Lowercase substrings; any match selects the category.
    pub patterns: Vec<String>,
    pub suggestions: Vec<String>,
}

impl CategoryRule {
    pub fn new(category: ErrorCategory, patterns: &[&str], suggestions: &[&str]) -> Self {
        Self {
            category,
            patterns: patterns.iter().map(|p| p.to_lowercase()).collect(),
            suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn matches(&self, haystack: &str) -> bool {
        self.patterns.iter().any(|p| haystack.contains(p.as_str()))
    }
}

/// Result of classifying a failure description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: ErrorCategory,
    pub suggestions: Vec<String>,
}

/// Structured diagnostic attached to a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorAnalysis {
    /// Kind of the underlying error (e.g. `timeout`).
    pub error_type: String,
    pub category: ErrorCategory,
    pub message: String,
    pub suggestions: Vec<String>,
}

/// Read-only classification table.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rules: Vec<CategoryRule>,
}

impl ErrorClassifier {
    /// Classifier with the built-in rule table.
    pub fn new() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    /// Classifier over a custom rule table, tested in the given order.
    pub fn with_categories(rules: Vec<CategoryRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    /// Classify a free-text failure description.
    pub fn classify(&self, description: &str) -> Classification {
        let haystack = description.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&haystack))
            .map(|rule| Classification {
                category: rule.category,
                suggestions: rule.suggestions.clone(),
            })
            .unwrap_or(Classification {
                category: ErrorCategory::Unknown,
                suggestions: Vec::new(),
            })
    }

    /// Classify a provider failure, keeping its kind and message.
    pub fn analyze(&self, error: &ProviderError) -> ErrorAnalysis {
        let message = error.to_string();
        let Classification {
            category,
            suggestions,
        } = self.classify(&message);
        ErrorAnalysis {
            error_type: error.kind().to_string(),
            category,
            message,
            suggestions,
        }
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn default_rules() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new(
            ErrorCategory::Authentication,
            &["invalid api key", "unauthorized", "401"],
            &[
                "Check your ANTHROPIC_API_KEY environment variable",
                "Verify your API key is correct at https://console.anthropic.com/",
                "Ensure your account has sufficient credits",
            ],
        ),
        CategoryRule::new(
            ErrorCategory::RateLimit,
            &["rate limit", "429", "too many requests"],
            &[
                "Wait a moment before making another request",
                "Consider using a different model (Haiku is faster)",
                "Check your usage limits in the Anthropic Console",
            ],
        ),
        CategoryRule::new(
            ErrorCategory::ModelError,
            &["model not found", "invalid model"],
            &[
                "Check the model name is correct",
                "Use one of: claude-3-5-sonnet-20241022, claude-3-5-haiku-20241022, claude-3-opus-20240229",
            ],
        ),
        CategoryRule::new(
            ErrorCategory::Network,
            &["connection", "timeout", "network"],
            &[
                "Check your internet connection",
                "Try again in a moment",
                "Verify Anthropic's service status",
            ],
        ),
    ]
}
