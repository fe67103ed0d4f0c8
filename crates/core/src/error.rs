//! Error types for the callmeter domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! The external-call boundary gets its own tagged error so that downstream
//! accounting and classification work over structured data.

use thiserror::Error;

/// The top-level error type for callmeter operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- I/O ---
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// A failure raised by an outbound API call.
///
/// Each variant carries an explicit kind (see [`ProviderError::kind`]) and a
/// human-readable message. The rendered message is what error classification
/// matches against, so the wording of each `#[error]` attribute matters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The local rate limiter refused the request before it was sent.
    #[error("Request not admitted by local rate limit, retry after {retry_after_secs}s")]
    AdmissionDenied { retry_after_secs: u64 },

    #[error("Unauthorized: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request cancelled: {0}")]
    Cancelled(String),
}

impl ProviderError {
    /// Stable, machine-readable name of the error variant.
    ///
    /// Used as the key of the per-kind error counters.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApiError { .. } => "api_error",
            Self::RateLimited { .. } => "rate_limited",
            Self::AdmissionDenied { .. } => "admission_denied",
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::ModelNotFound(_) => "model_not_found",
            Self::NotConfigured(_) => "not_configured",
            Self::Timeout(_) => "timeout",
            Self::Network(_) => "network",
            Self::Cancelled(_) => "cancelled",
        }
    }
}
