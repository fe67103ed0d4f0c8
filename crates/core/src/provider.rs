//! Provider trait — the abstraction over the outbound API boundary.
//!
//! A Provider takes a model id and an input payload and returns an output
//! payload together with the token counts the backend billed. Callmeter never
//! builds network requests itself; callers plug their client in here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;

/// A single outbound call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderRequest {
    /// The model to use (e.g., "claude-3-5-sonnet-20241022")
    pub model: String,

    /// The input payload (prompt text)
    pub input: String,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ProviderRequest {
    /// Create a request for the given model and input.
    pub fn new(model: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            input: input.into(),
            max_tokens: None,
        }
    }

    /// Set the output token limit.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderResponse {
    /// The generated output
    pub output: String,

    /// Token usage statistics
    pub usage: Usage,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Input plus output tokens.
    pub fn total(&self) -> u64 {
        self.input_tokens as u64 + self.output_tokens as u64
    }
}

/// The core Provider trait.
///
/// Real API clients, test doubles and the monitored wrapper all implement
/// this trait, so call sites never know which one they are talking to.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic", "simulated").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_request_defaults() {
        let req = ProviderRequest::new("claude-3-5-haiku-20241022", "hello");
        assert_eq!(req.model, "claude-3-5-haiku-20241022");
        assert!(req.max_tokens.is_none());

        let req = req.with_max_tokens(256);
        assert_eq!(req.max_tokens, Some(256));
    }

    #[test]
    fn usage_total_does_not_overflow() {
        let usage = Usage::new(u32::MAX, u32::MAX);
        assert_eq!(usage.total(), 2 * u32::MAX as u64);
    }

    #[test]
    fn request_serialization_skips_missing_limit() {
        let req = ProviderRequest::new("m", "text");
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("max_tokens"));
    }

    struct Silent;

    #[async_trait]
    impl Provider for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            Err(ProviderError::ModelNotFound(request.model))
        }
    }

    #[tokio::test]
    async fn default_health_check_is_healthy() {
        let provider = Silent;
        assert!(provider.health_check().await.unwrap());
        let err = provider
            .complete(ProviderRequest::new("nope", "hi"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "model_not_found");
    }
}
