//! # Callmeter Core
//!
//! Domain types, traits, and error definitions at the outbound API boundary.
//! This crate has **zero framework dependencies** — it defines the contract
//! that the monitor and every API client implement against.

pub mod error;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
