//! The `Provider` trait every LLM transport implements.

use std::future::Future;

use crate::error::ProviderError;
use crate::types::{GenerateRequest, ModelResponse};

/// LLM transport contract.
///
/// Uses RPITIT (return position impl trait in trait) — Rust 2024 native
/// async. Not object-safe by design; compose with generics `<P: Provider>`.
///
/// Two operations are required: free-form generation over a conversation
/// (with optional tool declarations), and a structured single-prompt call
/// that must return JSON matching a caller-supplied schema.
pub trait Provider: Send + Sync {
    /// Send a conversation and get back text and/or function-call parts.
    fn generate(
        &self,
        request: GenerateRequest,
    ) -> impl Future<Output = Result<ModelResponse, ProviderError>> + Send;

    /// Ask for a JSON object matching `schema`.
    ///
    /// Implementations must return [`ProviderError::Malformed`] when the
    /// response body is not valid JSON.
    fn generate_structured(
        &self,
        prompt: &str,
        schema: serde_json::Value,
        temperature: f32,
    ) -> impl Future<Output = Result<serde_json::Value, ProviderError>> + Send;
}

impl<P: Provider> Provider for std::sync::Arc<P> {
    fn generate(
        &self,
        request: GenerateRequest,
    ) -> impl Future<Output = Result<ModelResponse, ProviderError>> + Send {
        (**self).generate(request)
    }

    fn generate_structured(
        &self,
        prompt: &str,
        schema: serde_json::Value,
        temperature: f32,
    ) -> impl Future<Output = Result<serde_json::Value, ProviderError>> + Send {
        (**self).generate_structured(prompt, schema, temperature)
    }
}
