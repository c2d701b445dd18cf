#![doc = include_str!("../README.md")]

pub mod client;
pub mod error;
pub mod mapping;

pub use client::Gemini;

// Re-export repl-types for convenience
pub use repl_types::{ModelResponse, Provider, ProviderError, ResponsePart};

use std::future::Future;

use repl_types::GenerateRequest;

use crate::error::{map_http_status, map_reqwest_error};
use crate::mapping::{from_api_response, to_api_request};

impl Provider for Gemini {
    /// Send a conversation to the Gemini `generateContent` API.
    ///
    /// Maps the [`GenerateRequest`] to Gemini's JSON format, sends it with
    /// the API key header, and maps the response parts back.
    fn generate(
        &self,
        request: GenerateRequest,
    ) -> impl Future<Output = Result<ModelResponse, ProviderError>> + Send {
        let model = if request.model.is_empty() {
            self.model.clone()
        } else {
            request.model.clone()
        };
        let url = self.generate_url(&model);
        let api_key = self.api_key.clone();
        let http_client = self.client.clone();

        async move {
            let body = to_api_request(&request);
            tracing::debug!(url = %url, model = %model, "sending generate request");

            let response = http_client
                .post(&url)
                .header("x-goog-api-key", &api_key)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(map_reqwest_error)?;

            let status = response.status();
            let response_text = response.text().await.map_err(map_reqwest_error)?;
            if !status.is_success() {
                return Err(map_http_status(status, &response_text));
            }

            let json: serde_json::Value = serde_json::from_str(&response_text)
                .map_err(|e| ProviderError::Malformed(format!("invalid JSON response: {e}")))?;
            from_api_response(&json)
        }
    }

    /// Ask the model for a JSON object matching `schema`.
    ///
    /// Uses `responseMimeType: application/json` plus `responseSchema` so
    /// the model is constrained to the shape; the returned text part is
    /// parsed and any parse failure is [`ProviderError::Malformed`].
    fn generate_structured(
        &self,
        prompt: &str,
        schema: serde_json::Value,
        temperature: f32,
    ) -> impl Future<Output = Result<serde_json::Value, ProviderError>> + Send {
        let url = self.generate_url(&self.model);
        let api_key = self.api_key.clone();
        let http_client = self.client.clone();
        let prompt = prompt.to_string();

        async move {
            let body = serde_json::json!({
                "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
                "generationConfig": {
                    "temperature": temperature,
                    "responseMimeType": "application/json",
                    "responseSchema": schema,
                },
            });
            tracing::debug!(url = %url, "sending structured request");

            let response = http_client
                .post(&url)
                .header("x-goog-api-key", &api_key)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(map_reqwest_error)?;

            let status = response.status();
            let response_text = response.text().await.map_err(map_reqwest_error)?;
            if !status.is_success() {
                return Err(map_http_status(status, &response_text));
            }

            let json: serde_json::Value = serde_json::from_str(&response_text)
                .map_err(|e| ProviderError::Malformed(format!("invalid JSON response: {e}")))?;
            let text = from_api_response(&json)?.text();
            serde_json::from_str(&text)
                .map_err(|e| ProviderError::Malformed(format!("structured response is not JSON: {e}")))
        }
    }
}
