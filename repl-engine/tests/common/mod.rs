//! Shared test harness: scripted providers in the mock style of the
//! workspace's provider tests.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use repl_engine::Config;
use repl_types::{GenerateRequest, ModelResponse, Provider, ProviderError, ResponsePart, TokenUsage};

/// A provider that replays pre-scripted responses in sequence and records
/// every request it sees.
#[derive(Default)]
pub struct ScriptedProvider {
    generate: Mutex<VecDeque<Result<ModelResponse, ProviderError>>>,
    structured: Mutex<VecDeque<Result<serde_json::Value, ProviderError>>>,
    pub generate_calls: AtomicUsize,
    pub structured_calls: AtomicUsize,
    pub requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_generate(self, response: Result<ModelResponse, ProviderError>) -> Self {
        self.generate.lock().expect("test lock").push_back(response);
        self
    }

    pub fn script_text(self, text: &str) -> Self {
        self.script_generate(Ok(text_response(text)))
    }

    pub fn script_call(self, name: &str, args: serde_json::Value) -> Self {
        self.script_generate(Ok(call_response(name, args)))
    }

    pub fn script_structured(self, response: Result<serde_json::Value, ProviderError>) -> Self {
        self.structured.lock().expect("test lock").push_back(response);
        self
    }

    pub fn script_no_tool(self) -> Self {
        self.script_structured(Ok(serde_json::json!({
            "requires_tool_call": false,
            "reasoning": "no file access needed",
        })))
    }

    /// The last generate request's message contents, for asserting on what
    /// the model actually saw.
    pub fn last_request(&self) -> GenerateRequest {
        self.requests
            .lock()
            .expect("test lock")
            .last()
            .cloned()
            .expect("no generate request was issued")
    }
}

impl Provider for ScriptedProvider {
    fn generate(
        &self,
        request: GenerateRequest,
    ) -> impl Future<Output = Result<ModelResponse, ProviderError>> + Send {
        self.requests.lock().expect("test lock").push(request);
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .generate
            .lock()
            .expect("test lock")
            .pop_front()
            .expect("ScriptedProvider: no generate response left");
        async move { next }
    }

    fn generate_structured(
        &self,
        _prompt: &str,
        _schema: serde_json::Value,
        _temperature: f32,
    ) -> impl Future<Output = Result<serde_json::Value, ProviderError>> + Send {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .structured
            .lock()
            .expect("test lock")
            .pop_front()
            .expect("ScriptedProvider: no structured response left");
        async move { next }
    }
}

/// A provider whose calls never resolve, for timeout tests.
pub struct StalledProvider;

impl Provider for StalledProvider {
    fn generate(
        &self,
        _request: GenerateRequest,
    ) -> impl Future<Output = Result<ModelResponse, ProviderError>> + Send {
        std::future::pending()
    }

    fn generate_structured(
        &self,
        _prompt: &str,
        _schema: serde_json::Value,
        _temperature: f32,
    ) -> impl Future<Output = Result<serde_json::Value, ProviderError>> + Send {
        std::future::pending()
    }
}

pub fn text_response(text: &str) -> ModelResponse {
    ModelResponse {
        parts: vec![ResponsePart::Text(text.to_string())],
        usage: Some(TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
        }),
    }
}

pub fn call_response(name: &str, args: serde_json::Value) -> ModelResponse {
    ModelResponse {
        parts: vec![ResponsePart::FunctionCall {
            name: name.to_string(),
            args,
        }],
        usage: None,
    }
}

/// A config pointed at a generously capped test model.
pub fn test_config() -> Config {
    let mut config = Config::new("test-key");
    config.model = "test-model".to_string();
    config.rpm_table.insert("test-model".to_string(), 10_000);
    config
}
