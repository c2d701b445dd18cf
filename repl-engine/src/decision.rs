//! The decision engine: structured classification of a user utterance into
//! a tool decision, with an in-process TTL cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use repl_types::{Provider, ProviderError, ToolCall, ToolDecision, TurnError};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::time::Instant;

use crate::config::Config;
use crate::rate::RateController;

/// The fixed classifier instruction. Tool and parameter names are verbatim —
/// the dispatcher depends on them.
const CLASSIFIER_INSTRUCTION: &str = "\
You decide whether a console utterance needs a workspace file tool before it \
can be answered. The available tools are:

- list_files: parameters {pattern} — glob over the workspace; ** matches any depth
- read_file: parameters {file_path} — read one file
- write_file: parameters {file_path, content} — create or overwrite one file

Respond with a JSON object: requires_tool_call (boolean), tool_name, \
reasoning, and the tool's parameters as top-level fields.

Example: \"show me the Makefile\" -> {\"requires_tool_call\": true, \
\"tool_name\": \"read_file\", \"file_path\": \"Makefile\", \"reasoning\": \
\"the user wants file contents\"}
Example: \"what is 2 + 2\" -> {\"requires_tool_call\": false, \"reasoning\": \
\"arithmetic needs no files\"}

Utterance: ";

/// Wire shape of the classifier response. Lives only at the parse boundary;
/// validation turns it into a [`ToolDecision`].
#[derive(Debug, Deserialize, JsonSchema)]
struct RawDecision {
    requires_tool_call: bool,
    #[serde(default)]
    tool_name: Option<String>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    file_path: Option<String>,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

struct CacheSlot {
    decision: ToolDecision,
    inserted: Instant,
}

/// Classifies utterances into [`ToolDecision`]s.
///
/// Decisions are cached per exact utterance string with a TTL; the cache is
/// process-scoped and deliberately not persisted. When disabled
/// (fallback mode), every utterance classifies as no-tool and the model's
/// own function calling carries the turn.
pub struct DecisionEngine<P> {
    provider: Arc<P>,
    rate: Arc<RateController>,
    model: String,
    enabled: bool,
    ttl: Duration,
    cache: Mutex<HashMap<String, CacheSlot>>,
}

impl<P: Provider> DecisionEngine<P> {
    /// Build the engine from the resolved configuration.
    #[must_use]
    pub fn new(provider: Arc<P>, rate: Arc<RateController>, config: &Config) -> Self {
        Self {
            provider,
            rate,
            model: config.model.clone(),
            enabled: config.structured_dispatch,
            ttl: config.decision_cache_ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Classify an utterance.
    ///
    /// A malformed classifier response is retried once; two in a row
    /// degrade to a no-tool decision recording the failure. Transport
    /// errors other than malformed output propagate.
    pub async fn analyze(&self, utterance: &str) -> Result<ToolDecision, TurnError> {
        if !self.enabled {
            return Ok(ToolDecision::NoTool {
                reasoning: "structured dispatch disabled".to_string(),
            });
        }

        if let Some(hit) = self.cache_get(utterance) {
            tracing::debug!("decision cache hit");
            return Ok(hit);
        }

        let prompt = format!("{CLASSIFIER_INSTRUCTION}{utterance}");
        let schema = decision_schema();
        let mut last_failure = String::new();

        for _ in 0..2 {
            let raw = match self
                .rate
                .execute(&self.model, || {
                    self.provider.generate_structured(&prompt, schema.clone(), 0.0)
                })
                .await
            {
                Ok(value) => value,
                Err(TurnError::Transport(ProviderError::Malformed(msg))) => {
                    last_failure = msg;
                    continue;
                }
                Err(other) => return Err(other),
            };

            match validate(normalize(raw)) {
                Ok(decision) => {
                    self.cache_put(utterance, decision.clone());
                    return Ok(decision);
                }
                Err(failure) => last_failure = failure,
            }
        }

        tracing::warn!(failure = %last_failure, "classifier failed twice, degrading to no-tool");
        Ok(ToolDecision::NoTool {
            reasoning: format!("classifier gave malformed output twice: {last_failure}"),
        })
    }

    fn cache_get(&self, utterance: &str) -> Option<ToolDecision> {
        let cache = self.cache.lock().ok()?;
        let slot = cache.get(utterance)?;
        (slot.inserted.elapsed() < self.ttl).then(|| slot.decision.clone())
    }

    fn cache_put(&self, utterance: &str, decision: ToolDecision) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(
                utterance.to_string(),
                CacheSlot {
                    decision,
                    inserted: Instant::now(),
                },
            );
        }
    }
}

/// JSON schema for the classifier response, derived from [`RawDecision`].
fn decision_schema() -> serde_json::Value {
    let schema = schemars::schema_for!(RawDecision);
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(obj) = value.as_object_mut() {
        // responseSchema takes a bare object schema
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

/// Repair the common model slips before strict parsing: a nested
/// `args`/`parameters` object, `path` instead of `file_path`, and string
/// booleans.
fn normalize(mut value: serde_json::Value) -> serde_json::Value {
    if let Some(obj) = value.as_object_mut() {
        for wrapper in ["args", "parameters"] {
            if let Some(serde_json::Value::Object(nested)) = obj.remove(wrapper) {
                for (key, nested_value) in nested {
                    obj.entry(key).or_insert(nested_value);
                }
            }
        }

        if !obj.contains_key("file_path")
            && let Some(path) = obj.remove("path")
        {
            obj.insert("file_path".to_string(), path);
        }

        if let Some(serde_json::Value::String(raw)) = obj.get("requires_tool_call") {
            let coerced = match raw.to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            };
            if let Some(flag) = coerced {
                obj.insert(
                    "requires_tool_call".to_string(),
                    serde_json::Value::Bool(flag),
                );
            }
        }
    }

    value
}

/// Strict validation of a normalized response into a [`ToolDecision`].
fn validate(value: serde_json::Value) -> Result<ToolDecision, String> {
    let raw: RawDecision =
        serde_json::from_value(value).map_err(|e| format!("unparseable decision: {e}"))?;

    if !raw.requires_tool_call {
        return Ok(ToolDecision::NoTool {
            reasoning: raw.reasoning,
        });
    }

    let call = match raw.tool_name.as_deref() {
        Some("list_files") => ToolCall::ListFiles {
            pattern: raw.pattern.unwrap_or_else(|| "*".to_string()),
        },
        Some("read_file") => ToolCall::ReadFile {
            file_path: raw
                .file_path
                .ok_or("read_file decision without file_path")?,
        },
        Some("write_file") => ToolCall::WriteFile {
            file_path: raw
                .file_path
                .ok_or("write_file decision without file_path")?,
            content: raw.content.ok_or("write_file decision without content")?,
        },
        Some(other) => return Err(format!("unknown tool_name: {other}")),
        None => return Err("requires_tool_call without tool_name".to_string()),
    };

    Ok(ToolDecision::UseTool {
        call,
        reasoning: raw.reasoning,
    })
}
