//! Request/response mapping between repl-types and the Gemini
//! `generateContent` JSON format.
//!
//! Reference: <https://ai.google.dev/api/generate-content>

use repl_types::{
    GenerateRequest, Message, ModelResponse, ProviderError, ResponsePart, Role, TokenUsage,
    ToolDefinition,
};

/// Convert a [`GenerateRequest`] into the Gemini request JSON body.
///
/// System text (the request's `system` field plus any [`Role::System`]
/// messages) becomes `systemInstruction`; [`Role::Tool`] messages become
/// named `functionResponse` parts.
#[must_use]
pub fn to_api_request(req: &GenerateRequest) -> serde_json::Value {
    let mut contents = Vec::new();
    let mut system_texts: Vec<&str> = req.system.as_deref().into_iter().collect();

    for message in &req.messages {
        match message.role {
            Role::System => system_texts.push(&message.content),
            Role::User => contents.push(serde_json::json!({
                "role": "user",
                "parts": [{ "text": message.content }],
            })),
            Role::Assistant => contents.push(serde_json::json!({
                "role": "model",
                "parts": [{ "text": message.content }],
            })),
            Role::Tool => contents.push(map_tool_message(message)),
        }
    }

    let mut body = serde_json::json!({ "contents": contents });

    if !system_texts.is_empty() {
        body["systemInstruction"] = serde_json::json!({
            "parts": [{ "text": system_texts.join("\n\n") }],
        });
    }

    if !req.tools.is_empty() {
        body["tools"] = serde_json::json!([{
            "functionDeclarations": req.tools.iter().map(map_tool_definition).collect::<Vec<_>>(),
        }]);
    }

    body
}

/// A [`Role::Tool`] message as a named function response.
fn map_tool_message(message: &Message) -> serde_json::Value {
    let name = message.tool_name.as_deref().unwrap_or("tool");
    serde_json::json!({
        "role": "user",
        "parts": [{
            "functionResponse": {
                "name": name,
                "response": { "result": message.content },
            },
        }],
    })
}

/// A [`ToolDefinition`] as a Gemini function declaration.
fn map_tool_definition(def: &ToolDefinition) -> serde_json::Value {
    serde_json::json!({
        "name": def.name,
        "description": def.description,
        "parameters": def.input_schema,
    })
}

/// Parse a Gemini response body into a [`ModelResponse`].
///
/// Reads the first candidate's parts in order; `text` parts become
/// [`ResponsePart::Text`] and `functionCall` parts become
/// [`ResponsePart::FunctionCall`].
pub fn from_api_response(json: &serde_json::Value) -> Result<ModelResponse, ProviderError> {
    let parts_json = json
        .pointer("/candidates/0/content/parts")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ProviderError::Malformed("response has no candidate parts".to_string()))?;

    let mut parts = Vec::new();
    for part in parts_json {
        if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
            parts.push(ResponsePart::Text(text.to_string()));
        } else if let Some(call) = part.get("functionCall") {
            let name = call
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    ProviderError::Malformed("functionCall part without a name".to_string())
                })?
                .to_string();
            let args = call
                .get("args")
                .cloned()
                .unwrap_or_else(|| serde_json::json!({}));
            parts.push(ResponsePart::FunctionCall { name, args });
        }
        // other part kinds (inlineData etc.) are ignored
    }

    Ok(ModelResponse {
        parts,
        usage: map_usage(json),
    })
}

/// Pull token counts out of `usageMetadata`, when present.
fn map_usage(json: &serde_json::Value) -> Option<TokenUsage> {
    let usage = json.get("usageMetadata")?;
    Some(TokenUsage {
        input_tokens: usage.get("promptTokenCount").and_then(|v| v.as_u64())?,
        output_tokens: usage
            .get("candidatesTokenCount")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
    })
}
