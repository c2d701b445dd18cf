//! Core message, tool, and request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human user.
    User,
    /// The model.
    Assistant,
    /// A system instruction.
    System,
    /// The result of a tool execution, fed back to the model.
    Tool,
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message author.
    pub role: Role,
    /// The text content.
    pub content: String,
    /// When the message was created.
    pub timestamp: DateTime<Utc>,
    /// Advisory token count, used only for budget accounting.
    pub tokens: usize,
    /// For [`Role::Tool`] messages, the name of the tool that produced the
    /// content. The transport needs it to emit a named function response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    /// Create a message with the current timestamp and a zero token count.
    ///
    /// The token count is filled in by the context manager when the message
    /// is admitted to a context.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tokens: 0,
            tool_name: None,
        }
    }

    /// Create a [`Role::Tool`] message carrying the output of `tool_name`.
    #[must_use]
    pub fn tool(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            timestamp: Utc::now(),
            tokens: 0,
            tool_name: Some(tool_name.into()),
        }
    }
}

/// Token usage reported by the provider for a single request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub input_tokens: u64,
    /// Tokens produced in the completion.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Input plus output tokens.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Add another usage report into this one.
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// A validated invocation of one of the core tools.
///
/// The tool surface is a closed sum — there is no dynamic registry. The
/// serialized form tags the variant with `tool_name` so journal entries
/// record the call verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool_name", rename_all = "snake_case")]
pub enum ToolCall {
    /// List files under the sandbox root matching a glob pattern.
    ListFiles {
        /// Shell glob; `**` matches any depth.
        pattern: String,
    },
    /// Read a file relative to the sandbox root.
    ReadFile {
        /// Relative path of the file.
        file_path: String,
    },
    /// Write a file relative to the sandbox root, creating parents.
    WriteFile {
        /// Relative path of the file.
        file_path: String,
        /// The full content to write.
        content: String,
    },
}

impl ToolCall {
    /// The wire name of the tool.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::ListFiles { .. } => "list_files",
            ToolCall::ReadFile { .. } => "read_file",
            ToolCall::WriteFile { .. } => "write_file",
        }
    }

    /// The call's arguments as a JSON object (without the tag).
    #[must_use]
    pub fn args(&self) -> serde_json::Value {
        match self {
            ToolCall::ListFiles { pattern } => serde_json::json!({ "pattern": pattern }),
            ToolCall::ReadFile { file_path } => serde_json::json!({ "file_path": file_path }),
            ToolCall::WriteFile { file_path, content } => serde_json::json!({
                "file_path": file_path,
                "content": content,
            }),
        }
    }
}

/// The classifier's verdict for a user utterance.
///
/// Optional tool fields exist only at the parse boundary; past it a decision
/// either carries a fully validated [`ToolCall`] or none at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolDecision {
    /// Answer directly, no tool needed.
    NoTool {
        /// Why the classifier decided against a tool call.
        reasoning: String,
    },
    /// Execute a tool before answering.
    UseTool {
        /// The validated call.
        call: ToolCall,
        /// Why the classifier chose this tool.
        reasoning: String,
    },
}

impl ToolDecision {
    /// Whether this decision requires a tool call.
    #[must_use]
    pub fn requires_tool_call(&self) -> bool {
        matches!(self, ToolDecision::UseTool { .. })
    }

    /// The classifier's reasoning string.
    #[must_use]
    pub fn reasoning(&self) -> &str {
        match self {
            ToolDecision::NoTool { reasoning } | ToolDecision::UseTool { reasoning, .. } => {
                reasoning
            }
        }
    }
}

/// A tool made visible to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Wire name of the tool.
    pub name: String,
    /// What the tool does, for the model's benefit.
    pub description: String,
    /// JSON Schema of the input object.
    pub input_schema: serde_json::Value,
}

/// A request to the LLM transport.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Model identifier (e.g. `flash-lite`).
    pub model: String,
    /// The conversation so far, oldest first.
    pub messages: Vec<Message>,
    /// Optional system instruction.
    pub system: Option<String>,
    /// Tools the model may call; empty to disable tool use.
    pub tools: Vec<ToolDefinition>,
}

/// One part of a model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePart {
    /// Plain text.
    Text(String),
    /// A request to invoke a tool.
    FunctionCall {
        /// Tool name as emitted by the model.
        name: String,
        /// JSON arguments object.
        args: serde_json::Value,
    },
}

/// The response envelope returned by a provider.
#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    /// Text and function-call parts, in the order the model emitted them.
    pub parts: Vec<ResponsePart>,
    /// Usage metadata, when the provider reports it.
    pub usage: Option<TokenUsage>,
}

impl ModelResponse {
    /// Concatenate all text parts.
    #[must_use]
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ResponsePart::Text(text) => Some(text.as_str()),
                ResponsePart::FunctionCall { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// The function-call parts, in emission order.
    #[must_use]
    pub fn function_calls(&self) -> Vec<(&str, &serde_json::Value)> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ResponsePart::FunctionCall { name, args } => Some((name.as_str(), args)),
                ResponsePart::Text(_) => None,
            })
            .collect()
    }

    /// Whether any part is a function call.
    #[must_use]
    pub fn has_function_calls(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, ResponsePart::FunctionCall { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
    }

    #[test]
    fn message_skips_absent_tool_name() {
        let msg = Message::new(Role::User, "hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("tool_name").is_none());
    }

    #[test]
    fn tool_message_carries_tool_name() {
        let msg = Message::tool("read_file", "contents");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["tool_name"], "read_file");
        assert_eq!(json["role"], "tool");
    }

    #[test]
    fn tool_call_tags_variant_with_tool_name() {
        let call = ToolCall::ReadFile {
            file_path: "Makefile".into(),
        };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["tool_name"], "read_file");
        assert_eq!(json["file_path"], "Makefile");
    }

    #[test]
    fn tool_call_args_omit_the_tag() {
        let call = ToolCall::ListFiles {
            pattern: "**/*.rs".into(),
        };
        assert_eq!(call.args(), serde_json::json!({ "pattern": "**/*.rs" }));
        assert_eq!(call.name(), "list_files");
    }

    #[test]
    fn response_text_skips_function_calls() {
        let response = ModelResponse {
            parts: vec![
                ResponsePart::Text("a".into()),
                ResponsePart::FunctionCall {
                    name: "read_file".into(),
                    args: serde_json::json!({ "file_path": "x" }),
                },
                ResponsePart::Text("b".into()),
            ],
            usage: None,
        };
        assert_eq!(response.text(), "ab");
        assert!(response.has_function_calls());
        assert_eq!(response.function_calls().len(), 1);
    }

    #[test]
    fn usage_accumulates() {
        let mut total = TokenUsage::default();
        total.accumulate(&TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
        });
        total.accumulate(&TokenUsage {
            input_tokens: 3,
            output_tokens: 2,
        });
        assert_eq!(total.total(), 20);
    }
}
