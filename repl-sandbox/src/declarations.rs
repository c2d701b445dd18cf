//! Wire declarations for the three core tools, and parsing of
//! model-emitted function calls back into [`ToolCall`]s.

use repl_types::{ToolCall, ToolDefinition};
use thiserror::Error;

/// The declaration list handed to the model on every tooled request.
///
/// Parameter names are load-bearing: the classifier prompt and the
/// dispatcher both rely on `file_path`, `pattern`, and `content` verbatim.
#[must_use]
pub fn tool_declarations() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "list_files".to_string(),
            description: "List files in the workspace matching a glob pattern. \
                          Use ** to match any depth."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Glob pattern, e.g. '*' or '**/*.rs'"
                    }
                }
            }),
        },
        ToolDefinition {
            name: "read_file".to_string(),
            description: "Read the contents of a file in the workspace.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path relative to the workspace root"
                    }
                },
                "required": ["file_path"]
            }),
        },
        ToolDefinition {
            name: "write_file".to_string(),
            description: "Write a file in the workspace, creating parent \
                          directories as needed."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path relative to the workspace root"
                    },
                    "content": {
                        "type": "string",
                        "description": "Full content to write"
                    }
                },
                "required": ["file_path", "content"]
            }),
        },
    ]
}

/// Error turning a model-emitted function call into a [`ToolCall`].
#[derive(Debug, Error)]
pub enum CallParseError {
    /// The model named a tool that does not exist.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    /// A required argument was missing or not a string.
    #[error("{tool}: missing required argument '{arg}'")]
    MissingArg {
        /// The tool being invoked.
        tool: &'static str,
        /// The absent argument.
        arg: &'static str,
    },
}

/// Parse a `{name, args}` function-call part into a validated [`ToolCall`].
///
/// `list_files` defaults its pattern to `*` when absent.
pub fn parse_call(name: &str, args: &serde_json::Value) -> Result<ToolCall, CallParseError> {
    let str_arg = |key: &str| args.get(key).and_then(|v| v.as_str()).map(str::to_string);
    match name {
        "list_files" => Ok(ToolCall::ListFiles {
            pattern: str_arg("pattern").unwrap_or_else(|| "*".to_string()),
        }),
        "read_file" => Ok(ToolCall::ReadFile {
            file_path: str_arg("file_path").ok_or(CallParseError::MissingArg {
                tool: "read_file",
                arg: "file_path",
            })?,
        }),
        "write_file" => Ok(ToolCall::WriteFile {
            file_path: str_arg("file_path").ok_or(CallParseError::MissingArg {
                tool: "write_file",
                arg: "file_path",
            })?,
            content: str_arg("content").ok_or(CallParseError::MissingArg {
                tool: "write_file",
                arg: "content",
            })?,
        }),
        other => Err(CallParseError::UnknownTool(other.to_string())),
    }
}
