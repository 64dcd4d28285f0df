//! Wire message types for the tool control protocol.
//!
//! This module defines the command/response protocol spoken over the stdio
//! transport:
//!
//! - Messages are UTF-8 encoded JSON objects, one per line
//! - A request is either `list_tools` or `call_tool`
//! - Every request (and every malformed line) is answered with exactly one
//!   response envelope
//!
//! The protocol is deliberately small: it is not a general RPC framework,
//! and exactly one peer is assumed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Server name reported in logs.
pub const SERVER_NAME: &str = "discord-mcp";

/// Fixed error text for a recognised-but-unhandled command.
///
/// Sent both for an unknown `type` and for a known type whose handler was
/// never registered.
pub const INVALID_COMMAND_MESSAGE: &str = "Invalid command or handler not set";

/// Describes one callable tool in the catalog.
///
/// The full set is constructed once and returned verbatim on every
/// `list_tools` request, in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique, stable tool name.
    pub name: String,

    /// Human-readable description.
    pub description: String,

    /// JSON Schema describing the accepted arguments.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Content item in a `call_tool` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentItem {
    /// Text content (the only kind produced).
    Text {
        /// The text content.
        text: String,
    },
}

impl ContentItem {
    /// Creates a text content item.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// A decoded command read from the input stream.
///
/// One command corresponds to exactly one line of input; malformed lines
/// are rejected outright, never buffered across read attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandMessage {
    /// Request for the tool catalog.
    ListTools,
    /// Request to invoke a named tool.
    CallTool {
        /// Name of the tool to invoke.
        tool: String,
        /// Arguments for the tool (empty when absent).
        arguments: Map<String, Value>,
    },
}

/// Failures while decoding a command line.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The line is not valid JSON.
    #[error("invalid JSON: {0}")]
    Decode(String),

    /// The line is valid JSON but not an object.
    #[error("command must be a JSON object")]
    NotAnObject,

    /// The object carries an unrecognised or missing `type`.
    #[error("{INVALID_COMMAND_MESSAGE}")]
    UnknownCommand,

    /// A `call_tool` command without a usable `tool` field.
    #[error("call_tool command requires a string `tool` field")]
    MissingTool,

    /// A `call_tool` command whose `arguments` is not an object.
    #[error("call_tool `arguments` must be a JSON object")]
    InvalidArguments,
}

/// Parses one input line into a command.
///
/// Parsing is two-staged so that a well-formed JSON object with an
/// unrecognised `type` is reported as an unknown command rather than a
/// decode failure.
///
/// # Errors
///
/// Returns a [`ProtocolError`] describing why the line was rejected.
pub fn parse_command(line: &str) -> Result<CommandMessage, ProtocolError> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| ProtocolError::Decode(e.to_string()))?;

    let obj = value.as_object().ok_or(ProtocolError::NotAnObject)?;

    match obj.get("type").and_then(Value::as_str) {
        Some("list_tools") => Ok(CommandMessage::ListTools),
        Some("call_tool") => {
            let tool = obj
                .get("tool")
                .and_then(Value::as_str)
                .ok_or(ProtocolError::MissingTool)?
                .to_string();

            let arguments = match obj.get("arguments") {
                None | Some(Value::Null) => Map::new(),
                Some(Value::Object(map)) => map.clone(),
                Some(_) => return Err(ProtocolError::InvalidArguments),
            };

            Ok(CommandMessage::CallTool { tool, arguments })
        }
        _ => Err(ProtocolError::UnknownCommand),
    }
}

/// One complete encoded response unit written to the output stream.
///
/// Exactly one envelope is written per received command (or per malformed
/// line).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseEnvelope {
    /// Answer to `list_tools`.
    Tools {
        /// The tool catalog, in registration order.
        tools: Vec<ToolDescriptor>,
    },
    /// Answer to a successful `call_tool`.
    Result {
        /// Ordered, non-empty content produced by the tool.
        result: Vec<ContentItem>,
    },
    /// Answer to any recoverable failure.
    Error {
        /// Human-readable description of the failure.
        error: String,
    },
}

impl ResponseEnvelope {
    /// Creates an error envelope from anything displayable.
    #[must_use]
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self::Error {
            error: message.to_string(),
        }
    }

    /// Serialises the envelope to its single-line wire form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation fails (which would indicate a bug
    /// in the envelope types themselves).
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_list_tools() {
        let cmd = parse_command(r#"{"type":"list_tools"}"#).unwrap();
        assert_eq!(cmd, CommandMessage::ListTools);
    }

    #[test]
    fn parse_call_tool_with_arguments() {
        let line = r#"{"type":"call_tool","tool":"send_message","arguments":{"channel_id":"1"}}"#;
        let cmd = parse_command(line).unwrap();

        let CommandMessage::CallTool { tool, arguments } = cmd else {
            panic!("Expected CallTool");
        };
        assert_eq!(tool, "send_message");
        assert_eq!(arguments.get("channel_id"), Some(&json!("1")));
    }

    #[test]
    fn parse_call_tool_defaults_arguments() {
        let cmd = parse_command(r#"{"type":"call_tool","tool":"get_user_info"}"#).unwrap();

        let CommandMessage::CallTool { arguments, .. } = cmd else {
            panic!("Expected CallTool");
        };
        assert!(arguments.is_empty());
    }

    #[test]
    fn parse_invalid_json() {
        let err = parse_command("not valid json").unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn parse_non_object() {
        let err = parse_command(r#"["list_tools"]"#).unwrap_err();
        assert!(matches!(err, ProtocolError::NotAnObject));
    }

    #[test]
    fn parse_unknown_type() {
        let err = parse_command(r#"{"type":"shutdown"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCommand));
        assert_eq!(err.to_string(), INVALID_COMMAND_MESSAGE);
    }

    #[test]
    fn parse_missing_type() {
        let err = parse_command(r#"{"tool":"send_message"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCommand));
    }

    #[test]
    fn parse_call_tool_without_tool() {
        let err = parse_command(r#"{"type":"call_tool"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingTool));
    }

    #[test]
    fn parse_call_tool_bad_arguments() {
        let err = parse_command(r#"{"type":"call_tool","tool":"x","arguments":[1]}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidArguments));
    }

    #[test]
    fn serialise_tools_envelope() {
        let envelope = ResponseEnvelope::Tools {
            tools: vec![ToolDescriptor {
                name: "send_message".to_string(),
                description: "Send a message".to_string(),
                input_schema: json!({"type": "object"}),
            }],
        };

        let json = envelope.encode().unwrap();
        assert!(json.contains(r#""type":"tools""#));
        assert!(json.contains(r#""inputSchema""#));
        assert!(!json.contains('\n'));
    }

    #[test]
    fn serialise_result_envelope() {
        let envelope = ResponseEnvelope::Result {
            result: vec![ContentItem::text("done")],
        };

        let json = envelope.encode().unwrap();
        assert!(json.contains(r#""type":"result""#));
        assert!(json.contains(r#""result":[{"type":"text","text":"done"}]"#));
    }

    #[test]
    fn serialise_error_envelope() {
        let envelope = ResponseEnvelope::error("boom");
        let json = envelope.encode().unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains("boom"));
    }

    #[test]
    fn tools_envelope_round_trip_preserves_order() {
        let tools: Vec<ToolDescriptor> = (0..4)
            .map(|i| ToolDescriptor {
                name: format!("tool_{i}"),
                description: format!("Tool number {i}"),
                input_schema: json!({"type": "object", "properties": {}}),
            })
            .collect();

        let envelope = ResponseEnvelope::Tools {
            tools: tools.clone(),
        };
        let encoded = envelope.encode().unwrap();
        let decoded: ResponseEnvelope = serde_json::from_str(&encoded).unwrap();

        let ResponseEnvelope::Tools { tools: decoded } = decoded else {
            panic!("Expected Tools envelope");
        };
        assert_eq!(decoded, tools);
    }
}
