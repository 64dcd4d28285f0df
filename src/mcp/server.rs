//! Protocol server for the tool control channel.
//!
//! The server owns a [`Transport`] pair and loops: read one line, decode
//! one command, dispatch it to a registered handler, write exactly one
//! response envelope. Per-command failures (malformed lines, unknown
//! commands, handler errors) are answered with an `error` envelope and
//! never terminate the loop; only end-of-stream, task cancellation or a
//! write-side I/O failure do.
//!
//! The server is a persistent loop serving arbitrarily many sequential
//! commands over the same connection; exactly one command is in flight at
//! a time, and its response is written before the next line is read.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::mcp::protocol::{
    parse_command, CommandMessage, ContentItem, ResponseEnvelope, ToolDescriptor,
    INVALID_COMMAND_MESSAGE,
};
use crate::mcp::transport::Transport;

/// Opaque failure raised by a call handler.
///
/// Converted to an `error` envelope at the server boundary; the concrete
/// type is of no interest to the loop.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Handler answering `list_tools` commands.
#[async_trait]
pub trait ListToolsHandler: Send + Sync {
    /// Returns the tool catalog. Must not fail under normal operation.
    async fn list_tools(&self) -> Vec<ToolDescriptor>;
}

/// Handler answering `call_tool` commands.
#[async_trait]
pub trait CallToolHandler: Send + Sync {
    /// Invokes the named tool with the given arguments.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] for any dispatch failure; the server
    /// converts it to an error envelope and keeps serving.
    async fn call_tool(
        &self,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> Result<Vec<ContentItem>, HandlerError>;
}

/// The protocol server.
///
/// At most one handler of each kind is registered; re-registration
/// replaces the prior handler (last registration wins).
pub struct McpServer {
    /// The transport pair this server owns.
    transport: Transport,
    /// Handler for `list_tools`, if registered.
    list_handler: Option<Arc<dyn ListToolsHandler>>,
    /// Handler for `call_tool`, if registered.
    call_handler: Option<Arc<dyn CallToolHandler>>,
}

impl McpServer {
    /// Creates a server over the given transport with no handlers.
    #[must_use]
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            list_handler: None,
            call_handler: None,
        }
    }

    /// Registers the `list_tools` handler, replacing any prior one.
    pub fn register_list_tools(&mut self, handler: Arc<dyn ListToolsHandler>) {
        self.list_handler = Some(handler);
    }

    /// Registers the `call_tool` handler, replacing any prior one.
    pub fn register_call_tool(&mut self, handler: Arc<dyn CallToolHandler>) {
        self.call_handler = Some(handler);
    }

    /// Runs the serve loop until the peer closes the stream.
    ///
    /// # Errors
    ///
    /// Returns an error only for stream-level I/O failures; these are
    /// fatal to the loop and surface to the lifecycle coordinator.
    pub async fn run(&mut self) -> io::Result<()> {
        tracing::info!(server = crate::mcp::protocol::SERVER_NAME, "serving tool protocol");

        loop {
            let Some(line) = self.transport.read_line().await? else {
                tracing::info!("input stream closed, shutting down protocol server");
                return Ok(());
            };

            let envelope = self.process_line(&line).await;
            self.transport.write_envelope(&envelope).await?;
        }
    }

    /// Decodes and dispatches one line, producing exactly one envelope.
    async fn process_line(&self, line: &[u8]) -> ResponseEnvelope {
        let text = match std::str::from_utf8(line) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "received non-UTF-8 command line");
                return ResponseEnvelope::error(format!("invalid UTF-8: {e}"));
            }
        };

        match parse_command(text) {
            Ok(command) => {
                tracing::debug!(?command, "received command");
                self.dispatch(command).await
            }
            Err(e) => {
                tracing::error!(error = %e, "rejected command line");
                ResponseEnvelope::error(e)
            }
        }
    }

    /// Routes a decoded command to its handler.
    async fn dispatch(&self, command: CommandMessage) -> ResponseEnvelope {
        match command {
            CommandMessage::ListTools => match &self.list_handler {
                Some(handler) => ResponseEnvelope::Tools {
                    tools: handler.list_tools().await,
                },
                None => ResponseEnvelope::error(INVALID_COMMAND_MESSAGE),
            },
            CommandMessage::CallTool { tool, arguments } => match &self.call_handler {
                Some(handler) => match handler.call_tool(&tool, arguments).await {
                    Ok(result) => ResponseEnvelope::Result { result },
                    Err(e) => {
                        tracing::error!(tool = %tool, error = %e, "tool call failed");
                        ResponseEnvelope::error(e)
                    }
                },
                None => ResponseEnvelope::error(INVALID_COMMAND_MESSAGE),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct StaticCatalog(Vec<ToolDescriptor>);

    #[async_trait]
    impl ListToolsHandler for StaticCatalog {
        async fn list_tools(&self) -> Vec<ToolDescriptor> {
            self.0.clone()
        }
    }

    struct EchoCall;

    #[async_trait]
    impl CallToolHandler for EchoCall {
        async fn call_tool(
            &self,
            tool: &str,
            _arguments: Map<String, Value>,
        ) -> Result<Vec<ContentItem>, HandlerError> {
            if tool == "broken" {
                return Err("tool exploded".into());
            }
            Ok(vec![ContentItem::text(format!("called {tool}"))])
        }
    }

    fn catalog() -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: "echo".to_string(),
            description: "Echo tool".to_string(),
            input_schema: json!({"type": "object"}),
        }]
    }

    /// Runs a server over channel streams, feeding it `lines` and
    /// collecting every envelope it writes.
    async fn drive(lines: &[&str], with_handlers: bool) -> Vec<ResponseEnvelope> {
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);

        let mut server = McpServer::new(Transport::from_channel(in_rx, out_tx));
        if with_handlers {
            server.register_list_tools(Arc::new(StaticCatalog(catalog())));
            server.register_call_tool(Arc::new(EchoCall));
        }

        for line in lines {
            in_tx.send(line.as_bytes().to_vec()).await.unwrap();
        }
        drop(in_tx);

        server.run().await.unwrap();
        // Drop the server so its transport's output sender is released;
        // otherwise the drain loop below blocks waiting for an EOF that
        // the still-alive sender never delivers.
        drop(server);

        let mut envelopes = Vec::new();
        while let Some(bytes) = out_rx.recv().await {
            envelopes.push(serde_json::from_slice(&bytes).unwrap());
        }
        envelopes
    }

    #[tokio::test]
    async fn one_envelope_per_command_in_order() {
        let envelopes = drive(
            &[
                r#"{"type":"list_tools"}"#,
                r#"{"type":"call_tool","tool":"echo"}"#,
                r#"{"type":"list_tools"}"#,
            ],
            true,
        )
        .await;

        assert_eq!(envelopes.len(), 3);
        assert!(matches!(envelopes[0], ResponseEnvelope::Tools { .. }));
        assert!(matches!(envelopes[1], ResponseEnvelope::Result { .. }));
        assert!(matches!(envelopes[2], ResponseEnvelope::Tools { .. }));
    }

    #[tokio::test]
    async fn malformed_line_keeps_loop_alive() {
        let envelopes = drive(&["this is not json", r#"{"type":"list_tools"}"#], true).await;

        assert_eq!(envelopes.len(), 2);
        assert!(matches!(envelopes[0], ResponseEnvelope::Error { .. }));
        assert!(matches!(envelopes[1], ResponseEnvelope::Tools { .. }));
    }

    #[tokio::test]
    async fn handler_failure_keeps_loop_alive() {
        let envelopes = drive(
            &[
                r#"{"type":"call_tool","tool":"broken"}"#,
                r#"{"type":"call_tool","tool":"echo"}"#,
            ],
            true,
        )
        .await;

        assert_eq!(envelopes.len(), 2);
        let ResponseEnvelope::Error { error } = &envelopes[0] else {
            panic!("Expected Error envelope");
        };
        assert!(error.contains("tool exploded"));
        assert!(matches!(envelopes[1], ResponseEnvelope::Result { .. }));
    }

    #[tokio::test]
    async fn unregistered_handlers_answer_fixed_message() {
        let envelopes = drive(
            &[
                r#"{"type":"list_tools"}"#,
                r#"{"type":"call_tool","tool":"echo"}"#,
            ],
            false,
        )
        .await;

        assert_eq!(envelopes.len(), 2);
        for envelope in &envelopes {
            let ResponseEnvelope::Error { error } = envelope else {
                panic!("Expected Error envelope");
            };
            assert_eq!(error, INVALID_COMMAND_MESSAGE);
        }
    }

    #[tokio::test]
    async fn unknown_command_type_answers_fixed_message() {
        let envelopes = drive(&[r#"{"type":"reboot"}"#], true).await;

        let ResponseEnvelope::Error { error } = &envelopes[0] else {
            panic!("Expected Error envelope");
        };
        assert_eq!(error, INVALID_COMMAND_MESSAGE);
    }

    #[tokio::test]
    async fn re_registration_replaces_handler() {
        struct Second;

        #[async_trait]
        impl ListToolsHandler for Second {
            async fn list_tools(&self) -> Vec<ToolDescriptor> {
                vec![ToolDescriptor {
                    name: "second".to_string(),
                    description: "Replacement catalog".to_string(),
                    input_schema: json!({"type": "object"}),
                }]
            }
        }

        let (in_tx, in_rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(4);

        let mut server = McpServer::new(Transport::from_channel(in_rx, out_tx));
        server.register_list_tools(Arc::new(StaticCatalog(catalog())));
        server.register_list_tools(Arc::new(Second));

        in_tx
            .send(br#"{"type":"list_tools"}"#.to_vec())
            .await
            .unwrap();
        drop(in_tx);

        server.run().await.unwrap();

        let bytes = out_rx.recv().await.unwrap();
        let envelope: ResponseEnvelope = serde_json::from_slice(&bytes).unwrap();
        let ResponseEnvelope::Tools { tools } = envelope else {
            panic!("Expected Tools envelope");
        };
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "second");
    }
}
