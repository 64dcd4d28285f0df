//! Tool control protocol implementation.
//!
//! This module implements the line-delimited JSON protocol for exposing
//! Discord operations as tools. The server communicates over a stdio (or
//! in-process channel) transport, one JSON object per line.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Protocol Server                        │
//! │                                                             │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐    │
//! │   │  Transport  │───▶│   Server    │───▶│  Handlers   │    │
//! │   │ (pipe/chan) │    │   (loop)    │    │ (dispatch)  │    │
//! │   └─────────────┘    └─────────────┘    └─────────────┘    │
//! │          │                  │                  │            │
//! │          ▼                  ▼                  ▼            │
//! │   ┌─────────────────────────────────────────────────┐      │
//! │   │           line-delimited JSON envelopes         │      │
//! │   └─────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod protocol;
pub mod server;
pub mod transport;

pub use protocol::{CommandMessage, ContentItem, ResponseEnvelope, ToolDescriptor};
pub use server::{CallToolHandler, ListToolsHandler, McpServer};
pub use transport::Transport;
