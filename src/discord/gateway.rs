//! Discord gateway connection.
//!
//! Maintains the websocket session that makes the bot present: Hello →
//! Identify → heartbeat keep-alive at the interval the server dictates,
//! then a dispatch stream. Only two dispatches matter to this bridge:
//! `READY` (flips the readiness latch upstream) and `MESSAGE_CREATE`
//! (fed to the event responder).
//!
//! The heartbeat runs as its own task so shutdown can stop the keep-alive
//! before closing the socket.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::discord::model::{Message, User};
use crate::discord::DiscordError;

/// Gateway endpoint (JSON encoding, API v10).
const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Gateway intents: guilds, guild members, guild messages, direct
/// messages, message content.
const INTENTS: u64 = (1 << 0) | (1 << 1) | (1 << 9) | (1 << 12) | (1 << 15);

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// One frame of the gateway protocol.
#[derive(Debug, Deserialize)]
struct GatewayPayload {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

/// Events surfaced to the owning client.
#[derive(Debug)]
pub(crate) enum GatewayEvent {
    /// The session is established; the bot user is known.
    Ready(User),
    /// A message was posted somewhere the bot can see.
    MessageCreate(Box<Message>),
}

/// Shared handle to a live connection, used for shutdown.
#[derive(Clone)]
pub(crate) struct ConnectionHandle {
    sink: Arc<Mutex<WsSink>>,
    heartbeat: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl ConnectionHandle {
    /// Stops the keep-alive sub-task, then closes the socket.
    ///
    /// Every step is lenient: a missing heartbeat task or a failing close
    /// frame must not block the rest of shutdown. Failures are logged,
    /// never propagated.
    pub(crate) async fn shutdown(&self) {
        let heartbeat = self.heartbeat.lock().ok().and_then(|mut slot| slot.take());
        match heartbeat {
            Some(task) => {
                task.abort();
                tracing::debug!("gateway heartbeat stopped");
            }
            None => tracing::debug!("no gateway heartbeat to stop"),
        }

        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(WsMessage::Close(None)).await {
            tracing::debug!(error = %e, "gateway close frame not delivered");
        }
        if let Err(e) = sink.flush().await {
            tracing::debug!(error = %e, "gateway sink flush failed during shutdown");
        }
        tracing::info!("gateway connection closed");
    }
}

/// A live gateway connection.
pub(crate) struct Connection {
    sink: Arc<Mutex<WsSink>>,
    stream: WsStream,
    sequence: Arc<AtomicU64>,
    heartbeat: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl Connection {
    /// Connects, performs the Hello/Identify handshake and starts the
    /// heartbeat sub-task.
    ///
    /// # Errors
    ///
    /// Returns a gateway error if the socket cannot be established or the
    /// handshake does not follow the protocol.
    pub(crate) async fn connect(token: &str) -> Result<Self, DiscordError> {
        let (socket, _response) = connect_async(GATEWAY_URL)
            .await
            .map_err(|e| DiscordError::Gateway(format!("connect failed: {e}")))?;

        let (sink, mut stream) = socket.split();
        let sink = Arc::new(Mutex::new(sink));
        let sequence = Arc::new(AtomicU64::new(0));

        let hello = next_payload(&mut stream, &sink)
            .await?
            .ok_or_else(|| DiscordError::Gateway("stream closed before hello".to_string()))?;

        if hello.op != OP_HELLO {
            return Err(DiscordError::Gateway(format!(
                "expected hello (op {OP_HELLO}), got op {}",
                hello.op
            )));
        }

        let interval_ms = hello
            .d
            .get("heartbeat_interval")
            .and_then(Value::as_u64)
            .ok_or_else(|| DiscordError::Gateway("hello missing heartbeat_interval".to_string()))?;

        send_json(&sink, &identify(token)).await?;
        tracing::debug!(interval_ms, "gateway identified, starting heartbeat");

        let heartbeat = tokio::spawn(heartbeat_loop(
            Arc::clone(&sink),
            Arc::clone(&sequence),
            interval_ms,
        ));

        Ok(Self {
            sink,
            stream,
            sequence,
            heartbeat: Arc::new(std::sync::Mutex::new(Some(heartbeat))),
        })
    }

    /// Returns a shutdown handle to this connection.
    pub(crate) fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            sink: Arc::clone(&self.sink),
            heartbeat: Arc::clone(&self.heartbeat),
        }
    }

    /// Waits for the next event of interest.
    ///
    /// Protocol frames (heartbeat requests, ACKs, unrelated dispatches)
    /// are handled internally. Returns `None` once the server closes the
    /// stream.
    ///
    /// # Errors
    ///
    /// Returns a gateway error on transport failure or when the server
    /// ends the session (reconnect request, invalidated session).
    pub(crate) async fn next_event(&mut self) -> Result<Option<GatewayEvent>, DiscordError> {
        loop {
            let Some(payload) = next_payload(&mut self.stream, &self.sink).await? else {
                return Ok(None);
            };

            if let Some(sequence) = payload.s {
                self.sequence.store(sequence, Ordering::SeqCst);
            }

            match payload.op {
                OP_DISPATCH => match payload.t.as_deref() {
                    Some("READY") => match payload.d.get("user").cloned() {
                        Some(user) => match serde_json::from_value::<User>(user) {
                            Ok(user) => return Ok(Some(GatewayEvent::Ready(user))),
                            Err(e) => {
                                tracing::warn!(error = %e, "unparseable READY user, ignoring");
                            }
                        },
                        None => tracing::warn!("READY dispatch without user, ignoring"),
                    },
                    Some("MESSAGE_CREATE") => {
                        match serde_json::from_value::<Message>(payload.d) {
                            Ok(message) => {
                                return Ok(Some(GatewayEvent::MessageCreate(Box::new(message))))
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "unparseable MESSAGE_CREATE, ignoring");
                            }
                        }
                    }
                    _ => {}
                },
                OP_HEARTBEAT => {
                    let sequence = self.sequence.load(Ordering::SeqCst);
                    send_json(&self.sink, &heartbeat_payload(sequence)).await?;
                }
                OP_HEARTBEAT_ACK => tracing::trace!("heartbeat acknowledged"),
                OP_RECONNECT => {
                    return Err(DiscordError::Gateway(
                        "server requested reconnect".to_string(),
                    ))
                }
                OP_INVALID_SESSION => {
                    return Err(DiscordError::Gateway("session invalidated".to_string()))
                }
                other => tracing::trace!(op = other, "ignoring gateway frame"),
            }
        }
    }
}

/// Reads the next JSON payload, transparently answering pings.
async fn next_payload(
    stream: &mut WsStream,
    sink: &Arc<Mutex<WsSink>>,
) -> Result<Option<GatewayPayload>, DiscordError> {
    loop {
        let Some(frame) = stream.next().await else {
            return Ok(None);
        };
        let frame = frame.map_err(|e| DiscordError::Gateway(e.to_string()))?;

        match frame {
            WsMessage::Text(text) => match serde_json::from_str::<GatewayPayload>(&text) {
                Ok(payload) => return Ok(Some(payload)),
                Err(e) => tracing::warn!(error = %e, "unparseable gateway frame, ignoring"),
            },
            WsMessage::Ping(data) => {
                sink.lock()
                    .await
                    .send(WsMessage::Pong(data))
                    .await
                    .map_err(|e| DiscordError::Gateway(e.to_string()))?;
            }
            WsMessage::Close(_) => return Ok(None),
            _ => {}
        }
    }
}

/// Sends one JSON payload over the socket.
async fn send_json(sink: &Arc<Mutex<WsSink>>, payload: &Value) -> Result<(), DiscordError> {
    sink.lock()
        .await
        .send(WsMessage::Text(payload.to_string()))
        .await
        .map_err(|e| DiscordError::Gateway(e.to_string()))
}

/// The Identify frame.
fn identify(token: &str) -> Value {
    json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "discord-mcp",
                "device": "discord-mcp"
            }
        }
    })
}

/// A heartbeat frame carrying the last seen sequence (null before any).
fn heartbeat_payload(sequence: u64) -> Value {
    let d = if sequence == 0 {
        Value::Null
    } else {
        Value::from(sequence)
    };
    json!({ "op": OP_HEARTBEAT, "d": d })
}

/// Sends heartbeats until stopped or the sink dies.
async fn heartbeat_loop(sink: Arc<Mutex<WsSink>>, sequence: Arc<AtomicU64>, interval_ms: u64) {
    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));

    loop {
        interval.tick().await;
        let payload = heartbeat_payload(sequence.load(Ordering::SeqCst));
        if let Err(e) = send_json(&sink, &payload).await {
            tracing::warn!(error = %e, "heartbeat delivery failed, stopping keep-alive");
            return;
        }
        tracing::trace!("heartbeat sent");
    }
}
