//! The owning Discord client handle.
//!
//! Created by the lifecycle coordinator and shared read-mostly: the tool
//! dispatcher calls through the REST surface, the gateway task feeds the
//! readiness latch and the event responder, and only the coordinator may
//! close the connection — after the protocol server has stopped.

use std::sync::{Arc, Mutex};

use crate::discord::events::MessageResponder;
use crate::discord::gateway::{Connection, ConnectionHandle, GatewayEvent};
use crate::discord::http::Http;
use crate::discord::DiscordError;
use crate::runtime::ReadinessLatch;

/// Persistent, event-driven Discord client.
pub struct DiscordClient {
    token: String,
    http: Arc<Http>,
    ready: ReadinessLatch,
    connection: Mutex<Option<ConnectionHandle>>,
}

impl DiscordClient {
    /// Creates a client for the given bot token. No connection is made
    /// until [`run`](Self::run) is spawned.
    ///
    /// # Errors
    ///
    /// Returns an error if the REST client cannot be built.
    pub fn new(token: &str) -> Result<Self, DiscordError> {
        Ok(Self {
            token: token.to_string(),
            http: Arc::new(Http::new(token)?),
            ready: ReadinessLatch::new(),
            connection: Mutex::new(None),
        })
    }

    /// The REST surface of this client.
    #[must_use]
    pub fn http(&self) -> Arc<Http> {
        Arc::clone(&self.http)
    }

    /// The readiness latch, set once the gateway session is established.
    ///
    /// One-way: the client may only signal readiness, never force a
    /// lifecycle transition itself.
    #[must_use]
    pub fn ready(&self) -> ReadinessLatch {
        self.ready.clone()
    }

    /// Whether a gateway connection is currently active.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Runs the gateway connection until it closes or fails.
    ///
    /// Intended to be spawned as the client connection task. Sets the
    /// readiness latch on READY and feeds message events to `responder`.
    ///
    /// # Errors
    ///
    /// Returns a gateway error if the connection cannot be established or
    /// the server ends the session.
    pub async fn run(
        self: Arc<Self>,
        responder: Arc<MessageResponder>,
    ) -> Result<(), DiscordError> {
        let mut connection = Connection::connect(&self.token).await?;

        if let Ok(mut slot) = self.connection.lock() {
            *slot = Some(connection.handle());
        }

        loop {
            match connection.next_event().await? {
                None => {
                    tracing::info!("gateway stream closed");
                    return Ok(());
                }
                Some(GatewayEvent::Ready(user)) => {
                    tracing::info!(user = %user.tag(), "logged in, client ready");
                    responder.note_ready(&user);
                    self.ready.set();
                }
                Some(GatewayEvent::MessageCreate(message)) => {
                    responder.handle_message(*message).await;
                }
            }
        }
    }

    /// Closes the active connection, if any.
    ///
    /// Stops the heartbeat sub-task first, then the socket; both steps
    /// tolerate absence and failure silently. Idempotent.
    pub async fn close(&self) {
        let handle = self.connection.lock().ok().and_then(|mut slot| slot.take());
        match handle {
            Some(handle) => handle.shutdown().await,
            None => tracing::debug!("no active gateway connection to close"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn close_without_connection_is_a_noop() {
        let client = DiscordClient::new("test-token").unwrap();
        assert!(!client.is_connected());
        client.close().await;
        client.close().await;
    }

    #[test]
    fn readiness_latch_starts_unset() {
        let client = DiscordClient::new("test-token").unwrap();
        assert!(!client.ready().is_set());
    }
}
