//! Integration tests for the lifecycle coordinator.
//!
//! These run against an offline Discord client: the gateway connection
//! task is real but never becomes ready, which is exactly what the
//! startup-timeout and exit-signal paths need to exercise deterministic
//! shutdown behaviour.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use discord_mcp::config::{BotConfig, StartupConfig};
use discord_mcp::discord::events::MessageResponder;
use discord_mcp::discord::DiscordClient;
use discord_mcp::mcp::server::{CallToolHandler, HandlerError, ListToolsHandler};
use discord_mcp::mcp::{ContentItem, ToolDescriptor, Transport};
use discord_mcp::runtime::{Coordinator, LifecycleState, RuntimeError};
use discord_mcp::templates::TemplateManager;

struct EmptyCatalog;

#[async_trait]
impl ListToolsHandler for EmptyCatalog {
    async fn list_tools(&self) -> Vec<ToolDescriptor> {
        Vec::new()
    }
}

struct RejectAll;

#[async_trait]
impl CallToolHandler for RejectAll {
    async fn call_tool(
        &self,
        tool: &str,
        _arguments: Map<String, Value>,
    ) -> Result<Vec<ContentItem>, HandlerError> {
        Err(format!("Unknown tool: {tool}").into())
    }
}

fn startup_config() -> StartupConfig {
    StartupConfig {
        ready_timeout_secs: 1,
        poll_interval_ms: 10,
    }
}

fn offline_client() -> Arc<DiscordClient> {
    Arc::new(DiscordClient::new("offline-test-token").unwrap())
}

fn responder(client: &DiscordClient) -> Arc<MessageResponder> {
    let dir = tempfile::tempdir().unwrap();
    let templates = Arc::new(TemplateManager::load(dir.path()).unwrap());
    Arc::new(MessageResponder::new(
        client.http(),
        templates,
        BotConfig::default(),
    ))
}

fn channel_transport() -> (mpsc::Sender<Vec<u8>>, Transport) {
    let (in_tx, in_rx) = mpsc::channel(8);
    let (out_tx, _out_rx) = mpsc::channel(8);
    (in_tx, Transport::from_channel(in_rx, out_tx))
}

#[tokio::test]
async fn startup_timeout_aborts_and_cleans_up() {
    let client = offline_client();
    let responder = responder(&client);
    let (_in_tx, transport) = channel_transport();

    let mut coordinator = Coordinator::new(&startup_config());
    let started = Instant::now();

    let result = coordinator
        .run(
            Arc::clone(&client),
            responder,
            transport,
            Arc::new(EmptyCatalog),
            Arc::new(RejectAll),
        )
        .await;

    assert!(matches!(result, Err(RuntimeError::StartupTimeout { .. })));
    assert_eq!(coordinator.state(), LifecycleState::Stopped);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn exit_signal_interrupts_the_serving_race() {
    let client = offline_client();
    let responder = responder(&client);
    let (in_tx, transport) = channel_transport();

    // Readiness is latched manually; the real gateway never connects here
    client.ready().set();

    let mut coordinator = Coordinator::new(&startup_config());
    let exit = coordinator.exit_signal();

    let run = tokio::spawn(async move {
        let result = coordinator
            .run(
                Arc::clone(&client),
                responder,
                transport,
                Arc::new(EmptyCatalog),
                Arc::new(RejectAll),
            )
            .await;
        (result, coordinator)
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    exit.trigger();

    let (result, coordinator) = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("run should settle after the exit signal")
        .unwrap();

    assert!(result.is_ok(), "signal-interrupted shutdown is a success");
    assert_eq!(coordinator.state(), LifecycleState::Stopped);

    // The input stream stayed open the whole time; only the signal ended it
    drop(in_tx);
}

#[tokio::test]
async fn peer_closing_the_stream_completes_normally() {
    let client = offline_client();
    let responder = responder(&client);
    let (in_tx, transport) = channel_transport();

    client.ready().set();
    drop(in_tx);

    let mut coordinator = Coordinator::new(&startup_config());
    let result = coordinator
        .run(
            Arc::clone(&client),
            responder,
            transport,
            Arc::new(EmptyCatalog),
            Arc::new(RejectAll),
        )
        .await;

    assert!(result.is_ok());
    assert_eq!(coordinator.state(), LifecycleState::Stopped);
}
