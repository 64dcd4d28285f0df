//! Lifecycle coordination.
//!
//! Owns the startup ordering and the at-most-once shutdown of the two
//! long-running tasks: the Discord client connection and the protocol
//! server loop. Either one's termination (normal, erroring or externally
//! signalled) triggers a deterministic, ordered shutdown of the other.
//!
//! The exit signal is a one-way latch observed by polling: the OS-level
//! callbacks that set it may run outside the cooperative scheduler, so a
//! bounded-interval poll bridges the two worlds. The poll interval trades
//! shutdown latency against idle CPU cost. Client readiness, set from
//! within the scheduler, uses a native watch channel instead.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::StartupConfig;
use crate::discord::client::DiscordClient;
use crate::discord::events::MessageResponder;
use crate::mcp::server::{CallToolHandler, ListToolsHandler};
use crate::mcp::transport::Transport;
use crate::mcp::McpServer;

/// How long the shutdown sweep waits for each task to settle.
const SWEEP_BOUND: Duration = Duration::from_secs(2);

/// Fatal coordination failures.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The Discord client never became ready within the bound.
    #[error("Discord client failed to become ready within {timeout:?}")]
    StartupTimeout {
        /// The configured readiness timeout.
        timeout: Duration,
    },

    /// Signal handler installation or stream-level I/O failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Process-wide shutdown-request flag.
///
/// Settable once (idempotent beyond the first set), never reset, observed
/// by polling. Safe to trigger from outside the scheduler.
#[derive(Clone, Debug, Default)]
pub struct ExitSignal {
    flag: Arc<AtomicBool>,
}

impl ExitSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latches the signal. Idempotent.
    pub fn trigger(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            tracing::info!("exit signal latched");
        }
    }

    /// Whether the signal has been latched.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Waits until the signal is latched, polling at `poll_interval`.
    pub async fn wait(&self, poll_interval: Duration) {
        while !self.is_triggered() {
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// One-way readiness flag for a dependency.
///
/// Set exactly once when the dependency becomes usable; never resets.
/// Waiters inside the scheduler are woken through a watch channel.
#[derive(Clone, Debug)]
pub struct ReadinessLatch {
    tx: Arc<watch::Sender<bool>>,
}

impl ReadinessLatch {
    /// Creates an unset latch.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Sets the latch. Idempotent.
    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the latch has been set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Waits until the latch is set.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for ReadinessLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Coordinator lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing started yet.
    NotStarted,
    /// The Discord connection task is running, readiness pending.
    ClientConnecting,
    /// The Discord client reported readiness.
    ClientReady,
    /// The protocol server is serving.
    ServingProtocol,
    /// Ordered cleanup in progress.
    ShuttingDown,
    /// Cleanup finished.
    Stopped,
}

/// Installs the platform signal handlers and bridges them to the latch.
///
/// Must be wired before the client task starts so a signal arriving
/// during startup is not lost.
///
/// # Errors
///
/// Returns an error if a signal stream cannot be installed.
#[cfg(unix)]
pub fn spawn_signal_bridge(exit: &ExitSignal) -> io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let exit = exit.clone();

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => tracing::info!("received SIGINT, requesting shutdown"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, requesting shutdown"),
        }
        exit.trigger();
    }))
}

/// Installs the console control handlers and bridges them to the latch.
///
/// The control callback runs outside the cooperative scheduler, which is
/// why the latch is observed by polling rather than woken directly.
///
/// # Errors
///
/// Returns an error if a console event stream cannot be installed.
#[cfg(windows)]
pub fn spawn_signal_bridge(exit: &ExitSignal) -> io::Result<JoinHandle<()>> {
    use tokio::signal::windows::{ctrl_break, ctrl_c};

    let mut ctrl_c = ctrl_c()?;
    let mut ctrl_break = ctrl_break()?;
    let exit = exit.clone();

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = ctrl_c.recv() => tracing::info!("received Ctrl+C, requesting shutdown"),
            _ = ctrl_break.recv() => tracing::info!("received Ctrl+Break, requesting shutdown"),
        }
        exit.trigger();
    }))
}

/// The lifecycle coordinator.
///
/// Startup ordering: signal bridge, then the client connection task, then
/// — only after readiness — the protocol server task. Running: the server
/// task races the exit signal. Shutdown: always, at most once, lenient
/// per step.
pub struct Coordinator {
    exit: ExitSignal,
    ready_timeout: Duration,
    poll_interval: Duration,
    state: LifecycleState,
    shutdown_done: Arc<AtomicBool>,
}

impl Coordinator {
    /// Creates a coordinator with the configured startup timings.
    #[must_use]
    pub fn new(startup: &StartupConfig) -> Self {
        Self {
            exit: ExitSignal::new(),
            ready_timeout: Duration::from_secs(startup.ready_timeout_secs),
            poll_interval: Duration::from_millis(startup.poll_interval_ms),
            state: LifecycleState::NotStarted,
            shutdown_done: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The exit signal this coordinator races against.
    #[must_use]
    pub fn exit_signal(&self) -> ExitSignal {
        self.exit.clone()
    }

    /// The flag recording whether orderly shutdown has run.
    ///
    /// Shared with the emergency [`ShutdownGuard`].
    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown_done)
    }

    /// The current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    fn transition(&mut self, to: LifecycleState) {
        tracing::info!(from = ?self.state, to = ?to, "lifecycle transition");
        self.state = to;
    }

    /// Runs the coordinated lifecycle to completion.
    ///
    /// Returns `Ok(())` for a normal or signal-interrupted shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::StartupTimeout`] if the client never
    /// becomes ready (cleanup still runs), or an I/O error if the signal
    /// bridge cannot be installed.
    pub async fn run(
        &mut self,
        client: Arc<DiscordClient>,
        responder: Arc<MessageResponder>,
        transport: Transport,
        list_handler: Arc<dyn ListToolsHandler>,
        call_handler: Arc<dyn CallToolHandler>,
    ) -> Result<(), RuntimeError> {
        let bridge_task = spawn_signal_bridge(&self.exit)?;

        self.transition(LifecycleState::ClientConnecting);
        let client_task = tokio::spawn({
            let client = Arc::clone(&client);
            async move {
                match client.run(responder).await {
                    Ok(()) => tracing::info!("Discord client task finished"),
                    Err(e) => tracing::error!(error = %e, "Discord client task failed"),
                }
            }
        });

        let ready = client.ready();
        let exit = self.exit.clone();
        let ready_timeout = self.ready_timeout;
        let poll_interval = self.poll_interval;

        let became_ready = tokio::select! {
            outcome = tokio::time::timeout(ready_timeout, ready.wait()) => outcome.is_ok(),
            () = exit.wait(poll_interval) => {
                tracing::info!("shutdown requested during startup");
                self.shutdown(&client, vec![
                    ("discord-client", client_task),
                    ("signal-bridge", bridge_task),
                ])
                .await;
                return Ok(());
            }
        };

        if !became_ready {
            tracing::error!(timeout = ?self.ready_timeout, "Discord client never became ready");
            self.shutdown(&client, vec![
                ("discord-client", client_task),
                ("signal-bridge", bridge_task),
            ])
            .await;
            return Err(RuntimeError::StartupTimeout {
                timeout: self.ready_timeout,
            });
        }

        self.transition(LifecycleState::ClientReady);

        let mut server = McpServer::new(transport);
        server.register_list_tools(list_handler);
        server.register_call_tool(call_handler);

        // The task logs its own outcome: a stream-level failure is treated
        // the same as the peer closing, either way the race is decided.
        let mut server_task = tokio::spawn(async move {
            match server.run().await {
                Ok(()) => tracing::info!("protocol server finished, peer closed the stream"),
                Err(e) => tracing::error!(error = %e, "protocol server stream failure"),
            }
        });
        self.transition(LifecycleState::ServingProtocol);

        let mut server_done = false;
        tokio::select! {
            joined = &mut server_task => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "protocol server task aborted unexpectedly");
                }
                server_done = true;
            }
            () = self.exit.wait(self.poll_interval) => {
                tracing::info!("exit signal received, shutting down");
            }
        }

        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();
        if !server_done {
            tasks.push(("protocol-server", server_task));
        }
        tasks.push(("discord-client", client_task));
        tasks.push(("signal-bridge", bridge_task));

        self.shutdown(&client, tasks).await;
        Ok(())
    }

    /// Runs the ordered cleanup: stop the client's keep-alive and
    /// connection first, then cancel and await every remaining task.
    ///
    /// At most once per coordinator; repeated invocations are no-ops.
    /// Returns whether cleanup actually ran. Individual step failures are
    /// logged, never propagated, and never block subsequent steps.
    pub async fn shutdown(
        &mut self,
        client: &DiscordClient,
        tasks: Vec<(&'static str, JoinHandle<()>)>,
    ) -> bool {
        if self.shutdown_done.swap(true, Ordering::SeqCst) {
            tracing::debug!("shutdown already ran, skipping");
            return false;
        }

        self.transition(LifecycleState::ShuttingDown);

        client.close().await;

        for (name, handle) in tasks {
            sweep_task(name, handle).await;
        }

        self.transition(LifecycleState::Stopped);
        tracing::info!("shutdown complete");
        true
    }
}

/// Requests cancellation of one task and awaits its settlement, bounded.
///
/// The cancellation outcome itself is swallowed; panics are logged, never
/// propagated. A task that ignores cancellation past the bound is left
/// behind with a warning rather than joined forever.
async fn sweep_task(name: &str, handle: JoinHandle<()>) {
    handle.abort();
    match tokio::time::timeout(SWEEP_BOUND, handle).await {
        Err(_) => tracing::warn!(task = name, "task ignored cancellation within bound"),
        Ok(Ok(())) => tracing::debug!(task = name, "task completed"),
        Ok(Err(e)) if e.is_cancelled() => tracing::debug!(task = name, "task cancelled"),
        Ok(Err(e)) => tracing::error!(task = name, error = %e, "task failed during shutdown"),
    }
}

/// Last-resort cleanup for an unclean exit.
///
/// If the process leaves `main` without the coordinator having run its
/// shutdown (panic unwinding, early fatal error), this guard performs a
/// synchronous best-effort close of the Discord connection on a freshly
/// built short-lived runtime. All failures are swallowed unconditionally.
pub struct ShutdownGuard {
    client: Arc<DiscordClient>,
    completed: Arc<AtomicBool>,
}

impl ShutdownGuard {
    /// Arms the guard for the given client.
    ///
    /// `completed` is the coordinator's shutdown flag; once it is set the
    /// guard becomes a no-op.
    #[must_use]
    pub fn new(client: Arc<DiscordClient>, completed: Arc<AtomicBool>) -> Self {
        Self { client, completed }
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        if self.completed.load(Ordering::SeqCst) {
            return;
        }

        tracing::warn!("process exiting without orderly shutdown, running emergency cleanup");
        let client = Arc::clone(&self.client);
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            if let Ok(runtime) = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                runtime.block_on(async {
                    let _ = tokio::time::timeout(SWEEP_BOUND, client.close()).await;
                });
            }
        }));
    }
}
