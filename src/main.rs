//! discord-mcp: stdio bridge exposing Discord operations as tools
//!
//! Serves `list_tools`/`call_tool` commands over stdin/stdout, each tool
//! backed by a persistent Discord client connection.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use discord_mcp::config;
use discord_mcp::discord::events::MessageResponder;
use discord_mcp::discord::DiscordClient;
use discord_mcp::mcp::Transport;
use discord_mcp::runtime::{Coordinator, ShutdownGuard};
use discord_mcp::templates::TemplateManager;
use discord_mcp::tools::ToolDispatcher;

/// Stdio bridge exposing Discord operations as tools.
///
/// Reads one JSON command per line from stdin and answers each with one
/// response envelope on stdout. Requires the DISCORD_TOKEN environment
/// variable.
#[derive(Parser, Debug)]
#[command(name = "discord-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            _ => Level::ERROR,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
///
/// Logs go to stderr exclusively; stdout belongs to the protocol.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Entry point for the discord-mcp bridge.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    // Display GPL license notice (required by GPLv3 Section 5d)
    eprintln!(
        "discord-mcp {}  Copyright (C) 2026  The Embedded Society",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("This program comes with ABSOLUTELY NO WARRANTY.");
    eprintln!("This is free software, licensed under GPL-3.0-or-later.");
    eprintln!("Source: {}", env!("CARGO_PKG_REPOSITORY"));
    eprintln!();

    // The credential is required before any task starts
    let token = match config::resolve_token() {
        Ok(token) => token,
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            eprintln!("Export DISCORD_TOKEN with your bot token before starting.");
            return ExitCode::FAILURE;
        }
    };

    let templates_dir = cfg.templates_dir();
    let templates = match TemplateManager::load(&templates_dir) {
        Ok(templates) => Arc::new(templates),
        Err(e) => {
            error!(error = %e, "failed to load message templates");
            eprintln!("Template error: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting discord-mcp bridge"
    );

    let client = match DiscordClient::new(&token) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "failed to build Discord client");
            return ExitCode::FAILURE;
        }
    };

    let responder = Arc::new(MessageResponder::new(
        client.http(),
        Arc::clone(&templates),
        cfg.bot.clone(),
    ));
    let dispatcher = Arc::new(ToolDispatcher::new(client.http(), client.ready()));

    let mut coordinator = Coordinator::new(&cfg.startup);

    // Emergency cleanup if main is left without orderly shutdown
    let _guard = ShutdownGuard::new(Arc::clone(&client), coordinator.shutdown_flag());

    // Single cooperative scheduler; all tasks interleave on one thread
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime");

    let dispatcher_for_list = Arc::clone(&dispatcher);
    let list_handler: Arc<dyn discord_mcp::mcp::ListToolsHandler> = dispatcher_for_list;
    let call_handler: Arc<dyn discord_mcp::mcp::CallToolHandler> = dispatcher;

    let result = runtime.block_on(coordinator.run(
        Arc::clone(&client),
        responder,
        Transport::stdio(),
        list_handler,
        call_handler,
    ));

    match result {
        Ok(()) => {
            info!("Bridge shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Bridge error");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn quiet_wins_over_config_level() {
        assert_eq!(get_log_level(0, true, "debug"), Level::ERROR);
    }

    #[test]
    fn verbosity_ladder() {
        assert_eq!(get_log_level(0, false, "warn"), Level::WARN);
        assert_eq!(get_log_level(1, false, "warn"), Level::INFO);
        assert_eq!(get_log_level(2, false, "warn"), Level::DEBUG);
        assert_eq!(get_log_level(3, false, "warn"), Level::TRACE);
    }
}
