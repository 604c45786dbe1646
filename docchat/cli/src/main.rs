//! DocChat - Terminal client for document-grounded chat
//!
//! Streams answers from the document service into the terminal as they are
//! generated. Attach a document with `/attach` to ask about it directly.
//!
//! # Usage
//!
//! ```bash
//! # Ask the default service (http://localhost:8080/api/v1)
//! docchat --identity ada@example.com
//!
//! # Another service, credential from the environment
//! DOCCHAT_TOKEN=... docchat --api-url https://docs.example.com/api/v1 --identity ada@example.com
//!
//! # With config file
//! docchat --config ~/.config/docchat/config.toml
//!
//! # Verbose logging (goes to stderr)
//! RUST_LOG=debug docchat
//! ```
//!
//! # Signals
//!
//! - `SIGINT` while an answer streams: cancel the answer
//! - `SIGINT` at the prompt: exit

mod commands;
mod render;
mod repl;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use docchat_core::{
    default_config_path, load_config_from_path, AnswerBackend, ClientConfig, ConfigOverrides,
    Dispatcher, HttpBackend, SessionContext,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

use render::{run_renderer, Renderer};
use repl::Repl;

/// DocChat - Ask questions about your documents
#[derive(Parser, Debug)]
#[command(name = "docchat")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Base URL of the document service API
    #[arg(short = 'u', long, value_name = "URL")]
    api_url: Option<String>,

    /// Identity (email) sent with each query
    #[arg(short = 'i', long, value_name = "EMAIL")]
    identity: Option<String>,

    /// Bearer credential for the document service
    #[arg(short = 't', long, env = "DOCCHAT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "DOCCHAT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "DOCCHAT_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so they never interleave with answer text on stdout.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("docchat={level},docchat_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve configuration: CLI flags > environment > file > defaults
fn resolve_config(args: &Args) -> Result<ClientConfig> {
    let path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(ref url) = args.api_url {
        overrides = overrides.with_api_base_url(url);
    }
    if let Some(ref identity) = args.identity {
        overrides = overrides.with_identity(identity);
    }
    overrides
        .apply(&mut config)
        .context("Invalid command-line override")?;

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("DocChat starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = resolve_config(&args)?;
    info!(
        api = %config.api_base_url,
        source = %config.source(),
        "Configuration resolved"
    );

    let identity = config.identity.clone().context(
        "No identity configured: pass --identity, set DOCCHAT_IDENTITY, \
         or add [session] identity to the config file",
    )?;
    let mut context = SessionContext::new(identity);
    if let Some(token) = args.token.clone() {
        context = context.with_credential(token);
    }

    let backend = HttpBackend::new(&config).context("Failed to create HTTP client")?;
    if !backend.health_check().await {
        warn!(api = %config.api_base_url, "Document service did not answer the health check");
    }

    let (notice_tx, notice_rx) = mpsc::channel(config.stream_channel_capacity);
    let (console_tx, console_rx) = mpsc::channel(16);

    let renderer = tokio::spawn(run_renderer(
        Renderer::new(tokio::io::stdout()),
        notice_rx,
        console_rx,
    ));

    let dispatcher = Dispatcher::new(backend, context, config, notice_tx);
    let result = Repl::new(dispatcher, console_tx).run().await;

    // The REPL owned both senders; the renderer drains and exits
    if let Err(e) = renderer.await {
        warn!(error = %e, "Renderer task failed");
    }

    info!("DocChat stopped");
    result
}
