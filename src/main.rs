//! # cloudcode-proxy
//!
//! A local HTTP proxy server bridging OpenAI and Anthropic client dialects to
//! a Google-generative-AI-shaped Cloud Code upstream. Built with Rust
//! following SOLID principles for type safety, performance, and reliability.
//!
//! ## Features
//!
//! - **Dual client dialects**: `/v1/messages` (Anthropic) and `/v1/chat/completions` (OpenAI)
//! - **Tool/function calling**: full round-trip support for both dialects
//! - **Streaming**: Server-Sent Events translated live, not buffered-then-replayed
//! - **Thinking-signature continuity**: opaque cross-turn tokens survive dialect round-trips
//! - **Structured logging**: `tracing` with configurable verbosity
//!
//! ## Quick start
//!
//! ```bash
//! export PROXY_API_KEY="your-local-key"
//! export UPSTREAM_URL="https://your-upstream.example.com"
//! cloudcode-proxy
//! ```
//!
//! Authors: Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use cloudcode_proxy::config::Config;
use cloudcode_proxy::error::{ProxyError, Result};
use cloudcode_proxy::server::{self, AppState};

/* --- constants ------------------------------------------------------------------------------ */

/** the version as defined in cargo.toml */
const VERSION: &str = env!("CARGO_PKG_VERSION");

/* --- types ----------------------------------------------------------------------------------- */

///
/// Command-line overrides layered on top of the environment-backed `Config`.
#[derive(Parser, Debug)]
#[command(name = "cloudcode-proxy", version = VERSION, about = "Local proxy bridging OpenAI/Anthropic clients to a Cloud Code upstream")]
struct Cli {
    /// Enable debug-level logging regardless of LOG_LEVEL.
    #[arg(long)]
    debug: bool,

    /// Fall back to the default model instead of rejecting unknown caller models.
    #[arg(long)]
    fallback: bool,

    /// Skip auto-launching a browser at startup (handled by an external collaborator; accepted for compatibility).
    #[arg(long)]
    no_browser: bool,

    /// Skip spawning the local tunnelling helper (handled by an external collaborator; accepted for compatibility).
    #[arg(long)]
    no_ngrok: bool,

    /// Override the listening port.
    #[arg(long)]
    port: Option<u16>,
}

/* --- start of code -------------------------------------------------------------------------- */

///
/// Main application entry point for the Cloud Code proxy server.
///
/// Initializes logging, loads configuration from the environment (layering
/// CLI overrides on top), creates the application state, and starts the HTTP
/// server with proper routing and middleware.
#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        let error_msg = e.to_string();
        eprintln!("Error:");
        for line in error_msg.lines() {
            eprintln!("{line}");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = initialize_config()?;
    if cli.debug {
        config.log_level = cloudcode_proxy::config::LogLevel::Debug;
    }
    if cli.fallback {
        config.fallback = true;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    initialize_logging(&config);

    if cli.no_browser {
        info!("--no-browser: skipping browser auto-launch (external collaborator, not implemented here)");
    }
    if cli.no_ngrok {
        info!("--no-ngrok: skipping tunnel helper (external collaborator, not implemented here)");
    }

    let app_state = create_app_state(config.clone())?;
    let app = create_router(app_state);

    start_server(&config, app).await
}

/// Load configuration from environment variables.
fn initialize_config() -> Result<Config> {
    Config::from_env()
}

/// Initialize the tracing subscriber at the configured log level.
fn initialize_logging(config: &Config) {
    tracing_subscriber::fmt().with_env_filter(config.log_level.as_filter_str()).with_target(false).init();
}

/// Build application state wrapped for sharing across handlers.
fn create_app_state(config: Config) -> Result<Arc<AppState>> {
    Ok(Arc::new(AppState::new(config)?))
}

/// Build the Axum router with both client-dialect endpoints plus diagnostics.
fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/messages", post(server::messages))
        .route("/v1/chat/completions", post(server::chat_completions))
        .route("/v1/models", get(server::models))
        .route("/health", get(server::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Bind the configured port and serve, with a helpful message on bind failure.
async fn start_server(config: &Config, app: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await.map_err(|e| {
        let error_msg = format!("Failed to bind to port {}: {e}", config.port);
        let error_str = e.to_string();

        if error_str.contains("Address already in use") || error_str.contains("address already in use") {
            ProxyError::Internal(format!(
                "{error_msg}\n\n\
                Port {0} is already in use. Here are some solutions:\n\n\
                1. Find and stop the other process:\n\
                   lsof -i :{0}\n\
                   kill -9 <PID>\n\n\
                2. Use a different port:\n\
                   cloudcode-proxy --port 3001",
                config.port
            ))
        } else {
            ProxyError::Internal(format!(
                "{error_msg}\n\n\
                Check that the port is valid (1-65535) and that you have permission to bind to it."
            ))
        }
    })?;

    log_startup_info(config);

    axum::serve(listener, app).await.map_err(|e| ProxyError::Internal(format!("server error: {e}")))?;

    Ok(())
}

/// Log startup information: version, port, and active dialects.
fn log_startup_info(config: &Config) {
    info!("cloudcode-proxy v{VERSION} listening on port {}", config.port);
    info!("Anthropic endpoint:  http://localhost:{}/v1/messages", config.port);
    info!("OpenAI endpoint:     http://localhost:{}/v1/chat/completions", config.port);

    if config.log_level.is_trace_enabled() {
        info!("[TRACE] trace logging enabled — translated requests and upstream events will be logged");
    }
}
