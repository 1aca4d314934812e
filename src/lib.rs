//! # cloudcode-proxy
//!
//! A local HTTP proxy that bridges OpenAI Chat Completions and Anthropic
//! Messages client dialects to a Cloud Code upstream speaking Google's
//! generative-AI request/response shape. Translates requests and responses
//! in both directions, re-frames streaming output per dialect, sanitizes
//! tool JSON schemas, and keeps cross-turn "thinking" signatures alive when
//! clients drop them.
//!
//! ## Library usage
//!
//! ```rust,no_run
//! use cloudcode_proxy::{Config, create_app};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let app = create_app(config)?;
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`] — environment-backed runtime configuration
//! - [`error`] — error types and the JSON error envelope
//! - [`cache`] — thinking-signature cache (C1)
//! - [`model`] — shared Anthropic pivot data model, plus `model::openai` and `model::google` wire types
//! - [`schema`] — JSON-schema sanitizer (C4)
//! - [`router`] — model routing table (C6)
//! - [`translate`] — request/response translators (C2, C3)
//! - [`sse`] — streaming pipeline and OpenAI re-framing (C5)
//! - [`server`] — HTTP surface (C7)
//!
//! Authors: Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod router;
pub mod schema;
pub mod server;
pub mod sse;
pub mod translate;

pub use config::Config;
pub use error::ProxyError;

/// Build the full application router: both endpoints, diagnostics, and the
/// CORS/tracing middleware stack.
///
/// # Errors
///
/// Returns a `ProxyError` if the upstream HTTP client cannot be built.
pub fn create_app(config: Config) -> Result<axum::Router, ProxyError> {
    use axum::routing::{get, post};
    use axum::Router;
    use std::sync::Arc;
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    let app_state = Arc::new(server::AppState::new(config)?);

    Ok(Router::new()
        .route("/v1/messages", post(server::messages))
        .route("/v1/chat/completions", post(server::chat_completions))
        .route("/v1/models", get(server::models))
        .route("/health", get(server::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state))
}
