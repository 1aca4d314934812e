//!
//! HTTP surface (C7): `/v1/messages` and `/v1/chat/completions`.
//!
//! Wires authentication, the request translators (C2), the model router
//! (C6), the upstream transport, and the SSE pipeline (C5) together into the
//! two public endpoints. Handlers stay thin; `AppState` owns the shared
//! collaborators.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::Event;
use axum::response::{IntoResponse, Response, Sse};
use axum::Json;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::cache::SignatureCache;
use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::model::google::{GoogleRequest, GoogleResponse, GoogleStreamEnvelope};
use crate::model::openai::{OpenAiRequest, OpenAiStreamChunk};
use crate::model::{Request as AnthropicRequest, StreamEvent};
use crate::router::{ModelRouter, RouteEntry};
use crate::sse::{AnthropicEventPipeline, IdleMonitor, IdleStatus, OpenAiStreamReframer};
use crate::translate::request::{AnthropicToGoogleConverter, OpenAiToAnthropicConverter};
use crate::translate::response::{anthropic_to_openai, google_to_anthropic};

/* --- types ----------------------------------------------------------------------------------- */

///
/// Shared application state handed to every handler via `axum::extract::State`.
pub struct AppState {
    pub config: Config,
    pub http_client: Client,
    pub cache: SignatureCache,
    pub router: ModelRouter,
    pub metrics: AppMetrics,
}

///
/// Operational counters surfaced on `/health`.
#[derive(Debug, Default)]
pub struct AppMetrics {
    pub total_requests: AtomicU64,
    pub successful_requests: AtomicU64,
    pub failed_requests: AtomicU64,
    pub empty_response_retries: AtomicU64,
}

/* --- constants ------------------------------------------------------------------------------ */

/** Upstream HTTP client timeout; generous because turns can run long. */
const HTTP_CLIENT_TIMEOUT_SECS: u64 = 600;

/** Channel buffer size for streaming responses. */
const STREAMING_CHANNEL_BUFFER: usize = 100;

/** Maximum accepted request body size (§4.7). */
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/** `Authorization` header bearer prefix. */
const BEARER_PREFIX: &str = "Bearer ";

/* --- start of code -------------------------------------------------------------------------- */

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(HTTP_CLIENT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProxyError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, http_client, cache: SignatureCache::new(), router: ModelRouter::new(), metrics: AppMetrics::default() })
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<()> {
        let provided = headers.get("authorization").and_then(|v| v.to_str().ok()).and_then(|v| v.strip_prefix(BEARER_PREFIX));

        match provided {
            Some(token) if token.as_bytes() == self.config.proxy_api_key.as_bytes() => Ok(()),
            _ => Err(ProxyError::Unauthorized),
        }
    }

    fn resolve_model(&self, caller_model: &str) -> Result<RouteEntry> {
        match self.router.resolve(caller_model) {
            Some(entry) => Ok(entry),
            None if self.config.fallback => self
                .router
                .resolve(&self.config.default_model)
                .ok_or_else(|| ProxyError::BadRequest(format!("unknown model: {caller_model}"))),
            None => Err(ProxyError::BadRequest(format!("unknown model: {caller_model}"))),
        }
    }
}

/* --- /v1/messages ------------------------------------------------------------------------------*/

pub async fn messages(State(state): State<Arc<AppState>>, headers: HeaderMap, body: axum::body::Bytes) -> Response {
    state.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

    match handle_messages(state.clone(), headers, body).await {
        Ok(response) => {
            state.metrics.successful_requests.fetch_add(1, Ordering::Relaxed);
            response
        }
        Err(e) => {
            state.metrics.failed_requests.fetch_add(1, Ordering::Relaxed);
            e.into_response()
        }
    }
}

async fn handle_messages(state: Arc<AppState>, headers: HeaderMap, body: axum::body::Bytes) -> Result<Response> {
    state.authenticate(&headers)?;
    if body.len() > MAX_BODY_BYTES {
        return Err(ProxyError::BadRequest("request body exceeds 32 MiB".to_string()));
    }

    let request: AnthropicRequest = serde_json::from_slice(&body)?;
    dispatch_anthropic(state, request).await
}

async fn dispatch_anthropic(state: Arc<AppState>, request: AnthropicRequest) -> Result<Response> {
    let route = state.resolve_model(&request.model)?;
    let stream = request.stream;
    let converter = AnthropicToGoogleConverter::new(&state.cache, route.family.clone());
    let google_request = converter.convert(request)?;

    if stream {
        stream_anthropic(state, google_request, route).await
    } else {
        let google_response = call_upstream_buffered(&state, &google_request, &route.upstream_id).await?;
        let response = google_to_anthropic(generate_message_id(), route.upstream_id, google_response);
        Ok(Json(response).into_response())
    }
}

async fn stream_anthropic(state: Arc<AppState>, google_request: GoogleRequest, route: RouteEntry) -> Result<Response> {
    let upstream = call_upstream_stream(&state, &google_request, &route.upstream_id).await?;
    let (tx, rx) = mpsc::channel::<std::result::Result<Event, std::convert::Infallible>>(STREAMING_CHANNEL_BUFFER);

    let message_id = generate_message_id();
    tokio::spawn(run_anthropic_pipeline(state, upstream, google_request, message_id, route, tx));

    Ok(Sse::new(ReceiverStream::new(rx)).into_response())
}

/// Drains one upstream SSE response into the pipeline. Returns `Ok(true)` if
/// the client disconnected mid-stream (caller should stop reading upstream).
async fn drain_anthropic_stream(
    state: &AppState,
    upstream: &mut reqwest::Response,
    pipeline: &mut AnthropicEventPipeline,
    monitor: &mut IdleMonitor,
    tx: &mpsc::Sender<std::result::Result<Event, std::convert::Infallible>>,
) -> bool {
    let mut buffer = String::new();

    loop {
        match upstream.chunk().await {
            Ok(Some(bytes)) => {
                monitor.record_activity(bytes.len());
                buffer.push_str(&String::from_utf8_lossy(&bytes));
                let (lines, rest) = split_sse_lines(&buffer);
                for line in lines {
                    if let Some(data) = extract_sse_data(line) {
                        if let Ok(envelope) = serde_json::from_str::<GoogleStreamEnvelope>(data) {
                            for event in pipeline.ingest_chunk(envelope.into_response(), &state.cache) {
                                if !send_event(tx, &event).await {
                                    return true;
                                }
                            }
                        }
                    }
                }
                buffer = rest;
            }
            Ok(None) => return false,
            Err(e) => {
                send_event(tx, &AnthropicEventPipeline::error_event(&e.to_string(), "upstream_error")).await;
                return false;
            }
        }

        match monitor.poll() {
            IdleStatus::Warn => tracing::warn!("upstream stream idle for 120s"),
            IdleStatus::TimedOut { idle_secs, chunks, bytes } => {
                let error = ProxyError::StreamIdleTimeout { idle_secs, chunks, bytes };
                send_event(tx, &AnthropicEventPipeline::error_event(&error.to_string(), error.error_type())).await;
                return false;
            }
            IdleStatus::Active => {}
        }
    }
}

async fn run_anthropic_pipeline(
    state: Arc<AppState>,
    mut upstream: reqwest::Response,
    google_request: GoogleRequest,
    message_id: String,
    route: RouteEntry,
    tx: mpsc::Sender<std::result::Result<Event, std::convert::Infallible>>,
) {
    let mut pipeline = AnthropicEventPipeline::new(message_id, route.upstream_id.clone(), route.family.clone());
    let mut monitor = IdleMonitor::new();

    if drain_anthropic_stream(&state, &mut upstream, &mut pipeline, &mut monitor, &tx).await {
        return;
    }

    if !pipeline.has_emitted_start() {
        match call_upstream_stream(&state, &google_request, &route.upstream_id).await {
            Ok(mut retried) => {
                state.metrics.empty_response_retries.fetch_add(1, Ordering::Relaxed);
                let mut monitor = IdleMonitor::new();
                if drain_anthropic_stream(&state, &mut retried, &mut pipeline, &mut monitor, &tx).await {
                    return;
                }
            }
            Err(e) => {
                send_event(&tx, &AnthropicEventPipeline::error_event(&e.to_string(), "upstream_error")).await;
                return;
            }
        }
    }

    if !pipeline.has_emitted_start() {
        let error = ProxyError::EmptyResponse;
        send_event(&tx, &AnthropicEventPipeline::error_event(&error.to_string(), error.error_type())).await;
        return;
    }

    for event in pipeline.finish() {
        if !send_event(&tx, &event).await {
            return;
        }
    }
}

/// Sends one Anthropic SSE event. Returns `false` if the client has disconnected
/// (receiver dropped), signalling the caller to stop reading the upstream.
async fn send_event(tx: &mpsc::Sender<std::result::Result<Event, std::convert::Infallible>>, event: &StreamEvent) -> bool {
    let Ok(data) = serde_json::to_string(event) else { return true };
    tx.send(Ok(Event::default().data(data))).await.is_ok()
}

/* --- /v1/chat/completions -----------------------------------------------------------------------*/

pub async fn chat_completions(State(state): State<Arc<AppState>>, headers: HeaderMap, body: axum::body::Bytes) -> Response {
    state.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

    match handle_chat_completions(state.clone(), headers, body).await {
        Ok(response) => {
            state.metrics.successful_requests.fetch_add(1, Ordering::Relaxed);
            response
        }
        Err(e) => {
            state.metrics.failed_requests.fetch_add(1, Ordering::Relaxed);
            e.into_response()
        }
    }
}

async fn handle_chat_completions(state: Arc<AppState>, headers: HeaderMap, body: axum::body::Bytes) -> Result<Response> {
    state.authenticate(&headers)?;
    if body.len() > MAX_BODY_BYTES {
        return Err(ProxyError::BadRequest("request body exceeds 32 MiB".to_string()));
    }

    let openai_request: OpenAiRequest = serde_json::from_slice(&body)?;
    let stream = openai_request.stream.unwrap_or(false);
    let route = state.resolve_model(&openai_request.model)?;
    let openai_converter = OpenAiToAnthropicConverter::new(state.config.log_level);
    let anthropic_request = openai_converter.convert(openai_request, route.enable_thinking)?;

    let converter = AnthropicToGoogleConverter::new(&state.cache, route.family.clone());
    let google_request = converter.convert(anthropic_request)?;

    if stream {
        stream_openai(state, google_request, route).await
    } else {
        let google_response = call_upstream_buffered(&state, &google_request, &route.upstream_id).await?;
        let anthropic_response = google_to_anthropic(generate_message_id(), route.upstream_id, google_response);
        let openai_response = anthropic_to_openai(current_unix_time(), anthropic_response);
        Ok(Json(openai_response).into_response())
    }
}

async fn stream_openai(state: Arc<AppState>, google_request: GoogleRequest, route: RouteEntry) -> Result<Response> {
    let upstream = call_upstream_stream(&state, &google_request, &route.upstream_id).await?;
    let (tx, rx) = mpsc::channel::<std::result::Result<Event, std::convert::Infallible>>(STREAMING_CHANNEL_BUFFER);

    let message_id = generate_message_id();
    tokio::spawn(run_openai_pipeline(state, upstream, google_request, message_id, route, tx));

    Ok(Sse::new(ReceiverStream::new(rx)).into_response())
}

/// Drains one upstream SSE response into the pipeline/reframer. Returns
/// `true` if the client disconnected mid-stream.
async fn drain_openai_stream(
    state: &AppState,
    upstream: &mut reqwest::Response,
    pipeline: &mut AnthropicEventPipeline,
    reframer: &mut OpenAiStreamReframer,
    monitor: &mut IdleMonitor,
    tx: &mpsc::Sender<std::result::Result<Event, std::convert::Infallible>>,
) -> bool {
    let mut buffer = String::new();

    loop {
        match upstream.chunk().await {
            Ok(Some(bytes)) => {
                monitor.record_activity(bytes.len());
                buffer.push_str(&String::from_utf8_lossy(&bytes));
                let (lines, rest) = split_sse_lines(&buffer);
                for line in lines {
                    if let Some(data) = extract_sse_data(line) {
                        if let Ok(envelope) = serde_json::from_str::<GoogleStreamEnvelope>(data) {
                            for event in pipeline.ingest_chunk(envelope.into_response(), &state.cache) {
                                if let Some(chunk) = reframer.reframe(&event) {
                                    if !send_openai_chunk(tx, &chunk).await {
                                        return true;
                                    }
                                }
                            }
                        }
                    }
                }
                buffer = rest;
            }
            Ok(None) => return false,
            Err(_) => return false,
        }

        if let IdleStatus::TimedOut { .. } = monitor.poll() {
            return false;
        }
    }
}

async fn run_openai_pipeline(
    state: Arc<AppState>,
    mut upstream: reqwest::Response,
    google_request: GoogleRequest,
    message_id: String,
    route: RouteEntry,
    tx: mpsc::Sender<std::result::Result<Event, std::convert::Infallible>>,
) {
    let mut pipeline = AnthropicEventPipeline::new(message_id, route.upstream_id.clone(), route.family.clone());
    let mut reframer = OpenAiStreamReframer::new(route.upstream_id.clone(), current_unix_time());
    let mut monitor = IdleMonitor::new();

    if drain_openai_stream(&state, &mut upstream, &mut pipeline, &mut reframer, &mut monitor, &tx).await {
        return;
    }

    if !pipeline.has_emitted_start() {
        match call_upstream_stream(&state, &google_request, &route.upstream_id).await {
            Ok(mut retried) => {
                state.metrics.empty_response_retries.fetch_add(1, Ordering::Relaxed);
                let mut monitor = IdleMonitor::new();
                if drain_openai_stream(&state, &mut retried, &mut pipeline, &mut reframer, &mut monitor, &tx).await {
                    return;
                }
            }
            Err(_) => return,
        }
    }

    if !pipeline.has_emitted_start() {
        return;
    }

    for event in pipeline.finish() {
        if let Some(chunk) = reframer.reframe(&event) {
            if !send_openai_chunk(&tx, &chunk).await {
                return;
            }
        }
    }
    let _ = tx.send(Ok(Event::default().data("[DONE]"))).await;
}

/// Sends one OpenAI-framed SSE chunk. Returns `false` if the client has
/// disconnected (receiver dropped).
async fn send_openai_chunk(tx: &mpsc::Sender<std::result::Result<Event, std::convert::Infallible>>, chunk: &OpenAiStreamChunk) -> bool {
    let Ok(data) = serde_json::to_string(chunk) else { return true };
    tx.send(Ok(Event::default().data(data))).await.is_ok()
}

/* --- upstream transport --------------------------------------------------------------------- */

async fn call_upstream_buffered(state: &AppState, request: &GoogleRequest, model: &str) -> Result<GoogleResponse> {
    match call_upstream_once(state, request, model).await {
        Ok(response) => Ok(response),
        Err(ProxyError::EmptyResponse) if state.config.enable_retries => {
            state.metrics.empty_response_retries.fetch_add(1, Ordering::Relaxed);
            call_upstream_once(state, request, model).await
        }
        Err(e) => Err(e),
    }
}

async fn call_upstream_once(state: &AppState, request: &GoogleRequest, model: &str) -> Result<GoogleResponse> {
    let url = format!("{}/v1/models/{}:generateContent", state.config.upstream_url, model);
    let response = state.http_client.post(url).json(request).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ProxyError::UpstreamFailure(format!("{status}: {body}")));
    }

    let google_response: GoogleResponse = response.json().await?;
    if google_response.candidates.is_empty() {
        return Err(ProxyError::EmptyResponse);
    }
    Ok(google_response)
}

async fn call_upstream_stream(state: &AppState, request: &GoogleRequest, model: &str) -> Result<reqwest::Response> {
    let url = format!("{}/v1/models/{}:streamGenerateContent?alt=sse", state.config.upstream_url, model);
    let response = state.http_client.post(url).json(request).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ProxyError::UpstreamFailure(format!("{status}: {body}")));
    }

    Ok(response)
}

/* --- SSE byte buffering --------------------------------------------------------------------- */

/// Split buffered text on complete lines, returning the completed lines and the
/// leftover partial line to prepend to the next chunk.
fn split_sse_lines(content: &str) -> (Vec<&str>, String) {
    let mut lines_to_process = Vec::new();
    let mut new_buffer = String::new();

    let ends_with_newline = content.ends_with('\n');
    let all_lines: Vec<&str> = content.lines().collect();
    let line_count = all_lines.len();

    for (i, line) in all_lines.into_iter().enumerate() {
        let is_last = i == line_count.saturating_sub(1);
        if is_last && !ends_with_newline {
            new_buffer = line.to_string();
        } else {
            lines_to_process.push(line);
        }
    }

    (lines_to_process, new_buffer)
}

fn extract_sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))
}

/* --- helpers --------------------------------------------------------------------------------- */

fn generate_message_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..24).map(|_| format!("{:x}", rng.gen_range(0..16))).collect();
    format!("msg_{suffix}")
}

fn current_unix_time() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

/* --- diagnostics ------------------------------------------------------------------------------ */

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let (hits, misses) = state.cache.stats();
    Json(json!({
        "status": "ok",
        "total_requests": state.metrics.total_requests.load(Ordering::Relaxed),
        "successful_requests": state.metrics.successful_requests.load(Ordering::Relaxed),
        "failed_requests": state.metrics.failed_requests.load(Ordering::Relaxed),
        "empty_response_retries": state.metrics.empty_response_retries.load(Ordering::Relaxed),
        "signature_cache": { "hits": hits, "misses": misses },
    }))
}

pub async fn models(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": [{
            "id": state.config.default_model,
            "object": "model",
            "created": current_unix_time(),
            "owned_by": "google",
        }]
    }))
}

/* --- tests ----------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_sse_lines_keeps_partial_last_line_in_buffer() {
        let (lines, rest) = split_sse_lines("data: one\ndata: two");
        assert_eq!(lines, vec!["data: one"]);
        assert_eq!(rest, "data: two");
    }

    #[test]
    fn split_sse_lines_emits_all_when_newline_terminated() {
        let (lines, rest) = split_sse_lines("data: one\ndata: two\n");
        assert_eq!(lines, vec!["data: one", "data: two"]);
        assert_eq!(rest, "");
    }

    #[test]
    fn extract_sse_data_strips_prefix() {
        assert_eq!(extract_sse_data("data: {}"), Some("{}"));
        assert_eq!(extract_sse_data("event: ping"), None);
    }
}
