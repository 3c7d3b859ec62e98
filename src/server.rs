//! HTTP API server.
//!
//! Exposes the assistant over a small JSON API for browser clients.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/query` | Answer a question, JSON response |
//! | `POST` | `/api/chat` | Alias for `/api/query` |
//! | `POST` | `/api/chat/stream` | Answer a question as an SSE stream |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "unsafe_input", "message": "Unsafe input detected" } }
//! ```
//!
//! Error codes mirror [`AssistantError::kind`]. Validation failures map to
//! 400, rate limiting to 429, embedding exhaustion to 503, everything else
//! to 500.
//!
//! # Streaming
//!
//! The stream endpoint emits the finished answer in fixed-size `data:`
//! chunks followed by a terminal `data: [DONE]` event. The terminal event
//! is sent even when answering fails partway; validation failures are
//! rejected with a plain HTTP error before any event is sent.

use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderValue, StatusCode},
    response::sse::{Event as SseEvent, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::AssistantError;
use crate::models::QueryResult;
use crate::query::Assistant;
use crate::synthesis::chunk_answer;

/// Delay between streamed chunks.
const STREAM_DELAY: Duration = Duration::from_millis(20);

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    assistant: Arc<Assistant>,
    limiter: Option<RateLimiter>,
    stream_chunk_chars: usize,
}

/// Starts the HTTP server on the configured bind address.
///
/// The assistant is assembled once at startup, so a missing index fails
/// here rather than on the first request.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let assistant = Assistant::from_config(config).await?;

    let state = AppState {
        assistant: Arc::new(assistant),
        limiter: RateLimiter::new(config.server.rate_limit_per_minute),
        stream_chunk_chars: config.server.stream_chunk_chars,
    };

    let cors = build_cors(&config.server.cors_origins);

    let mut app = Router::new()
        .route("/api/query", post(handle_query))
        .route("/api/chat", post(handle_query))
        .route("/api/chat/stream", post(handle_chat_stream))
        .route("/health", get(handle_health))
        .with_state(state);

    if config.server.serve_static {
        app = app.fallback_service(ServeDir::new(&config.server.static_dir));
        info!(dir = %config.server.static_dir.display(), "serving static files");
    }

    let app = app.layer(cors);

    println!("askdocs server listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn build_cors(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let mut allowed = Vec::new();
    for origin in origins {
        match origin.parse::<HeaderValue>() {
            Ok(value) => allowed.push(value),
            Err(_) => warn!(origin = %origin, "ignoring unparseable CORS origin"),
        }
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

// ============ Rate limiting ============

/// Per-IP sliding window rate limiter.
///
/// Each client keeps the timestamps of its requests from the last minute;
/// a request is allowed while the window holds fewer than the limit.
#[derive(Clone)]
struct RateLimiter {
    state: Arc<Mutex<LimiterState>>,
    limit: usize,
    window: Duration,
}

struct LimiterState {
    clients: HashMap<IpAddr, VecDeque<Instant>>,
    last_sweep: Instant,
}

impl RateLimiter {
    fn new(per_minute: u32) -> Option<Self> {
        if per_minute == 0 {
            return None;
        }
        Some(Self {
            state: Arc::new(Mutex::new(LimiterState {
                clients: HashMap::new(),
                last_sweep: Instant::now(),
            })),
            limit: per_minute as usize,
            window: Duration::from_secs(60),
        })
    }

    async fn acquire(&self, ip: IpAddr) -> bool {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        // At most once per window, drop clients whose newest hit has left
        // the window, so the map does not grow with every IP ever seen.
        if now.duration_since(state.last_sweep) >= self.window {
            let window = self.window;
            state
                .clients
                .retain(|_, hits| hits.back().is_some_and(|t| now.duration_since(*t) < window));
            state.last_sweep = now;
        }

        let hits = state.clients.entry(ip).or_default();

        while let Some(front) = hits.front() {
            if now.duration_since(*front) >= self.window {
                hits.pop_front();
            } else {
                break;
            }
        }

        if hits.len() >= self.limit {
            false
        } else {
            hits.push_back(now);
            true
        }
    }
}

async fn check_rate_limit(state: &AppState, ip: IpAddr) -> Result<(), AppError> {
    if let Some(limiter) = &state.limiter {
        if !limiter.acquire(ip).await {
            return Err(AppError {
                status: StatusCode::TOO_MANY_REQUESTS,
                code: "rate_limited".to_string(),
                message: "Too many requests, try again shortly".to_string(),
            });
        }
    }
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<AssistantError> for AppError {
    fn from(err: AssistantError) -> Self {
        let status = match &err {
            AssistantError::QuestionEmpty
            | AssistantError::QuestionTooLong { .. }
            | AssistantError::UnsafeInput
            | AssistantError::CorpusEmpty
            | AssistantError::CorpusFormat(_) => StatusCode::BAD_REQUEST,
            AssistantError::EmbeddingUnavailable | AssistantError::CollectionMissing(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AssistantError::GenerationFailed(_) | AssistantError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        AppError {
            status,
            code: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/query ============

#[derive(Deserialize)]
struct QueryRequest {
    #[serde(default)]
    question: String,
}

/// Handler for `POST /api/query` and its `/api/chat` alias.
async fn handle_query(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResult>, AppError> {
    check_rate_limit(&state, addr.ip()).await?;
    let result = state.assistant.answer(&req.question).await?;
    Ok(Json(result))
}

// ============ POST /api/chat/stream ============

/// Handler for `POST /api/chat/stream`.
///
/// The whole answer is produced before the first event; streaming is
/// pacing, not incremental generation.
async fn handle_chat_stream(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<QueryRequest>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, AppError> {
    check_rate_limit(&state, addr.ip()).await?;

    let outcome = state.assistant.answer(&req.question).await;
    let payloads = stream_payloads(outcome, state.stream_chunk_chars)?;

    let stream = futures_util::stream::iter(payloads).then(|chunk| async move {
        tokio::time::sleep(STREAM_DELAY).await;
        Ok::<_, Infallible>(SseEvent::default().data(chunk))
    });

    Ok(Sse::new(stream))
}

/// Event payloads for one stream, ending with the `[DONE]` marker.
///
/// Input validation failures become the HTTP error instead of a stream;
/// any other pipeline failure is delivered in-stream so a client that
/// already started reading still gets a well-formed termination.
fn stream_payloads(
    outcome: Result<QueryResult, AssistantError>,
    chunk_chars: usize,
) -> Result<Vec<String>, AppError> {
    let mut payloads = match outcome {
        Ok(result) => chunk_answer(&result.answer, chunk_chars),
        Err(
            err @ (AssistantError::QuestionEmpty
            | AssistantError::QuestionTooLong { .. }
            | AssistantError::UnsafeInput),
        ) => return Err(err.into()),
        Err(err) => vec![format!("Error: {err}")],
    };
    payloads.push("[DONE]".to_string());
    Ok(payloads)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([127, 0, 0, last])
    }

    #[test]
    fn zero_limit_disables_rate_limiting() {
        assert!(RateLimiter::new(0).is_none());
    }

    #[tokio::test]
    async fn limiter_blocks_after_limit() {
        let limiter = RateLimiter::new(2).unwrap();
        assert!(limiter.acquire(ip(1)).await);
        assert!(limiter.acquire(ip(1)).await);
        assert!(!limiter.acquire(ip(1)).await);
    }

    #[tokio::test]
    async fn limiter_tracks_clients_separately() {
        let limiter = RateLimiter::new(1).unwrap();
        assert!(limiter.acquire(ip(1)).await);
        assert!(!limiter.acquire(ip(1)).await);
        assert!(limiter.acquire(ip(2)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn limiter_window_slides() {
        let limiter = RateLimiter::new(1).unwrap();
        assert!(limiter.acquire(ip(1)).await);
        assert!(!limiter.acquire(ip(1)).await);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.acquire(ip(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn limiter_evicts_idle_clients() {
        let limiter = RateLimiter::new(1).unwrap();
        for last in 0..100u8 {
            assert!(limiter.acquire(ip(last)).await);
        }
        assert_eq!(limiter.state.lock().await.clients.len(), 100);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.acquire(ip(200)).await);

        let state = limiter.state.lock().await;
        assert_eq!(state.clients.len(), 1);
        assert!(state.clients.contains_key(&ip(200)));
    }

    #[test]
    fn stream_ends_with_done_marker() {
        let result = QueryResult {
            query: "how do I create a ticket".to_string(),
            matches: Vec::new(),
            answer: "a".repeat(300),
        };
        let payloads = stream_payloads(Ok(result), 140).unwrap();
        assert_eq!(payloads.len(), 4);
        assert_eq!(payloads[0].len(), 140);
        assert_eq!(payloads.last().map(String::as_str), Some("[DONE]"));
    }

    #[test]
    fn pipeline_failure_streams_error_then_done() {
        let payloads = stream_payloads(Err(AssistantError::EmbeddingUnavailable), 140).unwrap();
        assert_eq!(payloads.len(), 2);
        assert!(payloads[0].starts_with("Error: "));
        assert_eq!(payloads[1], "[DONE]");
    }

    #[test]
    fn validation_failure_rejects_instead_of_streaming() {
        let err = stream_payloads(Err(AssistantError::QuestionEmpty), 140).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "empty_question");
    }

    #[test]
    fn error_statuses_follow_error_kind() {
        let cases = [
            (AssistantError::QuestionEmpty, StatusCode::BAD_REQUEST),
            (AssistantError::UnsafeInput, StatusCode::BAD_REQUEST),
            (
                AssistantError::QuestionTooLong {
                    limit: 10,
                    actual: 20,
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                AssistantError::EmbeddingUnavailable,
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AssistantError::CollectionMissing("api_docs".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AssistantError::GenerationFailed("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            let kind = err.kind();
            let app_err = AppError::from(err);
            assert_eq!(app_err.status, status);
            assert_eq!(app_err.code, kind);
        }
    }
}
