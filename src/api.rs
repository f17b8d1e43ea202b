//! REST API Server for the crypto chat agent
//!
//! Exposes one orchestrator session per `chat_id` over HTTP, with a
//! server-sent events variant that streams intermediate displays.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::{delete, get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::agent::{Orchestrator, SessionFactory};
use crate::config::SessionConfig;
use crate::models::{TurnResult, TurnUpdate};

pub const DEFAULT_CHAT_ID: &str = "default";

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRequest {
    pub chat_id: Option<String>,
    pub message: String,
}

impl ChatRequest {
    fn chat_id(&self) -> String {
        match self.chat_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => DEFAULT_CHAT_ID.to_string(),
        }
    }
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatReply {
    pub chat_id: String,
    pub turn: TurnResult,
    pub markdown: String,
}

/// One server-sent event of a streamed turn
#[derive(Debug)]
enum StreamEvent {
    Update(TurnUpdate),
    Turn(ChatReply),
}

/// =============================
/// API State
/// =============================

type Session = Arc<Mutex<Orchestrator>>;

/// Live chat sessions. Bounded in number; idle sessions expire together
/// with their history.
#[derive(Clone)]
pub struct ApiState {
    factory: SessionFactory,
    sessions: Cache<String, Session>,
}

impl ApiState {
    pub fn new(factory: SessionFactory, limits: &SessionConfig) -> Self {
        Self {
            factory,
            sessions: Cache::builder()
                .max_capacity(limits.max_sessions)
                .time_to_idle(limits.idle_ttl)
                .build(),
        }
    }

    async fn session(&self, chat_id: &str) -> Session {
        self.sessions
            .get_with(chat_id.to_string(), async {
                info!(chat_id = %chat_id, "Creating chat session");
                Arc::new(Mutex::new(self.factory.create()))
            })
            .await
    }

    async fn existing_session(&self, chat_id: &str) -> Option<Session> {
        self.sessions.get(chat_id).await
    }

    async fn end_session(&self, chat_id: &str) -> bool {
        self.sessions.remove(chat_id).await.is_some()
    }
}

type ApiError = (StatusCode, Json<ApiResponse>);

fn reject_blank(req: &ChatRequest) -> Result<(), ApiError> {
    if req.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Message must not be empty")),
        ));
    }
    Ok(())
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoints
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    reject_blank(&req)?;
    let chat_id = req.chat_id();
    info!(chat_id = %chat_id, "chat request");

    let session = state.session(&chat_id).await;
    let turn = session.lock().await.continue_conversation(&req.message).await;

    Ok(Json(ApiResponse::success(ChatReply {
        chat_id,
        markdown: turn.display.to_markdown(),
        turn,
    })))
}

async fn history_handler(
    State(state): State<ApiState>,
    Path(chat_id): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    let Some(session) = state.existing_session(&chat_id).await else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Unknown chat: {}", chat_id))),
        ));
    };

    let orchestrator = session.lock().await;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "chat_id": chat_id,
        "entries": orchestrator.history().entries(),
    }))))
}

async fn end_chat_handler(
    State(state): State<ApiState>,
    Path(chat_id): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    if !state.end_session(&chat_id).await {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Unknown chat: {}", chat_id))),
        ));
    }

    info!(chat_id = %chat_id, "Chat session ended");
    Ok(Json(ApiResponse::success(serde_json::json!({ "chat_id": chat_id }))))
}

async fn chat_stream_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    reject_blank(&req)?;
    let chat_id = req.chat_id();
    info!(chat_id = %chat_id, "chat/stream SSE request");

    let session = state.session(&chat_id).await;
    let (event_tx, event_rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut orchestrator = session.lock().await;
        let (update_tx, mut update_rx) = mpsc::channel(32);

        let forward = async {
            while let Some(update) = update_rx.recv().await {
                if event_tx.send(StreamEvent::Update(update)).await.is_err() {
                    break;
                }
            }
        };
        let (turn, _) = tokio::join!(
            orchestrator.continue_conversation_streaming(&req.message, update_tx),
            forward
        );

        let _ = event_tx
            .send(StreamEvent::Turn(ChatReply {
                chat_id,
                markdown: turn.display.to_markdown(),
                turn,
            }))
            .await;
    });

    let stream = ReceiverStream::new(event_rx).map(|event| {
        let (name, data) = match &event {
            StreamEvent::Update(update) => ("update", serde_json::to_string(update)),
            StreamEvent::Turn(reply) => ("turn", serde_json::to_string(reply)),
        };
        Ok::<_, Infallible>(Event::default().event(name).data(data.unwrap_or_default()))
    });

    Ok(Sse::new(stream))
}

/// =============================
/// Router
/// =============================

pub fn create_router(factory: SessionFactory, limits: &SessionConfig) -> Router {
    let state = ApiState::new(factory, limits);

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", post(chat_stream_handler))
        .route("/api/chat/:chat_id", delete(end_chat_handler))
        .route("/api/chat/:chat_id/history", get(history_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    factory: SessionFactory,
    limits: &SessionConfig,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(factory, limits);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
