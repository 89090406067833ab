//! Chat transport.
//!
//! Endpoints:
//! - `POST /api/chat`: one conversational turn
//! - `POST /api/place-order`: bulk order straight to order placement
//! - `GET  /api/greeting`: opening message for a new session
//! - `GET  /api/recommendations/trending-books`: the catalog's trending shelf

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;
use uuid::Uuid;

use bookworm_agent::{AgentRuntime, ChatOutcome};
use bookworm_core::domain::book::TrendingBook;
use bookworm_core::domain::conversation::Metadata;
use bookworm_core::domain::envelope::{ResponseEnvelope, ResponseKind};
use bookworm_core::errors::{ApplicationError, FailureClass};

#[derive(Clone)]
pub struct ChatState {
    runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    #[serde(flatten)]
    pub envelope: ResponseEnvelope,
}

#[derive(Debug, Serialize)]
pub struct ChatError {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    pub response: &'static str,
    pub correlation_id: String,
}

type Failure = (StatusCode, Json<ChatError>);
type ChatResult = Result<Json<ChatResponse>, Failure>;

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/place-order", post(place_order))
        .route("/api/greeting", get(greeting))
        .route("/api/recommendations/trending-books", get(trending_books))
        .layer(cors)
        .with_state(ChatState { runtime })
}

pub async fn chat(State(state): State<ChatState>, Json(body): Json<ChatRequest>) -> ChatResult {
    let session_id = body.session_id.as_deref();
    let outcome = state
        .runtime
        .handle_message(session_id, &body.message, body.metadata.unwrap_or_default())
        .await
        .map_err(|agent_error| failure(session_id, agent_error.into()))?;
    Ok(Json(respond(outcome)))
}

/// Accepts `{order_data, user_details, session_id?}`. The shape is checked by
/// the runtime, so any JSON body is forwarded.
pub async fn place_order(State(state): State<ChatState>, Json(mut body): Json<Value>) -> ChatResult {
    let session_id = body
        .as_object_mut()
        .and_then(|map| map.remove("session_id"))
        .and_then(|value| value.as_str().map(str::to_string));
    let outcome = state
        .runtime
        .place_order(session_id.as_deref(), &body)
        .await
        .map_err(|agent_error| failure(session_id.as_deref(), agent_error.into()))?;
    Ok(Json(respond(outcome)))
}

pub async fn greeting(State(state): State<ChatState>) -> Json<ResponseEnvelope> {
    Json(state.runtime.greeting())
}

pub async fn trending_books(
    State(state): State<ChatState>,
) -> Result<Json<Vec<TrendingBook>>, Failure> {
    let books = state.runtime.trending_books().await.map_err(|error| failure(None, error))?;
    Ok(Json(books))
}

fn respond(outcome: ChatOutcome) -> ChatResponse {
    ChatResponse { session_id: outcome.session_id, envelope: outcome.envelope }
}

fn failure(session_id: Option<&str>, application_error: ApplicationError) -> Failure {
    let correlation_id =
        session_id.map(str::to_string).unwrap_or_else(|| Uuid::new_v4().to_string());
    error!(
        event_name = "chat.request.failed",
        correlation_id = %correlation_id,
        error = %application_error,
        "request aborted"
    );

    let interface_error = application_error.into_interface(correlation_id);
    let status = match interface_error.class {
        FailureClass::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        FailureClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ChatError {
            kind: ResponseKind::Error,
            response: interface_error.user_message(),
            correlation_id: interface_error.correlation_id().to_string(),
        }),
    )
}
