use std::convert::Infallible;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::json;
use tracing::error;

use crate::chat::{self, ChatKundliRequest};
use crate::state::AppState;
use crate::voice::{self, VoiceChatRequest};

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat-kundli", post(chat_kundli))
        .route("/voice-chat", post(voice_chat))
}

/// Streams the answer as plain text; the first byte is a heartbeat.
async fn chat_kundli(State(state): State<AppState>, Json(body): Json<ChatKundliRequest>) -> Response {
    let chunks = chat::start(&state, body).await;
    let body = Body::from_stream(chunks.map(Ok::<_, Infallible>));
    (
        [
            (CONTENT_TYPE, "text/plain; charset=utf-8"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        body,
    )
        .into_response()
}

async fn voice_chat(State(state): State<AppState>, Json(body): Json<VoiceChatRequest>) -> Response {
    match voice::answer(&state.config, &state.client, &body).await {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => {
            error!(error = %e, "voice chat failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Voice chat failed", "details": e.to_string() })),
            )
                .into_response()
        }
    }
}
