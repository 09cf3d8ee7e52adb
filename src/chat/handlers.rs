use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{error, instrument};

use crate::state::AppState;
use crate::users::repo_types::UserId;

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub reply: String,
}

pub fn chat_routes() -> Router<AppState> {
    Router::new()
        .route("/chat/:user_id/messages", post(post_message))
        .route("/chat/:user_id/photos", post(post_photo))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

#[instrument(skip(state, body))]
pub async fn post_message(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(body): Json<ChatMessage>,
) -> Result<Json<ChatReply>, (StatusCode, String)> {
    let reply = state
        .chat
        .handle_text(user_id, &body.text, OffsetDateTime::now_utc())
        .await
        .map_err(|e| {
            error!(error = %e, user_id, "chat message failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong".to_string())
        })?;
    Ok(Json(ChatReply { reply }))
}

#[instrument(skip(state, image), fields(bytes = image.len()))]
pub async fn post_photo(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    image: Bytes,
) -> Result<Json<ChatReply>, (StatusCode, String)> {
    let reply = state
        .chat
        .handle_photo(user_id, &image, OffsetDateTime::now_utc())
        .await
        .map_err(|e| {
            error!(error = %e, user_id, "chat photo failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong".to_string())
        })?;
    Ok(Json(ChatReply { reply }))
}
