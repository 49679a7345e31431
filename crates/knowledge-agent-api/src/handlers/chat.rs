use axum::{extract::State, Extension, Json};
use std::sync::Arc;
use tracing::info;

use crate::auth::CurrentUser;
use crate::models::chat::{ChatRequest, ChatResponse};
use crate::state::AppState;
use crate::utils::error::ApiError;

/// One chat turn.
/// POST /api/chat
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    info!(user = %user.id, messages = request.messages.len(), "chat request");
    let response = state.chat.handle(&user, request).await?;
    Ok(Json(response))
}
