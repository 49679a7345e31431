use axum::{extract::State, Extension, Json};
use std::sync::Arc;

use crate::auth::CurrentUser;
use crate::graph::models::UserProfile;
use crate::state::AppState;
use crate::utils::error::ApiError;

/// Profile of the authenticated user, fetched with their own credential.
/// GET /api/me
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<UserProfile>, ApiError> {
    let profile = state
        .provider
        .get_user_profile(&user.bearer_token)
        .await
        .map_err(|err| ApiError::ProviderError(format!("{err:#}")))?;
    Ok(Json(profile))
}
