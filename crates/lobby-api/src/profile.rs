use axum::{Extension, Json, extract::State, response::IntoResponse};

use lobby_gateway::profile;
use lobby_types::api::{SuccessResponse, UpdateAvatarRequest};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::AuthUser;

/// `PUT /users/me/avatar`. Every live connection receives `avatar_updated`
/// with the stored (normalized) avatar.
pub async fn update_avatar(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<UpdateAvatarRequest>,
) -> Result<impl IntoResponse, ApiError> {
    profile::update_avatar(&state.hub, user.id, &req).await?;
    Ok(Json(SuccessResponse { success: true }))
}
