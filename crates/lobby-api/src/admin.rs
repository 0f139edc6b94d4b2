use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use lobby_gateway::moderation;
use lobby_types::api::{BanResponse, ClearRoomResponse};
use lobby_types::models::UserId;
use lobby_types::room::RoomId;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::AuthUser;

/// `POST /admin/users/{user_id}/ban` toggles the target's banned flag.
pub async fn toggle_ban(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Extension(actor): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let banned = moderation::toggle_ban(&state.hub, actor.id, user_id).await?;
    Ok(Json(BanResponse {
        success: true,
        banned,
    }))
}

/// `POST /admin/rooms/{room}/clear`
pub async fn clear_room(
    State(state): State<AppState>,
    Path(room): Path<String>,
    Extension(actor): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = moderation::clear_room(&state.hub, actor.id, &RoomId::from(room)).await?;
    Ok(Json(ClearRoomResponse {
        success: true,
        deleted,
    }))
}
