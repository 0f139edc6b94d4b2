use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use lobby_types::models::UserId;

use crate::auth::AppState;
use crate::error::ApiError;

/// Caller identity, reloaded from the store on every request so that bans
/// and admin changes take effect without waiting for token expiry.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: UserId,
    pub username: String,
    pub is_admin: bool,
}

fn unauthorized() -> ApiError {
    ApiError::Unauthorized("Invalid or expired token".into())
}

/// Extract and validate the JWT from the Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(unauthorized)?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(unauthorized)?;
    let claims = state.hub.tokens.verify(token).ok_or_else(unauthorized)?;

    let user_id = claims.sub;
    let user = state
        .hub
        .store
        .call(move |db| db.get_user_by_id(user_id))
        .await?
        .ok_or_else(unauthorized)?;

    if user.is_banned {
        return Err(ApiError::Forbidden("Account is banned".into()));
    }

    req.extensions_mut().insert(AuthUser {
        id: user.id,
        username: user.username,
        is_admin: user.is_admin,
    });
    Ok(next.run(req).await)
}
