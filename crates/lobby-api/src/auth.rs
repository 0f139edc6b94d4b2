use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{info, warn};

use lobby_gateway::{Hub, roster};
use lobby_types::api::{AuthResponse, LoginRequest, RegisterRequest};

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub hub: Hub,
    /// Usernames granted admin when they register.
    pub admins: Vec<String>,
}

impl AppStateInner {
    pub fn is_designated_admin(&self, username: &str) -> bool {
        self.admins.iter().any(|a| a.eq_ignore_ascii_case(username))
    }
}

fn validate_username(username: &str) -> Result<(), ApiError> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(ApiError::BadRequest("Username must be 3-32 characters".into()));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(ApiError::BadRequest(
            "Username may only contain letters, digits, '_' and '-'".into(),
        ));
    }
    Ok(())
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_username(&req.username)?;
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest("Password must be at least 8 characters".into()));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?
        .to_string();

    let is_admin = state.is_designated_admin(&req.username);
    let username = req.username.clone();
    let user = state
        .hub
        .store
        .call(move |db| db.create_user(&username, &password_hash, is_admin))
        .await?
        .ok_or_else(|| ApiError::Conflict("Username is already taken".into()))?;

    let token = state.hub.tokens.issue(user.id, &user.username)?;
    info!("Registered {} ({}){}", user.username, user.id, if is_admin { " as admin" } else { "" });

    // Connected clients learn about the newcomer.
    if let Err(e) = roster::broadcast(&state.hub).await {
        warn!("Roster broadcast after registration failed: {}", e);
    }

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user_id: user.id,
            username: user.username,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.clone();
    let user = state
        .hub
        .store
        .call(move |db| db.get_user_by_username(&username))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid username or password".into()))?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("stored hash for user {} is malformed: {e}", user.id))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized("Invalid username or password".into()))?;

    if user.is_banned {
        return Err(ApiError::Forbidden("Account is banned".into()));
    }

    let token = state.hub.tokens.issue(user.id, &user.username)?;

    Ok(Json(AuthResponse {
        token,
        user_id: user.id,
        username: user.username,
    }))
}
