use serde::{Deserialize, Serialize};

use crate::models::{Avatar, MessageId, UserId};
use crate::room::RoomId;

// -- JWT Claims --

/// JWT claims shared by lobby-api (token issuance) and lobby-gateway
/// (socket authentication).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Returned by both register and login.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: UserId,
    pub username: String,
}

// -- Profile --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAvatarRequest {
    pub color: String,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

// -- Moderation --

#[derive(Debug, Serialize, Deserialize)]
pub struct BanResponse {
    pub success: bool,
    pub banned: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearRoomResponse {
    pub success: bool,
    pub deleted: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// -- Messages --

/// Full message record as broadcast and as returned in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub room: RoomId,
    pub sender_id: UserId,
    pub sender_username: String,
    pub content: Option<String>,
    pub image_data: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub edited: bool,
    pub reactions: Vec<ReactionGroup>,
}

// -- Reactions --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
    pub user_ids: Vec<UserId>,
}

// -- Roster --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    pub avatar: Avatar,
    pub online: bool,
    pub is_admin: bool,
    /// Only present in the roster sent to admin connections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_banned: Option<bool>,
}
