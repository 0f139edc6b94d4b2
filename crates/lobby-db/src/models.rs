//! Database row types. These map directly to SQLite rows and stay
//! independent of the lobby-types wire records.

use lobby_types::models::{MessageId, UserId};

pub struct UserRow {
    pub id: UserId,
    pub username: String,
    pub password: String,
    pub is_admin: bool,
    pub is_banned: bool,
    pub avatar_color: String,
    pub avatar_emoji: Option<String>,
    pub avatar_image: Option<String>,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: MessageId,
    pub room: String,
    pub sender_id: UserId,
    pub sender_username: String,
    pub content: Option<String>,
    pub image_data: Option<String>,
    pub edited: bool,
    pub created_at: String,
}

pub struct ReactionRow {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub emoji: String,
    pub created_at: String,
}
