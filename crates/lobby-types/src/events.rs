use serde::{Deserialize, Serialize};

use crate::api::{MessageRecord, ReactionGroup, UserSummary};
use crate::models::{Avatar, MessageId, UserId};
use crate::room::RoomId;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Answer to `authenticate`
    Authenticated {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_admin: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// The identity was banned; a close frame follows.
    Banned,

    /// Full roster snapshot
    UsersList { users: Vec<UserSummary> },

    /// First connection of an identity came up
    UserOnline {
        id: UserId,
        username: String,
        avatar: Avatar,
    },

    /// Last connection of an identity went away
    UserOffline { id: UserId },

    AvatarUpdated { id: UserId, avatar: Avatar },

    MessageHistory {
        room: RoomId,
        messages: Vec<MessageRecord>,
    },

    /// A new message was persisted
    Message(MessageRecord),

    MessageEdited {
        message_id: MessageId,
        room: RoomId,
        content: String,
        edited: bool,
    },

    MessageDeleted { message_id: MessageId, room: RoomId },

    /// Full grouped reaction view for one message after a toggle
    ReactionUpdated {
        message_id: MessageId,
        room: RoomId,
        reactions: Vec<ReactionGroup>,
    },

    RoomCleared { room: RoomId },

    /// Validation or store failure for the caller's last command
    Error { message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Authenticate the connection with a session token
    Authenticate { token: String },

    /// Subscribe to a room and fetch its recent history
    GetMessages { room: RoomId },

    /// Subscribe to a room without fetching history
    JoinRoom { room: RoomId },

    SendMessage {
        room: RoomId,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        image_data: Option<String>,
    },

    EditMessage { message_id: MessageId, content: String },

    DeleteMessage { message_id: MessageId },

    ToggleReaction { message_id: MessageId, emoji: String },
}

impl GatewayCommand {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::GetMessages { .. } => "get_messages",
            Self::JoinRoom { .. } => "join_room",
            Self::SendMessage { .. } => "send_message",
            Self::EditMessage { .. } => "edit_message",
            Self::DeleteMessage { .. } => "delete_message",
            Self::ToggleReaction { .. } => "toggle_reaction",
        }
    }
}
