use serde::{Deserialize, Serialize};

/// Stable numeric identity assigned by the store.
pub type UserId = i64;

/// Message ids are assigned by the store at persist time.
pub type MessageId = i64;

pub const DEFAULT_AVATAR_COLOR: &str = "#5865f2";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Avatar {
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    /// `data:image/...;base64,` URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Default for Avatar {
    fn default() -> Self {
        Self {
            color: DEFAULT_AVATAR_COLOR.to_string(),
            emoji: None,
            image: None,
        }
    }
}
