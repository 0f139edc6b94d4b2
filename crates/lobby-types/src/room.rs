use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::UserId;

/// The shared room every authenticated connection is subscribed to.
pub const GENERAL_ROOM: &str = "general";

const DIRECT_PREFIX: &str = "dm:";

/// A broadcast scope key. Either the public room or a canonical
/// `dm:<low>:<high>` pair key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomKind {
    Public,
    Direct { low: UserId, high: UserId },
    /// Anything that is not a well-formed key. Never authorized.
    Unknown,
}

impl RoomId {
    pub fn general() -> Self {
        Self(GENERAL_ROOM.to_string())
    }

    /// Canonical pair key. Symmetric: `direct(a, b) == direct(b, a)`.
    pub fn direct(a: UserId, b: UserId) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{DIRECT_PREFIX}{low}:{high}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> RoomKind {
        if self.0 == GENERAL_ROOM {
            return RoomKind::Public;
        }

        let Some(pair) = self.0.strip_prefix(DIRECT_PREFIX) else {
            return RoomKind::Unknown;
        };
        let Some((low, high)) = pair.split_once(':') else {
            return RoomKind::Unknown;
        };
        let (Ok(low), Ok(high)) = (low.parse::<UserId>(), high.parse::<UserId>()) else {
            return RoomKind::Unknown;
        };

        // Reject "dm:2:1", "dm:01:2", "dm:+1:2" and self pairs: only the exact
        // string `direct()` would produce is a valid key.
        if low <= 0 || low >= high || Self::direct(low, high) != *self {
            return RoomKind::Unknown;
        }

        RoomKind::Direct { low, high }
    }

    /// Whether `user_id` may read from or post into this room.
    pub fn permits(&self, user_id: UserId) -> bool {
        match self.kind() {
            RoomKind::Public => true,
            RoomKind::Direct { low, high } => user_id == low || user_id == high,
            RoomKind::Unknown => false,
        }
    }

    /// The other participant of a direct room, if `user_id` is one of the pair.
    pub fn peer_of(&self, user_id: UserId) -> Option<UserId> {
        match self.kind() {
            RoomKind::Direct { low, high } if user_id == low => Some(high),
            RoomKind::Direct { low, high } if user_id == high => Some(low),
            _ => None,
        }
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
