use std::collections::{HashMap, HashSet};

use lobby_types::room::RoomId;

use crate::ConnectionId;

/// Per-connection room subscriptions. Purely in-memory; a reconnect starts
/// from the default room again.
#[derive(Debug, Default)]
pub struct RoomMembership {
    rooms: HashMap<ConnectionId, HashSet<RoomId>>,
}

impl RoomMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a connection, subscribed to the public room.
    pub fn attach(&mut self, conn_id: ConnectionId) {
        self.rooms
            .entry(conn_id)
            .or_default()
            .insert(RoomId::general());
    }

    /// Forget every subscription of a connection.
    pub fn detach(&mut self, conn_id: ConnectionId) {
        self.rooms.remove(&conn_id);
    }

    /// Idempotent. Returns `true` if the room was newly added. Unknown
    /// (detached) connections are ignored.
    pub fn subscribe(&mut self, conn_id: ConnectionId, room: &RoomId) -> bool {
        match self.rooms.get_mut(&conn_id) {
            Some(rooms) => rooms.insert(room.clone()),
            None => false,
        }
    }

    /// Subscribe every given connection to `room`, returning how many were
    /// newly subscribed. Used before fan-out of a direct message so the
    /// recipient receives it even if it never opened the room.
    pub fn ensure_subscribed<I>(&mut self, room: &RoomId, conns: I) -> usize
    where
        I: IntoIterator<Item = ConnectionId>,
    {
        conns
            .into_iter()
            .filter(|conn_id| self.subscribe(*conn_id, room))
            .count()
    }

    pub fn is_subscribed(&self, conn_id: ConnectionId, room: &RoomId) -> bool {
        self.rooms
            .get(&conn_id)
            .is_some_and(|rooms| rooms.contains(room))
    }

    pub fn rooms_of(&self, conn_id: ConnectionId) -> impl Iterator<Item = &RoomId> + '_ {
        self.rooms.get(&conn_id).into_iter().flatten()
    }
}
