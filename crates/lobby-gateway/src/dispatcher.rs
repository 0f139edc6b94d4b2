use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;

use lobby_types::api::UserSummary;
use lobby_types::events::GatewayEvent;
use lobby_types::models::UserId;
use lobby_types::room::RoomId;

use crate::ConnectionId;
use crate::membership::RoomMembership;
use crate::presence::PresenceRegistry;

/// What a connection's writer task receives.
#[derive(Debug, Clone)]
pub enum Outbound {
    Event(Arc<GatewayEvent>),
    /// Send a close frame and stop.
    Close,
}

pub type OutboundTx = mpsc::UnboundedSender<Outbound>;
pub type OutboundRx = mpsc::UnboundedReceiver<Outbound>;

struct ConnectionEntry {
    user_id: UserId,
    is_admin: bool,
    tx: OutboundTx,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    presence: PresenceRegistry,
    membership: RoomMembership,
}

impl Registry {
    /// Fire-and-forget: a closed receiver is skipped, never waited on.
    fn deliver(&self, conn_id: ConnectionId, event: &Arc<GatewayEvent>) -> bool {
        match self.connections.get(&conn_id) {
            Some(entry) => entry.tx.send(Outbound::Event(event.clone())).is_ok(),
            None => false,
        }
    }

    fn remove(&mut self, conn_id: ConnectionId) -> Option<(UserId, bool)> {
        let entry = self.connections.remove(&conn_id)?;
        self.membership.detach(conn_id);
        let went_offline = self.presence.remove_connection(entry.user_id, conn_id);
        Some((entry.user_id, went_offline))
    }
}

/// Owns every authenticated connection along with its presence and room
/// subscriptions, and fans events out to them. All table mutation goes
/// through this type; no lock is held across an await.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<RwLock<Registry>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an authenticated connection to its identity and subscribe it to
    /// the public room. Returns `true` if the identity just came online.
    pub async fn register(
        &self,
        conn_id: ConnectionId,
        user_id: UserId,
        is_admin: bool,
        tx: OutboundTx,
    ) -> bool {
        let mut registry = self.inner.write().await;
        registry
            .connections
            .insert(conn_id, ConnectionEntry { user_id, is_admin, tx });
        registry.membership.attach(conn_id);
        registry.presence.add_connection(user_id, conn_id)
    }

    /// Drop a connection. Returns its identity and whether that identity just
    /// went offline, or `None` if the connection was already gone.
    pub async fn unregister(&self, conn_id: ConnectionId) -> Option<(UserId, bool)> {
        self.inner.write().await.remove(conn_id)
    }

    /// Whether a connection is still registered. A connection removed by
    /// `disconnect_user` reports `false` even before its transport closes.
    pub async fn is_live(&self, conn_id: ConnectionId) -> bool {
        self.inner.read().await.connections.contains_key(&conn_id)
    }

    /// Idempotent. Returns `true` if the room was newly added.
    pub async fn subscribe(&self, conn_id: ConnectionId, room: &RoomId) -> bool {
        self.inner.write().await.membership.subscribe(conn_id, room)
    }

    pub async fn is_subscribed(&self, conn_id: ConnectionId, room: &RoomId) -> bool {
        self.inner.read().await.membership.is_subscribed(conn_id, room)
    }

    /// Before fan-out into a direct room, subscribe every live connection of
    /// the pair member other than `sender_id`. Returns the number of newly
    /// subscribed connections. No-op for non-direct rooms.
    pub async fn ensure_recipient_subscribed(&self, room: &RoomId, sender_id: UserId) -> usize {
        let Some(recipient) = room.peer_of(sender_id) else {
            return 0;
        };

        let mut guard = self.inner.write().await;
        let registry = &mut *guard;
        let conns: Vec<ConnectionId> = registry.presence.connections_of(recipient).collect();
        let added = registry.membership.ensure_subscribed(room, conns);
        if added > 0 {
            debug!("Auto-subscribed {} connection(s) of user {} to {}", added, recipient, room);
        }
        added
    }

    /// Deliver to every connection subscribed to `room`. Returns how many
    /// connections accepted the event.
    pub async fn broadcast_to_room(&self, room: &RoomId, event: GatewayEvent) -> usize {
        let event = Arc::new(event);
        let registry = self.inner.read().await;
        registry
            .connections
            .keys()
            .filter(|conn_id| registry.membership.is_subscribed(**conn_id, room))
            .filter(|conn_id| registry.deliver(**conn_id, &event))
            .count()
    }

    /// Deliver to every authenticated connection.
    pub async fn broadcast_all(&self, event: GatewayEvent) -> usize {
        let event = Arc::new(event);
        let registry = self.inner.read().await;
        registry
            .connections
            .keys()
            .filter(|conn_id| registry.deliver(**conn_id, &event))
            .count()
    }

    /// Deliver to every live connection of one identity.
    pub async fn send_to_user(&self, user_id: UserId, event: GatewayEvent) -> usize {
        let event = Arc::new(event);
        let registry = self.inner.read().await;
        registry
            .presence
            .connections_of(user_id)
            .filter(|conn_id| registry.deliver(*conn_id, &event))
            .count()
    }

    /// Send a rights-aware roster: admin connections get `admin_view`,
    /// everyone else `member_view`.
    pub async fn broadcast_roster(&self, admin_view: Vec<UserSummary>, member_view: Vec<UserSummary>) {
        let admin_event = Arc::new(GatewayEvent::UsersList { users: admin_view });
        let member_event = Arc::new(GatewayEvent::UsersList { users: member_view });

        let registry = self.inner.read().await;
        for (conn_id, entry) in &registry.connections {
            let event = if entry.is_admin { &admin_event } else { &member_event };
            registry.deliver(*conn_id, event);
        }
    }

    /// Remove every connection of an identity and tell each writer to close.
    /// Anything queued before (e.g. a ban notice) is flushed first. Returns
    /// `true` if the identity went offline as a result.
    pub async fn disconnect_user(&self, user_id: UserId) -> bool {
        let mut registry = self.inner.write().await;
        let conns: Vec<ConnectionId> = registry.presence.connections_of(user_id).collect();

        let mut went_offline = false;
        for conn_id in conns {
            if let Some(entry) = registry.connections.get(&conn_id) {
                let _ = entry.tx.send(Outbound::Close);
            }
            if let Some((_, offline)) = registry.remove(conn_id) {
                went_offline |= offline;
            }
        }
        went_offline
    }

    pub async fn online_users(&self) -> HashSet<UserId> {
        self.inner.read().await.presence.online_users()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;

    fn events(rx: &mut OutboundRx) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    async fn connect(dispatcher: &Dispatcher, user_id: UserId) -> (ConnectionId, OutboundRx) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn_id = Uuid::new_v4();
        dispatcher.register(conn_id, user_id, false, tx).await;
        (conn_id, rx)
    }

    #[tokio::test]
    async fn room_broadcast_reaches_only_subscribers() {
        let dispatcher = Dispatcher::new();
        let (a, mut rx_a) = connect(&dispatcher, 1).await;
        let (_b, mut rx_b) = connect(&dispatcher, 2).await;
        let (_c, mut rx_c) = connect(&dispatcher, 3).await;

        let dm = RoomId::direct(1, 2);
        dispatcher.subscribe(a, &dm).await;

        let delivered = dispatcher
            .broadcast_to_room(&dm, GatewayEvent::RoomCleared { room: dm.clone() })
            .await;
        assert_eq!(delivered, 1);
        assert_eq!(events(&mut rx_a).len(), 1);
        assert!(events(&mut rx_b).is_empty());
        assert!(events(&mut rx_c).is_empty());

        let delivered = dispatcher
            .broadcast_to_room(&RoomId::general(), GatewayEvent::RoomCleared { room: RoomId::general() })
            .await;
        assert_eq!(delivered, 3);
    }

    #[tokio::test]
    async fn recipient_is_subscribed_before_fanout() {
        let dispatcher = Dispatcher::new();
        let (_a, _rx_a) = connect(&dispatcher, 1).await;
        let (b1, _rx_b1) = connect(&dispatcher, 2).await;
        let (b2, _rx_b2) = connect(&dispatcher, 2).await;

        let dm = RoomId::direct(1, 2);
        assert_eq!(dispatcher.ensure_recipient_subscribed(&dm, 1).await, 2);
        assert!(dispatcher.is_subscribed(b1, &dm).await);
        assert!(dispatcher.is_subscribed(b2, &dm).await);
        assert_eq!(dispatcher.ensure_recipient_subscribed(&dm, 1).await, 0);
        assert_eq!(dispatcher.ensure_recipient_subscribed(&RoomId::general(), 1).await, 0);
    }

    #[tokio::test]
    async fn dead_connection_does_not_block_others() {
        let dispatcher = Dispatcher::new();
        let (_a, rx_a) = connect(&dispatcher, 1).await;
        let (_b, mut rx_b) = connect(&dispatcher, 2).await;
        drop(rx_a);

        // Best effort: the event to the dead connection is simply lost.
        let delivered = dispatcher.broadcast_all(GatewayEvent::UserOffline { id: 9 }).await;
        assert_eq!(delivered, 1);
        assert_eq!(events(&mut rx_b).len(), 1);
    }

    #[tokio::test]
    async fn disconnect_user_closes_every_device_after_pending_events() {
        let dispatcher = Dispatcher::new();
        let (a1, mut rx_a1) = connect(&dispatcher, 1).await;
        let (a2, mut rx_a2) = connect(&dispatcher, 1).await;
        let (_b, mut rx_b) = connect(&dispatcher, 2).await;

        assert_eq!(dispatcher.send_to_user(1, GatewayEvent::Banned).await, 2);
        assert!(dispatcher.disconnect_user(1).await);
        assert!(!dispatcher.is_live(a1).await);
        assert!(!dispatcher.is_live(a2).await);
        assert!(dispatcher.unregister(a1).await.is_none());

        for rx in [&mut rx_a1, &mut rx_a2] {
            let got = events(rx);
            assert_eq!(got.len(), 2);
            assert!(matches!(&got[0], Outbound::Event(e) if **e == GatewayEvent::Banned));
            assert!(matches!(got[1], Outbound::Close));
        }
        assert!(events(&mut rx_b).is_empty());
        assert_eq!(dispatcher.online_users().await, HashSet::from([2]));
    }

    #[tokio::test]
    async fn roster_is_rights_aware() {
        let dispatcher = Dispatcher::new();
        let (admin_tx, mut admin_rx) = mpsc::unbounded_channel();
        dispatcher.register(Uuid::new_v4(), 1, true, admin_tx).await;
        let (_m, mut member_rx) = connect(&dispatcher, 2).await;

        let summary = |is_banned| UserSummary {
            id: 3,
            username: "mallory".into(),
            avatar: Default::default(),
            online: false,
            is_admin: false,
            is_banned,
        };
        dispatcher
            .broadcast_roster(vec![summary(Some(true))], vec![summary(None)])
            .await;

        let admin = events(&mut admin_rx);
        let member = events(&mut member_rx);
        let banned_flag = |got: &[Outbound]| match &got[0] {
            Outbound::Event(e) => match &**e {
                GatewayEvent::UsersList { users } => users[0].is_banned,
                other => panic!("unexpected {other:?}"),
            },
            Outbound::Close => panic!("unexpected close"),
        };
        assert_eq!(banned_flag(&admin[..]), Some(true));
        assert_eq!(banned_flag(&member[..]), None);
    }
}
