use std::collections::{HashMap, HashSet};

use lobby_types::models::UserId;

use crate::ConnectionId;

/// Identity -> live connections. An identity is online iff its set is non-empty.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: HashMap<UserId, HashSet<ConnectionId>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` only on the 0 -> 1 edge.
    pub fn add_connection(&mut self, user_id: UserId, conn_id: ConnectionId) -> bool {
        let conns = self.entries.entry(user_id).or_default();
        let was_offline = conns.is_empty();
        conns.insert(conn_id) && was_offline
    }

    /// Returns `true` only on the 1 -> 0 edge. Removing an unknown
    /// connection never reports a transition.
    pub fn remove_connection(&mut self, user_id: UserId, conn_id: ConnectionId) -> bool {
        let Some(conns) = self.entries.get_mut(&user_id) else {
            return false;
        };
        if !conns.remove(&conn_id) {
            return false;
        }
        if conns.is_empty() {
            self.entries.remove(&user_id);
            return true;
        }
        false
    }

    pub fn connections_of(&self, user_id: UserId) -> impl Iterator<Item = ConnectionId> + '_ {
        self.entries.get(&user_id).into_iter().flatten().copied()
    }

    pub fn online_users(&self) -> HashSet<UserId> {
        self.entries.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn offline_fires_once_after_last_close() {
        for n in 1..=4 {
            let mut presence = PresenceRegistry::new();
            let conns: Vec<ConnectionId> = (0..n).map(|_| Uuid::new_v4()).collect();

            let online_edges = conns.iter().filter(|c| presence.add_connection(7, **c)).count();
            assert_eq!(online_edges, 1);

            for (i, conn) in conns.iter().enumerate() {
                let went_offline = presence.remove_connection(7, *conn);
                assert_eq!(went_offline, i == n - 1, "n={n} i={i}");
                assert_eq!(presence.online_users().contains(&7), i != n - 1);
            }
        }
    }

    #[test]
    fn duplicate_and_unknown_connections_do_not_fire() {
        let mut presence = PresenceRegistry::new();
        let conn = Uuid::new_v4();

        assert!(presence.add_connection(1, conn));
        assert!(!presence.add_connection(1, conn));
        assert!(!presence.remove_connection(1, Uuid::new_v4()));
        assert!(!presence.remove_connection(2, conn));

        assert!(presence.remove_connection(1, conn));
        assert!(!presence.remove_connection(1, conn));
    }

    #[test]
    fn lists_connections_per_user() {
        let mut presence = PresenceRegistry::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        presence.add_connection(1, a);
        presence.add_connection(1, b);
        presence.add_connection(2, c);

        let mut ones: Vec<_> = presence.connections_of(1).collect();
        ones.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(ones, expected);
        assert_eq!(presence.connections_of(3).count(), 0);
        assert_eq!(presence.online_users(), HashSet::from([1, 2]));
    }
}
