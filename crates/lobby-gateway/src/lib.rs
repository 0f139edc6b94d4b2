pub mod chat;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod identity;
pub mod membership;
pub mod moderation;
pub mod presence;
pub mod profile;
pub mod records;
pub mod roster;
pub mod session;
pub mod store;
pub mod validate;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use lobby_db::Database;

use crate::dispatcher::Dispatcher;
use crate::identity::TokenKeys;
use crate::store::Store;

/// Opaque id of one physical transport link.
pub type ConnectionId = Uuid;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Messages returned by `get_messages`.
    pub history_limit: u32,
    /// Upper bound on any single persistence call.
    pub store_timeout: Duration,
    /// Unauthenticated connections are closed after this long.
    pub auth_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            store_timeout: Duration::from_secs(5),
            auth_timeout: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}

/// Shared context of the real-time core: persistence, identity
/// verification, and the connection tables.
#[derive(Clone)]
pub struct Hub {
    pub store: Store,
    pub tokens: TokenKeys,
    pub dispatcher: Dispatcher,
    pub config: GatewayConfig,
    sequencer: Arc<Mutex<()>>,
}

impl Hub {
    pub fn new(db: Arc<Database>, tokens: TokenKeys, config: GatewayConfig) -> Self {
        Self {
            store: Store::new(db, config.store_timeout),
            tokens,
            dispatcher: Dispatcher::new(),
            config,
            sequencer: Arc::new(Mutex::new(())),
        }
    }

    /// Held across "persist, then fan out" so broadcast order matches commit order.
    pub async fn sequence(&self) -> MutexGuard<'_, ()> {
        self.sequencer.lock().await
    }
}
