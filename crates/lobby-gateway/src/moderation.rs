//! Admin-gated operations. Each one commits to the store first, then pushes
//! its side effects to live sessions.

use tracing::{info, warn};

use lobby_types::events::GatewayEvent;
use lobby_types::models::UserId;
use lobby_types::room::{RoomId, RoomKind};

use crate::error::ChatError;
use crate::{Hub, roster};

async fn require_admin(hub: &Hub, actor_id: UserId) -> Result<(), ChatError> {
    let actor = hub
        .store
        .call(move |db| db.get_user_by_id(actor_id))
        .await?;
    match actor {
        Some(user) if user.is_admin && !user.is_banned => Ok(()),
        _ => Err(ChatError::Forbidden),
    }
}

/// Flip the banned flag of `target_id`. On a transition to banned, every
/// live connection of the target gets `banned` and is closed. The roster is
/// rebroadcast either way. Returns the new banned state.
pub async fn toggle_ban(hub: &Hub, actor_id: UserId, target_id: UserId) -> Result<bool, ChatError> {
    require_admin(hub, actor_id).await?;
    if actor_id == target_id {
        return Err(ChatError::invalid("You cannot ban yourself"));
    }

    let _order = hub.sequence().await;
    let banned = hub
        .store
        .call(move |db| db.toggle_banned(target_id))
        .await?
        .ok_or(ChatError::NotFound)?;

    if banned {
        let notified = hub.dispatcher.send_to_user(target_id, GatewayEvent::Banned).await;
        if hub.dispatcher.disconnect_user(target_id).await {
            hub.dispatcher
                .broadcast_all(GatewayEvent::UserOffline { id: target_id })
                .await;
        }
        info!("User {} banned by {} ({} connection(s) closed)", target_id, actor_id, notified);
    } else {
        info!("User {} unbanned by {}", target_id, actor_id);
    }

    // The ban itself is committed; a failed roster refresh only delays the UI.
    if let Err(e) = roster::broadcast(hub).await {
        warn!("Roster broadcast after ban toggle failed: {}", e);
    }

    Ok(banned)
}

/// Delete every message of `room` and tell its current subscribers.
/// Returns how many messages were removed.
pub async fn clear_room(hub: &Hub, actor_id: UserId, room: &RoomId) -> Result<usize, ChatError> {
    require_admin(hub, actor_id).await?;
    if room.kind() == RoomKind::Unknown {
        return Err(ChatError::invalid(format!("Unknown room '{}'", room)));
    }

    let _order = hub.sequence().await;
    let key = room.to_string();
    let deleted = hub.store.call(move |db| db.clear_room(&key)).await?;

    hub.dispatcher
        .broadcast_to_room(room, GatewayEvent::RoomCleared { room: room.clone() })
        .await;
    info!("Room {} cleared by {} ({} messages)", room, actor_id, deleted);

    Ok(deleted)
}
