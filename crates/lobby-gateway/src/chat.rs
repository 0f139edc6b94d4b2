//! Room-scoped operations: history, join, send, edit, delete, react.
//!
//! Every mutation commits to the store before anything is fanned out, so a
//! failed or timed-out write never reaches other sessions.

use tracing::debug;

use lobby_db::models::MessageRow;
use lobby_types::api::{MessageRecord, ReactionGroup};
use lobby_types::events::GatewayEvent;
use lobby_types::models::MessageId;
use lobby_types::room::RoomId;

use crate::error::ChatError;
use crate::records::{group_reactions, message_record, message_records};
use crate::session::SessionUser;
use crate::{ConnectionId, Hub, validate};

fn authorize(room: &RoomId, user: &SessionUser) -> Result<(), ChatError> {
    if room.permits(user.id) {
        Ok(())
    } else {
        Err(ChatError::Forbidden)
    }
}

/// Called with the sequencer held. A ban ordered ahead of this mutation has
/// already removed the connection, so whatever it was about to do is refused.
async fn ensure_live(hub: &Hub, conn_id: ConnectionId) -> Result<(), ChatError> {
    if hub.dispatcher.is_live(conn_id).await {
        Ok(())
    } else {
        Err(ChatError::Forbidden)
    }
}

async fn load_message(hub: &Hub, message_id: MessageId) -> Result<MessageRow, ChatError> {
    hub.store
        .call(move |db| db.get_message(message_id))
        .await?
        .ok_or(ChatError::NotFound)
}

/// Subscribe the connection to `room` and return its recent history, oldest first.
pub async fn history(
    hub: &Hub,
    conn_id: ConnectionId,
    user: &SessionUser,
    room: &RoomId,
) -> Result<Vec<MessageRecord>, ChatError> {
    authorize(room, user)?;

    // Subscribe before reading so nothing committed in between is missed.
    hub.dispatcher.subscribe(conn_id, room).await;

    let key = room.to_string();
    let limit = hub.config.history_limit;
    let (rows, reactions) = hub
        .store
        .call(move |db| {
            let rows = db.get_messages(&key, limit)?;
            let ids: Vec<MessageId> = rows.iter().map(|r| r.id).collect();
            let reactions = db.get_reactions_for_messages(&ids)?;
            Ok((rows, reactions))
        })
        .await?;

    Ok(message_records(rows, &reactions))
}

pub async fn join_room(
    hub: &Hub,
    conn_id: ConnectionId,
    user: &SessionUser,
    room: &RoomId,
) -> Result<(), ChatError> {
    authorize(room, user)?;
    if hub.dispatcher.subscribe(conn_id, room).await {
        debug!("{} ({}) joined {}", user.username, user.id, room);
    }
    Ok(())
}

/// Persist a new message and fan it out to the room, sender included.
pub async fn send_message(
    hub: &Hub,
    conn_id: ConnectionId,
    user: &SessionUser,
    room: &RoomId,
    content: Option<&str>,
    image_data: Option<&str>,
) -> Result<MessageId, ChatError> {
    authorize(room, user)?;
    let outgoing = validate::outgoing_message(content, image_data)?;

    let _order = hub.sequence().await;
    ensure_live(hub, conn_id).await?;
    let key = room.to_string();
    let sender_id = user.id;
    let row = hub
        .store
        .call(move |db| {
            db.insert_message(
                &key,
                sender_id,
                outgoing.content.as_deref(),
                outgoing.image_data.as_deref(),
            )
        })
        .await?;

    let record = message_record(row, Vec::new());
    let message_id = record.id;

    hub.dispatcher.subscribe(conn_id, room).await;
    hub.dispatcher.ensure_recipient_subscribed(room, user.id).await;
    hub.dispatcher
        .broadcast_to_room(room, GatewayEvent::Message(record))
        .await;

    Ok(message_id)
}

/// Only the original sender may edit. Anything else is a silent `NotFound`.
pub async fn edit_message(
    hub: &Hub,
    conn_id: ConnectionId,
    user: &SessionUser,
    message_id: MessageId,
    content: &str,
) -> Result<(), ChatError> {
    let existing = load_message(hub, message_id).await?;
    if existing.sender_id != user.id {
        return Err(ChatError::NotFound);
    }
    let content = validate::message_text(content)?;

    let _order = hub.sequence().await;
    ensure_live(hub, conn_id).await?;
    let sender_id = user.id;
    let row = hub
        .store
        .call(move |db| db.edit_message(message_id, sender_id, &content))
        .await?
        .ok_or(ChatError::NotFound)?;

    let room = RoomId::from(row.room);
    hub.dispatcher
        .broadcast_to_room(
            &room,
            GatewayEvent::MessageEdited {
                message_id,
                room: room.clone(),
                content: row.content.unwrap_or_default(),
                edited: row.edited,
            },
        )
        .await;

    Ok(())
}

/// Senders delete their own messages; admins delete any.
pub async fn delete_message(
    hub: &Hub,
    conn_id: ConnectionId,
    user: &SessionUser,
    message_id: MessageId,
) -> Result<(), ChatError> {
    let existing = load_message(hub, message_id).await?;
    if existing.sender_id != user.id && !user.is_admin {
        return Err(ChatError::NotFound);
    }

    let _order = hub.sequence().await;
    ensure_live(hub, conn_id).await?;
    let deleted = hub
        .store
        .call(move |db| db.delete_message(message_id))
        .await?;
    if !deleted {
        return Err(ChatError::NotFound);
    }

    let room = RoomId::from(existing.room);
    hub.dispatcher
        .broadcast_to_room(
            &room,
            GatewayEvent::MessageDeleted {
                message_id,
                room: room.clone(),
            },
        )
        .await;

    Ok(())
}

/// Toggle the (message, user, emoji) triple, then broadcast the full grouped
/// view re-read from the store.
pub async fn toggle_reaction(
    hub: &Hub,
    conn_id: ConnectionId,
    user: &SessionUser,
    message_id: MessageId,
    emoji: &str,
) -> Result<Vec<ReactionGroup>, ChatError> {
    let existing = load_message(hub, message_id).await?;
    let room = RoomId::from(existing.room);
    authorize(&room, user)?;
    let emoji = validate::reaction_emoji(emoji)?;

    let _order = hub.sequence().await;
    ensure_live(hub, conn_id).await?;
    let user_id = user.id;
    let rows = hub
        .store
        .call(move |db| {
            db.toggle_reaction(message_id, user_id, &emoji)?;
            db.get_reactions(message_id)
        })
        .await?;

    let reactions = group_reactions(&rows)
        .remove(&message_id)
        .unwrap_or_default();

    hub.dispatcher
        .broadcast_to_room(
            &room,
            GatewayEvent::ReactionUpdated {
                message_id,
                room: room.clone(),
                reactions: reactions.clone(),
            },
        )
        .await;

    Ok(reactions)
}
