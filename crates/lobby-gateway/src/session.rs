//! Per-connection state machine, independent of the transport.
//!
//! `Unauthenticated -> Authenticated -> Closed`. A session is created when a
//! transport connects, fed every decoded command through [`Session::handle`],
//! and finished with [`Session::close`] when the transport goes away.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use lobby_types::events::{GatewayCommand, GatewayEvent};
use lobby_types::models::UserId;

use crate::dispatcher::{Outbound, OutboundRx, OutboundTx};
use crate::error::{ChatError, GENERIC_FAILURE};
use crate::records::avatar_of;
use crate::{ConnectionId, Hub, chat, roster};

/// Identity cached on the connection once authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: UserId,
    pub username: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated(SessionUser),
    Closed,
}

pub struct Session {
    conn_id: ConnectionId,
    state: SessionState,
    tx: OutboundTx,
    hub: Hub,
}

impl Session {
    /// Open a session for a fresh transport. Everything for this connection,
    /// direct replies and fan-out alike, arrives on the returned receiver.
    pub fn new(hub: Hub) -> (Self, OutboundRx) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Self {
            conn_id: Uuid::new_v4(),
            state: SessionState::Unauthenticated,
            tx,
            hub,
        };
        (session, rx)
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated(_))
    }

    fn reply(&self, event: GatewayEvent) {
        let _ = self.tx.send(Outbound::Event(Arc::new(event)));
    }

    fn reject(&self, reason: &str) {
        self.reply(GatewayEvent::Authenticated {
            success: false,
            is_admin: None,
            error: Some(reason.to_string()),
        });
    }

    /// Process one inbound command to completion.
    pub async fn handle(&mut self, cmd: GatewayCommand) {
        let user = match &self.state {
            SessionState::Closed => return,
            SessionState::Unauthenticated => None,
            SessionState::Authenticated(user) => Some(user.clone()),
        };

        let Some(user) = user else {
            // Nothing but a credential is answered before identity is known.
            match cmd {
                GatewayCommand::Authenticate { token } => self.authenticate(&token).await,
                other => debug!("Dropping {} on unauthenticated connection {}", other.name(), self.conn_id),
            }
            return;
        };

        // A ban removes the connection from the dispatcher before its
        // transport is gone; nothing more may be accepted from it.
        if !self.hub.dispatcher.is_live(self.conn_id).await {
            self.state = SessionState::Closed;
            return;
        }

        let name = cmd.name();
        if let Err(e) = self.dispatch(&user, cmd).await {
            match e.client_message() {
                Some(message) => {
                    if let ChatError::Store(err) = &e {
                        error!("{} from {} ({}) failed: {}", name, user.username, user.id, err);
                    }
                    self.reply(GatewayEvent::Error { message });
                }
                None => debug!("Dropping {} from {} ({}): {}", name, user.username, user.id, e),
            }
        }
    }

    async fn dispatch(&self, user: &SessionUser, cmd: GatewayCommand) -> Result<(), ChatError> {
        let hub = &self.hub;
        match cmd {
            GatewayCommand::Authenticate { .. } => {
                debug!("{} ({}) is already authenticated", user.username, user.id);
                Ok(())
            }

            GatewayCommand::GetMessages { room } => {
                let messages = chat::history(hub, self.conn_id, user, &room).await?;
                self.reply(GatewayEvent::MessageHistory { room, messages });
                Ok(())
            }

            GatewayCommand::JoinRoom { room } => chat::join_room(hub, self.conn_id, user, &room).await,

            GatewayCommand::SendMessage {
                room,
                content,
                image_data,
            } => {
                chat::send_message(
                    hub,
                    self.conn_id,
                    user,
                    &room,
                    content.as_deref(),
                    image_data.as_deref(),
                )
                .await?;
                Ok(())
            }

            GatewayCommand::EditMessage { message_id, content } => {
                chat::edit_message(hub, self.conn_id, user, message_id, &content).await
            }

            GatewayCommand::DeleteMessage { message_id } => chat::delete_message(hub, self.conn_id, user, message_id).await,

            GatewayCommand::ToggleReaction { message_id, emoji } => {
                chat::toggle_reaction(hub, self.conn_id, user, message_id, &emoji).await?;
                Ok(())
            }
        }
    }

    async fn authenticate(&mut self, token: &str) {
        let Some(claims) = self.hub.tokens.verify(token) else {
            self.reject("Invalid or expired token");
            return;
        };

        // Serialized with ban toggles so a ban cannot slip in between the
        // banned check and registration.
        let _order = self.hub.sequence().await;

        let user_id = claims.sub;
        let row = match self.hub.store.call(move |db| db.get_user_by_id(user_id)).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                self.reject("Invalid or expired token");
                return;
            }
            Err(e) => {
                error!("User lookup for {} failed during authentication: {}", user_id, e);
                self.reject(GENERIC_FAILURE);
                return;
            }
        };

        if row.is_banned {
            info!("Rejected banned user {} ({})", row.username, row.id);
            self.reject("Account is banned");
            self.reply(GatewayEvent::Banned);
            let _ = self.tx.send(Outbound::Close);
            self.state = SessionState::Closed;
            return;
        }

        let user = SessionUser {
            id: row.id,
            username: row.username.clone(),
            is_admin: row.is_admin,
        };

        // Queue the acknowledgment before registering so it precedes any fan-out.
        self.reply(GatewayEvent::Authenticated {
            success: true,
            is_admin: Some(user.is_admin),
            error: None,
        });

        let came_online = self
            .hub
            .dispatcher
            .register(self.conn_id, user.id, user.is_admin, self.tx.clone())
            .await;
        self.state = SessionState::Authenticated(user.clone());
        info!("{} ({}) authenticated on {}", user.username, user.id, self.conn_id);

        match roster::snapshot(&self.hub, user.is_admin).await {
            Ok(users) => self.reply(GatewayEvent::UsersList { users }),
            Err(e) => warn!("Roster snapshot for {} failed: {}", user.id, e),
        }

        if came_online {
            self.hub
                .dispatcher
                .broadcast_all(GatewayEvent::UserOnline {
                    id: user.id,
                    username: user.username,
                    avatar: avatar_of(&row),
                })
                .await;
        }
    }

    /// Transport closed. Deregisters the connection and announces the
    /// identity offline if this was its last connection. Idempotent.
    pub async fn close(&mut self) {
        let previous = std::mem::replace(&mut self.state, SessionState::Closed);
        let SessionState::Authenticated(user) = previous else {
            return;
        };

        if let Some((user_id, true)) = self.hub.dispatcher.unregister(self.conn_id).await {
            self.hub
                .dispatcher
                .broadcast_all(GatewayEvent::UserOffline { id: user_id })
                .await;
        }
        info!("{} ({}) disconnected from {}", user.username, user.id, self.conn_id);
    }
}
