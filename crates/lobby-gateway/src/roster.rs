use std::collections::HashSet;

use lobby_db::models::UserRow;
use lobby_types::api::UserSummary;
use lobby_types::models::UserId;

use crate::Hub;
use crate::records::avatar_of;
use crate::store::StoreError;

/// Build the roster as seen by an admin (`admin_view`) or a regular member.
/// Only admins learn who is banned.
pub fn summarize(users: &[UserRow], online: &HashSet<UserId>, admin_view: bool) -> Vec<UserSummary> {
    users
        .iter()
        .map(|user| UserSummary {
            id: user.id,
            username: user.username.clone(),
            avatar: avatar_of(user),
            online: online.contains(&user.id),
            is_admin: user.is_admin,
            is_banned: admin_view.then_some(user.is_banned),
        })
        .collect()
}

/// Roster snapshot for one newly authenticated connection.
pub async fn snapshot(hub: &Hub, admin_view: bool) -> Result<Vec<UserSummary>, StoreError> {
    let users = hub.store.call(|db| db.list_users()).await?;
    let online = hub.dispatcher.online_users().await;
    Ok(summarize(&users, &online, admin_view))
}

/// Push the current roster to every connection, per-connection rights applied.
pub async fn broadcast(hub: &Hub) -> Result<(), StoreError> {
    let users = hub.store.call(|db| db.list_users()).await?;
    let online = hub.dispatcher.online_users().await;
    hub.dispatcher
        .broadcast_roster(summarize(&users, &online, true), summarize(&users, &online, false))
        .await;
    Ok(())
}
