use lobby_types::api::UpdateAvatarRequest;
use lobby_types::events::GatewayEvent;
use lobby_types::models::{Avatar, UserId};

use crate::error::ChatError;
use crate::{Hub, validate};

/// Validate and persist a new avatar, then tell every connection.
pub async fn update_avatar(hub: &Hub, user_id: UserId, req: &UpdateAvatarRequest) -> Result<Avatar, ChatError> {
    let avatar = Avatar {
        color: validate::avatar_color(&req.color)?,
        emoji: validate::avatar_emoji(req.emoji.as_deref())?,
        image: validate::avatar_image(req.image.as_deref())?,
    };

    let stored = avatar.clone();
    let updated = hub
        .store
        .call(move |db| {
            db.update_avatar(
                user_id,
                &stored.color,
                stored.emoji.as_deref(),
                stored.image.as_deref(),
            )
        })
        .await?;
    if !updated {
        return Err(ChatError::NotFound);
    }

    hub.dispatcher
        .broadcast_all(GatewayEvent::AvatarUpdated {
            id: user_id,
            avatar: avatar.clone(),
        })
        .await;

    Ok(avatar)
}
