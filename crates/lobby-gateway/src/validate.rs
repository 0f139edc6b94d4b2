use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;

use crate::error::ChatError;

/// Longest accepted message text, in characters, after trimming.
pub const MAX_CONTENT_CHARS: usize = 4000;

/// Encoded size ceiling for a message image (the whole data URL).
pub const MAX_IMAGE_DATA_LEN: usize = 3 * 1024 * 1024;

/// Encoded size ceiling for an avatar image.
pub const MAX_AVATAR_IMAGE_LEN: usize = 512 * 1024;

pub const MAX_AVATAR_EMOJI_LEN: usize = 16;
pub const MAX_REACTION_EMOJI_LEN: usize = 32;

/// Validated payload of a new message. At least one side is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub image_data: Option<String>,
}

pub fn outgoing_message(
    content: Option<&str>,
    image_data: Option<&str>,
) -> Result<OutgoingMessage, ChatError> {
    let content = content.map(str::trim).filter(|s| !s.is_empty());
    let image_data = image_data.filter(|s| !s.is_empty());

    if content.is_none() && image_data.is_none() {
        return Err(ChatError::invalid("Message must contain text or an image"));
    }

    let content = content.map(message_text).transpose()?;
    if let Some(image) = image_data {
        image_data_url(image, MAX_IMAGE_DATA_LEN, "Image is too large (max 3 MB)")?;
    }

    Ok(OutgoingMessage {
        content,
        image_data: image_data.map(str::to_string),
    })
}

/// Trimmed, non-empty, bounded text. Used for edits as well as sends.
pub fn message_text(content: &str) -> Result<String, ChatError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ChatError::invalid("Message cannot be empty"));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ChatError::invalid(format!(
            "Message is too long (max {MAX_CONTENT_CHARS} characters)"
        )));
    }
    Ok(content.to_string())
}

pub fn reaction_emoji(emoji: &str) -> Result<String, ChatError> {
    let emoji = emoji.trim();
    if emoji.is_empty() || emoji.len() > MAX_REACTION_EMOJI_LEN {
        return Err(ChatError::invalid("Invalid reaction"));
    }
    Ok(emoji.to_string())
}

/// `#rrggbb`
pub fn avatar_color(color: &str) -> Result<String, ChatError> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(ChatError::invalid("Color must look like #rrggbb"));
    }
    Ok(color.to_ascii_lowercase())
}

pub fn avatar_emoji(emoji: Option<&str>) -> Result<Option<String>, ChatError> {
    match emoji.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(e) if e.len() > MAX_AVATAR_EMOJI_LEN => Err(ChatError::invalid("Avatar emoji is too long")),
        Some(e) => Ok(Some(e.to_string())),
    }
}

pub fn avatar_image(image: Option<&str>) -> Result<Option<String>, ChatError> {
    match image.filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(image) => {
            image_data_url(image, MAX_AVATAR_IMAGE_LEN, "Avatar image is too large (max 512 KB)")?;
            Ok(Some(image.to_string()))
        }
    }
}

/// Checks size first so an oversized payload is never decoded.
fn image_data_url(data: &str, max_len: usize, too_large: &str) -> Result<(), ChatError> {
    if data.len() > max_len {
        return Err(ChatError::invalid(too_large));
    }

    let payload = data
        .strip_prefix("data:image/")
        .and_then(|rest| rest.split_once(";base64,"))
        .map(|(_, payload)| payload)
        .ok_or_else(|| ChatError::invalid("Image must be a base64 data URL"))?;

    if payload.is_empty() || B64.decode(payload).is_err() {
        return Err(ChatError::invalid("Image data is not valid base64"));
    }
    Ok(())
}
