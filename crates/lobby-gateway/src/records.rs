use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use lobby_db::models::{MessageRow, ReactionRow, UserRow};
use lobby_types::api::{MessageRecord, ReactionGroup};
use lobby_types::models::{Avatar, MessageId};
use lobby_types::room::RoomId;

/// Group reaction rows by message, then by emoji. Groups keep the order in
/// which each emoji was first used; reactors keep insertion order.
pub fn group_reactions(rows: &[ReactionRow]) -> HashMap<MessageId, Vec<ReactionGroup>> {
    let mut grouped: HashMap<MessageId, Vec<ReactionGroup>> = HashMap::new();
    for row in rows {
        let groups = grouped.entry(row.message_id).or_default();
        match groups.iter_mut().find(|g| g.emoji == row.emoji) {
            Some(group) => {
                group.user_ids.push(row.user_id);
                group.count = group.user_ids.len();
            }
            None => groups.push(ReactionGroup {
                emoji: row.emoji.clone(),
                count: 1,
                user_ids: vec![row.user_id],
            }),
        }
    }
    grouped
}

pub fn message_record(row: MessageRow, reactions: Vec<ReactionGroup>) -> MessageRecord {
    let created_at = parse_timestamp(&row.created_at).unwrap_or_else(|| {
        warn!("Corrupt created_at '{}' on message {}", row.created_at, row.id);
        DateTime::default()
    });

    MessageRecord {
        id: row.id,
        room: RoomId::from(row.room),
        sender_id: row.sender_id,
        sender_username: row.sender_username,
        content: row.content,
        image_data: row.image_data,
        created_at,
        edited: row.edited,
        reactions,
    }
}

/// Attach grouped reactions to a page of message rows.
pub fn message_records(rows: Vec<MessageRow>, reactions: &[ReactionRow]) -> Vec<MessageRecord> {
    let mut grouped = group_reactions(reactions);
    rows.into_iter()
        .map(|row| {
            let groups = grouped.remove(&row.id).unwrap_or_default();
            message_record(row, groups)
        })
        .collect()
}

pub fn avatar_of(user: &UserRow) -> Avatar {
    Avatar {
        color: user.avatar_color.clone(),
        emoji: user.avatar_emoji.clone(),
        image: user.avatar_image.clone(),
    }
}

/// The store writes RFC 3339; older rows may carry SQLite's
/// "YYYY-MM-DD HH:MM:SS" with no zone, which is UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|ndt| ndt.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reaction(message_id: MessageId, user_id: i64, emoji: &str) -> ReactionRow {
        ReactionRow {
            message_id,
            user_id,
            emoji: emoji.to_string(),
            created_at: String::new(),
        }
    }

    #[test]
    fn groups_by_message_and_emoji() {
        let rows = vec![
            reaction(1, 10, "👍"),
            reaction(1, 11, "🔥"),
            reaction(2, 10, "👍"),
            reaction(1, 12, "👍"),
        ];

        let grouped = group_reactions(&rows);
        assert_eq!(
            grouped[&1],
            vec![
                ReactionGroup { emoji: "👍".into(), count: 2, user_ids: vec![10, 12] },
                ReactionGroup { emoji: "🔥".into(), count: 1, user_ids: vec![11] },
            ]
        );
        assert_eq!(grouped[&2].len(), 1);
        assert!(!grouped.contains_key(&3));
    }

    #[test]
    fn parses_both_timestamp_shapes() {
        let rfc = parse_timestamp("2026-10-16T08:30:00.250Z").unwrap();
        assert_eq!(rfc.timestamp_millis() % 1000, 250);

        let naive = parse_timestamp("2026-10-16 08:30:00").unwrap();
        assert_eq!(naive.timestamp(), rfc.timestamp());

        assert!(parse_timestamp("yesterday").is_none());
    }
}
