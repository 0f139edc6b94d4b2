use crate::Database;
use crate::models::{MessageRow, ReactionRow, UserRow};
use anyhow::{Result, anyhow};
use lobby_types::models::{MessageId, UserId};
use rusqlite::{Connection, OptionalExtension, Row, ToSql, params};

const USER_COLUMNS: &str =
    "id, username, password, is_admin, is_banned, avatar_color, avatar_emoji, avatar_image, created_at";

// JOIN users to fetch sender_username in a single query
const MESSAGE_SELECT: &str =
    "SELECT m.id, m.room, m.sender_id, u.username, m.content, m.image_data, m.edited, m.created_at
     FROM messages m
     LEFT JOIN users u ON m.sender_id = u.id";

impl Database {
    // -- Users --

    /// `None` if the username (case-insensitively) is already taken.
    pub fn create_user(&self, username: &str, password_hash: &str, is_admin: bool) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (username, password, is_admin) VALUES (?1, ?2, ?3)
                 ON CONFLICT DO NOTHING",
                params![username, password_hash, is_admin],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            let id = conn.last_insert_rowid();
            query_user(conn, "id = ?1", &id)?
                .ok_or_else(|| anyhow!("User {} missing after insert", id))
                .map(Some)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", &username))
    }

    pub fn get_user_by_id(&self, id: UserId) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", &id))
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY username"))?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Grant admin to every listed username that exists. Returns how many rows changed.
    pub fn promote_admins(&self, usernames: &[String]) -> Result<usize> {
        self.with_conn(|conn| {
            let mut changed = 0;
            for username in usernames {
                changed += conn.execute(
                    "UPDATE users SET is_admin = 1 WHERE username = ?1 AND is_admin = 0",
                    [username],
                )?;
            }
            Ok(changed)
        })
    }

    /// Flip the banned flag. Returns the new state, or `None` if the user does not exist.
    pub fn toggle_banned(&self, id: UserId) -> Result<Option<bool>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let current: Option<bool> = tx
                .query_row("SELECT is_banned FROM users WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;

            let Some(current) = current else {
                return Ok(None);
            };

            tx.execute("UPDATE users SET is_banned = ?1 WHERE id = ?2", params![!current, id])?;
            tx.commit()?;
            Ok(Some(!current))
        })
    }

    pub fn update_avatar(
        &self,
        id: UserId,
        color: &str,
        emoji: Option<&str>,
        image: Option<&str>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET avatar_color = ?1, avatar_emoji = ?2, avatar_image = ?3 WHERE id = ?4",
                params![color, emoji, image, id],
            )?;
            Ok(changed == 1)
        })
    }

    // -- Messages --

    /// Persist a message. The store assigns id and created_at.
    pub fn insert_message(
        &self,
        room: &str,
        sender_id: UserId,
        content: Option<&str>,
        image_data: Option<&str>,
    ) -> Result<MessageRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (room, sender_id, content, image_data) VALUES (?1, ?2, ?3, ?4)",
                params![room, sender_id, content, image_data],
            )?;
            let id = conn.last_insert_rowid();
            query_message(conn, id)?.ok_or_else(|| anyhow!("Message {} missing after insert", id))
        })
    }

    pub fn get_message(&self, id: MessageId) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Newest `limit` messages of a room, returned oldest first.
    pub fn get_messages(&self, room: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{MESSAGE_SELECT} WHERE m.room = ?1 ORDER BY m.id DESC LIMIT ?2"
            ))?;
            let mut rows = stmt
                .query_map(params![room, limit], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }

    /// Replace content and set the edited flag. Only matches when `sender_id`
    /// owns the message; `None` covers both missing and not owned.
    pub fn edit_message(&self, id: MessageId, sender_id: UserId, content: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET content = ?1, edited = 1 WHERE id = ?2 AND sender_id = ?3",
                params![content, id, sender_id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_message(conn, id)
        })
    }

    /// Delete a message and (by cascade) its reactions.
    pub fn delete_message(&self, id: MessageId) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(changed == 1)
        })
    }

    /// Delete every message of a room. Returns the number removed.
    pub fn clear_room(&self, room: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM messages WHERE room = ?1", [room])?;
            Ok(changed)
        })
    }

    // -- Reactions --

    /// Toggle a (message, user, emoji) triple: removes it if present, inserts it otherwise.
    /// Returns `true` when the reaction was added.
    pub fn toggle_reaction(&self, message_id: MessageId, user_id: UserId, emoji: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                params![message_id, user_id, emoji],
            )?;

            if removed == 0 {
                tx.execute(
                    "INSERT INTO reactions (message_id, user_id, emoji) VALUES (?1, ?2, ?3)",
                    params![message_id, user_id, emoji],
                )?;
            }

            tx.commit()?;
            Ok(removed == 0)
        })
    }

    /// Reactions of one message in insertion order.
    pub fn get_reactions(&self, message_id: MessageId) -> Result<Vec<ReactionRow>> {
        self.get_reactions_for_messages(&[message_id])
    }

    /// Batch-fetch reactions for a set of message IDs, in insertion order.
    pub fn get_reactions_for_messages(&self, message_ids: &[MessageId]) -> Result<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT message_id, user_id, emoji, created_at FROM reactions WHERE message_id IN ({}) ORDER BY rowid",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn ToSql> = message_ids.iter().map(|id| id as &dyn ToSql).collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(ReactionRow {
                        message_id: row.get(0)?,
                        user_id: row.get(1)?,
                        emoji: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, predicate: &str, value: &dyn ToSql) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate}"))?;
    let row = stmt.query_row([value], user_from_row).optional()?;
    Ok(row)
}

fn query_message(conn: &Connection, id: MessageId) -> Result<Option<MessageRow>> {
    let mut stmt = conn.prepare(&format!("{MESSAGE_SELECT} WHERE m.id = ?1"))?;
    let row = stmt.query_row([id], message_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        is_admin: row.get(3)?,
        is_banned: row.get(4)?,
        avatar_color: row.get(5)?,
        avatar_emoji: row.get(6)?,
        avatar_image: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        room: row.get(1)?,
        sender_id: row.get(2)?,
        sender_username: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| "unknown".to_string()),
        content: row.get(4)?,
        image_data: row.get(5)?,
        edited: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_users() -> (Database, UserId, UserId) {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user("alice", "hash", false).unwrap().unwrap();
        let bob = db.create_user("bob", "hash", false).unwrap().unwrap();
        (db, alice.id, bob.id)
    }

    #[test]
    fn usernames_are_unique() {
        let (db, alice, _) = db_with_users();
        assert!(db.create_user("alice", "other", false).unwrap().is_none());
        assert!(db.create_user("Alice", "other", false).unwrap().is_none());
        assert_eq!(db.get_user_by_username("alice").unwrap().unwrap().id, alice);
        assert!(db.get_user_by_username("carol").unwrap().is_none());
    }

    #[test]
    fn history_is_bounded_and_oldest_first() {
        let (db, alice, bob) = db_with_users();
        for i in 0..5 {
            db.insert_message("general", alice, Some(&format!("m{i}")), None).unwrap();
        }
        db.insert_message("dm:1:2", bob, Some("private"), None).unwrap();

        let rows = db.get_messages("general", 3).unwrap();
        let contents: Vec<_> = rows.iter().map(|r| r.content.clone().unwrap()).collect();
        assert_eq!(contents, ["m2", "m3", "m4"]);
        assert_eq!(rows[0].sender_username, "alice");
        assert!(!rows[0].created_at.is_empty());
    }

    #[test]
    fn only_sender_can_edit() {
        let (db, alice, bob) = db_with_users();
        let msg = db.insert_message("general", alice, Some("hi"), None).unwrap();
        assert!(!msg.edited);

        assert!(db.edit_message(msg.id, bob, "hijacked").unwrap().is_none());
        assert!(db.edit_message(9999, alice, "ghost").unwrap().is_none());

        let edited = db.edit_message(msg.id, alice, "hello").unwrap().unwrap();
        assert_eq!(edited.content.as_deref(), Some("hello"));
        assert!(edited.edited);
    }

    #[test]
    fn reaction_toggle_is_presence_absence() {
        let (db, alice, bob) = db_with_users();
        let msg = db.insert_message("general", alice, Some("hi"), None).unwrap();

        assert!(db.toggle_reaction(msg.id, alice, "👍").unwrap());
        assert!(db.toggle_reaction(msg.id, bob, "👍").unwrap());
        assert_eq!(db.get_reactions(msg.id).unwrap().len(), 2);

        assert!(!db.toggle_reaction(msg.id, alice, "👍").unwrap());
        let rows = db.get_reactions(msg.id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, bob);
    }

    #[test]
    fn deleting_cascades_to_reactions() {
        let (db, alice, bob) = db_with_users();
        let keep = db.insert_message("general", alice, Some("keep"), None).unwrap();
        let gone = db.insert_message("general", alice, Some("gone"), None).unwrap();
        db.toggle_reaction(gone.id, bob, "🔥").unwrap();
        db.toggle_reaction(keep.id, bob, "🔥").unwrap();

        assert!(db.delete_message(gone.id).unwrap());
        assert!(!db.delete_message(gone.id).unwrap());
        assert!(db.get_reactions(gone.id).unwrap().is_empty());
        assert_eq!(db.get_reactions(keep.id).unwrap().len(), 1);
    }

    #[test]
    fn clear_room_only_touches_that_room() {
        let (db, alice, bob) = db_with_users();
        db.insert_message("general", alice, Some("a"), None).unwrap();
        db.insert_message("general", bob, Some("b"), None).unwrap();
        db.insert_message("dm:1:2", bob, None, Some("data:image/png;base64,AAAA")).unwrap();

        assert_eq!(db.clear_room("general").unwrap(), 2);
        assert!(db.get_messages("general", 10).unwrap().is_empty());
        assert_eq!(db.get_messages("dm:1:2", 10).unwrap().len(), 1);
    }

    #[test]
    fn toggle_banned_flips_flag() {
        let (db, alice, _) = db_with_users();
        assert_eq!(db.toggle_banned(alice).unwrap(), Some(true));
        assert!(db.get_user_by_id(alice).unwrap().unwrap().is_banned);
        assert_eq!(db.toggle_banned(alice).unwrap(), Some(false));
        assert_eq!(db.toggle_banned(404).unwrap(), None);
    }

    #[test]
    fn promote_and_avatar_update() {
        let (db, alice, _) = db_with_users();
        assert_eq!(db.promote_admins(&["alice".into(), "nobody".into()]).unwrap(), 1);
        assert_eq!(db.promote_admins(&["alice".into()]).unwrap(), 0);

        assert!(db.update_avatar(alice, "#00ff00", Some("🦀"), None).unwrap());
        let row = db.get_user_by_id(alice).unwrap().unwrap();
        assert!(row.is_admin);
        assert_eq!(row.avatar_color, "#00ff00");
        assert_eq!(row.avatar_emoji.as_deref(), Some("🦀"));
        assert!(row.avatar_image.is_none());
    }
}
