use crate::Database;
use crate::models::{CallRow, MessageRow, NewMessage, UserRow};
use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use parley_types::models::{
    CallKind, CallLogEntry, CallSession, CallStatus, CallVerdict, Conversation, ConversationKind,
    Message, MessageKind, Presence, User,
};

impl Database {
    // -- Users --

    /// Identity rows belong to the external identity layer; this is the
    /// wiring point it (and the tests) use to materialize one.
    pub fn ensure_user(&self, id: &str, display_name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO users (id, display_name, status, created_at)
                 VALUES (?1, ?2, 'offline', ?3)",
                rusqlite::params![id, display_name, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    /// Presence mirror on the user row. The registry is the authority for
    /// the live handle; this keeps the stored record in step.
    pub fn set_presence(
        &self,
        id: &str,
        status: Presence,
        connection_id: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET status = ?2, connection_id = ?3 WHERE id = ?1",
                rusqlite::params![id, presence_str(status), connection_id],
            )?;
            Ok(())
        })
    }

    pub fn friends_of(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT friend_id FROM friendships WHERE user_id = ?1 ORDER BY friend_id")?;
            let ids = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    // -- Friend requests --

    /// Returns the request id and whether a new row was inserted. A repeat
    /// send for the same (sender, recipient) pair lands on the existing row.
    pub fn create_friend_request(&self, from: &str, to: &str) -> Result<(Uuid, bool)> {
        let id = Uuid::new_v4();
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO friend_requests (id, sender_id, recipient_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (sender_id, recipient_id) DO NOTHING",
                rusqlite::params![id.to_string(), from, to, Utc::now().to_rfc3339()],
            )?;

            let stored: String = conn.query_row(
                "SELECT id FROM friend_requests WHERE sender_id = ?1 AND recipient_id = ?2",
                [from, to],
                |row| row.get(0),
            )?;

            Ok((stored.parse()?, inserted > 0))
        })
    }

    /// Both symmetric friendship inserts and the request deletion commit as
    /// one transaction, so a crash cannot leave a one-directional friendship.
    /// Returns (sender, recipient), or None if the request is gone.
    pub fn accept_friend_request(&self, request_id: Uuid) -> Result<Option<(String, String)>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let pair = tx
                .query_row(
                    "SELECT sender_id, recipient_id FROM friend_requests WHERE id = ?1",
                    [request_id.to_string()],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;

            let Some((sender, recipient)) = pair else {
                return Ok(None);
            };

            let now = Utc::now().to_rfc3339();
            tx.execute(
                "INSERT OR IGNORE INTO friendships (user_id, friend_id, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![sender, recipient, now],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO friendships (user_id, friend_id, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![recipient, sender, now],
            )?;
            tx.execute(
                "DELETE FROM friend_requests WHERE id = ?1",
                [request_id.to_string()],
            )?;

            tx.commit()?;
            Ok(Some((sender, recipient)))
        })
    }

    // -- Conversations --

    pub fn find_or_create_direct(&self, a: &str, b: &str) -> Result<Conversation> {
        if a == b {
            bail!("direct conversation requires two distinct participants");
        }
        let mut participants = vec![a.to_string(), b.to_string()];
        participants.sort();
        let id = self.find_or_create_conversation(ConversationKind::Direct, &participants)?;
        self.get_conversation(id)?
            .ok_or_else(|| anyhow!("conversation {} vanished after create", id))
    }

    pub fn find_or_create_group(&self, participants: &[String]) -> Result<Conversation> {
        let mut participants = participants.to_vec();
        participants.sort();
        participants.dedup();
        if participants.len() < 2 {
            bail!("group conversation requires at least two distinct participants");
        }
        let id = self.find_or_create_conversation(ConversationKind::Group, &participants)?;
        self.get_conversation(id)?
            .ok_or_else(|| anyhow!("conversation {} vanished after create", id))
    }

    /// Race-safe find-or-create: the canonical participant key carries a
    /// UNIQUE index, so concurrent callers converge on a single row.
    fn find_or_create_conversation(
        &self,
        kind: ConversationKind,
        sorted_participants: &[String],
    ) -> Result<Uuid> {
        let key = participant_key(kind, sorted_participants);
        let candidate = Uuid::new_v4();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO conversations (id, kind, participant_key, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (participant_key) DO NOTHING",
                rusqlite::params![
                    candidate.to_string(),
                    conversation_kind_str(kind),
                    key,
                    Utc::now().to_rfc3339()
                ],
            )?;

            let stored: String = tx.query_row(
                "SELECT id FROM conversations WHERE participant_key = ?1",
                [&key],
                |row| row.get(0),
            )?;

            for user_id in sorted_participants {
                tx.execute(
                    "INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id)
                     VALUES (?1, ?2)",
                    rusqlite::params![stored, user_id],
                )?;
            }

            tx.commit()?;
            Ok(stored.parse()?)
        })
    }

    /// Fully populated view: participant user rows plus the message log.
    pub fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT kind FROM conversations WHERE id = ?1",
                    [id.to_string()],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;

            let Some(kind) = row else {
                return Ok(None);
            };

            Ok(Some(load_conversation(conn, id, &kind)?))
        })
    }

    /// Participant ids straight from the membership table; routing uses
    /// these even when a participant has no user row yet.
    pub fn participant_ids(&self, conversation_id: Uuid) -> Result<Vec<String>> {
        self.with_conn(|conn| query_participant_ids(conn, conversation_id))
    }

    pub fn conversations_for_user(
        &self,
        user_id: &str,
        kind: ConversationKind,
    ) -> Result<Vec<Conversation>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.kind FROM conversations c
                 JOIN conversation_participants cp ON cp.conversation_id = c.id
                 WHERE cp.user_id = ?1 AND c.kind = ?2
                 ORDER BY c.rowid",
            )?;
            let ids = stmt
                .query_map(
                    rusqlite::params![user_id, conversation_kind_str(kind)],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            ids.into_iter()
                .map(|(id, kind)| load_conversation(conn, id.parse()?, &kind))
                .collect()
        })
    }

    // -- Messages --

    /// Append to the log; the store assigns id and timestamp and returns
    /// the stored record.
    pub fn append_message(&self, conversation_id: Uuid, new: NewMessage) -> Result<Message> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages
                     (id, conversation_id, sender_id, recipient_id, kind, body, file_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    id.to_string(),
                    conversation_id.to_string(),
                    new.from,
                    new.to,
                    message_kind_str(new.kind),
                    new.text,
                    new.file,
                    created_at.to_rfc3339()
                ],
            )?;
            Ok(())
        })?;

        Ok(Message {
            id,
            conversation_id,
            from: new.from,
            to: new.to,
            kind: new.kind,
            text: new.text,
            file: new.file,
            created_at,
        })
    }

    /// Log order: rowid order, which is append order.
    pub fn get_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        self.with_conn(|conn| query_messages(conn, conversation_id))
    }

    // -- Calls --

    pub fn create_call(&self, kind: CallKind, from: &str, to: &str) -> Result<CallSession> {
        let id = Uuid::new_v4();
        let started_at = Utc::now();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO calls
                     (id, kind, caller_id, callee_id, pair_key, status, started_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'ongoing', ?6)",
                rusqlite::params![
                    id.to_string(),
                    call_kind_str(kind),
                    from,
                    to,
                    pair_key(from, to),
                    started_at.to_rfc3339()
                ],
            )?;
            Ok(())
        })?;

        Ok(CallSession {
            id,
            kind,
            from: from.to_string(),
            to: to.to_string(),
            status: CallStatus::Ongoing,
            verdict: None,
            started_at,
            ended_at: None,
        })
    }

    /// Terminal disposition (missed / denied / busy): sets the verdict,
    /// ends the session, stamps ended_at. The `status = 'ongoing'` guard
    /// makes ended sessions immutable; when several ongoing sessions exist
    /// for the pair, the most recent one is settled.
    pub fn settle_call(
        &self,
        kind: CallKind,
        a: &str,
        b: &str,
        verdict: CallVerdict,
    ) -> Result<Option<CallSession>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(id) = latest_ongoing_call(&tx, kind, a, b)? else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE calls SET verdict = ?2, status = 'ended', ended_at = ?3
                 WHERE id = ?1 AND status = 'ongoing'",
                rusqlite::params![id, verdict_str(verdict), Utc::now().to_rfc3339()],
            )?;

            let session = query_call(&tx, &id)?
                .ok_or_else(|| anyhow!("call {} vanished mid-update", id))?;

            tx.commit()?;
            Ok(Some(session))
        })
    }

    /// Acceptance records the verdict but leaves the status as stored; the
    /// session keeps running until a later hang-up settles it.
    pub fn accept_call(&self, kind: CallKind, a: &str, b: &str) -> Result<Option<CallSession>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(id) = latest_ongoing_call(&tx, kind, a, b)? else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE calls SET verdict = 'accepted' WHERE id = ?1 AND status = 'ongoing'",
                [&id],
            )?;

            let session = query_call(&tx, &id)?
                .ok_or_else(|| anyhow!("call {} vanished mid-update", id))?;

            tx.commit()?;
            Ok(Some(session))
        })
    }

    pub fn get_call(&self, id: Uuid) -> Result<Option<CallSession>> {
        self.with_conn(|conn| query_call(conn, &id.to_string()))
    }

    /// Call history for one user, newest first, shaped for display.
    pub fn call_log_for_user(&self, user_id: &str) -> Result<Vec<CallLogEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, kind, caller_id, callee_id, status, verdict, started_at, ended_at
                 FROM calls
                 WHERE caller_id = ?1 OR callee_id = ?1
                 ORDER BY started_at DESC, rowid DESC",
            )?;

            let rows = stmt
                .query_map([user_id], map_call_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|row| {
                    let session = call_from_row(row)?;
                    let incoming = session.to == user_id;
                    Ok(CallLogEntry {
                        id: session.id,
                        kind: session.kind,
                        peer: if incoming { session.from } else { session.to },
                        incoming,
                        missed: session.verdict != Some(CallVerdict::Accepted),
                        started_at: session.started_at,
                        ended_at: session.ended_at,
                    })
                })
                .collect()
        })
    }
}

// -- Row loading --

fn query_user(conn: &Connection, id: &str) -> Result<Option<User>> {
    let mut stmt =
        conn.prepare("SELECT id, display_name, status, created_at FROM users WHERE id = ?1")?;

    let row = stmt
        .query_row([id], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                display_name: row.get(1)?,
                status: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    row.map(user_from_row).transpose()
}

fn load_conversation(conn: &Connection, id: Uuid, kind: &str) -> Result<Conversation> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.display_name, u.status, u.created_at
         FROM conversation_participants cp
         JOIN users u ON u.id = cp.user_id
         WHERE cp.conversation_id = ?1
         ORDER BY u.id",
    )?;

    let participants = stmt
        .query_map([id.to_string()], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                display_name: row.get(1)?,
                status: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .into_iter()
        .map(user_from_row)
        .collect::<Result<Vec<_>>>()?;

    Ok(Conversation {
        id,
        kind: conversation_kind_from_str(kind)?,
        participants,
        messages: query_messages(conn, id)?,
    })
}

fn query_participant_ids(conn: &Connection, conversation_id: Uuid) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM conversation_participants
         WHERE conversation_id = ?1 ORDER BY user_id",
    )?;
    let ids = stmt
        .query_map([conversation_id.to_string()], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn query_messages(conn: &Connection, conversation_id: Uuid) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, sender_id, recipient_id, kind, body, file_url, created_at
         FROM messages WHERE conversation_id = ?1 ORDER BY rowid",
    )?;

    let rows = stmt
        .query_map([conversation_id.to_string()], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                conversation_id: row.get(1)?,
                sender_id: row.get(2)?,
                recipient_id: row.get(3)?,
                kind: row.get(4)?,
                body: row.get(5)?,
                file_url: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter().map(message_from_row).collect()
}

fn latest_ongoing_call(conn: &Connection, kind: CallKind, a: &str, b: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT id FROM calls
         WHERE pair_key = ?1 AND kind = ?2 AND status = 'ongoing'
         ORDER BY started_at DESC, rowid DESC
         LIMIT 1",
        rusqlite::params![pair_key(a, b), call_kind_str(kind)],
        |row| row.get(0),
    )
    .optional()
}

fn map_call_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CallRow> {
    Ok(CallRow {
        id: row.get(0)?,
        kind: row.get(1)?,
        caller_id: row.get(2)?,
        callee_id: row.get(3)?,
        status: row.get(4)?,
        verdict: row.get(5)?,
        started_at: row.get(6)?,
        ended_at: row.get(7)?,
    })
}

fn query_call(conn: &Connection, id: &str) -> Result<Option<CallSession>> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, caller_id, callee_id, status, verdict, started_at, ended_at
         FROM calls WHERE id = ?1",
    )?;

    let row = stmt.query_row([id], map_call_row).optional()?;
    row.map(call_from_row).transpose()
}

// -- Row conversion --

fn user_from_row(row: UserRow) -> Result<User> {
    Ok(User {
        id: row.id,
        display_name: row.display_name,
        status: presence_from_str(&row.status)?,
        created_at: parse_ts(&row.created_at)?,
    })
}

fn message_from_row(row: MessageRow) -> Result<Message> {
    Ok(Message {
        id: row.id.parse()?,
        conversation_id: row.conversation_id.parse()?,
        from: row.sender_id,
        to: row.recipient_id,
        kind: message_kind_from_str(&row.kind)?,
        text: row.body,
        file: row.file_url,
        created_at: parse_ts(&row.created_at)?,
    })
}

fn call_from_row(row: CallRow) -> Result<CallSession> {
    Ok(CallSession {
        id: row.id.parse()?,
        kind: call_kind_from_str(&row.kind)?,
        from: row.caller_id,
        to: row.callee_id,
        status: match row.status.as_str() {
            "ongoing" => CallStatus::Ongoing,
            "ended" => CallStatus::Ended,
            other => bail!("unknown call status '{}'", other),
        },
        verdict: row.verdict.as_deref().map(verdict_from_str).transpose()?,
        started_at: parse_ts(&row.started_at)?,
        ended_at: row.ended_at.as_deref().map(parse_ts).transpose()?,
    })
}

// -- Key and enum encoding --

/// Canonical key for a conversation's participant set. Callers pass the
/// participants already sorted; the key is what the UNIQUE index sees.
fn participant_key(kind: ConversationKind, sorted_participants: &[String]) -> String {
    format!(
        "{}:{}",
        conversation_kind_str(kind),
        sorted_participants.join(":")
    )
}

/// Unordered pair key for call lookups.
fn pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}:{}", a, b)
    } else {
        format!("{}:{}", b, a)
    }
}

fn presence_str(p: Presence) -> &'static str {
    match p {
        Presence::Online => "online",
        Presence::Offline => "offline",
    }
}

fn presence_from_str(s: &str) -> Result<Presence> {
    match s {
        "online" => Ok(Presence::Online),
        "offline" => Ok(Presence::Offline),
        other => bail!("unknown presence '{}'", other),
    }
}

fn conversation_kind_str(k: ConversationKind) -> &'static str {
    match k {
        ConversationKind::Direct => "direct",
        ConversationKind::Group => "group",
    }
}

fn conversation_kind_from_str(s: &str) -> Result<ConversationKind> {
    match s {
        "direct" => Ok(ConversationKind::Direct),
        "group" => Ok(ConversationKind::Group),
        other => bail!("unknown conversation kind '{}'", other),
    }
}

fn message_kind_str(k: MessageKind) -> &'static str {
    match k {
        MessageKind::Text => "text",
        MessageKind::Image => "image",
        MessageKind::Video => "video",
        MessageKind::File => "file",
        MessageKind::Link => "link",
    }
}

fn message_kind_from_str(s: &str) -> Result<MessageKind> {
    match s {
        "text" => Ok(MessageKind::Text),
        "image" => Ok(MessageKind::Image),
        "video" => Ok(MessageKind::Video),
        "file" => Ok(MessageKind::File),
        "link" => Ok(MessageKind::Link),
        other => bail!("unknown message kind '{}'", other),
    }
}

fn call_kind_str(k: CallKind) -> &'static str {
    match k {
        CallKind::Audio => "audio",
        CallKind::Video => "video",
    }
}

fn call_kind_from_str(s: &str) -> Result<CallKind> {
    match s {
        "audio" => Ok(CallKind::Audio),
        "video" => Ok(CallKind::Video),
        other => bail!("unknown call kind '{}'", other),
    }
}

fn verdict_str(v: CallVerdict) -> &'static str {
    match v {
        CallVerdict::Accepted => "accepted",
        CallVerdict::Denied => "denied",
        CallVerdict::Missed => "missed",
        CallVerdict::Busy => "busy",
    }
}

fn verdict_from_str(s: &str) -> Result<CallVerdict> {
    match s {
        "accepted" => Ok(CallVerdict::Accepted),
        "denied" => Ok(CallVerdict::Denied),
        "missed" => Ok(CallVerdict::Missed),
        "busy" => Ok(CallVerdict::Busy),
        other => bail!("unknown call verdict '{}'", other),
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        db.ensure_user("1", "alice").unwrap();
        db.ensure_user("2", "bob").unwrap();
        db.ensure_user("3", "carol").unwrap();
        (dir, db)
    }

    fn text(from: &str, to: Option<&str>, body: &str) -> NewMessage {
        NewMessage {
            from: from.to_string(),
            to: to.map(str::to_string),
            kind: MessageKind::Text,
            text: body.to_string(),
            file: None,
        }
    }

    #[test]
    fn direct_find_or_create_is_stable_across_argument_order() {
        let (_dir, db) = test_db();

        let first = db.find_or_create_direct("1", "2").unwrap();
        let second = db.find_or_create_direct("2", "1").unwrap();

        assert_eq!(first.id, second.id);
        assert!(first.messages.is_empty());

        let ids: Vec<&str> = second.participants.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn direct_conversation_requires_distinct_users() {
        let (_dir, db) = test_db();
        assert!(db.find_or_create_direct("1", "1").is_err());
    }

    #[test]
    fn group_find_or_create_ignores_participant_order() {
        let (_dir, db) = test_db();

        let forward = db
            .find_or_create_group(&["1".into(), "2".into(), "3".into()])
            .unwrap();
        let shuffled = db
            .find_or_create_group(&["3".into(), "1".into(), "2".into()])
            .unwrap();

        assert_eq!(forward.id, shuffled.id);
    }

    #[test]
    fn two_person_group_is_distinct_from_direct_pair() {
        let (_dir, db) = test_db();

        let direct = db.find_or_create_direct("1", "2").unwrap();
        let group = db.find_or_create_group(&["1".into(), "2".into()]).unwrap();

        assert_ne!(direct.id, group.id);
    }

    #[test]
    fn messages_read_back_in_append_order() {
        let (_dir, db) = test_db();
        let convo = db.find_or_create_direct("1", "2").unwrap();

        for i in 0..5 {
            db.append_message(convo.id, text("1", Some("2"), &format!("msg {i}")))
                .unwrap();
        }

        let log = db.get_messages(convo.id).unwrap();
        assert_eq!(log.len(), 5);
        for (i, message) in log.iter().enumerate() {
            assert_eq!(message.text, format!("msg {i}"));
            assert_eq!(message.from, "1");
        }
    }

    #[test]
    fn append_returns_stored_record_with_server_fields() {
        let (_dir, db) = test_db();
        let convo = db.find_or_create_direct("1", "2").unwrap();

        let stored = db.append_message(convo.id, text("1", Some("2"), "hi")).unwrap();
        assert_eq!(stored.conversation_id, convo.id);

        let log = db.get_messages(convo.id).unwrap();
        assert_eq!(log[0].id, stored.id);
        assert_eq!(log[0].created_at, stored.created_at);
    }

    #[test]
    fn denied_call_ends_with_verdict_and_timestamp() {
        let (_dir, db) = test_db();
        db.create_call(CallKind::Audio, "1", "2").unwrap();

        let session = db
            .settle_call(CallKind::Audio, "1", "2", CallVerdict::Denied)
            .unwrap()
            .unwrap();

        assert_eq!(session.status, CallStatus::Ended);
        assert_eq!(session.verdict, Some(CallVerdict::Denied));
        assert!(session.ended_at.is_some());
    }

    #[test]
    fn accepted_call_keeps_status_ongoing() {
        let (_dir, db) = test_db();
        db.create_call(CallKind::Video, "1", "2").unwrap();

        let session = db.accept_call(CallKind::Video, "2", "1").unwrap().unwrap();

        assert_eq!(session.status, CallStatus::Ongoing);
        assert_eq!(session.verdict, Some(CallVerdict::Accepted));
        assert_eq!(session.ended_at, None);
    }

    #[test]
    fn ended_call_accepts_no_further_transitions() {
        let (_dir, db) = test_db();
        let call = db.create_call(CallKind::Audio, "1", "2").unwrap();

        db.settle_call(CallKind::Audio, "1", "2", CallVerdict::Busy)
            .unwrap()
            .unwrap();

        assert!(db.accept_call(CallKind::Audio, "1", "2").unwrap().is_none());
        assert!(
            db.settle_call(CallKind::Audio, "1", "2", CallVerdict::Missed)
                .unwrap()
                .is_none()
        );

        let stored = db.get_call(call.id).unwrap().unwrap();
        assert_eq!(stored.verdict, Some(CallVerdict::Busy));
    }

    #[test]
    fn most_recent_ongoing_call_is_settled_first() {
        let (_dir, db) = test_db();
        let older = db.create_call(CallKind::Audio, "1", "2").unwrap();
        let newer = db.create_call(CallKind::Audio, "2", "1").unwrap();

        let settled = db
            .settle_call(CallKind::Audio, "1", "2", CallVerdict::Missed)
            .unwrap()
            .unwrap();

        assert_eq!(settled.id, newer.id);
        let older_stored = db.get_call(older.id).unwrap().unwrap();
        assert_eq!(older_stored.status, CallStatus::Ongoing);
    }

    #[test]
    fn audio_and_video_sessions_do_not_cross_settle() {
        let (_dir, db) = test_db();
        db.create_call(CallKind::Audio, "1", "2").unwrap();

        assert!(
            db.settle_call(CallKind::Video, "1", "2", CallVerdict::Missed)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn friend_acceptance_is_symmetric_and_deletes_request() {
        let (_dir, db) = test_db();

        let (request_id, inserted) = db.create_friend_request("1", "2").unwrap();
        assert!(inserted);

        let pair = db.accept_friend_request(request_id).unwrap().unwrap();
        assert_eq!(pair, ("1".to_string(), "2".to_string()));

        assert_eq!(db.friends_of("1").unwrap(), vec!["2".to_string()]);
        assert_eq!(db.friends_of("2").unwrap(), vec!["1".to_string()]);

        // Request row is gone: accepting again is a no-op.
        assert!(db.accept_friend_request(request_id).unwrap().is_none());
    }

    #[test]
    fn duplicate_friend_request_lands_on_existing_row() {
        let (_dir, db) = test_db();

        let (first_id, first_inserted) = db.create_friend_request("1", "2").unwrap();
        let (second_id, second_inserted) = db.create_friend_request("1", "2").unwrap();

        assert!(first_inserted);
        assert!(!second_inserted);
        assert_eq!(first_id, second_id);
    }

    #[test]
    fn call_log_reports_direction_and_missed_flag() {
        let (_dir, db) = test_db();

        db.create_call(CallKind::Audio, "1", "2").unwrap();
        db.settle_call(CallKind::Audio, "1", "2", CallVerdict::Missed)
            .unwrap();

        db.create_call(CallKind::Video, "2", "1").unwrap();
        db.accept_call(CallKind::Video, "1", "2").unwrap();

        let log = db.call_log_for_user("1").unwrap();
        assert_eq!(log.len(), 2);

        let video = log.iter().find(|e| e.kind == CallKind::Video).unwrap();
        assert_eq!(video.peer, "2");
        assert!(video.incoming);
        assert!(!video.missed);

        let audio = log.iter().find(|e| e.kind == CallKind::Audio).unwrap();
        assert_eq!(audio.peer, "2");
        assert!(!audio.incoming);
        assert!(audio.missed);
    }

    #[test]
    fn presence_updates_land_on_user_row() {
        let (_dir, db) = test_db();

        db.set_presence("1", Presence::Online, Some("conn-1")).unwrap();
        let user = db.get_user("1").unwrap().unwrap();
        assert_eq!(user.status, Presence::Online);

        db.set_presence("1", Presence::Offline, None).unwrap();
        let user = db.get_user("1").unwrap().unwrap();
        assert_eq!(user.status, Presence::Offline);
    }
}
