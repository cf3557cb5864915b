use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Presence as persisted on the user row. The registry owns the live
/// connection handle; the row mirrors it for everything else to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Offline,
}

/// A user as the core sees it. Identity is issued elsewhere; the id is an
/// opaque string and the core only mutates the presence fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub status: Presence,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Direct,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    File,
    Link,
}

/// One entry of a conversation's append-only log. Immutable once stored;
/// `file` is set only by the upload pipeline, which appends the message
/// after the durable copy exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub from: String,
    /// Recipient id, direct conversations only.
    pub to: Option<String>,
    pub kind: MessageKind,
    pub text: String,
    /// Remote location of the uploaded payload, file-kind messages only.
    pub file: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A conversation with its participants populated and full message log,
/// the shape clients receive on `start_chat` and conversation listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub participants: Vec<User>,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Ongoing,
    Ended,
}

/// Terminal disposition of a call attempt. Absent while the call is still
/// ongoing and undecided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallVerdict {
    Accepted,
    Denied,
    Missed,
    Busy,
}

/// One call attempt. Rows are append-mostly: created at initiation, settled
/// by the receiver's disposition, never deleted (call-log history).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    pub id: Uuid,
    pub kind: CallKind,
    pub from: String,
    pub to: String,
    pub status: CallStatus,
    pub verdict: Option<CallVerdict>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// A call-history entry shaped for display: the other party, direction,
/// and whether the attempt ever connected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLogEntry {
    pub id: Uuid,
    pub kind: CallKind,
    pub peer: String,
    pub incoming: bool,
    pub missed: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}
