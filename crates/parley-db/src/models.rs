/// Database row types — these map directly to SQLite rows.
/// Distinct from the parley-types API models to keep the DB layer
/// independent; conversion happens in the query layer.

pub struct UserRow {
    pub id: String,
    pub display_name: String,
    pub status: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub recipient_id: Option<String>,
    pub kind: String,
    pub body: String,
    pub file_url: Option<String>,
    pub created_at: String,
}

pub struct CallRow {
    pub id: String,
    pub kind: String,
    pub caller_id: String,
    pub callee_id: String,
    pub status: String,
    pub verdict: Option<String>,
    pub started_at: String,
    pub ended_at: Option<String>,
}

/// Input shape for appending to a conversation log. The store assigns the
/// id and timestamp.
pub struct NewMessage {
    pub from: String,
    pub to: Option<String>,
    pub kind: parley_types::models::MessageKind,
    pub text: String,
    pub file: Option<String>,
}
