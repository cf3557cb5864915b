use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- User identity is issued elsewhere; the core only mutates the
        -- presence fields (status, connection_id).
        CREATE TABLE IF NOT EXISTS users (
            id            TEXT PRIMARY KEY,
            display_name  TEXT NOT NULL,
            status        TEXT NOT NULL DEFAULT 'offline',
            connection_id TEXT,
            created_at    TEXT NOT NULL
        );

        -- Symmetric pairs: a friendship is two rows, written in one
        -- transaction by accept_friend_request.
        CREATE TABLE IF NOT EXISTS friendships (
            user_id    TEXT NOT NULL,
            friend_id  TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (user_id, friend_id)
        );

        -- Pending only; acceptance deletes the row. The UNIQUE index keeps
        -- repeated sends from piling up rows.
        CREATE TABLE IF NOT EXISTS friend_requests (
            id           TEXT PRIMARY KEY,
            sender_id    TEXT NOT NULL,
            recipient_id TEXT NOT NULL,
            created_at   TEXT NOT NULL,
            UNIQUE (sender_id, recipient_id)
        );

        -- participant_key is the canonical sorted participant list
        -- ('direct:a:b' / 'group:a:b:c'); the UNIQUE index makes
        -- find-or-create race-safe.
        CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY,
            kind            TEXT NOT NULL CHECK (kind IN ('direct', 'group')),
            participant_key TEXT NOT NULL UNIQUE,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS conversation_participants (
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            user_id         TEXT NOT NULL,
            PRIMARY KEY (conversation_id, user_id)
        );

        -- Append-only log; rowid order is append order.
        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            sender_id       TEXT NOT NULL,
            recipient_id    TEXT,
            kind            TEXT NOT NULL,
            body            TEXT NOT NULL,
            file_url        TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id);

        -- One row per call attempt; never deleted (call-log history).
        CREATE TABLE IF NOT EXISTS calls (
            id         TEXT PRIMARY KEY,
            kind       TEXT NOT NULL CHECK (kind IN ('audio', 'video')),
            caller_id  TEXT NOT NULL,
            callee_id  TEXT NOT NULL,
            pair_key   TEXT NOT NULL,
            status     TEXT NOT NULL CHECK (status IN ('ongoing', 'ended')),
            verdict    TEXT,
            started_at TEXT NOT NULL,
            ended_at   TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_calls_pair
            ON calls(pair_key, kind, status);

        CREATE INDEX IF NOT EXISTS idx_calls_caller ON calls(caller_id);
        CREATE INDEX IF NOT EXISTS idx_calls_callee ON calls(callee_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
