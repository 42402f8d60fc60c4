//! SQLite DDL for the record store.
//!
//! All `CREATE TABLE` / `CREATE INDEX` statements live here so they are
//! reviewable and testable in isolation.

use rusqlite::Connection;

/// Complete DDL for the record database.
///
/// Uses `IF NOT EXISTS` throughout so `apply_schema` is idempotent.
/// Timestamps are epoch milliseconds; ties are broken by `rowid`.
pub(crate) const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS profiles (
    id          TEXT PRIMARY KEY,
    first_name  TEXT NOT NULL DEFAULT '',
    last_name   TEXT NOT NULL DEFAULT '',
    email       TEXT,
    phone       TEXT NOT NULL UNIQUE,
    timezone    TEXT NOT NULL DEFAULT 'UTC',
    created_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS conversations (
    id              TEXT PRIMARY KEY,
    profile_id      TEXT NOT NULL REFERENCES profiles(id),
    date            TEXT NOT NULL,      -- YYYY-MM-DD
    time            TEXT NOT NULL,
    type            TEXT NOT NULL,      -- scheduled-coach | assistant
    voicemail       INTEGER NOT NULL DEFAULT 0,
    transcription   TEXT,               -- JSON array of turns
    call_recording  TEXT,
    created_at      INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conversations_profile ON conversations(profile_id, created_at);
CREATE INDEX IF NOT EXISTS idx_conversations_date    ON conversations(profile_id, date);

CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY,
    profile_id  TEXT NOT NULL REFERENCES profiles(id),
    content     TEXT NOT NULL,
    sender      TEXT NOT NULL,          -- user | ai
    created_at  INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_profile ON messages(profile_id, created_at);

CREATE TABLE IF NOT EXISTS entities (
    id               TEXT PRIMARY KEY,
    profile_id       TEXT NOT NULL REFERENCES profiles(id),
    conversation_id  TEXT,
    content          TEXT NOT NULL,
    created_at       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS action_items (
    id               TEXT PRIMARY KEY,
    profile_id       TEXT NOT NULL REFERENCES profiles(id),
    conversation_id  TEXT,
    content          TEXT NOT NULL,
    created_at       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS summaries_short (
    id               TEXT PRIMARY KEY,
    profile_id       TEXT NOT NULL REFERENCES profiles(id),
    conversation_id  TEXT,
    content          TEXT NOT NULL,
    created_at       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS summaries_detailed (
    id               TEXT PRIMARY KEY,
    profile_id       TEXT NOT NULL REFERENCES profiles(id),
    conversation_id  TEXT,
    content          TEXT NOT NULL,
    created_at       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS summaries_sms (
    id               TEXT PRIMARY KEY,
    profile_id       TEXT NOT NULL REFERENCES profiles(id),
    conversation_id  TEXT,
    content          TEXT NOT NULL,
    created_at       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS scheduled_calls (
    id                    TEXT PRIMARY KEY,
    profile_id            TEXT NOT NULL REFERENCES profiles(id),
    date                  TEXT NOT NULL,   -- YYYY-MM-DD
    time                  TEXT NOT NULL,   -- HH:MM:SS+HH:MM
    calendar_invite_sent  INTEGER NOT NULL DEFAULT 0,
    event_uid             TEXT,            -- calendar UID reused on reschedule
    reminder_sent         INTEGER NOT NULL DEFAULT 0,
    no_show               INTEGER NOT NULL DEFAULT 0,
    created_at            INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scheduled_profile ON scheduled_calls(profile_id, created_at);
CREATE INDEX IF NOT EXISTS idx_scheduled_date    ON scheduled_calls(date);
"#;

/// Apply the full schema to an open connection.
///
/// Safe to call multiple times. Seeds the schema version on a fresh database.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    let version_str = super::types::CURRENT_SCHEMA_VERSION.to_string();
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![version_str],
    )?;

    Ok(())
}

/// Read the schema version, if stamped.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let raw: String = row.get(0)?;
            Ok(raw.parse().ok())
        }
        None => Ok(None),
    }
}
