//! SQLite-backed record store.
//!
//! A single database file (see [`crate::app_dirs::database_file`]) holds every
//! table. Thread-safe via an internal `Mutex<Connection>`; no `.await` ever
//! happens while the lock is held.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use super::schema::{apply_schema, read_schema_version};
use super::types::{
    Conversation, ConversationType, Message, NewConversation, NewProfile, NewScheduledCall, Note,
    Profile, ScheduledCall, Sender, Summary, SummaryKind, TranscriptTurn, from_millis, new_id,
    to_millis,
};
use super::{RecordStore, StoreError, StoreResult};

const PROFILE_COLUMNS: &str =
    "id, first_name, last_name, email, phone, timezone, created_at";
const CONVERSATION_COLUMNS: &str =
    "id, profile_id, date, time, type, voicemail, transcription, call_recording, created_at";
const SCHEDULED_COLUMNS: &str = "id, profile_id, date, time, calendar_invite_sent, \
     event_uid, reminder_sent, no_show, created_at";

/// SQLite-backed record store.
pub struct SqliteRecordStore {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Open (or create) the database at `path`, applying the schema.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        apply_schema(&conn)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            path: None,
            conn: Mutex::new(conn),
        })
    }

    /// Database path, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the current schema version from the database.
    pub fn schema_version(&self) -> StoreResult<Option<u32>> {
        let conn = self.lock()?;
        Ok(read_schema_version(&conn)?)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Lock)
    }

    fn insert_notes(
        &self,
        table: &str,
        profile_id: &str,
        conversation_id: &str,
        contents: &[String],
    ) -> StoreResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = to_millis(Utc::now());
        let sql = format!(
            "INSERT INTO {table} (id, profile_id, conversation_id, content, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)"
        );
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for content in contents {
                stmt.execute(params![new_id(), profile_id, conversation_id, content, now])?;
                inserted += 1;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn list_notes(&self, table: &str, profile_id: &str) -> StoreResult<Vec<Note>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT id, profile_id, conversation_id, content, created_at FROM {table} \
             WHERE profile_id = ?1 ORDER BY created_at DESC, rowid DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![profile_id], row_to_note)?;
        collect(rows)
    }

    fn update_flag(&self, column: &str, id: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        let sql = format!("UPDATE scheduled_calls SET {column} = 1 WHERE id = ?1");
        let changed = conn.execute(&sql, params![id])?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("scheduled call {id}")));
        }
        Ok(())
    }

    fn update_conversation(&self, sql: &str, id: &str, value: &dyn rusqlite::ToSql) -> StoreResult<()> {
        let conn = self.lock()?;
        let changed = conn.execute(sql, params![value, id])?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("conversation {id}")));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SqliteRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRecordStore")
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    // ── Profiles ──────────────────────────────────────────────

    async fn insert_profile(
        &self,
        profile: &NewProfile,
        created_at: DateTime<Utc>,
    ) -> StoreResult<Profile> {
        let record = Profile {
            id: new_id(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
            timezone: profile.timezone.clone(),
            created_at,
        };
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO profiles (id, first_name, last_name, email, phone, timezone, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id,
                record.first_name,
                record.last_name,
                record.email,
                record.phone,
                record.timezone,
                to_millis(created_at)
            ],
        )?;
        Ok(record)
    }

    async fn get_profile(&self, id: &str) -> StoreResult<Option<Profile>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1");
        Ok(conn
            .query_row(&sql, params![id], row_to_profile)
            .optional()?)
    }

    async fn find_profile_by_phone(&self, phone: &str) -> StoreResult<Option<Profile>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE phone = ?1");
        Ok(conn
            .query_row(&sql, params![phone], row_to_profile)
            .optional()?)
    }

    async fn list_profiles(&self) -> StoreResult<Vec<Profile>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY created_at ASC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_profile)?;
        collect(rows)
    }

    // ── Conversations ─────────────────────────────────────────

    async fn create_conversation(&self, new: &NewConversation) -> StoreResult<Conversation> {
        let record = Conversation {
            id: new_id(),
            profile_id: new.profile_id.clone(),
            date: new.date,
            time: new.time.clone(),
            kind: new.kind,
            voicemail: false,
            transcription: None,
            call_recording: None,
            created_at: Utc::now(),
        };
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO conversations (id, profile_id, date, time, type, voicemail, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
            params![
                record.id,
                record.profile_id,
                record.date.to_string(),
                record.time,
                record.kind.as_str(),
                to_millis(record.created_at)
            ],
        )?;
        Ok(record)
    }

    async fn get_conversation(&self, id: &str) -> StoreResult<Option<Conversation>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1");
        Ok(conn
            .query_row(&sql, params![id], row_to_conversation)
            .optional()?)
    }

    async fn latest_conversation(&self, profile_id: &str) -> StoreResult<Option<Conversation>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE profile_id = ?1 \
             ORDER BY created_at DESC, rowid DESC LIMIT 1"
        );
        Ok(conn
            .query_row(&sql, params![profile_id], row_to_conversation)
            .optional()?)
    }

    async fn list_conversations(&self, profile_id: &str) -> StoreResult<Vec<Conversation>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE profile_id = ?1 \
             ORDER BY created_at ASC, rowid ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![profile_id], row_to_conversation)?;
        collect(rows)
    }

    async fn conversations_on_date(
        &self,
        profile_id: &str,
        date: NaiveDate,
    ) -> StoreResult<Vec<Conversation>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE profile_id = ?1 AND date = ?2 \
             ORDER BY created_at ASC, rowid ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![profile_id, date.to_string()], row_to_conversation)?;
        collect(rows)
    }

    async fn count_coach_conversations(&self, profile_id: &str) -> StoreResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM conversations \
             WHERE profile_id = ?1 AND type = ?2 AND voicemail = 0",
            params![profile_id, ConversationType::ScheduledCoach.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn profile_ids_with_conversations(&self) -> StoreResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT DISTINCT profile_id FROM conversations")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        collect(rows)
    }

    async fn set_voicemail(&self, conversation_id: &str, voicemail: bool) -> StoreResult<()> {
        self.update_conversation(
            "UPDATE conversations SET voicemail = ?1 WHERE id = ?2",
            conversation_id,
            &voicemail,
        )
    }

    async fn set_call_recording(&self, conversation_id: &str, url: &str) -> StoreResult<()> {
        self.update_conversation(
            "UPDATE conversations SET call_recording = ?1 WHERE id = ?2",
            conversation_id,
            &url,
        )
    }

    async fn set_transcription(
        &self,
        conversation_id: &str,
        turns: &[TranscriptTurn],
    ) -> StoreResult<()> {
        let json = serde_json::to_string(turns)?;
        self.update_conversation(
            "UPDATE conversations SET transcription = ?1 WHERE id = ?2",
            conversation_id,
            &json,
        )
    }

    // ── Messages ──────────────────────────────────────────────

    async fn insert_message(
        &self,
        profile_id: &str,
        content: &str,
        sender: Sender,
    ) -> StoreResult<Message> {
        let record = Message {
            id: new_id(),
            profile_id: profile_id.to_owned(),
            content: content.to_owned(),
            sender,
            created_at: Utc::now(),
        };
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO messages (id, profile_id, content, sender, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id,
                record.profile_id,
                record.content,
                record.sender.as_str(),
                to_millis(record.created_at)
            ],
        )?;
        Ok(record)
    }

    async fn list_messages(&self, profile_id: &str) -> StoreResult<Vec<Message>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, profile_id, content, sender, created_at FROM messages \
             WHERE profile_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![profile_id], row_to_message)?;
        collect(rows)
    }

    // ── Summaries ─────────────────────────────────────────────

    async fn insert_summary(
        &self,
        kind: SummaryKind,
        profile_id: &str,
        conversation_id: Option<&str>,
        content: &str,
    ) -> StoreResult<Summary> {
        let record = Summary {
            id: new_id(),
            profile_id: profile_id.to_owned(),
            conversation_id: conversation_id.map(str::to_owned),
            content: content.to_owned(),
            created_at: Utc::now(),
        };
        let conn = self.lock()?;
        let sql = format!(
            "INSERT INTO {} (id, profile_id, conversation_id, content, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            kind.table()
        );
        conn.execute(
            &sql,
            params![
                record.id,
                record.profile_id,
                record.conversation_id,
                record.content,
                to_millis(record.created_at)
            ],
        )?;
        Ok(record)
    }

    async fn insert_summary_pair(
        &self,
        profile_id: &str,
        conversation_id: &str,
        short: &str,
        detailed: &str,
    ) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = to_millis(Utc::now());
        for (kind, content) in [(SummaryKind::Short, short), (SummaryKind::Detailed, detailed)] {
            let sql = format!(
                "INSERT INTO {} (id, profile_id, conversation_id, content, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                kind.table()
            );
            tx.execute(&sql, params![new_id(), profile_id, conversation_id, content, now])?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn list_summaries(
        &self,
        kind: SummaryKind,
        profile_id: &str,
    ) -> StoreResult<Vec<Summary>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT id, profile_id, conversation_id, content, created_at FROM {} \
             WHERE profile_id = ?1 ORDER BY created_at DESC, rowid DESC",
            kind.table()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![profile_id], row_to_summary)?;
        collect(rows)
    }

    // ── Entities / action items ───────────────────────────────

    async fn insert_entities(
        &self,
        profile_id: &str,
        conversation_id: &str,
        contents: &[String],
    ) -> StoreResult<usize> {
        self.insert_notes("entities", profile_id, conversation_id, contents)
    }

    async fn list_entities(&self, profile_id: &str) -> StoreResult<Vec<Note>> {
        self.list_notes("entities", profile_id)
    }

    async fn insert_action_items(
        &self,
        profile_id: &str,
        conversation_id: &str,
        contents: &[String],
    ) -> StoreResult<usize> {
        self.insert_notes("action_items", profile_id, conversation_id, contents)
    }

    async fn list_action_items(&self, profile_id: &str) -> StoreResult<Vec<Note>> {
        self.list_notes("action_items", profile_id)
    }

    // ── Scheduled calls ───────────────────────────────────────

    async fn insert_scheduled_call(&self, new: &NewScheduledCall) -> StoreResult<ScheduledCall> {
        let record = ScheduledCall {
            id: new_id(),
            profile_id: new.profile_id.clone(),
            date: new.date,
            time: new.time.clone(),
            calendar_invite_sent: false,
            event_uid: None,
            reminder_sent: false,
            no_show: false,
            created_at: Utc::now(),
        };
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO scheduled_calls (id, profile_id, date, time, calendar_invite_sent, \
             reminder_sent, no_show, created_at) VALUES (?1, ?2, ?3, ?4, 0, 0, 0, ?5)",
            params![
                record.id,
                record.profile_id,
                record.date.to_string(),
                record.time,
                to_millis(record.created_at)
            ],
        )?;
        Ok(record)
    }

    async fn list_scheduled_calls(&self, profile_id: &str) -> StoreResult<Vec<ScheduledCall>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {SCHEDULED_COLUMNS} FROM scheduled_calls WHERE profile_id = ?1 \
             ORDER BY created_at DESC, rowid DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![profile_id], row_to_scheduled_call)?;
        collect(rows)
    }

    async fn scheduled_calls_on_dates(
        &self,
        dates: &[NaiveDate],
    ) -> StoreResult<Vec<ScheduledCall>> {
        if dates.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;
        let placeholders = vec!["?"; dates.len()].join(", ");
        let sql = format!(
            "SELECT {SCHEDULED_COLUMNS} FROM scheduled_calls WHERE date IN ({placeholders}) \
             ORDER BY created_at ASC, rowid ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let keys: Vec<String> = dates.iter().map(NaiveDate::to_string).collect();
        let rows = stmt.query_map(params_from_iter(keys.iter()), row_to_scheduled_call)?;
        collect(rows)
    }

    async fn mark_invite_sent(&self, id: &str, event_uid: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE scheduled_calls SET calendar_invite_sent = 1, event_uid = ?1 WHERE id = ?2",
            params![event_uid, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("scheduled call {id}")));
        }
        Ok(())
    }

    async fn mark_reminder_sent(&self, id: &str) -> StoreResult<()> {
        self.update_flag("reminder_sent", id)
    }

    async fn mark_no_show(&self, id: &str) -> StoreResult<()> {
        self.update_flag("no_show", id)
    }

    async fn delete_scheduled_calls(&self, ids: &[String]) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.lock()?;
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("DELETE FROM scheduled_calls WHERE id IN ({placeholders})");
        Ok(conn.execute(&sql, params_from_iter(ids.iter()))?)
    }
}

// ---------------------------------------------------------------------------
// Row mappers
// ---------------------------------------------------------------------------

fn collect<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> StoreResult<Vec<T>> {
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn parse_date(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| conversion_error(idx, format!("bad date {raw:?}: {e}")))
}

fn row_to_profile(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        timezone: row.get(5)?,
        created_at: from_millis(row.get(6)?),
    })
}

fn row_to_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let date_raw: String = row.get(2)?;
    let kind_raw: String = row.get(4)?;
    let kind = ConversationType::parse(&kind_raw)
        .ok_or_else(|| conversion_error(4, format!("unknown conversation type {kind_raw:?}")))?;
    let transcription_raw: Option<String> = row.get(6)?;
    let transcription = match transcription_raw {
        Some(raw) => Some(
            serde_json::from_str::<Vec<TranscriptTurn>>(&raw)
                .map_err(|e| conversion_error(6, e.to_string()))?,
        ),
        None => None,
    };
    Ok(Conversation {
        id: row.get(0)?,
        profile_id: row.get(1)?,
        date: parse_date(2, &date_raw)?,
        time: row.get(3)?,
        kind,
        voicemail: row.get(5)?,
        transcription,
        call_recording: row.get(7)?,
        created_at: from_millis(row.get(8)?),
    })
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let sender: String = row.get(3)?;
    Ok(Message {
        id: row.get(0)?,
        profile_id: row.get(1)?,
        content: row.get(2)?,
        sender: Sender::parse(&sender),
        created_at: from_millis(row.get(4)?),
    })
}

fn row_to_summary(row: &Row<'_>) -> rusqlite::Result<Summary> {
    Ok(Summary {
        id: row.get(0)?,
        profile_id: row.get(1)?,
        conversation_id: row.get(2)?,
        content: row.get(3)?,
        created_at: from_millis(row.get(4)?),
    })
}

fn row_to_note(row: &Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        id: row.get(0)?,
        profile_id: row.get(1)?,
        conversation_id: row.get(2)?,
        content: row.get(3)?,
        created_at: from_millis(row.get(4)?),
    })
}

fn row_to_scheduled_call(row: &Row<'_>) -> rusqlite::Result<ScheduledCall> {
    let date_raw: String = row.get(2)?;
    Ok(ScheduledCall {
        id: row.get(0)?,
        profile_id: row.get(1)?,
        date: parse_date(2, &date_raw)?,
        time: row.get(3)?,
        calendar_invite_sent: row.get(4)?,
        event_uid: row.get(5)?,
        reminder_sent: row.get(6)?,
        no_show: row.get(7)?,
        created_at: from_millis(row.get(8)?),
    })
}
