//! Durable chat history, episodic records and mood journal.
//!
//! Everything lives in one SQLite file behind a single connection guarded by
//! a mutex, so every write is serialized and committed before it returns.
//!
//! # Storage layout
//!
//! | table             | role                                               |
//! |-------------------|----------------------------------------------------|
//! | `chat_history`    | append-only log of every chat turn                 |
//! | `episodic_memory` | mutable record store keyed by `id`                 |
//! | `emotions`        | snapshot of the active moods, replaced atomically  |
//! | `mood_log`        | append-only log of every mood boost                |
//!
//! Tags are stored as a JSON array in a `TEXT` column so tag filters can use
//! `json_each` for exact matches.
//!
//! # Migrations
//!
//! The schema version lives in `PRAGMA user_version`.  Each step in
//! [`MIGRATIONS`] is additive and runs in its own transaction together with
//! its version bump, so a crash leaves the store at a consistent version and
//! re-opening an up-to-date store is a no-op.
//!
//! # Example
//!
//! ```rust
//! use peach_memory::storage::Storage;
//! use peach_types::{ChatEntry, Role};
//!
//! let storage = Storage::open_in_memory().unwrap();
//! storage
//!     .append_chat(&ChatEntry {
//!         role: Role::User,
//!         content: "hi".into(),
//!         mood: None,
//!         timestamp: 1.0,
//!     })
//!     .unwrap();
//! assert_eq!(storage.recent_chat(10).unwrap().len(), 1);
//! ```

use std::path::Path;

use parking_lot::Mutex;
use peach_emotion::{JournalError, MoodJournal};
use peach_types::{
    Category, ChatEntry, EmotionRecord, EpisodicRecord, MoodLogEntry, Relation, Role,
    SentimentColor,
};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;
use tracing::{debug, info};

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Tag codec error: {0}")]
    TagCodec(#[from] serde_json::Error),
    #[error("Episodic record has not been persisted yet")]
    MissingId,
    #[error("Episodic record not found: {0}")]
    NotFound(i64),
    #[error("Migration to schema version {version} failed: {source}")]
    Migration {
        version: u32,
        #[source]
        source: rusqlite::Error,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Schema
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered, additive schema steps.  Index `i` upgrades to version `i + 1`.
const MIGRATIONS: &[&str] = &[
    // v1 – base tables
    "CREATE TABLE IF NOT EXISTS chat_history (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        role      TEXT NOT NULL,
        content   TEXT NOT NULL,
        mood      TEXT,
        timestamp REAL NOT NULL
    );
    CREATE TABLE IF NOT EXISTS episodic_memory (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        time       TEXT NOT NULL,
        content    TEXT NOT NULL,
        mood       TEXT NOT NULL,
        tags       TEXT NOT NULL DEFAULT '[]',
        importance REAL NOT NULL,
        relation   TEXT NOT NULL,
        category   TEXT NOT NULL,
        timestamp  REAL NOT NULL
    );",
    // v2 – rehearsal counter
    "ALTER TABLE episodic_memory ADD COLUMN rehearsed_count INTEGER NOT NULL DEFAULT 0;",
    // v3 – sentiment colour
    "ALTER TABLE episodic_memory ADD COLUMN sentiment_color TEXT NOT NULL DEFAULT 'neutral';",
    // v4 – decay bookkeeping; existing rows start decaying from capture time
    "ALTER TABLE episodic_memory ADD COLUMN decayed_at REAL NOT NULL DEFAULT 0;
     UPDATE episodic_memory SET decayed_at = timestamp;",
    // v5 – mood journal and lookup indexes
    "CREATE TABLE IF NOT EXISTS emotions (
        mood         TEXT NOT NULL PRIMARY KEY,
        intensity    REAL NOT NULL,
        last_updated REAL NOT NULL,
        position     INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS mood_log (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        mood      TEXT NOT NULL,
        intensity REAL NOT NULL,
        timestamp REAL NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_chat_timestamp ON chat_history(timestamp);
    CREATE INDEX IF NOT EXISTS idx_episodic_timestamp ON episodic_memory(timestamp);",
];

/// Latest schema version this build knows about.
pub const SCHEMA_VERSION: u32 = MIGRATIONS.len() as u32;

const EPISODIC_COLUMNS: &str = "id, time, content, mood, tags, importance, relation, category, \
     sentiment_color, timestamp, rehearsed_count, decayed_at";

// ─────────────────────────────────────────────────────────────────────────────
// Filters
// ─────────────────────────────────────────────────────────────────────────────

/// Selector for bulk episodic deletion.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteFilter {
    /// Content contains the keyword (case-insensitive).
    Keyword(String),
    /// Tag set contains the tag exactly.
    Tag(String),
    Mood(String),
    /// Capture timestamp equals the value exactly.
    Timestamp(f64),
    Category(Category),
}

/// Rows removed by [`Storage::cleanup_older_than`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CleanupReport {
    pub chat_removed: usize,
    /// Ids of the episodic records removed.
    pub episodic_removed: Vec<i64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed single-writer store.
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open (or create) a persistent store at `path`, running pending
    /// migrations.  A migration failure is returned as an error and the
    /// store must not be used.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open a temporary in-memory store (useful for testing).
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self, StorageError> {
        migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Current `user_version` of the underlying database.
    pub fn schema_version(&self) -> Result<u32, StorageError> {
        let conn = self.conn.lock();
        Ok(conn.query_row("PRAGMA user_version", [], |r| r.get(0))?)
    }

    // ── Chat history ─────────────────────────────────────────────────────────

    /// Append one chat turn.  Returns its row id.
    pub fn append_chat(&self, entry: &ChatEntry) -> Result<i64, StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO chat_history (role, content, mood, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.role.as_str(),
                entry.content,
                entry.mood,
                entry.timestamp
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The last `limit` chat turns, oldest first.
    pub fn recent_chat(&self, limit: usize) -> Result<Vec<ChatEntry>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT role, content, mood, timestamp FROM chat_history
             ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let role: String = row.get(0)?;
            Ok(ChatEntry {
                role: Role::from_label(&role).ok_or_else(|| label_error(0, &role))?,
                content: row.get(1)?,
                mood: row.get(2)?,
                timestamp: row.get(3)?,
            })
        })?;
        let mut entries = rows.collect::<Result<Vec<_>, _>>()?;
        entries.reverse();
        Ok(entries)
    }

    // ── Episodic records ─────────────────────────────────────────────────────

    /// Insert a full record.  Returns the assigned id; the `id` field of
    /// `record` is ignored.
    pub fn insert_episodic(&self, record: &EpisodicRecord) -> Result<i64, StorageError> {
        let tags = serde_json::to_string(&record.tags)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO episodic_memory
                 (time, content, mood, tags, importance, relation, category,
                  sentiment_color, timestamp, rehearsed_count, decayed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.time,
                record.content,
                record.mood,
                tags,
                record.importance as f64,
                record.relation_to_user.as_str(),
                record.category.as_str(),
                record.sentiment_color.as_str(),
                record.timestamp,
                record.rehearsed_count,
                record.decayed_at,
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, importance = record.importance, "episodic record saved");
        Ok(id)
    }

    /// Overwrite the mutable fields (importance, category, rehearsal count
    /// and decay time) of the row matching `record.id`.
    pub fn update_episodic(&self, record: &EpisodicRecord) -> Result<(), StorageError> {
        let id = record.id.ok_or(StorageError::MissingId)?;
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE episodic_memory
             SET importance = ?1, category = ?2, rehearsed_count = ?3, decayed_at = ?4
             WHERE id = ?5",
            params![
                record.importance as f64,
                record.category.as_str(),
                record.rehearsed_count,
                record.decayed_at,
                id,
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }

    /// Write the outcome of a decay pass: importance, category and decay
    /// time only.  Rehearsal counts are left as stored.
    pub fn record_decay(&self, record: &EpisodicRecord) -> Result<(), StorageError> {
        let id = record.id.ok_or(StorageError::MissingId)?;
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE episodic_memory
             SET importance = ?1, category = ?2, decayed_at = ?3
             WHERE id = ?4",
            params![
                record.importance as f64,
                record.category.as_str(),
                record.decayed_at,
                id,
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }

    /// Replace the tag set of record `id`.
    pub fn update_episodic_tags(&self, id: i64, tags: &[String]) -> Result<(), StorageError> {
        let encoded = serde_json::to_string(tags)?;
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE episodic_memory SET tags = ?1 WHERE id = ?2",
            params![encoded, id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }

    /// Fetch one record by id.
    pub fn get_episodic(&self, id: i64) -> Result<Option<EpisodicRecord>, StorageError> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {EPISODIC_COLUMNS} FROM episodic_memory WHERE id = ?1");
        Ok(conn
            .query_row(&sql, params![id], episodic_from_row)
            .optional()?)
    }

    /// Most-recent-first records, optionally restricted to those carrying
    /// `tag` and/or in `category`.
    pub fn query_episodic(
        &self,
        limit: usize,
        tag: Option<&str>,
        category: Option<Category>,
    ) -> Result<Vec<EpisodicRecord>, StorageError> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {EPISODIC_COLUMNS} FROM episodic_memory
             WHERE (?1 IS NULL OR EXISTS (SELECT 1 FROM json_each(tags) WHERE value = ?1))
               AND (?2 IS NULL OR category = ?2)
             ORDER BY timestamp DESC, id DESC
             LIMIT ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![tag, category.map(|c| c.as_str()), limit as i64],
            episodic_from_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Every stored record, oldest first.
    pub fn all_episodic(&self) -> Result<Vec<EpisodicRecord>, StorageError> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {EPISODIC_COLUMNS} FROM episodic_memory ORDER BY timestamp ASC, id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], episodic_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn count_episodic(&self) -> Result<usize, StorageError> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM episodic_memory", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    /// Delete every record matching `filter`.  Returns the removed ids.
    pub fn delete_episodic(&self, filter: &DeleteFilter) -> Result<Vec<i64>, StorageError> {
        let conn = self.conn.lock();
        let ids = match filter {
            DeleteFilter::Keyword(keyword) => delete_returning(
                &conn,
                "DELETE FROM episodic_memory WHERE content LIKE ?1 RETURNING id",
                params![format!("%{keyword}%")],
            )?,
            DeleteFilter::Tag(tag) => delete_returning(
                &conn,
                "DELETE FROM episodic_memory
                 WHERE EXISTS (SELECT 1 FROM json_each(tags) WHERE value = ?1)
                 RETURNING id",
                params![tag],
            )?,
            DeleteFilter::Mood(mood) => delete_returning(
                &conn,
                "DELETE FROM episodic_memory WHERE mood = ?1 RETURNING id",
                params![mood],
            )?,
            DeleteFilter::Timestamp(ts) => delete_returning(
                &conn,
                "DELETE FROM episodic_memory WHERE timestamp = ?1 RETURNING id",
                params![ts],
            )?,
            DeleteFilter::Category(category) => delete_returning(
                &conn,
                "DELETE FROM episodic_memory WHERE category = ?1 RETURNING id",
                params![category.as_str()],
            )?,
        };
        info!(?filter, removed = ids.len(), "episodic records deleted");
        Ok(ids)
    }

    /// Delete chat turns and episodic records captured before `cutoff`.
    pub fn cleanup_older_than(&self, cutoff: f64) -> Result<CleanupReport, StorageError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let chat_removed = tx.execute(
            "DELETE FROM chat_history WHERE timestamp < ?1",
            params![cutoff],
        )?;
        let episodic_removed = delete_returning(
            &tx,
            "DELETE FROM episodic_memory WHERE timestamp < ?1 RETURNING id",
            params![cutoff],
        )?;
        tx.commit()?;
        info!(
            cutoff,
            chat_removed,
            episodic_removed = episodic_removed.len(),
            "old memories cleaned up"
        );
        Ok(CleanupReport {
            chat_removed,
            episodic_removed,
        })
    }

    /// Delete records whose importance has fallen below `threshold`.
    pub fn prune_below(&self, threshold: f32) -> Result<Vec<i64>, StorageError> {
        let conn = self.conn.lock();
        delete_returning(
            &conn,
            "DELETE FROM episodic_memory WHERE importance < ?1 RETURNING id",
            params![threshold as f64],
        )
    }

    /// Add `boost` (capped at 1) to every record above `threshold`.
    /// Returns the number of rows touched.
    pub fn reinforce_above(&self, threshold: f32, boost: f32) -> Result<usize, StorageError> {
        let conn = self.conn.lock();
        Ok(conn.execute(
            "UPDATE episodic_memory SET importance = MIN(1.0, importance + ?1)
             WHERE importance > ?2",
            params![boost as f64, threshold as f64],
        )?)
    }

    // ── Mood journal ─────────────────────────────────────────────────────────

    /// Replace the active-mood snapshot in one transaction.
    pub fn save_active_emotions(&self, active: &[EmotionRecord]) -> Result<(), StorageError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM emotions", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO emotions (mood, intensity, last_updated, position)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (position, record) in active.iter().enumerate() {
                stmt.execute(params![
                    record.mood,
                    record.intensity as f64,
                    record.last_updated,
                    position as i64
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Load the active-mood snapshot in activation order.
    pub fn load_active_emotions(&self) -> Result<Vec<EmotionRecord>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT mood, intensity, last_updated FROM emotions ORDER BY position ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(EmotionRecord {
                mood: row.get(0)?,
                intensity: row.get::<_, f64>(1)? as f32,
                last_updated: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn log_mood(&self, entry: &MoodLogEntry) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO mood_log (mood, intensity, timestamp) VALUES (?1, ?2, ?3)",
            params![entry.mood, entry.intensity as f64, entry.timestamp],
        )?;
        Ok(())
    }

    /// The last `limit` mood log entries, oldest first.
    pub fn recent_mood_log(&self, limit: usize) -> Result<Vec<MoodLogEntry>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT mood, intensity, timestamp FROM mood_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(MoodLogEntry {
                mood: row.get(0)?,
                intensity: row.get::<_, f64>(1)? as f32,
                timestamp: row.get(2)?,
            })
        })?;
        let mut entries = rows.collect::<Result<Vec<_>, _>>()?;
        entries.reverse();
        Ok(entries)
    }
}

impl MoodJournal for Storage {
    fn save_active(&self, active: &[EmotionRecord]) -> Result<(), JournalError> {
        self.save_active_emotions(active).map_err(journal_error)
    }

    fn log_mood(&self, entry: &MoodLogEntry) -> Result<(), JournalError> {
        Storage::log_mood(self, entry).map_err(journal_error)
    }

    fn load_active(&self) -> Result<Vec<EmotionRecord>, JournalError> {
        self.load_active_emotions().map_err(journal_error)
    }

    fn recent_log(&self, limit: usize) -> Result<Vec<MoodLogEntry>, JournalError> {
        self.recent_mood_log(limit).map_err(journal_error)
    }
}

fn journal_error(e: StorageError) -> JournalError {
    JournalError::Backend(e.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn migrate(conn: &mut Connection) -> Result<(), StorageError> {
    let current: u32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    for (idx, sql) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        let version = idx as u32 + 1;
        let step = |conn: &mut Connection| -> rusqlite::Result<()> {
            let tx = conn.transaction()?;
            tx.execute_batch(sql)?;
            tx.pragma_update(None, "user_version", version)?;
            tx.commit()
        };
        step(conn).map_err(|source| StorageError::Migration { version, source })?;
        info!(version, "storage schema migrated");
    }
    Ok(())
}

fn delete_returning<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<i64>, StorageError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |r| r.get::<_, i64>(0))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn label_error(idx: usize, label: &str) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(idx, format!("unknown label '{label}'"), Type::Text)
}

fn episodic_from_row(row: &Row<'_>) -> rusqlite::Result<EpisodicRecord> {
    let tags_json: String = row.get(4)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    let relation: String = row.get(6)?;
    let category: String = row.get(7)?;
    let color: String = row.get(8)?;
    Ok(EpisodicRecord {
        id: Some(row.get(0)?),
        time: row.get(1)?,
        content: row.get(2)?,
        mood: row.get(3)?,
        tags,
        importance: row.get::<_, f64>(5)? as f32,
        relation_to_user: Relation::from_label(&relation).ok_or_else(|| label_error(6, &relation))?,
        category: Category::from_label(&category).ok_or_else(|| label_error(7, &category))?,
        sentiment_color: SentimentColor::from_label(&color)
            .ok_or_else(|| label_error(8, &color))?,
        timestamp: row.get(9)?,
        rehearsed_count: row.get(10)?,
        decayed_at: row.get(11)?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use peach_types::display_time;

    fn record(content: &str, ts: f64) -> EpisodicRecord {
        EpisodicRecord {
            id: None,
            time: display_time(ts),
            content: content.to_string(),
            mood: "romantic".into(),
            tags: vec!["date".into(), "miss".into()],
            importance: 0.2,
            relation_to_user: Relation::Personal,
            category: Category::Fleeting,
            sentiment_color: SentimentColor::Warm,
            timestamp: ts,
            rehearsed_count: 0,
            decayed_at: ts,
        }
    }

    fn chat(content: &str, ts: f64) -> ChatEntry {
        ChatEntry {
            role: Role::User,
            content: content.into(),
            mood: Some("curious".into()),
            timestamp: ts,
        }
    }

    // ── schema ───────────────────────────────────────────────────────────────

    #[test]
    fn fresh_store_is_at_latest_version() {
        let storage = Storage::open_in_memory().unwrap();
        assert_eq!(storage.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn reopening_a_migrated_store_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");
        {
            let storage = Storage::open(&path).unwrap();
            storage.insert_episodic(&record("kept across reopen", 5.0)).unwrap();
        }
        let storage = Storage::open(&path).unwrap();
        assert_eq!(storage.schema_version().unwrap(), SCHEMA_VERSION);
        assert_eq!(storage.count_episodic().unwrap(), 1);
    }

    #[test]
    fn legacy_v1_store_is_upgraded_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(MIGRATIONS[0]).unwrap();
            conn.pragma_update(None, "user_version", 1).unwrap();
            conn.execute(
                "INSERT INTO episodic_memory
                     (time, content, mood, tags, importance, relation, category, timestamp)
                 VALUES ('t', 'old words', 'sad', '[\"rain\"]', 0.5, 'neutral', 'casual', 42.0)",
                [],
            )
            .unwrap();
        }
        let storage = Storage::open(&path).unwrap();
        let all = storage.all_episodic().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].rehearsed_count, 0);
        assert_eq!(all[0].sentiment_color, SentimentColor::Neutral);
        assert_eq!(all[0].decayed_at, 42.0);
        assert_eq!(all[0].tags, vec!["rain".to_string()]);
    }

    #[test]
    fn failed_migration_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.db");
        {
            let conn = Connection::open(&path).unwrap();
            // Claims v1 but lacks the episodic table.
            conn.pragma_update(None, "user_version", 1).unwrap();
        }
        let err = Storage::open(&path).err().unwrap();
        assert!(matches!(err, StorageError::Migration { version: 2, .. }));
    }

    // ── chat ─────────────────────────────────────────────────────────────────

    #[test]
    fn recent_chat_is_oldest_first_and_limited() {
        let storage = Storage::open_in_memory().unwrap();
        for i in 0..5 {
            storage.append_chat(&chat(&format!("msg {i}"), i as f64)).unwrap();
        }
        let recent = storage.recent_chat(3).unwrap();
        let contents: Vec<&str> = recent.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 2", "msg 3", "msg 4"]);
        assert_eq!(recent[0].mood.as_deref(), Some("curious"));
    }

    // ── episodic ─────────────────────────────────────────────────────────────

    #[test]
    fn episodic_roundtrip_preserves_fields() {
        let storage = Storage::open_in_memory().unwrap();
        let original = record("I miss you so much, it's been a rough week", 1_700_000_000.25);
        let id = storage.insert_episodic(&original).unwrap();

        let loaded = storage.get_episodic(id).unwrap().unwrap();
        assert_eq!(loaded.id, Some(id));
        assert_eq!(loaded.tags, original.tags);
        assert_eq!(loaded.importance, original.importance);
        assert_eq!(loaded.category, original.category);
        assert_eq!(loaded.timestamp, original.timestamp);
        assert_eq!(loaded.relation_to_user, original.relation_to_user);
        assert_eq!(loaded.sentiment_color, original.sentiment_color);
    }

    #[test]
    fn records_with_equal_timestamps_stay_distinct() {
        let storage = Storage::open_in_memory().unwrap();
        let a = storage.insert_episodic(&record("first at the same instant", 10.0)).unwrap();
        let b = storage.insert_episodic(&record("second at the same instant", 10.0)).unwrap();
        assert_ne!(a, b);

        let mut first = storage.get_episodic(a).unwrap().unwrap();
        first.importance = 0.9;
        storage.update_episodic(&first).unwrap();
        let second = storage.get_episodic(b).unwrap().unwrap();
        assert_eq!(second.importance, 0.2);
    }

    #[test]
    fn update_overwrites_mutable_fields_only() {
        let storage = Storage::open_in_memory().unwrap();
        let id = storage.insert_episodic(&record("some content here", 1.0)).unwrap();
        let mut rec = storage.get_episodic(id).unwrap().unwrap();
        rec.importance = 0.75;
        rec.category = Category::Core;
        rec.rehearsed_count = 3;
        rec.decayed_at = 99.0;
        rec.content = "ignored".into();
        storage.update_episodic(&rec).unwrap();

        let loaded = storage.get_episodic(id).unwrap().unwrap();
        assert_eq!(loaded.importance, 0.75);
        assert_eq!(loaded.category, Category::Core);
        assert_eq!(loaded.rehearsed_count, 3);
        assert_eq!(loaded.decayed_at, 99.0);
        assert_eq!(loaded.content, "some content here");
    }

    #[test]
    fn record_decay_keeps_rehearsal_count() {
        let storage = Storage::open_in_memory().unwrap();
        let id = storage.insert_episodic(&record("some content here", 1.0)).unwrap();
        let mut rehearsed = storage.get_episodic(id).unwrap().unwrap();
        rehearsed.rehearsed_count = 4;
        storage.update_episodic(&rehearsed).unwrap();

        let mut stale = rehearsed.clone();
        stale.rehearsed_count = 0;
        stale.importance = 0.05;
        stale.category = Category::Fleeting;
        stale.decayed_at = 50.0;
        storage.record_decay(&stale).unwrap();

        let loaded = storage.get_episodic(id).unwrap().unwrap();
        assert_eq!(loaded.rehearsed_count, 4);
        assert_eq!(loaded.importance, 0.05);
        assert_eq!(loaded.category, Category::Fleeting);
        assert_eq!(loaded.decayed_at, 50.0);
    }

    #[test]
    fn update_requires_a_persisted_record() {
        let storage = Storage::open_in_memory().unwrap();
        let err = storage.update_episodic(&record("never saved", 1.0)).unwrap_err();
        assert!(matches!(err, StorageError::MissingId));

        let mut ghost = record("never saved", 1.0);
        ghost.id = Some(404);
        let err = storage.update_episodic(&ghost).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(404)));
    }

    #[test]
    fn query_filters_by_tag_and_category() {
        let storage = Storage::open_in_memory().unwrap();
        let mut a = record("a", 1.0);
        a.tags = vec!["cosmic".into()];
        a.category = Category::Core;
        let mut b = record("b", 2.0);
        b.tags = vec!["cosmic-ish".into()];
        let c = record("c", 3.0);
        for r in [&a, &b, &c] {
            storage.insert_episodic(r).unwrap();
        }

        let tagged = storage.query_episodic(10, Some("cosmic"), None).unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].content, "a");

        let fleeting = storage.query_episodic(10, None, Some(Category::Fleeting)).unwrap();
        let contents: Vec<&str> = fleeting.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["c", "b"]);

        assert_eq!(storage.query_episodic(1, None, None).unwrap()[0].content, "c");
    }

    #[test]
    fn tag_update_is_persisted() {
        let storage = Storage::open_in_memory().unwrap();
        let id = storage.insert_episodic(&record("x", 1.0)).unwrap();
        storage
            .update_episodic_tags(id, &["date".into(), "miss".into(), "longing".into()])
            .unwrap();
        let loaded = storage.get_episodic(id).unwrap().unwrap();
        assert_eq!(loaded.tags.len(), 3);
        assert!(loaded.tags.contains(&"longing".to_string()));
    }

    // ── deletion ─────────────────────────────────────────────────────────────

    #[test]
    fn delete_by_each_filter() {
        let storage = Storage::open_in_memory().unwrap();
        let mut sad = record("rain on the window all day", 1.0);
        sad.mood = "sad".into();
        sad.tags = vec!["melancholy".into()];
        sad.category = Category::Casual;
        storage.insert_episodic(&sad).unwrap();
        storage.insert_episodic(&record("Dinner with Sam", 2.0)).unwrap();
        storage.insert_episodic(&record("stars over the lake", 3.0)).unwrap();
        storage.insert_episodic(&record("a walk in the park", 4.0)).unwrap();

        assert_eq!(storage.delete_episodic(&DeleteFilter::Keyword("dinner".into())).unwrap().len(), 1);
        assert_eq!(storage.delete_episodic(&DeleteFilter::Tag("melancholy".into())).unwrap().len(), 1);
        assert_eq!(storage.delete_episodic(&DeleteFilter::Timestamp(3.0)).unwrap().len(), 1);
        assert_eq!(storage.delete_episodic(&DeleteFilter::Mood("sad".into())).unwrap().len(), 0);
        assert_eq!(
            storage.delete_episodic(&DeleteFilter::Category(Category::Fleeting)).unwrap().len(),
            1
        );
        assert_eq!(storage.count_episodic().unwrap(), 0);
    }

    #[test]
    fn cleanup_removes_old_rows_from_both_tables() {
        let storage = Storage::open_in_memory().unwrap();
        storage.append_chat(&chat("old", 1.0)).unwrap();
        storage.append_chat(&chat("new", 100.0)).unwrap();
        let old = storage.insert_episodic(&record("old memory", 1.0)).unwrap();
        storage.insert_episodic(&record("new memory", 100.0)).unwrap();

        let report = storage.cleanup_older_than(50.0).unwrap();
        assert_eq!(report.chat_removed, 1);
        assert_eq!(report.episodic_removed, vec![old]);
        assert_eq!(storage.recent_chat(10).unwrap().len(), 1);
        assert_eq!(storage.count_episodic().unwrap(), 1);
    }

    #[test]
    fn prune_and_reinforce() {
        let storage = Storage::open_in_memory().unwrap();
        let mut faint = record("faint", 1.0);
        faint.importance = 0.05;
        let mut strong = record("strong", 2.0);
        strong.importance = 0.9;
        let faint_id = storage.insert_episodic(&faint).unwrap();
        let strong_id = storage.insert_episodic(&strong).unwrap();

        assert_eq!(storage.reinforce_above(0.3, 0.2).unwrap(), 1);
        assert_eq!(storage.get_episodic(strong_id).unwrap().unwrap().importance, 1.0);

        assert_eq!(storage.prune_below(0.1).unwrap(), vec![faint_id]);
    }

    // ── mood journal ─────────────────────────────────────────────────────────

    #[test]
    fn active_emotion_snapshot_is_replaced() {
        let storage = Storage::open_in_memory().unwrap();
        let snapshot = vec![
            EmotionRecord { mood: "playful".into(), intensity: 0.5, last_updated: 1.0 },
            EmotionRecord { mood: "anxious".into(), intensity: 0.5, last_updated: 2.0 },
        ];
        storage.save_active_emotions(&snapshot).unwrap();
        assert_eq!(storage.load_active_emotions().unwrap(), snapshot);

        storage.save_active_emotions(&snapshot[1..]).unwrap();
        assert_eq!(storage.load_active_emotions().unwrap().len(), 1);
    }

    #[test]
    fn mood_log_reads_recent_window() {
        let storage = Storage::open_in_memory().unwrap();
        for i in 0..4 {
            storage
                .log_mood(&MoodLogEntry {
                    mood: format!("m{i}"),
                    intensity: 0.5,
                    timestamp: i as f64,
                })
                .unwrap();
        }
        let recent = storage.recent_mood_log(2).unwrap();
        assert_eq!(recent[0].mood, "m2");
        assert_eq!(recent[1].mood, "m3");
    }

    #[test]
    fn storage_backs_the_emotion_model() {
        use peach_emotion::EmotionState;
        use peach_types::ManualClock;
        use std::sync::Arc;

        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(0.0));
        let mut state = EmotionState::seeded(clock.clone(), 11).with_journal(storage.clone());
        state.update_emotion("grateful", 0.2);

        let restored = EmotionState::seeded(clock, 12).with_journal(storage);
        assert!(restored.intensity("grateful") > 0.0);
        assert_eq!(restored.emotional_history(10).len(), 1);
    }
}
