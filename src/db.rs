//! # Note Store
//!
//! SQLite-backed persistence for transcription notes. The store owns a single
//! connection behind a mutex — note traffic is light and single-writer
//! semantics are all the pipeline needs.
//!
//! Schema is created on open. Databases created before the `audio_path`
//! column existed are migrated in place with an `ALTER TABLE`.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{AppError, AppResult};

/// A persisted transcription note.
///
/// - `content` is non-empty at creation time and mutable via edit
/// - `audio_path` is the stored filename of the retained audio artifact;
///   present only for notes created from a transcription that produced text
/// - `created_at` is assigned by SQLite once and never changes
#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub id: i64,
    pub content: String,
    pub audio_path: Option<String>,
    pub created_at: String,
}

/// Handle to the notes table. Cheap to clone; all clones share one
/// connection.
#[derive(Clone)]
pub struct NoteStore {
    conn: Arc<Mutex<Connection>>,
}

impl NoteStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: &str) -> AppResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> AppResult<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                audio_path TEXT,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;
        Self::ensure_audio_column(conn)?;
        Ok(())
    }

    /// Older databases predate the `audio_path` column; add it if missing.
    fn ensure_audio_column(conn: &Connection) -> AppResult<()> {
        let mut stmt = conn.prepare("PRAGMA table_info(notes)")?;
        let has_column = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .filter_map(Result::ok)
            .any(|name| name == "audio_path");
        if !has_column {
            conn.execute("ALTER TABLE notes ADD COLUMN audio_path TEXT", [])?;
        }
        Ok(())
    }

    fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("note store lock poisoned".to_string()))
    }

    /// Insert a note and return the stored row (id and timestamp assigned by
    /// the database).
    pub fn insert(&self, content: &str, audio_path: Option<&str>) -> AppResult<Note> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO notes (content, audio_path) VALUES (?1, ?2)",
            params![content, audio_path],
        )?;
        let id = conn.last_insert_rowid();
        Self::fetch(&conn, id)?
            .ok_or_else(|| AppError::Persistence(format!("inserted note {} not found", id)))
    }

    /// Fetch one note by id.
    pub fn get(&self, id: i64) -> AppResult<Option<Note>> {
        let conn = self.conn()?;
        Self::fetch(&conn, id)
    }

    /// All notes, most recent first.
    pub fn list(&self) -> AppResult<Vec<Note>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, content, audio_path, created_at FROM notes
             ORDER BY created_at DESC, id DESC",
        )?;
        let notes = stmt
            .query_map([], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notes)
    }

    /// Replace a note's content. Returns false if the id does not exist.
    pub fn update_content(&self, id: i64, content: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE notes SET content = ?1 WHERE id = ?2",
            params![content, id],
        )?;
        Ok(changed > 0)
    }

    /// Delete a note, returning the deleted row so the caller can clean up
    /// any referenced audio artifact. None if the id does not exist.
    pub fn delete(&self, id: i64) -> AppResult<Option<Note>> {
        let conn = self.conn()?;
        let note = Self::fetch(&conn, id)?;
        if note.is_some() {
            conn.execute("DELETE FROM notes WHERE id = ?1", params![id])?;
        }
        Ok(note)
    }

    /// Number of stored notes (health surface).
    pub fn count(&self) -> AppResult<i64> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?;
        Ok(count)
    }

    fn fetch(conn: &Connection, id: i64) -> AppResult<Option<Note>> {
        let note = conn
            .query_row(
                "SELECT id, content, audio_path, created_at FROM notes WHERE id = ?1",
                params![id],
                Self::map_row,
            )
            .optional()?;
        Ok(note)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Note> {
        Ok(Note {
            id: row.get(0)?,
            content: row.get(1)?,
            audio_path: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    /// Make every subsequent statement fail, to exercise persistence-failure
    /// paths in tests.
    #[cfg(test)]
    pub fn break_store(&self) {
        let conn = self.conn().unwrap();
        conn.execute("DROP TABLE notes", []).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let store = NoteStore::open_in_memory().unwrap();
        let note = store.insert("hello world", None).unwrap();
        assert!(note.id > 0);
        assert_eq!(note.content, "hello world");
        assert!(note.audio_path.is_none());
        assert!(!note.created_at.is_empty());

        let fetched = store.get(note.id).unwrap().unwrap();
        assert_eq!(fetched.content, "hello world");
    }

    #[test]
    fn test_insert_with_audio_path() {
        let store = NoteStore::open_in_memory().unwrap();
        let note = store.insert("transcribed", Some("abc_memo.wav")).unwrap();
        assert_eq!(note.audio_path.as_deref(), Some("abc_memo.wav"));
    }

    #[test]
    fn test_get_missing_returns_none() {
        let store = NoteStore::open_in_memory().unwrap();
        assert!(store.get(42).unwrap().is_none());
    }

    #[test]
    fn test_list_most_recent_first() {
        let store = NoteStore::open_in_memory().unwrap();
        let first = store.insert("first", None).unwrap();
        let second = store.insert("second", None).unwrap();
        let notes = store.list().unwrap();
        assert_eq!(notes.len(), 2);
        // Same CURRENT_TIMESTAMP second; the id tiebreaker keeps newest first.
        assert_eq!(notes[0].id, second.id);
        assert_eq!(notes[1].id, first.id);
    }

    #[test]
    fn test_update_content() {
        let store = NoteStore::open_in_memory().unwrap();
        let note = store.insert("draft", None).unwrap();
        assert!(store.update_content(note.id, "final").unwrap());
        assert_eq!(store.get(note.id).unwrap().unwrap().content, "final");
        assert!(!store.update_content(9999, "nope").unwrap());
    }

    #[test]
    fn test_delete_returns_row() {
        let store = NoteStore::open_in_memory().unwrap();
        let note = store.insert("to delete", Some("x.wav")).unwrap();
        let deleted = store.delete(note.id).unwrap().unwrap();
        assert_eq!(deleted.audio_path.as_deref(), Some("x.wav"));
        assert!(store.get(note.id).unwrap().is_none());
        assert!(store.delete(note.id).unwrap().is_none());
    }

    #[test]
    fn test_count() {
        let store = NoteStore::open_in_memory().unwrap();
        assert_eq!(store.count().unwrap(), 0);
        store.insert("a", None).unwrap();
        store.insert("b", None).unwrap();
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_audio_column_migration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute(
                "CREATE TABLE notes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    content TEXT NOT NULL,
                    created_at TEXT DEFAULT CURRENT_TIMESTAMP
                )",
                [],
            )
            .unwrap();
            conn.execute("INSERT INTO notes (content) VALUES ('legacy')", [])
                .unwrap();
        }

        let store = NoteStore::open(path.to_str().unwrap()).unwrap();
        let notes = store.list().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].content, "legacy");
        assert!(notes[0].audio_path.is_none());
    }
}
