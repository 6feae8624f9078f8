use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use tracing::info;

use super::{CacheEntry, CacheStore, now_millis};
use crate::error::CacheError;

/// SQLite-backed history table. A single connection is shared behind a mutex, which
/// serializes writes; WAL mode keeps readers from other processes unblocked.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let store = Self::from_connection(conn)?;
        info!(path = %db_path.display(), "translation cache opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS translated_text (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                src TEXT NOT NULL,
                dst TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_translated_text_src
                ON translated_text(src, created_at);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl CacheStore for SqliteStore {
    fn latest(&self, source_text: &str) -> Result<Option<String>, CacheError> {
        let conn = self.conn.lock();
        let hit = conn
            .query_row(
                "SELECT dst FROM translated_text
                 WHERE src = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT 1",
                params![source_text],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hit)
    }

    fn append(&self, source_text: &str, translated_text: &str) -> Result<(), CacheError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO translated_text (src, dst, created_at) VALUES (?1, ?2, ?3)",
            params![source_text, translated_text, now_millis()],
        )?;
        Ok(())
    }

    fn history(&self, source_text: &str) -> Result<Vec<CacheEntry>, CacheError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT src, dst, created_at FROM translated_text
             WHERE src = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![source_text], |row| {
            Ok(CacheEntry {
                source_text: row.get(0)?,
                translated_text: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        let entries = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
