mod migrations;
mod query;
mod rows;
mod storage;

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OpenFlags, functions::FunctionFlags};
use tracing::info;

use eventmaster_types::models::DEFAULT_PENDING_HOLD_MINUTES;

use crate::error::{Result, StorageError};

const READER_POOL_SIZE: usize = 4;

/// Relational storage on SQLite: one writer connection plus a small pool of
/// read-only connections. Writes are serialized by the writer mutex, so a
/// booking's capacity check and insert cannot interleave with another's.
pub struct SqliteStorage {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
    pending_hold: Duration,
}

/// SQLite's built-in `lower()` only folds ASCII; replace it with Unicode
/// lowercasing so searches behave like the in-memory adapter.
fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| s.to_lowercase())),
    )?;
    Ok(())
}

impl SqliteStorage {
    pub fn open(path: &Path) -> Result<Self> {
        let writer = Connection::open(path)?;

        // WAL mode for concurrent reads
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "foreign_keys", "ON")?;
        register_functions(&writer)?;

        migrations::run(&writer)?;

        let mut readers = Vec::with_capacity(READER_POOL_SIZE);
        for _ in 0..READER_POOL_SIZE {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            register_functions(&conn)?;
            readers.push(Mutex::new(conn));
        }

        info!(
            "Database opened at {} (1 writer + {} readers)",
            path.display(),
            READER_POOL_SIZE
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            reader_idx: AtomicUsize::new(0),
            pending_hold: Duration::minutes(DEFAULT_PENDING_HOLD_MINUTES),
        })
    }

    /// A private in-memory database. Reads go through the writer since
    /// separate in-memory connections would not share data.
    pub fn open_in_memory() -> Result<Self> {
        let writer = Connection::open_in_memory()?;
        writer.pragma_update(None, "foreign_keys", "ON")?;
        register_functions(&writer)?;
        migrations::run(&writer)?;

        Ok(Self {
            writer: Mutex::new(writer),
            readers: Vec::new(),
            reader_idx: AtomicUsize::new(0),
            pending_hold: Duration::minutes(DEFAULT_PENDING_HOLD_MINUTES),
        })
    }

    /// How long a pending booking keeps its seats before others may take them.
    pub fn with_pending_hold(mut self, hold: Duration) -> Self {
        self.pending_hold = hold;
        self
    }

    fn pending_cutoff(&self) -> DateTime<Utc> {
        crate::now() - self.pending_hold
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        if self.readers.is_empty() {
            return self.with_conn_mut(f);
        }
        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|e| StorageError::Backend(anyhow::anyhow!("Reader lock poisoned: {}", e)))?;
        f(&conn)
    }

    fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .writer
            .lock()
            .map_err(|e| StorageError::Backend(anyhow::anyhow!("Writer lock poisoned: {}", e)))?;
        f(&conn)
    }
}
