//! Handle store implementations

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use eyre::{Context, Result, eyre};
use rusqlite::{Connection, TransactionBehavior, params};
use tracing::{debug, info};

use crate::handle::CallbackHandleSet;
use crate::{DB_FILE_NAME, KEY_CLIENT_HANDLE, KEY_REGISTRATION_HANDLE};

/// How long a writer waits on another process holding the database lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Durable key/value persistence of the callback handle pair
///
/// Writes are atomic per call: readers never observe one handle from one
/// `put` and the other from another.
pub trait HandleStore: Send + Sync {
    /// Persist both handles in one atomic write (last writer wins)
    fn put(&self, handles: &CallbackHandleSet) -> Result<()>;

    /// Read the persisted pair, `None` if never set
    fn get(&self) -> Result<Option<CallbackHandleSet>>;

    /// Remove the persisted pair for this namespace
    fn clear(&self) -> Result<()>;

    /// Namespace the keys are scoped to
    fn namespace(&self) -> &str;
}

/// SQLite-backed handle store surviving process restarts
pub struct SqliteHandleStore {
    conn: Mutex<Connection>,
    namespace: String,
    db_path: PathBuf,
}

impl SqliteHandleStore {
    /// Open or create a store under `dir`, scoped to `namespace`
    pub fn open(dir: impl AsRef<Path>, namespace: impl Into<String>) -> Result<Self> {
        let dir = dir.as_ref();
        let namespace = namespace.into();
        debug!(?dir, %namespace, "SqliteHandleStore::open: called");

        fs::create_dir_all(dir).context("Failed to create store directory")?;
        let db_path = dir.join(DB_FILE_NAME);

        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open handle store at {}", db_path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .context("Failed to set busy timeout")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS callback_handles (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value INTEGER NOT NULL,
                PRIMARY KEY (namespace, key)
            )",
            [],
        )
        .context("Failed to create callback_handles table")?;

        debug!(?db_path, "Opened handle store");
        Ok(Self {
            conn: Mutex::new(conn),
            namespace,
            db_path,
        })
    }

    /// Path of the backing database file
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| eyre!("handle store lock poisoned: {e}"))
    }
}

impl HandleStore for SqliteHandleStore {
    fn put(&self, handles: &CallbackHandleSet) -> Result<()> {
        debug!(namespace = %self.namespace, %handles, "SqliteHandleStore::put: called");
        let mut guard = self.lock()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin handle transaction")?;

        for (key, value) in [
            (KEY_REGISTRATION_HANDLE, handles.registration_handle),
            (KEY_CLIENT_HANDLE, handles.client_handle),
        ] {
            tx.execute(
                "INSERT INTO callback_handles (namespace, key, value)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value",
                params![self.namespace, key, value],
            )
            .with_context(|| format!("Failed to write {key}"))?;
        }

        tx.commit().context("Failed to commit handle transaction")?;
        info!(namespace = %self.namespace, %handles, "Persisted callback handles");
        Ok(())
    }

    fn get(&self) -> Result<Option<CallbackHandleSet>> {
        debug!(namespace = %self.namespace, "SqliteHandleStore::get: called");
        let guard = self.lock()?;
        let mut stmt = guard
            .prepare("SELECT key, value FROM callback_handles WHERE namespace = ?1")
            .context("Failed to prepare handle query")?;
        let rows = stmt
            .query_map(params![self.namespace], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .context("Failed to query handles")?;

        let mut registration = None;
        let mut client = None;
        for row in rows {
            let (key, value) = row.context("Failed to read handle row")?;
            match key.as_str() {
                KEY_REGISTRATION_HANDLE => registration = Some(value),
                KEY_CLIENT_HANDLE => client = Some(value),
                _ => debug!(%key, "SqliteHandleStore::get: ignoring unknown key"),
            }
        }

        match (registration, client) {
            (Some(reg), Some(client)) => Ok(Some(CallbackHandleSet::new(reg, client))),
            _ => {
                debug!("SqliteHandleStore::get: no complete handle pair");
                Ok(None)
            }
        }
    }

    fn clear(&self) -> Result<()> {
        debug!(namespace = %self.namespace, "SqliteHandleStore::clear: called");
        let guard = self.lock()?;
        let removed = guard
            .execute(
                "DELETE FROM callback_handles WHERE namespace = ?1",
                params![self.namespace],
            )
            .context("Failed to clear handles")?;
        info!(namespace = %self.namespace, removed, "Cleared callback handles");
        Ok(())
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// In-memory handle store
///
/// Shared through an `Arc`, it stands in for the durable store across
/// simulated process incarnations in tests.
#[derive(Debug)]
pub struct MemoryHandleStore {
    handles: Mutex<Option<CallbackHandleSet>>,
    namespace: String,
}

impl MemoryHandleStore {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            handles: Mutex::new(None),
            namespace: namespace.into(),
        }
    }
}

impl Default for MemoryHandleStore {
    fn default() -> Self {
        Self::new(crate::DEFAULT_NAMESPACE)
    }
}

impl HandleStore for MemoryHandleStore {
    fn put(&self, handles: &CallbackHandleSet) -> Result<()> {
        let mut guard = self
            .handles
            .lock()
            .map_err(|e| eyre!("memory store lock poisoned: {e}"))?;
        *guard = Some(*handles);
        Ok(())
    }

    fn get(&self) -> Result<Option<CallbackHandleSet>> {
        let guard = self
            .handles
            .lock()
            .map_err(|e| eyre!("memory store lock poisoned: {e}"))?;
        Ok(*guard)
    }

    fn clear(&self) -> Result<()> {
        let mut guard = self
            .handles
            .lock()
            .map_err(|e| eyre!("memory store lock poisoned: {e}"))?;
        *guard = None;
        Ok(())
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }
}
