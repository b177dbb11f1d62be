//! Key/value persistence for serialized task collections.
//!
//! # Responsibility
//! - Load and save opaque serialized payloads under string keys.
//! - Offer memory, JSON-file and SQLite backends behind one trait.
//!
//! # Invariants
//! - `load` returns `Ok(None)` for keys that were never saved.
//! - `save` replaces the whole payload for a key.

use crate::db::DbError;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Storage used by `LocalTaskStore`.
pub trait SnapshotPersistence: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn save(&self, key: &str, payload: &str) -> Result<(), PersistenceError>;
}

#[derive(Debug)]
pub enum PersistenceError {
    Io { path: PathBuf, source: io::Error },
    Db(DbError),
}

impl Display for PersistenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "snapshot io failed at `{}`: {source}", path.display())
            }
            Self::Db(err) => write!(f, "snapshot db failed: {err}"),
        }
    }
}

impl Error for PersistenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Db(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Process-lifetime persistence; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a raw payload, e.g. to replay what a previous session left behind.
    pub fn with_entry(self, key: impl Into<String>, payload: impl Into<String>) -> Self {
        self.entries.lock().insert(key.into(), payload.into());
        self
    }
}

impl SnapshotPersistence for MemoryPersistence {
    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save(&self, key: &str, payload: &str) -> Result<(), PersistenceError> {
        self.entries
            .lock()
            .insert(key.to_string(), payload.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    dir: PathBuf,
}

impl JsonFilePersistence {
    /// Uses `dir`, creating it on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`.
    ///
    /// Bytes outside `[a-z0-9-]` are written as `_` plus two hex digits, so
    /// distinct keys never share a file, even on case-insensitive filesystems.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let mut file_stem = String::with_capacity(key.len());
        for byte in key.bytes() {
            if byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'-' {
                file_stem.push(char::from(byte));
            } else {
                file_stem.push_str(&format!("_{byte:02x}"));
            }
        }
        self.dir.join(format!("{file_stem}.json"))
    }
}

impl SnapshotPersistence for JsonFilePersistence {
    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(payload) => Ok(Some(payload)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistenceError::Io { path, source }),
        }
    }

    fn save(&self, key: &str, payload: &str) -> Result<(), PersistenceError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: io::Error| PersistenceError::Io { path, source }
        };

        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;
        let path = self.path_for(key);
        // Stage then rename: readers never observe a partial file.
        let staging = path.with_extension("json.tmp");
        let mut file = fs::File::create(&staging).map_err(io_err(&staging))?;
        file.write_all(payload.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(io_err(&staging))?;
        fs::rename(&staging, &path).map_err(io_err(&path))?;
        Ok(())
    }
}

/// Snapshots stored in the `snapshots` table of a migrated database.
pub struct SqlitePersistence {
    conn: Mutex<Connection>,
}

impl SqlitePersistence {
    /// Takes ownership of a connection returned by `open_db*`.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

impl SnapshotPersistence for SqlitePersistence {
    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let conn = self.conn.lock();
        let payload = conn
            .query_row(
                "SELECT payload FROM snapshots WHERE key = ?1;",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(payload)
    }

    fn save(&self, key: &str, payload: &str) -> Result<(), PersistenceError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO snapshots (key, payload, saved_at)
             VALUES (?1, ?2, (strftime('%s', 'now') * 1000))
             ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                saved_at = excluded.saved_at;",
            params![key, payload],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{JsonFilePersistence, MemoryPersistence, SnapshotPersistence, SqlitePersistence};
    use crate::db::open_db_in_memory;

    #[test]
    fn memory_roundtrip_and_missing_key() {
        let persistence = MemoryPersistence::new();
        assert_eq!(persistence.load("tasks").expect("load missing"), None);
        persistence.save("tasks", "[]").expect("save");
        assert_eq!(persistence.load("tasks").expect("load").as_deref(), Some("[]"));
    }

    #[test]
    fn json_file_escapes_keys_and_replaces_payloads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let persistence = JsonFilePersistence::new(dir.path().join("nested"));
        assert_eq!(persistence.load("tasks:alice").expect("load missing"), None);

        persistence.save("tasks:alice", "[1]").expect("first save");
        persistence.save("tasks:alice", "[2]").expect("second save");

        let path = persistence.path_for("tasks:alice");
        assert_eq!(path.file_name().expect("file name"), "tasks_3aalice.json");
        assert_eq!(
            persistence.load("tasks:alice").expect("load").as_deref(),
            Some("[2]")
        );
    }

    #[test]
    fn json_file_keys_never_share_a_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let persistence = JsonFilePersistence::new(dir.path());
        let keys = [
            "tasks:alice.smith",
            "tasks:alice_smith",
            "tasks:alice_2esmith",
            "tasks:Alice.smith",
            "tasks:al\u{e9}",
        ];
        for (index, key) in keys.iter().enumerate() {
            persistence
                .save(key, &format!("[{index}]"))
                .expect("save snapshot");
        }
        for (index, key) in keys.iter().enumerate() {
            assert_eq!(
                persistence.load(key).expect("load snapshot"),
                Some(format!("[{index}]")),
                "key {key}"
            );
        }
    }

    #[test]
    fn sqlite_upserts_by_key() {
        let persistence = SqlitePersistence::new(open_db_in_memory().expect("open db"));
        persistence.save("tasks:bob", "[]").expect("insert");
        persistence.save("tasks:bob", "[{}]").expect("upsert");
        assert_eq!(
            persistence.load("tasks:bob").expect("load").as_deref(),
            Some("[{}]")
        );
        assert_eq!(persistence.load("tasks:carol").expect("load missing"), None);
    }
}
