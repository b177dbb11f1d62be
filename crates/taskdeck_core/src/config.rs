//! Process configuration for embedding applications and the CLI.
//!
//! # Responsibility
//! - Describe which store backend a process uses and where it keeps data.
//! - Load settings from a JSON file with environment overrides.
//! - Build the configured `TaskStore`.
//!
//! # Invariants
//! - A missing config file is not an error; defaults apply.
//! - Exactly one backend is chosen per process.

use crate::db::{open_db, DbError};
use crate::logging::default_log_level;
use crate::store::{JsonFilePersistence, LocalTaskStore, SqliteDocumentStore, TaskStore};
use log::info;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const ENV_BACKEND: &str = "TASKDECK_BACKEND";
pub const ENV_DATA_DIR: &str = "TASKDECK_DATA_DIR";
pub const ENV_LOG_LEVEL: &str = "TASKDECK_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "TASKDECK_LOG_DIR";

const DEFAULT_DATA_DIR: &str = ".taskdeck";
const DOCUMENT_DB_FILE: &str = "tasks.sqlite3";
const LOG_SUBDIR: &str = "logs";

/// Store backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Device-local JSON snapshots.
    #[default]
    Local,
    /// SQLite document store (remote mode semantics).
    Document,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Document => "document",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Some(Self::Local),
            "document" | "remote" => Some(Self::Document),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub backend: BackendKind,
    pub data_dir: PathBuf,
    pub log_level: String,
    /// Defaults to `<data_dir>/logs`.
    pub log_dir: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
    InvalidValue { key: &'static str, value: String },
    Db(DbError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "config io failed at `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "invalid config file `{}`: {source}", path.display())
            }
            Self::InvalidValue { key, value } => write!(f, "invalid value `{value}` for {key}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::InvalidValue { .. } => None,
            Self::Db(err) => Some(err),
        }
    }
}

impl From<DbError> for ConfigError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl SyncConfig {
    /// Reads `path` as JSON; a missing file yields the defaults.
    ///
    /// # Errors
    /// - `Io` when the file exists but cannot be read.
    /// - `Parse` when the file is not a valid config object.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `TASKDECK_*` environment variables on top of `self`.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`; blank values are ignored.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(raw) = value(ENV_BACKEND) {
            self.backend = BackendKind::parse(&raw).ok_or(ConfigError::InvalidValue {
                key: ENV_BACKEND,
                value: raw,
            })?;
        }
        if let Some(raw) = value(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(raw);
        }
        if let Some(raw) = value(ENV_LOG_LEVEL) {
            self.log_level = raw.trim().to_string();
        }
        if let Some(raw) = value(ENV_LOG_DIR) {
            self.log_dir = Some(PathBuf::from(raw));
        }
        Ok(self)
    }

    /// Absolute log directory.
    ///
    /// # Errors
    /// - `Io` when the current directory cannot be resolved.
    pub fn resolved_log_dir(&self) -> Result<PathBuf, ConfigError> {
        let dir = self
            .log_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join(LOG_SUBDIR));
        std::path::absolute(&dir).map_err(|source| ConfigError::Io { path: dir, source })
    }

    /// Builds the configured store.
    ///
    /// # Errors
    /// - `Io` when the data directory cannot be created.
    /// - `Db` when the document database cannot be opened or migrated.
    pub fn open_store(&self) -> Result<Arc<dyn TaskStore>, ConfigError> {
        std::fs::create_dir_all(&self.data_dir).map_err(|source| ConfigError::Io {
            path: self.data_dir.clone(),
            source,
        })?;

        let store: Arc<dyn TaskStore> = match self.backend {
            BackendKind::Local => Arc::new(LocalTaskStore::new(JsonFilePersistence::new(
                self.data_dir.clone(),
            ))),
            BackendKind::Document => {
                let conn = open_db(self.data_dir.join(DOCUMENT_DB_FILE))?;
                Arc::new(SqliteDocumentStore::new(conn))
            }
        };
        info!(
            "event=store_open module=config status=ok backend={} data_dir={}",
            self.backend.as_str(),
            self.data_dir.display()
        );
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::{BackendKind, ConfigError, SyncConfig, ENV_BACKEND, ENV_DATA_DIR, ENV_LOG_DIR};
    use crate::store::StoreMode;
    use std::collections::HashMap;
    use std::path::PathBuf;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SyncConfig::load(dir.path().join("absent.json")).expect("load config");
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("taskdeck.json");
        std::fs::write(&path, r#"{ "backend": "document", "data_dir": "/srv/tasks" }"#)
            .expect("write file");

        let config = SyncConfig::load(&path).expect("load config");
        assert_eq!(config.backend, BackendKind::Document);
        assert_eq!(config.data_dir, PathBuf::from("/srv/tasks"));
        assert_eq!(config.log_level, SyncConfig::default().log_level);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("taskdeck.json");
        std::fs::write(&path, "{ backend").expect("write file");
        assert!(matches!(SyncConfig::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn overrides_replace_values_and_reject_unknown_backends() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_BACKEND, "document"),
            (ENV_DATA_DIR, "/tmp/taskdeck"),
            (ENV_LOG_DIR, "  "),
        ]);
        let config = SyncConfig::default()
            .with_overrides(|key| env.get(key).map(|value| value.to_string()))
            .expect("apply overrides");
        assert_eq!(config.backend, BackendKind::Document);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/taskdeck"));
        assert_eq!(config.log_dir, None);

        let err = SyncConfig::default()
            .with_overrides(|key| (key == ENV_BACKEND).then(|| "cloud".to_string()))
            .expect_err("apply overrides must fail");
        assert!(err.to_string().contains("TASKDECK_BACKEND"));
    }

    #[test]
    fn open_store_honors_backend() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = SyncConfig {
            data_dir: dir.path().join("data"),
            ..SyncConfig::default()
        };
        assert_eq!(config.open_store().expect("open store").mode(), StoreMode::Local);

        config.backend = BackendKind::Document;
        assert_eq!(config.open_store().expect("open store").mode(), StoreMode::Remote);
        assert!(dir.path().join("data").join("tasks.sqlite3").exists());
    }

    #[test]
    fn log_dir_defaults_under_data_dir() {
        let config = SyncConfig {
            data_dir: PathBuf::from("/var/lib/taskdeck"),
            ..SyncConfig::default()
        };
        assert_eq!(
            config.resolved_log_dir().expect("resolve log dir"),
            PathBuf::from("/var/lib/taskdeck/logs")
        );
    }
}
