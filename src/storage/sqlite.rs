use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use directories::ProjectDirs;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::settings::{merge_stored, Settings, SettingsError, SettingsStore};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("unable to determine data directory")]
    DataDir,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSettingsRecord {
    pub script_id: String,
    pub payload: String,
    pub saved_at: i64,
}

pub struct SqliteSettingsStore {
    pool: Pool<SqliteConnectionManager>,
}

#[derive(Debug)]
struct SqliteCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for SqliteCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(Duration::from_secs(1))
    }
}

impl SqliteSettingsStore {
    pub fn new() -> Result<Self, StorageError> {
        Self::open(&database_path()?)
    }

    /// Open a store rooted in `dir` (primarily for testing).
    pub fn new_with_path(dir: &Path) -> Result<Self, StorageError> {
        Self::open(&dir.join("settings.sqlite3"))
    }

    fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_| StorageError::DataDir)?;
        }

        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(2)
            .connection_customizer(Box::new(SqliteCustomizer))
            .build(manager)?;

        let conn = pool.get()?;
        initialise_schema(&conn)?;

        Ok(Self { pool })
    }

    pub fn record(&self, script_id: &str) -> Result<Option<StoredSettingsRecord>, StorageError> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT script_id, payload, saved_at FROM settings WHERE script_id = ?1",
            params![script_id],
            |row| {
                Ok(StoredSettingsRecord {
                    script_id: row.get(0)?,
                    payload: row.get(1)?,
                    saved_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn write_record(&self, record: &StoredSettingsRecord) -> Result<(), StorageError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (script_id, payload, saved_at) VALUES (?1, ?2, ?3)",
            params![record.script_id, record.payload, record.saved_at],
        )?;
        Ok(())
    }
}

#[async_trait(?Send)]
impl SettingsStore for SqliteSettingsStore {
    async fn load(&self, key: &str, defaults: &Settings) -> Result<Settings, SettingsError> {
        let record = self.record(key)?;
        merge_stored(defaults, record.as_ref().map(|r| r.payload.as_str()))
    }

    async fn save(&self, key: &str, settings: &Settings) -> Result<(), SettingsError> {
        let record = StoredSettingsRecord {
            script_id: key.to_string(),
            payload: serde_json::to_string(settings)?,
            saved_at: unix_timestamp(),
        };
        self.write_record(&record)?;
        Ok(())
    }
}

fn database_path() -> Result<PathBuf, StorageError> {
    if let Ok(dir) = std::env::var("LESSON_TALLY_DATA_DIR") {
        let mut path = PathBuf::from(dir);
        path.push("settings.sqlite3");
        return Ok(path);
    }

    if let Some(dirs) = ProjectDirs::from("org", "LessonTally", "LessonTally") {
        let mut data_dir = dirs.data_dir().to_path_buf();
        data_dir.push("settings.sqlite3");
        Ok(data_dir)
    } else {
        Err(StorageError::DataDir)
    }
}

fn initialise_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        CREATE TABLE IF NOT EXISTS settings (
            script_id TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            saved_at INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}

pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
