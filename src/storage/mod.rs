mod sqlite;

pub use sqlite::{unix_timestamp, SqliteSettingsStore, StorageError, StoredSettingsRecord};
