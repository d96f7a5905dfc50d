use std::cell::RefCell;
use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Show only the total instead of "<today> / <total>".
    pub show_total_only: bool,
    pub enable_debugging: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_total_only: false,
            enable_debugging: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Persists settings records keyed by script id.
#[async_trait(?Send)]
pub trait SettingsStore {
    /// Load the stored record for `key`, with stored values layered over
    /// `defaults`.
    async fn load(&self, key: &str, defaults: &Settings) -> Result<Settings, SettingsError>;

    async fn save(&self, key: &str, settings: &Settings) -> Result<(), SettingsError>;
}

/// Overlay a stored JSON payload onto `defaults`. Unknown keys are ignored and
/// missing keys keep their default.
pub fn merge_stored(defaults: &Settings, stored: Option<&str>) -> Result<Settings, SettingsError> {
    let Some(stored) = stored else {
        return Ok(defaults.clone());
    };

    let mut merged = serde_json::to_value(defaults)?;
    let stored: Value = serde_json::from_str(stored)?;
    if let (Value::Object(target), Value::Object(source)) = (&mut merged, stored) {
        for (key, value) in source {
            if target.contains_key(&key) {
                target.insert(key, value);
            }
        }
    }
    Ok(serde_json::from_value(merged)?)
}

#[derive(Default)]
pub struct MemorySettingsStore {
    records: RefCell<HashMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(key: &str, settings: &Settings) -> Result<Self, SettingsError> {
        let store = Self::new();
        store
            .records
            .borrow_mut()
            .insert(key.to_string(), serde_json::to_string(settings)?);
        Ok(store)
    }

    pub fn stored(&self, key: &str) -> Option<Settings> {
        self.records
            .borrow()
            .get(key)
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}

#[async_trait(?Send)]
impl SettingsStore for MemorySettingsStore {
    async fn load(&self, key: &str, defaults: &Settings) -> Result<Settings, SettingsError> {
        let raw = self.records.borrow().get(key).cloned();
        merge_stored(defaults, raw.as_deref())
    }

    async fn save(&self, key: &str, settings: &Settings) -> Result<(), SettingsError> {
        let raw = serde_json::to_string(settings)?;
        self.records.borrow_mut().insert(key.to_string(), raw);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_are_camel_case() {
        let json = serde_json::to_string(&Settings::default()).unwrap();
        assert_eq!(json, r#"{"showTotalOnly":false,"enableDebugging":true}"#);
    }

    #[test]
    fn stored_values_override_defaults() {
        let merged = merge_stored(
            &Settings::default(),
            Some(r#"{"showTotalOnly":true,"legacyOption":3}"#),
        )
        .unwrap();
        assert!(merged.show_total_only);
        assert!(merged.enable_debugging);
    }

    #[test]
    fn missing_record_yields_defaults() {
        let defaults = Settings {
            show_total_only: true,
            enable_debugging: false,
        };
        assert_eq!(merge_stored(&defaults, None).unwrap(), defaults);
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemorySettingsStore::new();
        let saved = Settings {
            show_total_only: true,
            enable_debugging: false,
        };
        store.save("script", &saved).await.unwrap();
        let loaded = store.load("script", &Settings::default()).await.unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(store.stored("script"), Some(saved));
    }
}
