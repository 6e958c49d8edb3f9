//! File-backed settings store
//!
//! A small JSON file standing in for the host's shared defaults: pairing
//! identifier and settings cache survive across invocations.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};
use tracing::warn;

use respool_core::SettingsStore;

/// Key-value store persisted as one JSON object
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// Open (or create) the store at the given path
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = std::fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<Map<String, Value>>(&bytes).ok())
            .unwrap_or_default();
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    fn read(&self, key: &str) -> Option<Value> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn write(&self, key: &str, value: Option<Value>) {
        let Ok(mut values) = self.values.lock() else {
            return;
        };
        match value {
            Some(value) => values.insert(key.to_string(), value),
            None => values.remove(key),
        };
        let serialized = match serde_json::to_vec_pretty(&*values) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to serialize settings store");
                return;
            }
        };
        if let Err(e) = std::fs::write(&self.path, serialized) {
            warn!(error = %e, path = %self.path.display(), "failed to write settings store");
        }
    }
}

impl SettingsStore for JsonFileStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.read(key)?.as_str().map(str::to_string)
    }

    fn set_string(&self, key: &str, value: &str) {
        self.write(key, Some(Value::from(value)));
    }

    fn get_i32(&self, key: &str) -> Option<i32> {
        self.read(key)?.as_i64().map(|v| v as i32)
    }

    fn set_i32(&self, key: &str, value: i32) {
        self.write(key, Some(Value::from(value)));
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.read(key)?.as_bool()
    }

    fn set_bool(&self, key: &str, value: bool) {
        self.write(key, Some(Value::from(value)));
    }

    fn get_f64(&self, key: &str) -> Option<f64> {
        self.read(key)?.as_f64()
    }

    fn set_f64(&self, key: &str, value: f64) {
        self.write(key, Some(Value::from(value)));
    }

    fn remove(&self, key: &str) {
        self.write(key, None);
    }
}
