use std::collections::HashMap;
use std::sync::Mutex;

/// Key/value storage scoped to one browser tab (or one process).
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// In-memory tab scope: nothing outlives the owning context.
#[derive(Debug, Default)]
pub struct TabStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl TabStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for TabStorage {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.remove(key);
    }
}
