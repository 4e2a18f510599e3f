use super::KeyValueStore;
use crate::error::{ShellError, ShellResult};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// In-memory key/value store (session storage, tests, ephemeral origins)
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> ShellResult<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| ShellError::storage("memory store lock poisoned"))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> ShellResult<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> ShellResult<Option<String>> {
        Ok(self.entries()?.insert(key.to_string(), value.to_string()))
    }

    fn remove(&self, key: &str) -> ShellResult<Option<String>> {
        Ok(self.entries()?.remove(key))
    }

    fn clear(&self) -> ShellResult<()> {
        self.entries()?.clear();
        Ok(())
    }

    fn keys(&self) -> ShellResult<Vec<String>> {
        Ok(self.entries()?.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_returns_previous_value() {
        let store = MemoryStore::new();

        assert_eq!(store.set("token", "a").unwrap(), None);
        assert_eq!(store.set("token", "b").unwrap(), Some("a".to_string()));
        assert_eq!(store.get("token").unwrap(), Some("b".to_string()));
    }

    #[test]
    fn test_clear_and_keys() {
        let store = MemoryStore::new();
        store.set("b", "2").unwrap();
        store.set("a", "1").unwrap();

        assert_eq!(store.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);

        store.clear().unwrap();
        assert!(store.keys().unwrap().is_empty());
        assert_eq!(store.remove("a").unwrap(), None);
    }
}
