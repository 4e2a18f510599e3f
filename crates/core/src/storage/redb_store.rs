use super::KeyValueStore;
use crate::error::ShellResult;
use anyhow::Context;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::PathBuf;
use std::sync::Arc;

const ENTRIES_TABLE: TableDefinition<&str, &str> = TableDefinition::new("local_storage");

/// File-persisted key/value store using redb, one database per origin
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    pub fn new(path: PathBuf) -> ShellResult<Self> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create storage directory")?;
        }

        let db = Database::create(&path).context("Failed to create redb database")?;

        let write_txn = db.begin_write().context("Failed to begin write transaction")?;
        {
            let _entries = write_txn
                .open_table(ENTRIES_TABLE)
                .context("Failed to open entries table")?;
        }
        write_txn.commit().context("Failed to commit transaction")?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl KeyValueStore for RedbStore {
    fn get(&self, key: &str) -> ShellResult<Option<String>> {
        let read_txn = self.db.begin_read().context("Failed to begin read")?;
        let table = read_txn
            .open_table(ENTRIES_TABLE)
            .context("Failed to open table")?;

        let value = table.get(key).context("Failed to get entry")?;
        Ok(value.map(|guard| guard.value().to_string()))
    }

    fn set(&self, key: &str, value: &str) -> ShellResult<Option<String>> {
        let write_txn = self.db.begin_write().context("Failed to begin write")?;
        let previous = {
            let mut table = write_txn
                .open_table(ENTRIES_TABLE)
                .context("Failed to open table")?;
            let previous = table
                .insert(key, value)
                .context("Failed to insert entry")?
                .map(|guard| guard.value().to_string());
            previous
        };
        write_txn.commit().context("Failed to commit")?;
        Ok(previous)
    }

    fn remove(&self, key: &str) -> ShellResult<Option<String>> {
        let write_txn = self.db.begin_write().context("Failed to begin write")?;
        let previous = {
            let mut table = write_txn
                .open_table(ENTRIES_TABLE)
                .context("Failed to open table")?;
            let previous = table
                .remove(key)
                .context("Failed to remove entry")?
                .map(|guard| guard.value().to_string());
            previous
        };
        write_txn.commit().context("Failed to commit")?;
        Ok(previous)
    }

    fn clear(&self) -> ShellResult<()> {
        let write_txn = self.db.begin_write().context("Failed to begin write")?;
        {
            let mut table = write_txn
                .open_table(ENTRIES_TABLE)
                .context("Failed to open table")?;

            let mut keys = Vec::new();
            for item in table.iter().context("Failed to iterate entries")? {
                let (key, _value) = item.context("Failed to read entry")?;
                keys.push(key.value().to_string());
            }

            for key in &keys {
                table
                    .remove(key.as_str())
                    .context("Failed to remove entry")?;
            }
        }
        write_txn.commit().context("Failed to commit")?;
        Ok(())
    }

    fn keys(&self) -> ShellResult<Vec<String>> {
        let read_txn = self.db.begin_read().context("Failed to begin read")?;
        let table = read_txn
            .open_table(ENTRIES_TABLE)
            .context("Failed to open table")?;

        let mut keys = Vec::new();
        for item in table.iter().context("Failed to iterate entries")? {
            let (key, _value) = item.context("Failed to read entry")?;
            keys.push(key.value().to_string());
        }

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_values_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("origin.redb");

        {
            let store = RedbStore::new(path.clone()).unwrap();
            store.set("token", "abc").unwrap();
            store.set("name", "Ada Lovelace").unwrap();
        }

        let store = RedbStore::new(path).unwrap();
        assert_eq!(store.get("token").unwrap(), Some("abc".to_string()));
        assert_eq!(
            store.keys().unwrap(),
            vec!["name".to_string(), "token".to_string()]
        );
    }

    #[test]
    fn test_remove_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let store = RedbStore::new(temp_dir.path().join("nested").join("origin.redb")).unwrap();

        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        assert_eq!(store.remove("a").unwrap(), Some("1".to_string()));
        assert_eq!(store.remove("a").unwrap(), None);

        store.clear().unwrap();
        assert!(store.keys().unwrap().is_empty());
        assert_eq!(store.get("b").unwrap(), None);
    }
}
