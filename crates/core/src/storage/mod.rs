pub mod cookies;
pub mod memory;
pub mod origin;
pub mod redb_store;

pub use cookies::{Cookie, CookieJar};
pub use memory::MemoryStore;
pub use origin::{OriginStorage, StorageArea, StorageEvent, StorageEvents};
pub use redb_store::RedbStore;

use crate::error::ShellResult;

/// String key/value persistence scoped to one origin (the `localStorage` /
/// `sessionStorage` contract)
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> ShellResult<Option<String>>;

    /// Write a value, returning the previous one
    fn set(&self, key: &str, value: &str) -> ShellResult<Option<String>>;

    /// Remove a value, returning the previous one
    fn remove(&self, key: &str) -> ShellResult<Option<String>>;

    /// Remove every key
    fn clear(&self) -> ShellResult<()>;

    /// List stored keys in ascending order
    fn keys(&self) -> ShellResult<Vec<String>>;
}
