//! Persistent key-value store scoped to a profile.
//!
//! The durable analog of a browser's per-origin storage: a string-keyed map
//! that survives restarts, loaded once at open and rewritten write-through
//! on every mutation. Access is synchronous; the file is small and the
//! write path is an atomic rename, so callers never suspend on storage.
//!
//! Key namespaces never overlap: session keys, the cart envelope, and the
//! wishlist array each have exactly one writer (see [`keys`]).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

/// Well-known storage keys.
pub mod keys {
    /// Bearer access token of the current session.
    pub const SESSION_TOKEN: &str = "session.token";

    /// Principal identifier of the current session.
    pub const SESSION_PRINCIPAL_ID: &str = "session.principalId";

    /// Role of the current session.
    pub const SESSION_ROLE: &str = "session.role";

    /// Serialized cart envelope.
    pub const CART: &str = "cart.v1";

    /// Serialized array of wishlisted product ids.
    pub const WISHLIST: &str = "wishlist.v1";
}

/// Errors that can occur while persisting local state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// State could not be serialized.
    #[error("storage serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable, synchronous, profile-scoped string store.
///
/// Cheap to clone; clones share the same in-memory map and backing file.
#[derive(Clone)]
pub struct ProfileStore {
    inner: Arc<ProfileStoreInner>,
}

struct ProfileStoreInner {
    path: PathBuf,
    map: RwLock<BTreeMap<String, String>>,
}

impl ProfileStore {
    /// Open (or create) the store for the given profile.
    ///
    /// A corrupt state file is treated as absent: the file is removed and
    /// the store starts empty rather than failing startup.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the state directory cannot be created or
    /// the state file cannot be read.
    pub fn open(state_dir: &Path, profile: &str) -> Result<Self, StoreError> {
        fs::create_dir_all(state_dir)?;
        let path = state_dir.join(format!("{profile}.json"));

        let map = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "State file is corrupt, starting from an empty store"
                    );
                    fs::remove_file(&path)?;
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            inner: Arc::new(ProfileStoreInner {
                path,
                map: RwLock::new(map),
            }),
        })
    }

    /// Read a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.map.read().get(key).cloned()
    }

    /// Write a value and flush to disk.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the state file cannot be written.
    pub fn set(&self, key: &str, value: impl Into<String>) -> Result<(), StoreError> {
        let mut map = self.inner.map.write();
        map.insert(key.to_owned(), value.into());
        Self::flush(&self.inner.path, &map)
    }

    /// Remove a key (no-op if absent) and flush to disk.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the state file cannot be written.
    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut map = self.inner.map.write();
        if map.remove(key).is_none() {
            return Ok(());
        }
        Self::flush(&self.inner.path, &map)
    }

    /// Remove every key and flush to disk.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the state file cannot be written.
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut map = self.inner.map.write();
        map.clear();
        Self::flush(&self.inner.path, &map)
    }

    /// Rewrite the backing file via a temp file + rename so a crash mid-write
    /// never leaves a truncated state file behind.
    fn flush(path: &Path, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let serialized = serde_json::to_string_pretty(map)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serialized)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ProfileStore::open(dir.path(), "default").expect("open");

        store.set(keys::SESSION_TOKEN, "tok-1").expect("set");
        assert_eq!(store.get(keys::SESSION_TOKEN).as_deref(), Some("tok-1"));
        assert_eq!(store.get(keys::SESSION_ROLE), None);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = ProfileStore::open(dir.path(), "default").expect("open");
            store.set(keys::WISHLIST, "[\"p-1\"]").expect("set");
        }

        let reopened = ProfileStore::open(dir.path(), "default").expect("reopen");
        assert_eq!(reopened.get(keys::WISHLIST).as_deref(), Some("[\"p-1\"]"));
    }

    #[test]
    fn test_profiles_are_isolated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let alice = ProfileStore::open(dir.path(), "alice").expect("open alice");
        let bob = ProfileStore::open(dir.path(), "bob").expect("open bob");

        alice.set("k", "alice-value").expect("set");
        assert_eq!(bob.get("k"), None);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("default.json"), "{not json").expect("write");

        let store = ProfileStore::open(dir.path(), "default").expect("open");
        assert_eq!(store.get(keys::SESSION_TOKEN), None);

        // The corrupt file was removed, so a reopen is clean too.
        let reopened = ProfileStore::open(dir.path(), "default").expect("reopen");
        assert_eq!(reopened.get(keys::SESSION_TOKEN), None);
    }

    #[test]
    fn test_remove_and_clear() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ProfileStore::open(dir.path(), "default").expect("open");

        store.set("a", "1").expect("set");
        store.set("b", "2").expect("set");
        store.remove("a").expect("remove");
        store.remove("a").expect("remove absent is a no-op");
        assert_eq!(store.get("a"), None);
        assert_eq!(store.get("b").as_deref(), Some("2"));

        store.clear().expect("clear");
        assert_eq!(store.get("b"), None);
    }
}
