//! In-memory artifact store for local development and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{StorageError, StorageResult};
use crate::store::{join_url, ArtifactStore};

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Artifact store backed by a process-local map.
///
/// Counts calls per operation so callers can assert which paths touched
/// storage.
#[derive(Debug)]
pub struct MemoryArtifactStore {
    objects: RwLock<HashMap<String, StoredObject>>,
    base_url: String,
    exists_calls: AtomicUsize,
    put_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MemoryArtifactStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            base_url: base_url.into(),
            exists_calls: AtomicUsize::new(0),
            put_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
        }
    }

    /// Fetch a stored object.
    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Total calls across all operations.
    pub fn total_calls(&self) -> usize {
        self.exists_calls() + self.put_calls() + self.delete_calls()
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

impl Default for MemoryArtifactStore {
    fn default() -> Self {
        Self::new("memory://panels")
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StorageResult<String> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if key.is_empty() {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(self.public_url(key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.objects.write().await.remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        join_url(&self.base_url, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_exists() {
        let store = MemoryArtifactStore::new("https://cdn.test");
        assert!(!store.exists("a/b/00-15.jpg").await.unwrap());

        let url = store.put("a/b/00-15.jpg", vec![1, 2, 3], "image/jpeg").await.unwrap();
        assert_eq!(url, "https://cdn.test/a/b/00-15.jpg");
        assert!(store.exists("a/b/00-15.jpg").await.unwrap());
        assert_eq!(store.get("a/b/00-15.jpg").await.unwrap().bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = MemoryArtifactStore::default();
        store.put("k", vec![1], "image/jpeg").await.unwrap();
        store.put("k", vec![2], "image/jpeg").await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("k").await.unwrap().bytes, vec![2]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryArtifactStore::default();
        store.delete("never/created.jpg").await.unwrap();
        store.put("k", vec![1], "image/jpeg").await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.is_empty().await);
        assert_eq!(store.delete_calls(), 3);
    }

    #[tokio::test]
    async fn test_call_counters() {
        let store = MemoryArtifactStore::default();
        store.exists("x").await.unwrap();
        store.put("x", vec![0], "image/jpeg").await.unwrap();
        assert_eq!(store.exists_calls(), 1);
        assert_eq!(store.put_calls(), 1);
        assert_eq!(store.total_calls(), 2);
    }
}
