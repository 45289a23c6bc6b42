//! Artifact store contract and key layout.

use async_trait::async_trait;

use comic_models::PanelIdentity;

use crate::error::StorageResult;

/// Cache-Control applied to uploaded panels so overwrites show up immediately.
pub const PANEL_CACHE_CONTROL: &str = "no-cache, no-store, must-revalidate, max-age=0";

/// Content type of stored panels.
pub const PANEL_CONTENT_TYPE: &str = "image/jpeg";

/// Opaque key-addressed blob store.
///
/// The existence of an object is the durable record that a panel was
/// generated; callers never need anything richer than this.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Store bytes at `key`, replacing any previous object. Returns the
    /// public URL of the object.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StorageResult<String>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Public URL for `key`.
    fn public_url(&self, key: &str) -> String;

    /// Verify the backing store is reachable.
    async fn check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Maps panel identities to object keys, with an optional prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyLayout {
    prefix: String,
}

impl KeyLayout {
    /// Create a layout. Trailing slashes on the prefix are dropped so keys
    /// always contain exactly one separator after it.
    pub fn new(prefix: impl AsRef<str>) -> Self {
        Self {
            prefix: prefix.as_ref().trim_end_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Object key for a panel: `[prefix/]video/style/MM-SS.jpg`.
    pub fn object_key(&self, identity: &PanelIdentity) -> String {
        let path = identity.object_path();
        if self.prefix.is_empty() {
            path
        } else {
            format!("{}/{}", self.prefix, path)
        }
    }
}

/// Join a public base URL and an object key.
pub(crate) fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}
