//! Panels known to be ready for the current session.

use std::collections::BTreeMap;

use comic_models::BucketKey;

use crate::placeholder::VersionClock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailablePanel {
    pub url: String,
    pub version: u64,
}

impl AvailablePanel {
    /// URL with a version query so a regenerated panel is refetched.
    pub fn display_url(&self) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}v={}", self.url, separator, self.version)
    }
}

/// Ready panels keyed by bucket.
#[derive(Debug, Default)]
pub struct AvailablePanels {
    entries: BTreeMap<BucketKey, AvailablePanel>,
    clock: VersionClock,
}

impl AvailablePanels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a ready panel and return its version.
    ///
    /// Re-inserting the same URL keeps the existing version, so rediscovery
    /// does not force a redraw.
    pub fn upsert(&mut self, key: BucketKey, url: impl Into<String>) -> u64 {
        let url = url.into();
        if let Some(existing) = self.entries.get(&key) {
            if existing.url == url {
                return existing.version;
            }
        }
        self.insert_new_version(key, url)
    }

    /// Record a panel that was just regenerated. Always bumps the version,
    /// since an overwrite keeps the same URL.
    pub fn refresh(&mut self, key: BucketKey, url: impl Into<String>) -> u64 {
        self.insert_new_version(key, url.into())
    }

    fn insert_new_version(&mut self, key: BucketKey, url: String) -> u64 {
        let version = self.clock.next();
        self.entries.insert(key, AvailablePanel { url, version });
        version
    }

    pub fn get(&self, key: &BucketKey) -> Option<&AvailablePanel> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &BucketKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in time order.
    pub fn keys(&self) -> impl Iterator<Item = &BucketKey> {
        self.entries.keys()
    }

    /// Reinsert a removed panel with its original version.
    pub fn restore(&mut self, key: BucketKey, panel: AvailablePanel) {
        self.entries.insert(key, panel);
    }

    pub fn remove(&mut self, key: &BucketKey) -> Option<AvailablePanel> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
