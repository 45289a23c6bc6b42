//! Panel artifact storage.
//!
//! This crate provides:
//! - The `ArtifactStore` contract (exists / put / delete / public URL)
//! - Deterministic object keys for panel identities
//! - An S3-compatible store (AWS S3, Cloudflare R2)
//! - An in-memory store for development and tests

pub mod error;
pub mod memory;
pub mod s3;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use memory::{MemoryArtifactStore, StoredObject};
pub use s3::{S3ArtifactStore, S3StoreConfig};
pub use store::{ArtifactStore, KeyLayout, PANEL_CACHE_CONTROL, PANEL_CONTENT_TYPE};
