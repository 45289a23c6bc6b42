//! Shared data models for comic panel generation.
//!
//! This crate provides Serde-serializable types for:
//! - Time bucket keys (`MM-SS`)
//! - Panel identities and validation
//! - The style catalog
//! - Generation job records
//! - Panel status wire bodies

pub mod bucket;
pub mod identity;
pub mod job;
pub mod status;
pub mod style;

// Re-export common types
pub use bucket::{BucketKey, BucketParseError, BUCKET_SECONDS};
pub use identity::{IdentityError, PanelIdentity};
pub use job::{JobRecord, JobState};
pub use status::{PanelStatus, FORCE_OVERWRITE_HEADER};
pub use style::{CatalogError, StyleCatalog, StyleDefinition};
