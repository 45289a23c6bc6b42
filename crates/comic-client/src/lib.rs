//! Client-side comic panel sync.
//!
//! This crate provides:
//! - `PanelApi` and its HTTP implementation
//! - Bounded-concurrency discovery and audit scans
//! - Playback window selection and strip rendering
//! - Placeholder derivation for pending panels
//! - Trigger policy and the playback session that ties it together

pub mod api;
pub mod error;
pub mod panels;
pub mod placeholder;
pub mod prober;
pub mod render;
pub mod session;
pub mod trigger;
pub mod window;

pub use api::{panel_url, HttpPanelClient, PanelApi};
pub use error::{ClientError, ClientResult};
pub use panels::{AvailablePanel, AvailablePanels};
pub use placeholder::{
    center_square, derive_placeholder, square_frame, Placeholder, PlaceholderCache,
    PlaceholderStyle, VersionClock,
};
pub use prober::{
    discovery_keys, probe_ready, scan, scan_with_progress, DiscoveryConfig, ScanOptions,
    ScanProgress, ScanReport,
};
pub use render::{render_strip, DisplayList, RenderChange, SlotView};
pub use session::{
    EnsureOutcome, FrameSource, PanelSession, PanelSync, RenderUpdate, SessionConfig,
    SessionLoops,
};
pub use trigger::{seek_target, KeyframeSchedule, TriggerPolicy, TriggerRequest};
pub use window::{compute_window, Alignment, PanelWindow, WindowConfig};
