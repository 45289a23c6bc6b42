//! Playback window selection.
//!
//! Chooses which known panels the strip shows for a playback position.

use std::collections::BTreeSet;

use comic_models::BucketKey;

/// Window sizing.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    /// Number of slots in the strip.
    pub size: usize,
    /// Anchors at or before this key may use the left-aligned bootstrap window.
    pub bootstrap_threshold: BucketKey,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            size: 6,
            bootstrap_threshold: BucketKey::from_whole_seconds(90),
        }
    }
}

/// Which side the window's keys are packed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// Bootstrap prefix; empty slots go on the right.
    Left,
    /// Anchor-ending suffix; empty slots go on the left.
    Right,
}

/// Selected keys in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelWindow {
    pub keys: Vec<BucketKey>,
    pub alignment: Alignment,
    size: usize,
}

impl PanelWindow {
    pub fn empty(size: usize) -> Self {
        Self {
            keys: Vec::new(),
            alignment: Alignment::Right,
            size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Fixed-size slot row, padded with `None` on the side opposite the
    /// alignment.
    pub fn slots(&self) -> Vec<Option<BucketKey>> {
        let padding = self.size.saturating_sub(self.keys.len());
        let keys = self.keys.iter().copied().map(Some);
        match self.alignment {
            Alignment::Left => keys.chain(std::iter::repeat(None).take(padding)).collect(),
            Alignment::Right => std::iter::repeat(None).take(padding).chain(keys).collect(),
        }
    }
}

/// Compute the window for playback time `time` over the known keys
/// (available and pending).
pub fn compute_window(time: f64, known: &BTreeSet<BucketKey>, config: &WindowConfig) -> PanelWindow {
    let size = config.size;
    if known.is_empty() || size == 0 {
        return PanelWindow::empty(size);
    }

    let target = BucketKey::next_bucket_after(time);
    let anchor = if known.contains(&target) {
        Some(target)
    } else {
        known.range(..=target).next_back().copied()
    };
    let Some(anchor) = anchor.or_else(|| known.iter().next_back().copied()) else {
        return PanelWindow::empty(size);
    };

    let mut keys: Vec<BucketKey> = known.range(..=anchor).rev().take(size).copied().collect();
    keys.reverse();

    if keys.len() < size && anchor <= config.bootstrap_threshold {
        return PanelWindow {
            keys: known.iter().take(size).copied().collect(),
            alignment: Alignment::Left,
            size,
        };
    }

    PanelWindow {
        keys,
        alignment: Alignment::Right,
        size,
    }
}
