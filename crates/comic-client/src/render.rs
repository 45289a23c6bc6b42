//! Strip rendering.
//!
//! [`render_strip`] is a pure function from session state to a display
//! list. Hosts compare consecutive lists with [`DisplayList::diff`] and redraw
//! only what changed.

use comic_models::BucketKey;

use crate::panels::AvailablePanels;
use crate::placeholder::PlaceholderCache;
use crate::window::PanelWindow;

/// One strip slot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SlotView {
    pub key: Option<BucketKey>,
    /// Version of the ready panel, if any.
    pub available: Option<u64>,
    /// Version of the placeholder, if any.
    pub pending: Option<u64>,
    /// Image to show: the cache-busted panel URL, else the placeholder URI.
    pub image: Option<String>,
}

impl SlotView {
    /// `key@v@has@pv@phas`, with `_` for an empty slot.
    fn signature(&self) -> String {
        let Some(key) = self.key else {
            return "_".to_string();
        };
        format!(
            "{}@{}@{}@{}@{}",
            key,
            self.available.unwrap_or(0),
            u8::from(self.available.is_some()),
            self.pending.unwrap_or(0),
            u8::from(self.pending.is_some()),
        )
    }

    /// `MM:SS` badge text.
    pub fn label(&self) -> Option<String> {
        self.key.map(|k| k.display_colon())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisplayList {
    /// The strip is hidden while no panel is available or pending.
    pub visible: bool,
    pub slots: Vec<SlotView>,
    /// Slot holding the bucket currently playing.
    pub highlighted: Option<usize>,
}

/// What a host must redraw to go from one display list to the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderChange {
    Unchanged,
    HighlightOnly,
    /// Same slot keys; only these slots changed content.
    Slots {
        indices: Vec<usize>,
        highlight_changed: bool,
    },
    /// Visibility or slot keys changed.
    Rebuild,
}

impl DisplayList {
    /// Composite signature over every slot.
    pub fn signature(&self) -> String {
        self.slots
            .iter()
            .map(SlotView::signature)
            .collect::<Vec<_>>()
            .join("|")
    }

    pub fn diff(&self, previous: Option<&DisplayList>) -> RenderChange {
        let Some(previous) = previous else {
            return RenderChange::Rebuild;
        };

        let same_keys = self.slots.len() == previous.slots.len()
            && self
                .slots
                .iter()
                .zip(&previous.slots)
                .all(|(a, b)| a.key == b.key);
        if self.visible != previous.visible || !same_keys {
            return RenderChange::Rebuild;
        }

        let highlight_changed = self.highlighted != previous.highlighted;
        if self.signature() == previous.signature() {
            return if highlight_changed {
                RenderChange::HighlightOnly
            } else {
                RenderChange::Unchanged
            };
        }

        let indices = self
            .slots
            .iter()
            .zip(&previous.slots)
            .enumerate()
            .filter(|(_, (a, b))| a.signature() != b.signature())
            .map(|(i, _)| i)
            .collect();
        RenderChange::Slots {
            indices,
            highlight_changed,
        }
    }
}

/// Build the display list for a window.
pub fn render_strip(
    window: &PanelWindow,
    available: &AvailablePanels,
    placeholders: &PlaceholderCache,
    current: BucketKey,
) -> DisplayList {
    let slots: Vec<SlotView> = window
        .slots()
        .into_iter()
        .map(|key| match key {
            None => SlotView::default(),
            Some(key) => {
                let panel = available.get(&key);
                let placeholder = placeholders.get(&key);
                let image = panel
                    .map(|p| p.display_url())
                    .or_else(|| placeholder.map(|p| p.data.clone()));
                SlotView {
                    key: Some(key),
                    available: panel.map(|p| p.version),
                    pending: placeholder.map(|p| p.version),
                    image,
                }
            }
        })
        .collect();

    let highlighted = slots.iter().position(|s| s.key == Some(current));

    DisplayList {
        visible: !window.is_empty(),
        slots,
        highlighted,
    }
}
