//! Placeholders for pending panels.
//!
//! While a panel is generating the strip shows a blurred, darkened crop of
//! the frame it was generated from.

use std::collections::HashMap;
use std::io::Cursor;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GenericImageView, RgbImage};

use comic_models::BucketKey;

use crate::error::ClientResult;

/// Issues change-detection versions.
///
/// Versions are wall-clock milliseconds, bumped past the previous value so
/// two assignments in the same millisecond still differ.
#[derive(Debug, Default, Clone)]
pub struct VersionClock {
    last: u64,
}

impl VersionClock {
    pub fn next(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        self.next_at(now)
    }

    pub fn next_at(&mut self, now_ms: u64) -> u64 {
        self.last = now_ms.max(self.last + 1);
        self.last
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// `data:` URI of the derived image.
    pub data: String,
    pub version: u64,
}

/// Placeholders keyed by bucket.
#[derive(Debug, Default)]
pub struct PlaceholderCache {
    entries: HashMap<BucketKey, Placeholder>,
    clock: VersionClock,
}

impl PlaceholderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a placeholder and return its new version.
    pub fn set(&mut self, key: BucketKey, data: impl Into<String>) -> u64 {
        let version = self.clock.next();
        self.entries.insert(
            key,
            Placeholder {
                data: data.into(),
                version,
            },
        );
        version
    }

    /// Drop a placeholder once the real panel is available.
    pub fn clear(&mut self, key: &BucketKey) -> Option<Placeholder> {
        self.entries.remove(key)
    }

    pub fn get(&self, key: &BucketKey) -> Option<&Placeholder> {
        self.entries.get(key)
    }

    pub fn version(&self, key: &BucketKey) -> Option<u64> {
        self.entries.get(key).map(|p| p.version)
    }

    pub fn contains(&self, key: &BucketKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &BucketKey> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How placeholders are derived from a frame.
#[derive(Debug, Clone)]
pub struct PlaceholderStyle {
    /// Edge length of the square output.
    pub size: u32,
    /// Gaussian blur sigma in pixels.
    pub blur: f32,
    /// Fraction of brightness removed, `0.0..=1.0`.
    pub darken: f32,
    pub quality: u8,
}

impl Default for PlaceholderStyle {
    fn default() -> Self {
        Self {
            size: 512,
            blur: 18.0,
            darken: 0.5,
            quality: 82,
        }
    }
}

/// Largest centered square of `image`, resized to `size` x `size`.
pub fn center_square(image: &DynamicImage, size: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    let side = width.min(height);
    let x = (width - side) / 2;
    let y = (height - side) / 2;
    image
        .crop_imm(x, y, side, side)
        .resize_exact(size, size, FilterType::Triangle)
}

/// Derive a placeholder `data:image/jpeg;base64,…` URI from a frame.
pub fn derive_placeholder(frame: &DynamicImage, style: &PlaceholderStyle) -> ClientResult<String> {
    let square = center_square(frame, style.size);
    let blurred = if style.blur > 0.0 {
        square.blur(style.blur)
    } else {
        square
    };

    let mut rgb = blurred.to_rgb8();
    darken(&mut rgb, style.darken);

    let jpeg = encode_jpeg(&rgb, style.quality)?;
    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg)))
}

/// Square JPEG frame to upload for generation.
pub fn square_frame(frame: &DynamicImage, size: u32, quality: u8) -> ClientResult<Vec<u8>> {
    let rgb = center_square(frame, size).to_rgb8();
    encode_jpeg(&rgb, quality)
}

fn darken(image: &mut RgbImage, amount: f32) {
    let keep = (1.0 - amount).clamp(0.0, 1.0);
    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = (*channel as f32 * keep).round() as u8;
        }
    }
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> ClientResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder.encode(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)?;
    Ok(out.into_inner())
}
