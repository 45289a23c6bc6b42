//! Time bucket keys.
//!
//! Every panel is addressed by the 15-second bucket of video time it was
//! captured in. Buckets are written as `MM-SS` (minutes zero-padded to at
//! least two digits), e.g. `01-15` for the bucket starting at 75 seconds.
//!
//! Input also tolerates the `MM:SS` form, which is normalized to the dash
//! form. Anything else is rejected rather than defaulted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Width of one bucket in seconds.
pub const BUCKET_SECONDS: u32 = 15;

/// Maximum number of minute digits accepted on input.
const MAX_MINUTE_DIGITS: usize = 3;

/// Canonical time key (`MM-SS`).
///
/// Ordering follows video time. For keys with two-digit minutes this is the
/// same as comparing the canonical strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    seconds: u32,
}

impl BucketKey {
    /// The `00-00` key.
    pub const ZERO: BucketKey = BucketKey { seconds: 0 };

    /// Key for an exact time, floored to whole seconds.
    ///
    /// Negative and non-finite inputs clamp to zero.
    pub fn from_seconds(seconds: f64) -> Self {
        Self {
            seconds: clamp_whole_seconds(seconds),
        }
    }

    /// Key for whole seconds.
    pub const fn from_whole_seconds(seconds: u32) -> Self {
        Self { seconds }
    }

    /// Key of the bucket containing `seconds` (`floor(s / 15) * 15`).
    pub fn bucket_of(seconds: f64) -> Self {
        let s = clamp_whole_seconds(seconds);
        Self {
            seconds: s - s % BUCKET_SECONDS,
        }
    }

    /// Key of the first bucket boundary strictly after `seconds`.
    pub fn next_bucket_after(seconds: f64) -> Self {
        let current = Self::bucket_of(seconds);
        Self {
            seconds: current.seconds.saturating_add(BUCKET_SECONDS),
        }
    }

    /// Parse a textual timecode (`mm-ss` or `mm:ss`).
    pub fn parse(text: &str) -> Result<Self, BucketParseError> {
        let raw = text.trim();
        if raw.is_empty() {
            return Err(BucketParseError::Empty);
        }

        let (minutes, seconds) = raw
            .split_once('-')
            .or_else(|| raw.split_once(':'))
            .ok_or_else(|| BucketParseError::InvalidFormat(raw.to_string()))?;

        let minute_ok = !minutes.is_empty()
            && minutes.len() <= MAX_MINUTE_DIGITS
            && minutes.bytes().all(|b| b.is_ascii_digit());
        let second_ok = seconds.len() == 2 && seconds.bytes().all(|b| b.is_ascii_digit());
        if !minute_ok || !second_ok {
            return Err(BucketParseError::InvalidFormat(raw.to_string()));
        }

        let mm: u32 = minutes
            .parse()
            .map_err(|_| BucketParseError::InvalidFormat(raw.to_string()))?;
        let ss: u32 = seconds
            .parse()
            .map_err(|_| BucketParseError::InvalidFormat(raw.to_string()))?;
        if ss > 59 {
            return Err(BucketParseError::SecondsOutOfRange(ss));
        }

        Ok(Self {
            seconds: mm * 60 + ss,
        })
    }

    /// Total seconds represented by this key.
    pub const fn to_seconds(&self) -> u32 {
        self.seconds
    }

    /// `MM:SS` form used for badges and log lines.
    pub fn display_colon(&self) -> String {
        format!("{:02}:{:02}", self.seconds / 60, self.seconds % 60)
    }

    /// Every bucket key from `00-00` up to and including `max_seconds`.
    pub fn range_through(max_seconds: f64) -> Vec<BucketKey> {
        let max = clamp_whole_seconds(max_seconds);
        (0..=max)
            .step_by(BUCKET_SECONDS as usize)
            .map(BucketKey::from_whole_seconds)
            .collect()
    }
}

fn clamp_whole_seconds(seconds: f64) -> u32 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    if seconds >= u32::MAX as f64 {
        return u32::MAX;
    }
    seconds.floor() as u32
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.seconds / 60, self.seconds % 60)
    }
}

impl FromStr for BucketKey {
    type Err = BucketParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for BucketKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BucketKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        BucketKey::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Timecode parsing error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BucketParseError {
    #[error("Timecode cannot be empty")]
    Empty,

    #[error("Invalid timecode '{0}'. Use MM-SS or MM:SS")]
    InvalidFormat(String),

    #[error("Seconds field out of range: {0}")]
    SecondsOutOfRange(u32),
}
