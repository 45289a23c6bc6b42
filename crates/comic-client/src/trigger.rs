//! When to ask for a panel.
//!
//! Passive playback generates the bucket being entered. A user action
//! generates the next bucket early and with overwrite. Keyframe hints act as
//! a user action once per session.

use std::collections::HashSet;

use comic_models::{BucketKey, BUCKET_SECONDS};

use crate::error::{ClientError, ClientResult};

/// Below this playback time a resume counts as a replay from the start.
pub const REPLAY_THRESHOLD_SECS: f64 = 0.5;

/// A generation the policy wants started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerRequest {
    pub bucket: BucketKey,
    /// Overwrite an existing panel.
    pub force: bool,
}

/// Per-video timestamps worth generating regardless of playback cadence.
#[derive(Debug, Clone, Default)]
pub struct KeyframeSchedule {
    seconds: HashSet<u32>,
}

impl KeyframeSchedule {
    /// Parse `MM:SS` (or `MM-SS`) stamps.
    pub fn parse<I, S>(stamps: I) -> ClientResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let seconds = stamps
            .into_iter()
            .map(|s| {
                BucketKey::parse(s.as_ref())
                    .map(|k| k.to_seconds())
                    .map_err(|e| ClientError::Rejected(format!("Invalid keyframe: {}", e)))
            })
            .collect::<ClientResult<HashSet<_>>>()?;
        Ok(Self { seconds })
    }

    pub fn contains(&self, whole_seconds: u32) -> bool {
        self.seconds.contains(&whole_seconds)
    }

    pub fn is_empty(&self) -> bool {
        self.seconds.is_empty()
    }
}

/// Session-scoped trigger markers.
#[derive(Debug, Default)]
pub struct TriggerPolicy {
    /// Last bucket the passive path looked at.
    last_considered: Option<BucketKey>,
    /// Intervals (floor buckets) in which the user acted.
    acted: HashSet<BucketKey>,
    /// Buckets requested by user actions.
    requested: HashSet<BucketKey>,
    /// Keyframe stamps already handled.
    fired: HashSet<u32>,
}

impl TriggerPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Passive tick at playback time `time`.
    pub fn on_tick(&mut self, time: f64) -> Option<TriggerRequest> {
        let bucket = BucketKey::bucket_of(time);
        if self.last_considered == Some(bucket) {
            return None;
        }
        self.last_considered = Some(bucket);

        // 00-00 is usually a title card.
        if bucket == BucketKey::ZERO {
            return None;
        }
        if self.acted.contains(&bucket) || self.requested.contains(&bucket) {
            return None;
        }
        Some(TriggerRequest {
            bucket,
            force: false,
        })
    }

    /// Explicit user request at playback time `time`. Always proceeds.
    pub fn on_user_action(&mut self, time: f64) -> TriggerRequest {
        self.acted.insert(BucketKey::bucket_of(time));
        let bucket = BucketKey::next_bucket_after(time);
        self.requested.insert(bucket);
        TriggerRequest {
            bucket,
            force: true,
        }
    }

    /// Fire a keyframe hint if `time` sits on an unfired stamp and the user
    /// has not acted in this interval.
    pub fn on_keyframe(&mut self, time: f64, schedule: &KeyframeSchedule) -> Option<TriggerRequest> {
        if schedule.is_empty() || !time.is_finite() || time < 0.0 {
            return None;
        }
        let stamp = BucketKey::from_seconds(time).to_seconds();
        if !schedule.contains(stamp) || !self.fired.insert(stamp) {
            return None;
        }
        if self.acted.contains(&BucketKey::bucket_of(time)) {
            return None;
        }
        Some(self.on_user_action(time))
    }

    /// Whether the user acted in the interval containing `time`.
    pub fn user_acted_at(&self, time: f64) -> bool {
        self.acted.contains(&BucketKey::bucket_of(time))
    }

    /// Forget every marker. Used after a seek.
    pub fn reset(&mut self) {
        self.last_considered = None;
        self.acted.clear();
        self.requested.clear();
        self.fired.clear();
    }

    /// Playback resumed at `time`. Returns whether markers were reset.
    pub fn on_resume(&mut self, time: f64) -> bool {
        if time < REPLAY_THRESHOLD_SECS {
            self.acted.clear();
            self.requested.clear();
            self.fired.clear();
            true
        } else {
            false
        }
    }
}

/// Seek destination for a skip of `delta` seconds, floored to a bucket start.
pub fn seek_target(current: f64, delta: f64) -> f64 {
    let target = (current + delta).max(0.0);
    let bucket = BUCKET_SECONDS as f64;
    (target / bucket).floor() * bucket
}
