//! Bounded-concurrency panel probing.
//!
//! Used for discovery when playback starts and by the audit tool to walk a
//! whole video. Results arrive in completion order, not key order.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use tracing::debug;

use comic_models::{BucketKey, PanelIdentity, PanelStatus};

use crate::api::PanelApi;
use crate::error::ClientResult;

/// Scan limits.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Maximum probes in flight.
    pub concurrency: usize,
    /// Stop once this many panels are found.
    pub stop_after: Option<usize>,
    /// Stop once this much time has passed.
    pub budget: Option<Duration>,
    /// Pause after each probe.
    pub delay: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            stop_after: None,
            budget: None,
            delay: Duration::ZERO,
        }
    }
}

impl ScanOptions {
    /// Full-range audit: eight probes at a time, no early stop.
    pub fn audit() -> Self {
        Self {
            concurrency: 8,
            ..Self::default()
        }
    }
}

/// Discovery-on-load settings.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Stop once this many panels are confirmed.
    pub min_found: usize,
    pub concurrency: usize,
    /// Delay between probes on each lane.
    pub delay: Duration,
    /// How long to wait for the video duration to become known.
    pub metadata_wait: Duration,
    /// Range scanned when the duration never becomes known.
    pub fallback_duration: Duration,
    /// Upper bound on the scanned range.
    pub max_duration: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            min_found: 6,
            concurrency: 4,
            delay: Duration::from_millis(40),
            metadata_wait: Duration::from_secs(5),
            fallback_duration: Duration::from_secs(600),
            max_duration: Duration::from_secs(3600),
        }
    }
}

impl DiscoveryConfig {
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            concurrency: self.concurrency,
            stop_after: Some(self.min_found),
            budget: None,
            delay: self.delay,
        }
    }
}

/// Keys to probe during discovery for a video of the given duration.
pub fn discovery_keys(duration: Option<f64>, config: &DiscoveryConfig) -> Vec<BucketKey> {
    let max = config.max_duration.as_secs_f64();
    let span = duration
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or_else(|| config.fallback_duration.as_secs_f64())
        .min(max);
    BucketKey::range_through(span)
}

/// Snapshot passed to progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanProgress {
    pub probed: usize,
    pub total: usize,
    pub found: usize,
}

/// Outcome of a scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Ready panels by key.
    pub found: BTreeMap<BucketKey, String>,
    /// Number of probes that completed.
    pub probed: usize,
    /// Probes that failed outright.
    pub errors: usize,
    /// Whether the scan ended before every key was probed.
    pub stopped_early: bool,
}

/// Probe `keys` with at most `options.concurrency` probes in flight.
///
/// `probe` resolves to the panel URL when the key is ready.
pub async fn scan<F, Fut>(keys: Vec<BucketKey>, options: &ScanOptions, probe: F) -> ScanReport
where
    F: Fn(BucketKey) -> Fut,
    Fut: Future<Output = ClientResult<Option<String>>>,
{
    scan_with_progress(keys, options, probe, |_| {}).await
}

/// [`scan`] with a callback after every completed probe.
pub async fn scan_with_progress<F, Fut, P>(
    keys: Vec<BucketKey>,
    options: &ScanOptions,
    probe: F,
    mut progress: P,
) -> ScanReport
where
    F: Fn(BucketKey) -> Fut,
    Fut: Future<Output = ClientResult<Option<String>>>,
    P: FnMut(ScanProgress),
{
    let total = keys.len();
    let delay = options.delay;
    let deadline = options.budget.map(|b| Instant::now() + b);
    let mut report = ScanReport::default();

    let mut results = stream::iter(keys)
        .map(|key| {
            let pending = probe(key);
            async move {
                let result = pending.await;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                (key, result)
            }
        })
        .buffer_unordered(options.concurrency.max(1));

    loop {
        let next = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, results.next()).await {
                Ok(next) => next,
                Err(_) => {
                    debug!(probed = report.probed, "Scan budget exhausted");
                    report.stopped_early = true;
                    break;
                }
            },
            None => results.next().await,
        };
        let Some((key, result)) = next else { break };

        report.probed += 1;
        match result {
            Ok(Some(url)) => {
                report.found.insert(key, url);
            }
            Ok(None) => {}
            Err(e) => {
                debug!(bucket = %key, error = %e, "Probe failed");
                report.errors += 1;
            }
        }

        progress(ScanProgress {
            probed: report.probed,
            total,
            found: report.found.len(),
        });

        if options.stop_after.is_some_and(|n| report.found.len() >= n) {
            report.stopped_early = report.probed < total;
            break;
        }
    }

    report
}

/// Probe one panel through the server API. Only `ready` counts as found.
pub async fn probe_ready(api: &dyn PanelApi, identity: &PanelIdentity) -> ClientResult<Option<String>> {
    match api.status(identity).await? {
        PanelStatus::Ready { url } => Ok(Some(url)),
        _ => Ok(None),
    }
}
