//! Playback session.
//!
//! One [`PanelSession`] holds everything the client knows about a video's
//! panels while it plays: ready panels, placeholders, in-flight requests and
//! trigger markers. [`PanelSync`] drives it from three activities: a startup
//! discovery scan, a trigger tick and a render tick.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use comic_models::{BucketKey, PanelIdentity, PanelStatus};

use crate::api::PanelApi;
use crate::error::{ClientError, ClientResult};
use crate::panels::{AvailablePanel, AvailablePanels};
use crate::placeholder::{derive_placeholder, square_frame, PlaceholderCache, PlaceholderStyle};
use crate::prober::{discovery_keys, probe_ready, scan, DiscoveryConfig, ScanReport};
use crate::render::{render_strip, DisplayList, RenderChange};
use crate::trigger::{seek_target, KeyframeSchedule, TriggerPolicy, TriggerRequest};
use crate::window::{compute_window, WindowConfig};

/// Content type of uploaded frames.
const FRAME_CONTENT_TYPE: &str = "image/jpeg";

/// How often duration metadata is checked while waiting for it.
const METADATA_POLL: Duration = Duration::from_millis(100);

/// Session timing and sizing.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Status polls after a generation request before giving up.
    pub poll_attempts: u32,
    pub poll_interval: Duration,
    pub trigger_interval: Duration,
    pub render_interval: Duration,
    pub window: WindowConfig,
    pub discovery: DiscoveryConfig,
    pub placeholder: PlaceholderStyle,
    /// Edge length of uploaded frames.
    pub frame_size: u32,
    pub frame_quality: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_attempts: 30,
            poll_interval: Duration::from_secs(5),
            trigger_interval: Duration::from_secs(5),
            render_interval: Duration::from_millis(250),
            window: WindowConfig::default(),
            discovery: DiscoveryConfig::default(),
            placeholder: PlaceholderStyle::default(),
            frame_size: 1024,
            frame_quality: 85,
        }
    }
}

/// Client state for one (video, style) playback.
#[derive(Debug)]
pub struct PanelSession {
    video: String,
    style: String,
    available: AvailablePanels,
    placeholders: PlaceholderCache,
    in_flight: HashSet<BucketKey>,
    trigger: TriggerPolicy,
    keyframes: KeyframeSchedule,
    last_render: Option<DisplayList>,
}

impl PanelSession {
    pub fn new(video: impl Into<String>, style: impl Into<String>) -> Self {
        Self {
            video: video.into(),
            style: style.into(),
            available: AvailablePanels::new(),
            placeholders: PlaceholderCache::new(),
            in_flight: HashSet::new(),
            trigger: TriggerPolicy::new(),
            keyframes: KeyframeSchedule::default(),
            last_render: None,
        }
    }

    pub fn with_keyframes(mut self, keyframes: KeyframeSchedule) -> Self {
        self.keyframes = keyframes;
        self
    }

    pub fn identity(&self, bucket: BucketKey) -> PanelIdentity {
        PanelIdentity::new(self.video.clone(), self.style.clone(), bucket)
    }

    pub fn available(&self) -> &AvailablePanels {
        &self.available
    }

    pub fn placeholders(&self) -> &PlaceholderCache {
        &self.placeholders
    }

    /// Keys with a ready panel or a placeholder.
    pub fn known_keys(&self) -> BTreeSet<BucketKey> {
        self.available
            .keys()
            .chain(self.placeholders.keys())
            .copied()
            .collect()
    }

    /// Record a ready panel. Its placeholder goes away.
    pub fn mark_available(&mut self, key: BucketKey, url: impl Into<String>, regenerated: bool) -> u64 {
        self.placeholders.clear(&key);
        if regenerated {
            self.available.refresh(key, url)
        } else {
            self.available.upsert(key, url)
        }
    }

    /// Show a placeholder while `key` generates. A key with a ready panel
    /// keeps showing that panel, so nothing is recorded for it.
    pub fn mark_pending(&mut self, key: BucketKey, placeholder: String) -> Option<u64> {
        if self.available.contains(&key) {
            return None;
        }
        Some(self.placeholders.set(key, placeholder))
    }

    pub fn clear_pending(&mut self, key: &BucketKey) {
        self.placeholders.clear(key);
    }

    /// Drop a panel from the session. Returns the ready panel, if there was
    /// one, so a failed delete can put it back.
    pub fn forget(&mut self, key: &BucketKey) -> Option<AvailablePanel> {
        self.placeholders.clear(key);
        self.available.remove(key)
    }

    /// Put back a panel taken out by [`forget`](Self::forget).
    pub fn restore(&mut self, key: BucketKey, panel: AvailablePanel) {
        self.placeholders.clear(&key);
        self.available.restore(key, panel);
    }

    /// Claim a key for a client-side request. False if already in flight.
    pub fn begin_request(&mut self, key: BucketKey) -> bool {
        self.in_flight.insert(key)
    }

    pub fn finish_request(&mut self, key: &BucketKey) {
        self.in_flight.remove(key);
    }

    pub fn is_in_flight(&self, key: &BucketKey) -> bool {
        self.in_flight.contains(key)
    }

    pub fn trigger_mut(&mut self) -> &mut TriggerPolicy {
        &mut self.trigger
    }

    /// Drop markers scoped to the old playback position.
    pub fn reset_for_seek(&mut self) {
        self.trigger.reset();
        self.last_render = None;
    }

    /// Render the strip for `time` and diff it against the last render.
    pub fn render(&mut self, time: f64, config: &WindowConfig) -> RenderUpdate {
        let window = compute_window(time, &self.known_keys(), config);
        let list = render_strip(
            &window,
            &self.available,
            &self.placeholders,
            BucketKey::bucket_of(time),
        );
        let change = list.diff(self.last_render.as_ref());
        self.last_render = Some(list.clone());
        RenderUpdate { list, change }
    }
}

/// A rendered strip plus what changed since the previous render.
#[derive(Debug, Clone)]
pub struct RenderUpdate {
    pub list: DisplayList,
    pub change: RenderChange,
}

/// The media element the session follows.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Current playback position in seconds.
    fn current_time(&self) -> f64;

    /// Media duration, once known.
    fn duration(&self) -> Option<f64>;

    /// Move playback to `seconds`.
    fn seek_to(&self, seconds: f64);

    /// Grab the frame currently on screen.
    async fn capture_frame(&self) -> ClientResult<DynamicImage>;
}

/// Result of pursuing one panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    Ready(String),
    /// This client is already pursuing the key.
    AlreadyInFlight,
    Failed(String),
    /// Polling gave up. The key can be requested again.
    TimedOut,
}

/// Drives a [`PanelSession`] against the panel server.
#[derive(Clone)]
pub struct PanelSync {
    api: Arc<dyn PanelApi>,
    frames: Arc<dyn FrameSource>,
    session: Arc<Mutex<PanelSession>>,
    config: SessionConfig,
}

impl PanelSync {
    pub fn new(
        api: Arc<dyn PanelApi>,
        frames: Arc<dyn FrameSource>,
        session: PanelSession,
        config: SessionConfig,
    ) -> Self {
        Self {
            api,
            frames,
            session: Arc::new(Mutex::new(session)),
            config,
        }
    }

    pub fn session(&self) -> &Arc<Mutex<PanelSession>> {
        &self.session
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get a panel ready, generating it if needed.
    ///
    /// Without `force` a panel already known or ready on the server is used
    /// as is. With `force` a new generation always starts.
    pub async fn ensure_panel(&self, key: BucketKey, force: bool) -> EnsureOutcome {
        let identity = {
            let mut session = self.session.lock().await;
            if !force {
                if let Some(panel) = session.available.get(&key) {
                    return EnsureOutcome::Ready(panel.url.clone());
                }
            }
            if !session.begin_request(key) {
                debug!(bucket = %key, "Already in flight");
                return EnsureOutcome::AlreadyInFlight;
            }
            session.identity(key)
        };

        let outcome = match self.pursue(&identity, force).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(panel = %identity, error = %e, "Panel request failed");
                self.session.lock().await.clear_pending(&key);
                EnsureOutcome::Failed(e.to_string())
            }
        };

        self.session.lock().await.finish_request(&key);
        outcome
    }

    /// Delete a panel. It leaves the strip at once and comes back if the
    /// server does not confirm the delete.
    pub async fn delete_panel(&self, key: BucketKey) -> ClientResult<()> {
        let (identity, previous) = {
            let mut session = self.session.lock().await;
            (session.identity(key), session.forget(&key))
        };

        let refused = match self.api.delete(&identity).await {
            Ok(PanelStatus::Deleted { .. }) => {
                info!(panel = %identity, "Panel deleted");
                return Ok(());
            }
            Ok(PanelStatus::Error { message }) => ClientError::DeleteRefused(message),
            Ok(other) => ClientError::DeleteRefused(other.as_str().to_string()),
            Err(e) => e,
        };

        warn!(panel = %identity, error = %refused, "Delete failed, restoring panel");
        if let Some(panel) = previous {
            self.session.lock().await.restore(key, panel);
        }
        Err(refused)
    }

    async fn pursue(&self, identity: &PanelIdentity, force: bool) -> ClientResult<EnsureOutcome> {
        let key = identity.bucket;
        let mut status = self.api.status(identity).await?;

        if let PanelStatus::Ready { url } = &status {
            self.session.lock().await.mark_available(key, url.clone(), false);
            if !force {
                return Ok(EnsureOutcome::Ready(url.clone()));
            }
            info!(panel = %identity, "Force overwrite requested, regenerating");
        }

        if force || status == PanelStatus::Missing {
            let (frame, placeholder) = self.capture().await?;
            if let Some(placeholder) = placeholder {
                self.session.lock().await.mark_pending(key, placeholder);
            }
            info!(panel = %identity, bytes = frame.len(), force, "Requesting generation");
            status = self
                .api
                .generate(identity, frame, FRAME_CONTENT_TYPE, force)
                .await?;
            if let PanelStatus::Error { message } = status {
                self.session.lock().await.clear_pending(&key);
                return Ok(EnsureOutcome::Failed(message));
            }
        }

        self.poll(identity, force).await
    }

    /// Poll until ready, failed, or out of attempts.
    async fn poll(&self, identity: &PanelIdentity, regenerated: bool) -> ClientResult<EnsureOutcome> {
        let key = identity.bucket;

        for attempt in 1..=self.config.poll_attempts {
            match self.api.status(identity).await? {
                PanelStatus::Ready { url } => {
                    info!(panel = %identity, url = %url, "Panel ready");
                    self.session.lock().await.mark_available(key, url.clone(), regenerated);
                    return Ok(EnsureOutcome::Ready(url));
                }
                PanelStatus::Error { message } => {
                    warn!(panel = %identity, message = %message, "Generation failed");
                    self.session.lock().await.clear_pending(&key);
                    return Ok(EnsureOutcome::Failed(message));
                }
                other => {
                    if attempt % 2 == 0 {
                        debug!(panel = %identity, status = other.as_str(), attempt, "Waiting for panel");
                    }
                }
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }

        info!(panel = %identity, "Timed out waiting for panel");
        Ok(EnsureOutcome::TimedOut)
    }

    /// Capture the current frame and derive the upload and placeholder from
    /// it off the async runtime.
    async fn capture(&self) -> ClientResult<(Vec<u8>, Option<String>)> {
        let frame = self.frames.capture_frame().await?;
        let style = self.config.placeholder.clone();
        let size = self.config.frame_size;
        let quality = self.config.frame_quality;

        tokio::task::spawn_blocking(move || {
            let placeholder = match derive_placeholder(&frame, &style) {
                Ok(uri) => Some(uri),
                Err(e) => {
                    debug!(error = %e, "Placeholder derivation failed");
                    None
                }
            };
            square_frame(&frame, size, quality).map(|bytes| (bytes, placeholder))
        })
        .await
        .map_err(|e| ClientError::Task(e.to_string()))?
    }

    /// Discovery scan over the video's buckets, recording ready panels as
    /// they are found.
    pub async fn prefetch(&self) -> ScanReport {
        let duration = self.wait_for_duration().await;
        let keys = discovery_keys(duration, &self.config.discovery);
        let (video, style) = {
            let session = self.session.lock().await;
            (session.video.clone(), session.style.clone())
        };
        info!(video = %video, style = %style, keys = keys.len(), "Discovering panels");

        let report = scan(keys, &self.config.discovery.scan_options(), |key| {
            let api = Arc::clone(&self.api);
            let session = Arc::clone(&self.session);
            let identity = PanelIdentity::new(video.clone(), style.clone(), key);
            async move {
                let found = probe_ready(api.as_ref(), &identity).await?;
                if let Some(url) = &found {
                    session.lock().await.mark_available(key, url.clone(), false);
                }
                Ok(found)
            }
        })
        .await;

        info!(
            found = report.found.len(),
            probed = report.probed,
            "Discovery finished"
        );
        report
    }

    async fn wait_for_duration(&self) -> Option<f64> {
        let deadline = Instant::now() + self.config.discovery.metadata_wait;
        loop {
            if let Some(duration) = self.frames.duration().filter(|d| d.is_finite() && *d > 0.0) {
                return Some(duration);
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(METADATA_POLL).await;
        }
    }

    /// Passive trigger for the bucket being played.
    pub async fn trigger_tick(&self) -> Option<JoinHandle<EnsureOutcome>> {
        let time = self.frames.current_time();
        let request = self.session.lock().await.trigger.on_tick(time)?;
        Some(self.dispatch(request))
    }

    /// Fire a keyframe hint if playback sits on one.
    pub async fn keyframe_tick(&self) -> Option<JoinHandle<EnsureOutcome>> {
        let time = self.frames.current_time();
        let request = {
            let mut session = self.session.lock().await;
            let PanelSession {
                trigger, keyframes, ..
            } = &mut *session;
            trigger.on_keyframe(time, keyframes)?
        };
        Some(self.dispatch(request))
    }

    /// Explicit user request: generate the next bucket with overwrite.
    pub async fn user_action(&self) -> JoinHandle<EnsureOutcome> {
        let time = self.frames.current_time();
        let request = self.session.lock().await.trigger.on_user_action(time);
        self.dispatch(request)
    }

    fn dispatch(&self, request: TriggerRequest) -> JoinHandle<EnsureOutcome> {
        let sync = self.clone();
        debug!(bucket = %request.bucket, force = request.force, "Trigger");
        tokio::spawn(async move { sync.ensure_panel(request.bucket, request.force).await })
    }

    /// Skip by `delta` seconds onto a bucket start.
    pub async fn seek_by(&self, delta: f64) -> f64 {
        let target = seek_target(self.frames.current_time(), delta);
        self.frames.seek_to(target);
        self.session.lock().await.reset_for_seek();
        info!(target, "Skipped to bucket");
        target
    }

    /// Playback resumed. Replaying from the start re-arms triggers.
    pub async fn resume(&self) -> bool {
        let time = self.frames.current_time();
        self.session.lock().await.trigger.on_resume(time)
    }

    pub async fn render_tick(&self) -> RenderUpdate {
        let time = self.frames.current_time();
        self.session.lock().await.render(time, &self.config.window)
    }

    /// Run discovery plus the render and trigger loops until shut down.
    ///
    /// Render updates other than [`RenderChange::Unchanged`] are sent on the
    /// returned channel.
    pub fn spawn_loops(&self) -> (SessionLoops, mpsc::Receiver<RenderUpdate>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (render_tx, render_rx) = mpsc::channel(16);

        let discovery = {
            let sync = self.clone();
            let mut shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = shutdown.changed() => {}
                    _ = sync.prefetch() => {}
                }
            })
        };

        let render = {
            let sync = self.clone();
            let mut shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                let mut ticker = interval(sync.config.render_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = ticker.tick() => {
                            sync.keyframe_tick().await;
                            let update = sync.render_tick().await;
                            if update.change != RenderChange::Unchanged
                                && render_tx.send(update).await.is_err()
                            {
                                break;
                            }
                        }
                    }
                }
            })
        };

        let trigger = {
            let sync = self.clone();
            let mut shutdown = shutdown_rx;
            tokio::spawn(async move {
                let mut ticker = interval(sync.config.trigger_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = ticker.tick() => {
                            sync.trigger_tick().await;
                        }
                    }
                }
            })
        };

        let loops = SessionLoops {
            shutdown_tx,
            tasks: vec![discovery, render, trigger],
        };
        (loops, render_rx)
    }
}

/// Running session loops. Dropping this stops them.
pub struct SessionLoops {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionLoops {
    /// Stop the loops and wait for them to exit. Panel requests already
    /// dispatched keep running.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

impl Drop for SessionLoops {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use image::{Rgb, RgbImage};

    /// Scripted server: queued statuses per bucket, then a default.
    #[derive(Default)]
    struct FakeApi {
        statuses: StdMutex<HashMap<BucketKey, VecDeque<PanelStatus>>>,
        generate_reply: StdMutex<Option<PanelStatus>>,
        delete_reply: StdMutex<Option<PanelStatus>>,
        status_calls: AtomicUsize,
        generate_calls: AtomicUsize,
        forced: StdMutex<Vec<bool>>,
    }

    impl FakeApi {
        fn script(&self, key: BucketKey, statuses: Vec<PanelStatus>) {
            self.statuses.lock().unwrap().insert(key, statuses.into());
        }
    }

    #[async_trait]
    impl PanelApi for FakeApi {
        async fn status(&self, identity: &PanelIdentity) -> ClientResult<PanelStatus> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            let mut statuses = self.statuses.lock().unwrap();
            let queue = statuses.entry(identity.bucket).or_default();
            let status = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            Ok(status.unwrap_or(PanelStatus::Missing))
        }

        async fn generate(
            &self,
            _: &PanelIdentity,
            frame: Vec<u8>,
            content_type: &str,
            force: bool,
        ) -> ClientResult<PanelStatus> {
            assert!(!frame.is_empty());
            assert_eq!(content_type, "image/jpeg");
            self.generate_calls.fetch_add(1, Ordering::SeqCst);
            self.forced.lock().unwrap().push(force);
            Ok(self
                .generate_reply
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(PanelStatus::Generating))
        }

        async fn delete(&self, identity: &PanelIdentity) -> ClientResult<PanelStatus> {
            Ok(self
                .delete_reply
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| PanelStatus::Deleted {
                    key: identity.object_path(),
                }))
        }
    }

    struct FakePlayer {
        time: StdMutex<f64>,
        duration: Option<f64>,
    }

    impl FakePlayer {
        fn at(time: f64) -> Self {
            Self {
                time: StdMutex::new(time),
                duration: Some(60.0),
            }
        }

        fn set(&self, time: f64) {
            *self.time.lock().unwrap() = time;
        }
    }

    #[async_trait]
    impl FrameSource for FakePlayer {
        fn current_time(&self) -> f64 {
            *self.time.lock().unwrap()
        }
        fn duration(&self) -> Option<f64> {
            self.duration
        }
        fn seek_to(&self, seconds: f64) {
            self.set(seconds);
        }
        async fn capture_frame(&self) -> ClientResult<DynamicImage> {
            Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
                64,
                48,
                Rgb([120, 90, 60]),
            )))
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            poll_attempts: 3,
            poll_interval: Duration::from_millis(10),
            frame_size: 32,
            placeholder: PlaceholderStyle {
                size: 16,
                blur: 1.0,
                ..PlaceholderStyle::default()
            },
            discovery: DiscoveryConfig {
                delay: Duration::ZERO,
                ..DiscoveryConfig::default()
            },
            ..SessionConfig::default()
        }
    }

    fn sync_with(api: Arc<FakeApi>, player: Arc<FakePlayer>) -> PanelSync {
        PanelSync::new(api, player, PanelSession::new("bbb", "noir"), config())
    }

    fn key(s: u32) -> BucketKey {
        BucketKey::from_whole_seconds(s)
    }

    #[tokio::test]
    async fn test_ensure_uses_ready_server_panel_without_generating() {
        let api = Arc::new(FakeApi::default());
        api.script(key(30), vec![PanelStatus::ready("https://cdn/30.jpg")]);
        let sync = sync_with(api.clone(), Arc::new(FakePlayer::at(31.0)));

        assert_eq!(
            sync.ensure_panel(key(30), false).await,
            EnsureOutcome::Ready("https://cdn/30.jpg".into())
        );
        assert_eq!(api.generate_calls.load(Ordering::SeqCst), 0);

        // Known locally now; no further status calls.
        let calls = api.status_calls.load(Ordering::SeqCst);
        sync.ensure_panel(key(30), false).await;
        assert_eq!(api.status_calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_missing_panel_is_generated_and_polled() {
        let api = Arc::new(FakeApi::default());
        api.script(
            key(30),
            vec![
                PanelStatus::Missing,
                PanelStatus::Generating,
                PanelStatus::ready("https://cdn/30.jpg"),
            ],
        );
        let sync = sync_with(api.clone(), Arc::new(FakePlayer::at(31.0)));

        let outcome = sync.ensure_panel(key(30), false).await;
        assert_eq!(outcome, EnsureOutcome::Ready("https://cdn/30.jpg".into()));
        assert_eq!(api.generate_calls.load(Ordering::SeqCst), 1);

        let session = sync.session().lock().await;
        assert!(session.available().contains(&key(30)));
        assert!(!session.placeholders().contains(&key(30)));
        assert!(!session.is_in_flight(&key(30)));
    }

    #[tokio::test]
    async fn test_failure_clears_placeholder() {
        let api = Arc::new(FakeApi::default());
        api.script(
            key(45),
            vec![PanelStatus::Missing, PanelStatus::error("No image returned")],
        );
        let sync = sync_with(api.clone(), Arc::new(FakePlayer::at(46.0)));

        assert_eq!(
            sync.ensure_panel(key(45), false).await,
            EnsureOutcome::Failed("No image returned".into())
        );
        let session = sync.session().lock().await;
        assert!(session.known_keys().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_keeps_placeholder_and_allows_retry() {
        let api = Arc::new(FakeApi::default());
        api.script(key(15), vec![PanelStatus::Missing, PanelStatus::Generating]);
        let sync = sync_with(api.clone(), Arc::new(FakePlayer::at(16.0)));

        assert_eq!(sync.ensure_panel(key(15), false).await, EnsureOutcome::TimedOut);
        {
            let session = sync.session().lock().await;
            assert!(session.placeholders().contains(&key(15)));
            assert!(!session.is_in_flight(&key(15)));
        }
        // Server still says generating, so no second POST.
        sync.ensure_panel(key(15), false).await;
        assert_eq!(api.generate_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_forced_regeneration_keeps_ready_panel_without_placeholder() {
        let api = Arc::new(FakeApi::default());
        api.script(
            key(30),
            vec![PanelStatus::ready("https://cdn/30.jpg"), PanelStatus::Generating],
        );
        let sync = sync_with(api.clone(), Arc::new(FakePlayer::at(31.0)));

        sync.ensure_panel(key(30), false).await;
        assert_eq!(sync.ensure_panel(key(30), true).await, EnsureOutcome::TimedOut);
        assert_eq!(*api.forced.lock().unwrap(), vec![true]);

        let session = sync.session().lock().await;
        assert!(session.available().contains(&key(30)));
        assert!(!session.placeholders().contains(&key(30)));
    }

    #[test]
    fn test_pending_and_available_are_exclusive() {
        let mut session = PanelSession::new("bbb", "noir");
        assert!(session.mark_pending(key(15), "data:a".into()).is_some());

        session.mark_available(key(15), "https://cdn/15.jpg", false);
        assert!(!session.placeholders().contains(&key(15)));
        assert_eq!(session.mark_pending(key(15), "data:b".into()), None);
        assert!(!session.placeholders().contains(&key(15)));
    }

    #[tokio::test]
    async fn test_delete_panel_removes_and_rolls_back_on_refusal() {
        let api = Arc::new(FakeApi::default());
        let sync = sync_with(api.clone(), Arc::new(FakePlayer::at(0.0)));
        let version = {
            let mut session = sync.session().lock().await;
            session.mark_available(key(15), "https://cdn/15.jpg", false);
            session.mark_available(key(30), "https://cdn/30.jpg", false)
        };

        tokio_test::assert_ok!(sync.delete_panel(key(15)).await);
        assert!(!sync.session().lock().await.available().contains(&key(15)));

        *api.delete_reply.lock().unwrap() = Some(PanelStatus::error("bucket offline"));
        let err = tokio_test::assert_err!(sync.delete_panel(key(30)).await);
        assert!(matches!(err, ClientError::DeleteRefused(m) if m == "bucket offline"));

        let session = sync.session().lock().await;
        let restored = session.available().get(&key(30)).unwrap();
        assert_eq!(restored.url, "https://cdn/30.jpg");
        assert_eq!(restored.version, version);
    }

    #[tokio::test]
    async fn test_in_flight_guard() {
        let api = Arc::new(FakeApi::default());
        let sync = sync_with(api, Arc::new(FakePlayer::at(0.0)));
        sync.session().lock().await.begin_request(key(60));
        assert_eq!(
            sync.ensure_panel(key(60), true).await,
            EnsureOutcome::AlreadyInFlight
        );
    }

    #[tokio::test]
    async fn test_user_action_forces_next_bucket() {
        let api = Arc::new(FakeApi::default());
        api.script(
            key(30),
            vec![
                PanelStatus::ready("https://cdn/30.jpg"),
                PanelStatus::ready("https://cdn/30.jpg"),
            ],
        );
        let sync = sync_with(api.clone(), Arc::new(FakePlayer::at(22.0)));

        let outcome = sync.user_action().await.await.unwrap();
        assert_eq!(outcome, EnsureOutcome::Ready("https://cdn/30.jpg".into()));
        assert_eq!(*api.forced.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_trigger_tick_follows_playback() {
        let api = Arc::new(FakeApi::default());
        api.script(key(15), vec![PanelStatus::ready("https://cdn/15.jpg")]);
        let player = Arc::new(FakePlayer::at(5.0));
        let sync = sync_with(api, player.clone());

        assert!(sync.trigger_tick().await.is_none());
        player.set(16.0);
        let handle = sync.trigger_tick().await.unwrap();
        assert_eq!(
            handle.await.unwrap(),
            EnsureOutcome::Ready("https://cdn/15.jpg".into())
        );
        assert!(sync.trigger_tick().await.is_none());
    }

    #[tokio::test]
    async fn test_seek_resets_triggers() {
        let api = Arc::new(FakeApi::default());
        let player = Arc::new(FakePlayer::at(37.0));
        let sync = sync_with(api, player.clone());

        sync.session().lock().await.trigger_mut().on_tick(37.0);
        assert_eq!(sync.seek_by(-15.0).await, 15.0);
        assert_eq!(player.current_time(), 15.0);

        player.set(37.0);
        assert!(sync.session().lock().await.trigger_mut().on_tick(37.0).is_some());
    }

    #[tokio::test]
    async fn test_prefetch_then_render() {
        let api = Arc::new(FakeApi::default());
        api.script(key(15), vec![PanelStatus::ready("https://cdn/15.jpg")]);
        api.script(key(45), vec![PanelStatus::ready("https://cdn/45.jpg")]);
        let player = Arc::new(FakePlayer::at(20.0));
        let sync = sync_with(api, player.clone());

        let report = sync.prefetch().await;
        assert_eq!(report.found.len(), 2);
        assert_eq!(report.probed, 5);

        let first = sync.render_tick().await;
        assert!(first.list.visible);
        assert_eq!(first.change, RenderChange::Rebuild);
        assert_eq!(first.list.highlighted, Some(0));

        assert_eq!(sync.render_tick().await.change, RenderChange::Unchanged);
        player.set(46.0);
        assert_eq!(sync.render_tick().await.change, RenderChange::HighlightOnly);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_loops_emit_renders_and_stop() {
        let api = Arc::new(FakeApi::default());
        api.script(key(15), vec![PanelStatus::ready("https://cdn/15.jpg")]);
        let sync = sync_with(api, Arc::new(FakePlayer::at(16.0)));

        let (loops, mut renders) = sync.spawn_loops();
        let mut saw_visible = false;
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(250)).await;
            while let Ok(update) = renders.try_recv() {
                saw_visible |= update.list.visible;
            }
            if saw_visible {
                break;
            }
        }
        loops.shutdown().await;
        assert!(saw_visible);
    }
}
