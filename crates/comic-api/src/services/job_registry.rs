//! Volatile registry of panel generation jobs.
//!
//! The registry is the only place that decides whether a generation runs:
//! `begin_generating` checks and claims an identity under a single write
//! lock and hands out a token for that claim. Outcomes are written only
//! while the claim is still current, so a cancelled or superseded job can
//! never overwrite a newer record. Records are reaped once they are older
//! than the TTL, whatever their state; after that, artifact existence in the
//! store is the only record of a finished panel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{oneshot, RwLock};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use comic_models::{JobRecord, JobState, PanelIdentity};

use crate::metrics;

/// Identifies one claim on an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenerationToken(Uuid);

impl GenerationToken {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for GenerationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of trying to claim an identity for generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    /// The caller owns a new generation and must run it.
    Created(GenerationToken),
    /// A generation for this identity is already running.
    AlreadyActive,
}

struct Slot {
    record: JobRecord,
    token: GenerationToken,
    /// Running work for a generating record.
    task: Option<AbortHandle>,
}

/// In-memory job registry.
pub struct JobRegistry {
    jobs: RwLock<HashMap<PanelIdentity, Slot>>,
    ttl: chrono::Duration,
}

impl JobRegistry {
    /// Create a registry whose records expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500)),
        }
    }

    /// Current record for an identity. Expired records are not returned even
    /// if the sweeper has not removed them yet.
    pub async fn get(&self, identity: &PanelIdentity) -> Option<JobRecord> {
        let now = Utc::now();
        self.jobs
            .read()
            .await
            .get(identity)
            .filter(|slot| !slot.record.is_expired(self.ttl, now))
            .map(|slot| slot.record.clone())
    }

    /// Claim an identity for generation.
    ///
    /// Ready and error records are replaced; a live generating record is
    /// left untouched.
    pub async fn begin_generating(&self, identity: &PanelIdentity) -> BeginOutcome {
        let now = Utc::now();
        let mut jobs = self.jobs.write().await;

        if let Some(slot) = jobs.get(identity) {
            if slot.record.state == JobState::Generating && !slot.record.is_expired(self.ttl, now) {
                return BeginOutcome::AlreadyActive;
            }
        }

        let token = GenerationToken::new();
        jobs.insert(
            identity.clone(),
            Slot {
                record: JobRecord::generating(now),
                token,
                task: None,
            },
        );
        BeginOutcome::Created(token)
    }

    /// Attach the running work to a claim so it can be cancelled. Returns
    /// false when the claim is gone, in which case the caller should stop
    /// the work itself.
    pub async fn attach(
        &self,
        identity: &PanelIdentity,
        token: GenerationToken,
        task: AbortHandle,
    ) -> bool {
        match self.jobs.write().await.get_mut(identity) {
            Some(slot) if slot.token == token => {
                slot.task = Some(task);
                true
            }
            _ => false,
        }
    }

    /// Whether `token` is still the current claim on `identity`.
    pub async fn holds(&self, identity: &PanelIdentity, token: GenerationToken) -> bool {
        let now = Utc::now();
        self.jobs
            .read()
            .await
            .get(identity)
            .is_some_and(|slot| slot.token == token && !slot.record.is_expired(self.ttl, now))
    }

    /// Mark a generation as finished. Ignored unless `token` is current.
    pub async fn complete(
        &self,
        identity: &PanelIdentity,
        token: GenerationToken,
        url: impl Into<String>,
    ) -> bool {
        self.settle(identity, token, JobRecord::ready(url, Utc::now())).await
    }

    /// Mark a generation as failed. Ignored unless `token` is current.
    pub async fn fail(
        &self,
        identity: &PanelIdentity,
        token: GenerationToken,
        message: impl Into<String>,
    ) -> bool {
        self.settle(identity, token, JobRecord::failed(message, Utc::now())).await
    }

    async fn settle(&self, identity: &PanelIdentity, token: GenerationToken, record: JobRecord) -> bool {
        match self.jobs.write().await.get_mut(identity) {
            Some(slot) if slot.token == token => {
                slot.record = record;
                slot.task = None;
                true
            }
            _ => false,
        }
    }

    /// Stop a running generation and drop its claim. Terminal records are
    /// kept. Returns whether a generation was cancelled.
    pub async fn cancel(&self, identity: &PanelIdentity) -> bool {
        let mut jobs = self.jobs.write().await;
        let running = jobs
            .get(identity)
            .is_some_and(|slot| slot.record.state == JobState::Generating);
        if !running {
            return false;
        }
        if let Some(task) = jobs.remove(identity).and_then(|slot| slot.task) {
            task.abort();
        }
        true
    }

    /// Forget an identity, cancelling any running generation.
    pub async fn remove(&self, identity: &PanelIdentity) -> Option<JobRecord> {
        let slot = self.jobs.write().await.remove(identity)?;
        if let Some(task) = slot.task {
            task.abort();
        }
        Some(slot.record)
    }

    /// Remove every record older than the TTL. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    /// Sweep as if the current time were `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, slot| !slot.record.is_expired(self.ttl, now));
        before - jobs.len()
    }

    /// Live generations.
    pub async fn active(&self) -> usize {
        let now = Utc::now();
        self.jobs
            .read()
            .await
            .values()
            .filter(|slot| {
                slot.record.state == JobState::Generating && !slot.record.is_expired(self.ttl, now)
            })
            .count()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

/// Start the background sweep loop.
    ///
    /// The loop runs until the returned handle is shut down or dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> SweeperHandle {
        let registry = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            info!("Starting job sweeper (interval: {:?})", every);

            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let swept = registry.sweep().await;
                        let size = registry.len().await;
                        metrics::set_registry_size(size);
                        if swept > 0 {
                            metrics::record_jobs_swept(swept);
                            debug!(swept, remaining = size, "Swept expired job records");
                        }
                    }
                }
            }

            info!("Job sweeper stopped");
        });

        SweeperHandle {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

/// Owns the sweep task. Dropping it stops the loop.
pub struct SweeperHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweep loop and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
