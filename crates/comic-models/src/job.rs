//! Generation job records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-side generation state for one panel identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Generating,
    Ready,
    Error,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Generating => "generating",
            JobState::Ready => "ready",
            JobState::Error => "error",
        }
    }

    /// Whether no more updates are expected for this job.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Ready | JobState::Error)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Volatile job record held by the job registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn generating(now: DateTime<Utc>) -> Self {
        Self {
            state: JobState::Generating,
            url: None,
            error: None,
            started_at: now,
        }
    }

    pub fn ready(url: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            state: JobState::Ready,
            url: Some(url.into()),
            error: None,
            started_at: now,
        }
    }

    pub fn failed(message: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            state: JobState::Error,
            url: None,
            error: Some(message.into()),
            started_at: now,
        }
    }

    /// Whether the record is older than `ttl` at `now`.
    pub fn is_expired(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.started_at) > ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_uses_started_at() {
        let start = Utc::now();
        let record = JobRecord::ready("https://cdn/x.jpg", start);
        let ttl = chrono::Duration::minutes(5);
        assert!(!record.is_expired(ttl, start + chrono::Duration::minutes(4)));
        assert!(record.is_expired(ttl, start + chrono::Duration::minutes(6)));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Generating.is_terminal());
        assert!(JobState::Ready.is_terminal());
        assert!(JobState::Error.is_terminal());
    }
}
