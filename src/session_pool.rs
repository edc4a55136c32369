//! Pool of reusable remote browser sessions.
//!
//! Records move `available -> in_use -> (available | deleted)`. Access is
//! optimistic: two callers may both claim the same record, which at worst
//! costs one failed attempt and a retry with a fresh session.

use crate::error::{Result, ScoutError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Idle seconds after which a pooled session is deleted instead of reused
pub const REUSE_WINDOW_SECS: i64 = 55;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Available,
    InUse,
}

/// Most recently released session, as offered by the store
#[derive(Debug, Clone, PartialEq)]
pub struct SessionCandidate {
    pub id: String,
    pub session_id: String,
    pub last_used_at: DateTime<Utc>,
    /// Idle since before the cutoff passed to the lookup
    pub stale: bool,
}

/// Persistence for pooled session records
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Newest available record, if any, flagged stale when it was last used
    /// before `cutoff`
    async fn get_available_session(&self, cutoff: DateTime<Utc>)
        -> Result<Option<SessionCandidate>>;

    async fn mark_in_use(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn mark_available(&self, id: &str, session_id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Insert a fresh available record and return its id
    async fn insert_available(&self, session_id: &str, at: DateTime<Utc>) -> Result<String>;

    async fn delete_session(&self, id: &str) -> Result<()>;
}

/// A leased browser session.
///
/// `record_id` is absent for a session created during this lease;
/// `session_id` is filled in once the browser initializes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionHandle {
    pub record_id: Option<String>,
    pub session_id: Option<String>,
    pub reused: bool,
}

/// Acquire, release and discard pooled sessions
#[derive(Clone)]
pub struct SessionPool {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    reuse_window: Duration,
}

impl SessionPool {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            reuse_window: Duration::seconds(REUSE_WINDOW_SECS),
        }
    }

    /// Claim the newest non-stale available session, deleting stale ones on
    /// the way. Returns an empty handle when the caller must create a session.
    ///
    /// Store failures only cost the reuse: the caller gets an empty handle.
    pub async fn acquire(&self) -> SessionHandle {
        let now = self.clock.now();
        let cutoff = now - self.reuse_window;

        loop {
            let candidate = match self.store.get_available_session(cutoff).await {
                Ok(Some(candidate)) => candidate,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Session pool lookup failed");
                    break;
                }
            };

            if candidate.stale {
                debug!(session_id = %candidate.session_id, "Deleting stale pooled session");
                if let Err(e) = self.store.delete_session(&candidate.id).await {
                    warn!(error = %e, "Failed to delete stale session record");
                    break;
                }
                continue;
            }

            if let Err(e) = self.store.mark_in_use(&candidate.id, now).await {
                warn!(error = %e, "Failed to claim pooled session");
                break;
            }

            info!(session_id = %candidate.session_id, "Reusing pooled browser session");
            return SessionHandle {
                record_id: Some(candidate.id),
                session_id: Some(candidate.session_id),
                reused: true,
            };
        }

        SessionHandle::default()
    }

    /// Return a healthy session to the pool
    pub async fn release(&self, handle: &mut SessionHandle, session_id: &str) -> Result<()> {
        let now = self.clock.now();
        handle.session_id = Some(session_id.to_string());

        match &handle.record_id {
            Some(id) => self.store.mark_available(id, session_id, now).await?,
            None => {
                let id = self.store.insert_available(session_id, now).await?;
                handle.record_id = Some(id);
            }
        }

        info!(session_id, "Marked browser session available for reuse");
        Ok(())
    }

    /// Drop a failed session's record so it is never handed out again
    pub async fn discard(&self, handle: &SessionHandle) -> Result<()> {
        if let Some(id) = &handle.record_id {
            self.store.delete_session(id).await?;
            info!(
                session_id = handle.session_id.as_deref().unwrap_or("unknown"),
                "Discarded browser session record"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct SessionRecord {
    session_id: String,
    status: SessionStatus,
    last_used_at: DateTime<Utc>,
}

/// Process-local session store
#[derive(Default)]
pub struct InMemorySessionStore {
    records: Mutex<HashMap<String, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn status_of(&self, id: &str) -> Option<SessionStatus> {
        self.records.lock().get(id).map(|r| r.status)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_available_session(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<SessionCandidate>> {
        let records = self.records.lock();
        Ok(records
            .iter()
            .filter(|(_, r)| r.status == SessionStatus::Available)
            .max_by_key(|(_, r)| r.last_used_at)
            .map(|(id, r)| SessionCandidate {
                id: id.clone(),
                session_id: r.session_id.clone(),
                last_used_at: r.last_used_at,
                stale: r.last_used_at < cutoff,
            }))
    }

    async fn mark_in_use(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(id)
            .ok_or_else(|| ScoutError::NotFound(format!("session record {}", id)))?;
        record.status = SessionStatus::InUse;
        record.last_used_at = at;
        Ok(())
    }

    async fn mark_available(&self, id: &str, session_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(id)
            .ok_or_else(|| ScoutError::NotFound(format!("session record {}", id)))?;
        record.session_id = session_id.to_string();
        record.status = SessionStatus::Available;
        record.last_used_at = at;
        Ok(())
    }

    async fn insert_available(&self, session_id: &str, at: DateTime<Utc>) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.records.lock().insert(
            id.clone(),
            SessionRecord {
                session_id: session_id.to_string(),
                status: SessionStatus::Available,
                last_used_at: at,
            },
        );
        Ok(id)
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        self.records.lock().remove(id);
        Ok(())
    }
}
