//! Session manager: issues handles and owns the live-session table.
//!
//! The table lives for the lifetime of the process and is never persisted;
//! only the audit shadow of each session reaches storage. Entries are keyed
//! by handle in a sharded map so work on different sessions never contends.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use shellgate_core::{
    AuditFilter, AuditRecord, BrokerError, LiveSession, SessionHandle, SessionOutcome, Target,
    traits::{AuditStore, TargetStore},
};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// What happens when a second caller attaches to a live handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReattachPolicy {
    /// Open an independent remote channel for every attach.
    #[default]
    Allow,
    /// Refuse attaches while another one is live.
    Reject,
}

/// Session manager configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL prepended to `/terminal/{handle}` in attach URLs.
    pub public_base_url: String,
    /// How long a handle stays attachable if nobody attaches. `None` disables expiry.
    pub handle_ttl: Option<Duration>,
    /// Concurrent re-attach policy.
    pub reattach: ReattachPolicy,
    /// How long a closed session stays in the live table before the sweeper drops it.
    pub closed_retention: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://127.0.0.1:3000".to_string(),
            handle_ttl: Some(Duration::from_secs(600)),
            reattach: ReattachPolicy::default(),
            closed_retention: Duration::from_secs(300),
        }
    }
}

impl SessionConfig {
    /// Set the public base URL.
    #[must_use]
    pub fn public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = url.into();
        self
    }

    /// Set the unattached-handle TTL.
    #[must_use]
    pub const fn handle_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.handle_ttl = ttl;
        self
    }

    /// Set the re-attach policy.
    #[must_use]
    pub const fn reattach(mut self, policy: ReattachPolicy) -> Self {
        self.reattach = policy;
        self
    }

    /// Set how long closed sessions remain listed.
    #[must_use]
    pub const fn closed_retention(mut self, retention: Duration) -> Self {
        self.closed_retention = retention;
        self
    }
}

/// Lifecycle state of a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "outcome", rename_all = "snake_case")]
pub enum SessionState {
    /// Issued, never attached.
    Created,
    /// At least one bridge is attached.
    Live,
    /// Terminated; the handle is spent.
    Closed(SessionOutcome),
}

struct LiveEntry {
    session: LiveSession,
    state: SessionState,
    attachments: usize,
    closed_at: Option<DateTime<Utc>>,
}

/// Result of session creation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    pub handle: SessionHandle,
    pub attach_url: String,
    pub target_id: String,
}

/// A successful admission of an attach attempt.
#[derive(Debug, Clone)]
pub struct Admission {
    pub session: LiveSession,
    /// Current profile, with credentials.
    pub target: Target,
}

/// Point-in-time view of a live-table entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(flatten)]
    pub session: LiveSession,
    #[serde(flatten)]
    pub state: SessionState,
    pub attachments: usize,
}

enum Gate {
    Admit(LiveSession),
    Expired,
    Spent,
    Busy,
}

/// Session manager for brokered terminal sessions.
pub struct SessionManager<S: ?Sized> {
    storage: Arc<S>,
    live: DashMap<SessionHandle, LiveEntry>,
    config: SessionConfig,
}

impl<S> SessionManager<S>
where
    S: TargetStore + AuditStore + ?Sized,
{
    /// Create a new session manager.
    #[must_use]
    pub fn new(storage: Arc<S>, config: SessionConfig) -> Self {
        Self {
            storage,
            live: DashMap::new(),
            config,
        }
    }

    /// Manager configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Attach URL for a handle.
    #[must_use]
    pub fn attach_url(&self, handle: SessionHandle) -> String {
        format!(
            "{}/terminal/{handle}",
            self.config.public_base_url.trim_end_matches('/')
        )
    }

    /// Issue a new session for a target.
    ///
    /// Writes the opening audit record, then registers the handle. Nothing
    /// is registered if the audit write fails. The remote host is not
    /// contacted.
    ///
    /// # Errors
    /// `Validation` for blank fields, `NotFound` for an unknown target,
    /// `UpstreamUnavailable` if storage fails.
    pub async fn create_session(
        &self,
        target_id: &str,
        reason: &str,
    ) -> Result<CreatedSession, BrokerError> {
        if target_id.trim().is_empty() {
            return Err(BrokerError::Validation("target is required".to_string()));
        }
        if reason.trim().is_empty() {
            return Err(BrokerError::Validation("reason is required".to_string()));
        }

        let target = self
            .storage
            .get_target(target_id)
            .await?
            .ok_or_else(|| BrokerError::not_found(format!("Target \"{target_id}\"")))?;

        let handle = self.fresh_handle();
        let session = LiveSession::new(handle, &target.id, reason.trim());
        self.storage
            .insert_audit(&AuditRecord::opened(&session, &target))
            .await?;

        self.live.insert(
            handle,
            LiveEntry {
                session,
                state: SessionState::Created,
                attachments: 0,
                closed_at: None,
            },
        );

        tracing::info!(
            %handle,
            target_id = %target.id,
            host = %target.host,
            "Session created"
        );

        Ok(CreatedSession {
            handle,
            attach_url: self.attach_url(handle),
            target_id: target.id,
        })
    }

    fn fresh_handle(&self) -> SessionHandle {
        loop {
            let handle = Uuid::new_v4();
            if !self.live.contains_key(&handle) {
                return handle;
            }
        }
    }

    fn is_expired(&self, session: &LiveSession, now: DateTime<Utc>) -> bool {
        self.config.handle_ttl.is_some_and(|ttl| {
            (now - session.created_at)
                .to_std()
                .is_ok_and(|age| age >= ttl)
        })
    }

    /// Membership check for a handle that can still be attached.
    ///
    /// Unknown, never-issued, expired and spent handles all yield `None`.
    #[must_use]
    pub fn lookup(&self, handle: SessionHandle) -> Option<LiveSession> {
        let entry = self.live.get(&handle)?;
        match entry.state {
            SessionState::Closed(_) => None,
            SessionState::Created if self.is_expired(&entry.session, Utc::now()) => None,
            SessionState::Created | SessionState::Live => Some(entry.session.clone()),
        }
    }

    /// Lifecycle state of a handle.
    #[must_use]
    pub fn state(&self, handle: SessionHandle) -> Option<SessionState> {
        self.live.get(&handle).map(|e| e.state)
    }

    /// Admit an attach attempt.
    ///
    /// Marks the session live, counts the attachment and loads the
    /// target's current credentials. Every successful admission must be
    /// paired with one [`release`](Self::release).
    ///
    /// # Errors
    /// `NotFound` for unknown, expired or spent handles (or a deleted
    /// target), `Validation` when re-attach is rejected.
    pub async fn admit(&self, handle: SessionHandle) -> Result<Admission, BrokerError> {
        let not_found = || BrokerError::not_found(format!("Session {handle}"));
        let now = Utc::now();

        let gate = {
            let Some(mut entry) = self.live.get_mut(&handle) else {
                return Err(not_found());
            };
            match entry.state {
                SessionState::Created if self.is_expired(&entry.session, now) => Gate::Expired,
                SessionState::Closed(_) => Gate::Spent,
                SessionState::Live if self.config.reattach == ReattachPolicy::Reject => Gate::Busy,
                SessionState::Created | SessionState::Live => {
                    entry.state = SessionState::Live;
                    entry.attachments += 1;
                    Gate::Admit(entry.session.clone())
                }
            }
        };

        let session = match gate {
            Gate::Admit(session) => session,
            Gate::Expired => {
                self.expire(handle, now).await;
                return Err(not_found());
            }
            Gate::Spent => return Err(not_found()),
            Gate::Busy => {
                tracing::warn!(%handle, "Rejected concurrent attach");
                return Err(BrokerError::Validation(format!(
                    "session {handle} is already attached"
                )));
            }
        };

        match self.storage.get_target(&session.target_id).await {
            Ok(Some(target)) => {
                tracing::debug!(%handle, target_id = %target.id, "Attach admitted");
                Ok(Admission { session, target })
            }
            Ok(None) => {
                self.release_logged(handle, SessionOutcome::Error).await;
                Err(BrokerError::not_found(format!(
                    "Target \"{}\"",
                    session.target_id
                )))
            }
            Err(e) => {
                self.release_logged(handle, SessionOutcome::Error).await;
                Err(e.into())
            }
        }
    }

    /// End one attachment.
    ///
    /// When the last attachment ends, the session is closed and its audit
    /// record finalized with `outcome`. Returns whether the audit record
    /// was written by this call.
    ///
    /// # Errors
    /// Returns error if the audit write fails.
    pub async fn release(
        &self,
        handle: SessionHandle,
        outcome: SessionOutcome,
    ) -> Result<bool, BrokerError> {
        let last = {
            let Some(mut entry) = self.live.get_mut(&handle) else {
                return Ok(false);
            };
            entry.attachments = entry.attachments.saturating_sub(1);
            entry.attachments == 0
        };

        if last {
            self.finalize(handle, Utc::now(), outcome).await
        } else {
            tracing::debug!(%handle, "Attachment released, session still attached");
            Ok(false)
        }
    }

    async fn release_logged(&self, handle: SessionHandle, outcome: SessionOutcome) {
        if let Err(e) = self.release(handle, outcome).await {
            tracing::error!(%handle, error = %e, "Failed to release session");
        }
    }

    /// Write the terminal audit status. Idempotent: the first terminal
    /// write wins and later calls report `false`.
    ///
    /// The audit row is written before the handle is marked closed. A
    /// failed write still spends the handle; it is logged and returned.
    ///
    /// # Errors
    /// Returns error if the audit write fails.
    pub async fn finalize(
        &self,
        handle: SessionHandle,
        end_time: DateTime<Utc>,
        outcome: SessionOutcome,
    ) -> Result<bool, BrokerError> {
        let written = self.storage.finalize_audit(handle, end_time, outcome).await;
        self.mark_closed(handle, outcome, matches!(written, Ok(true)));

        let applied = written.inspect_err(|e| {
            tracing::error!(%handle, ?outcome, error = %e, "Audit record left open");
        })?;

        if applied {
            tracing::info!(%handle, ?outcome, "Session finalized");
        } else {
            tracing::debug!(%handle, ?outcome, "Session already finalized");
        }
        Ok(applied)
    }

    fn mark_closed(&self, handle: SessionHandle, outcome: SessionOutcome, won: bool) {
        if let Some(mut entry) = self.live.get_mut(&handle) {
            if won || !matches!(entry.state, SessionState::Closed(_)) {
                entry.state = SessionState::Closed(outcome);
            }
            entry.closed_at.get_or_insert_with(Utc::now);
        }
    }

    async fn expire(&self, handle: SessionHandle, now: DateTime<Utc>) -> bool {
        let removed = self
            .live
            .remove_if(&handle, |_, e| {
                e.state == SessionState::Created && self.is_expired(&e.session, now)
            })
            .is_some();

        if removed {
            tracing::info!(%handle, "Unattached session expired");
            if let Err(e) = self
                .storage
                .finalize_audit(handle, now, SessionOutcome::Disconnected)
                .await
            {
                tracing::warn!(%handle, error = %e, "Failed to finalize expired session");
            }
        }
        removed
    }

    /// Sweep handles that outlived the TTL without being attached.
    ///
    /// Returns the number of sessions removed.
    pub async fn prune_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<SessionHandle> = self
            .live
            .iter()
            .filter(|e| e.state == SessionState::Created && self.is_expired(&e.session, now))
            .map(|e| *e.key())
            .collect();

        let mut removed = 0;
        for handle in expired {
            if self.expire(handle, now).await {
                removed += 1;
            }
        }
        removed
    }

    /// Drop closed sessions older than the retention period.
    ///
    /// Returns the number of entries removed.
    pub fn prune_closed(&self) -> usize {
        let now = Utc::now();
        let retention = self.config.closed_retention;
        let is_stale = |entry: &LiveEntry| {
            entry.closed_at.is_some_and(|closed_at| {
                (now - closed_at)
                    .to_std()
                    .is_ok_and(|age| age >= retention)
            })
        };

        let stale: Vec<SessionHandle> = self
            .live
            .iter()
            .filter(|e| is_stale(e.value()))
            .map(|e| *e.key())
            .collect();

        stale
            .into_iter()
            .filter(|handle| self.live.remove_if(handle, |_, e| is_stale(e)).is_some())
            .count()
    }

    /// Snapshot of the live table.
    #[must_use]
    pub fn live_sessions(&self) -> Vec<SessionSnapshot> {
        let mut sessions: Vec<SessionSnapshot> = self
            .live
            .iter()
            .map(|e| SessionSnapshot {
                session: e.session.clone(),
                state: e.state,
                attachments: e.attachments,
            })
            .collect();
        sessions.sort_by(|a, b| b.session.created_at.cmp(&a.session.created_at));
        sessions
    }

    /// Audit record for a handle.
    ///
    /// # Errors
    /// Returns error if storage fails.
    pub async fn audit_record(
        &self,
        handle: SessionHandle,
    ) -> Result<Option<AuditRecord>, BrokerError> {
        Ok(self.storage.get_audit(handle).await?)
    }

    /// Audit history, newest first.
    ///
    /// # Errors
    /// Returns error if storage fails.
    pub async fn audit_records(&self, filter: AuditFilter) -> Result<Vec<AuditRecord>, BrokerError> {
        Ok(self.storage.list_audit(filter).await?)
    }
}

impl<S> SessionManager<S>
where
    S: TargetStore + AuditStore + ?Sized + 'static,
{
    /// Sweep expired handles and stale closed sessions on a fixed interval
    /// until the task is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = self.prune_expired().await;
                if removed > 0 {
                    tracing::info!(removed, "Swept expired session handles");
                }
                let dropped = self.prune_closed();
                if dropped > 0 {
                    tracing::debug!(dropped, "Dropped closed sessions");
                }
            }
        })
    }
}
