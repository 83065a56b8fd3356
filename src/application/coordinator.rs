use super::{Shared, Tick, shared};
use crate::config::PollingConfig;
use crate::domain::ports::{PollingObserverRef, StatusFetcherRef};
use crate::domain::session::{
    PollingOverrides, PollingSession, PollingStatus, SessionId, SessionKey, SessionSnapshot,
    SessionState,
};
use crate::domain::status::{StatusReport, StatusSnapshot};
use crate::error::{Result, WatchError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Owns every polling session started through it.
///
/// Cloning the coordinator yields another handle to the same registry.
/// Starting a session spawns a tokio task, so `start_*` must be called from
/// within a Tokio runtime.
#[derive(Clone, Default)]
pub struct PollingCoordinator {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    config: PollingConfig,
    registry: Mutex<Registry>,
}

/// Neither the registry lock nor a session's state lock is ever held while
/// taking the other.
#[derive(Default)]
struct Registry {
    sessions: HashMap<SessionId, SessionEntry>,
    active: HashMap<SessionKey, SessionId>,
}

impl Registry {
    fn release(&mut self, id: SessionId, key: &SessionKey) {
        if self.active.get(key) == Some(&id) {
            self.active.remove(key);
        }
    }
}

#[derive(Clone)]
struct SessionEntry {
    key: SessionKey,
    started_at: DateTime<Utc>,
    session: Shared<PollingSession>,
    cancel: CancellationToken,
    fetcher: StatusFetcherRef,
    observer: PollingObserverRef,
}

impl SessionEntry {
    /// Stops the session if it is still running and silences its observer.
    /// Outside a callback this waits for a callback running on another thread
    /// to return.
    fn halt(&self) -> bool {
        self.cancel.cancel();
        let stopped = self.session.with(|session| session.finish(SessionState::Stopped));
        self.session.silence();
        stopped
    }

    fn snapshot(&self) -> SessionSnapshot {
        self.session.with(|session| session.snapshot())
    }
}

impl Inner {
    fn release(&self, id: SessionId, key: &SessionKey) {
        self.registry.lock().release(id, key);
    }

    fn entry(&self, id: SessionId) -> Result<SessionEntry> {
        self.registry
            .lock()
            .sessions
            .get(&id)
            .cloned()
            .ok_or(WatchError::SessionNotFound(id))
    }

    fn entries(&self) -> Vec<(SessionId, SessionEntry)> {
        self.registry
            .lock()
            .sessions
            .iter()
            .map(|(id, entry)| (*id, entry.clone()))
            .collect()
    }
}

impl PollingCoordinator {
    pub fn new(config: PollingConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    /// Starts monitoring `key`, superseding any active session for it.
    ///
    /// The first fetch happens immediately.
    pub fn start_polling(
        &self,
        key: SessionKey,
        fetcher: StatusFetcherRef,
        observer: PollingObserverRef,
        overrides: PollingOverrides,
    ) -> SessionId {
        let mut session = PollingSession::new(key.clone(), overrides);
        session.activate();
        let id = session.id;
        let max_attempts = session.max_poll_attempts;
        let entry = SessionEntry {
            key: key.clone(),
            started_at: session.started_at,
            session: shared(session),
            cancel: CancellationToken::new(),
            fetcher,
            observer,
        };

        let superseded = {
            let mut registry = self.inner.registry.lock();
            registry.sessions.insert(id, entry.clone());
            registry
                .active
                .insert(key.clone(), id)
                .and_then(|previous| registry.sessions.get(&previous).cloned())
        };
        if let Some(previous) = superseded
            && previous.halt()
        {
            info!(key = %key, "superseded active polling session");
        }

        info!(session_id = %id, key = %key, max_attempts, "polling session started");
        tokio::spawn(run_session(Arc::clone(&self.inner), id, entry));
        id
    }

    /// Like [`start_polling`](Self::start_polling), but the session is stopped
    /// when the returned guard is dropped.
    pub fn start_scoped(
        &self,
        key: SessionKey,
        fetcher: StatusFetcherRef,
        observer: PollingObserverRef,
        overrides: PollingOverrides,
    ) -> SessionGuard {
        let id = self.start_polling(key, fetcher, observer, overrides);
        SessionGuard {
            coordinator: self.clone(),
            id,
            detached: false,
        }
    }

    /// Stops a session. No callback fires for it once this returns, even if a
    /// fetch was in flight. Stopping a finished session is a no-op.
    pub fn stop_polling(&self, id: SessionId) -> Result<()> {
        let entry = {
            let mut registry = self.inner.registry.lock();
            let entry = registry
                .sessions
                .get(&id)
                .cloned()
                .ok_or(WatchError::SessionNotFound(id))?;
            registry.release(id, &entry.key);
            entry
        };
        if entry.halt() {
            info!(session_id = %id, key = %entry.key, "polling session stopped");
        }
        Ok(())
    }

    /// Stops the session and starts a fresh one for the same key with the same
    /// fetcher, observer, and overrides. Works for finished sessions too.
    pub fn restart_polling(&self, id: SessionId) -> Result<SessionId> {
        let entry = self.inner.entry(id)?;
        entry.halt();
        let overrides = entry.session.with(|session| session.overrides());
        debug!(session_id = %id, key = %entry.key, "restarting polling session");
        Ok(self.start_polling(entry.key, entry.fetcher, entry.observer, overrides))
    }

    /// Restarts the active session for `key`, or the most recent finished one.
    pub fn restart_polling_for(&self, key: &SessionKey) -> Result<SessionId> {
        let id = {
            let registry = self.inner.registry.lock();
            registry.active.get(key).copied().or_else(|| {
                registry
                    .sessions
                    .iter()
                    .filter(|(_, entry)| &entry.key == key)
                    .max_by_key(|(_, entry)| entry.started_at)
                    .map(|(id, _)| *id)
            })
        };
        let id = id.ok_or_else(|| WatchError::NotMonitored(key.to_string()))?;
        self.restart_polling(id)
    }

    pub fn get_polling_item(&self, id: SessionId) -> Option<SessionSnapshot> {
        self.inner.entry(id).ok().map(|entry| entry.snapshot())
    }

    /// The active session for `key`, if any.
    pub fn session_for(&self, key: &SessionKey) -> Option<SessionId> {
        self.inner.registry.lock().active.get(key).copied()
    }

    /// Stops every active session and returns how many were stopped.
    pub fn stop_all_polling(&self) -> usize {
        let entries: Vec<SessionEntry> = {
            let mut registry = self.inner.registry.lock();
            let ids: Vec<SessionId> = registry.active.drain().map(|(_, id)| id).collect();
            ids.iter()
                .filter_map(|id| registry.sessions.get(id).cloned())
                .collect()
        };
        let stopped = entries.iter().filter(|entry| entry.halt()).count();
        info!(stopped, "stopped all polling sessions");
        stopped
    }

    pub fn get_polling_status(&self) -> PollingStatus {
        let mut snapshots: Vec<SessionSnapshot> = self
            .inner
            .entries()
            .into_iter()
            .map(|(_, entry)| entry.snapshot())
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.started_at);
        snapshots.into_iter().collect()
    }

    /// Forgets finished sessions. Returns how many were removed.
    pub fn clear_finished(&self) -> usize {
        let finished: Vec<SessionId> = self
            .inner
            .entries()
            .into_iter()
            .filter(|(_, entry)| entry.snapshot().state.is_finished())
            .map(|(id, _)| id)
            .collect();
        let mut registry = self.inner.registry.lock();
        finished
            .into_iter()
            .filter(|id| registry.sessions.remove(id).is_some())
            .count()
    }
}

/// Stops its session on drop.
pub struct SessionGuard {
    coordinator: PollingCoordinator,
    id: SessionId,
    detached: bool,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.coordinator.get_polling_item(self.id)
    }

    /// Lets the session outlive the guard.
    pub fn detach(mut self) -> SessionId {
        self.detached = true;
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.detached {
            let _ = self.coordinator.stop_polling(self.id);
        }
    }
}

async fn run_session(inner: Arc<Inner>, id: SessionId, entry: SessionEntry) {
    let fetch_timeout = inner.config.fetch_timeout();
    let mut delay = Duration::ZERO;
    loop {
        tokio::select! {
            biased;
            _ = entry.cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        let fetched = tokio::select! {
            biased;
            _ = entry.cancel.cancelled() => break,
            fetched = fetch_with_timeout(&entry.fetcher, &entry.key.reference, fetch_timeout) => fetched,
        };

        match apply_tick(&inner, id, &entry, fetched) {
            Tick::After(next) => {
                debug!(session_id = %id, delay_ms = next.as_millis() as u64, "next poll scheduled");
                delay = next;
            }
            Tick::Done => break,
        }
    }
    debug!(session_id = %id, "polling task exited");
}

async fn fetch_with_timeout(
    fetcher: &StatusFetcherRef,
    reference: &str,
    limit: Duration,
) -> Result<StatusReport> {
    tokio::time::timeout(limit, fetcher.fetch_status(reference))
        .await
        .unwrap_or_else(|_| {
            Err(WatchError::transport(format!(
                "status fetch timed out after {}ms",
                limit.as_millis()
            )))
        })
}

enum Budget {
    Remaining(Duration),
    Spent(Option<StatusSnapshot>, u32),
}

/// Applies one fetch result. State changes happen under the session lock;
/// observers are called after it is released, through the session's callback
/// gate, so a `stop_polling` that returns before a callback starts suppresses
/// it.
fn apply_tick(
    inner: &Inner,
    id: SessionId,
    entry: &SessionEntry,
    fetched: Result<StatusReport>,
) -> Tick {
    match fetched {
        Ok(report) => {
            let status = StatusSnapshot::from(report);
            let recorded = entry.session.with(|session| {
                if !session.is_active() {
                    return false;
                }
                session.record_status(status.clone());
                true
            });
            if !recorded {
                debug!(session_id = %id, "dropping result for inactive session");
                return Tick::Done;
            }
            entry
                .session
                .notify(|| entry.observer.on_status_update(&status));

            if status.is_terminal() {
                let completed = entry.session.with(|session| {
                    if !session.is_active() {
                        return false;
                    }
                    session.count_poll();
                    session.finish(SessionState::Completed)
                });
                if completed {
                    inner.release(id, &entry.key);
                    info!(session_id = %id, key = %entry.key, status = %status.status, "polling session completed");
                    entry.session.notify(|| entry.observer.on_complete(&status));
                }
                return Tick::Done;
            }
        }
        Err(error) => {
            warn!(session_id = %id, key = %entry.key, error = %error, "status fetch failed");
            entry.session.notify(|| entry.observer.on_error(&error));
        }
    }

    let budget = entry.session.with(|session| {
        if !session.is_active() {
            return None;
        }
        if session.count_poll() {
            session.finish(SessionState::Errored);
            return Some(Budget::Spent(session.status.clone(), session.poll_count));
        }
        Some(Budget::Remaining(session.reschedule()))
    });
    match budget {
        None => Tick::Done,
        Some(Budget::Remaining(next)) => Tick::After(next),
        Some(Budget::Spent(last_status, attempts)) => {
            inner.release(id, &entry.key);
            info!(session_id = %id, key = %entry.key, attempts, "polling budget exhausted");
            entry
                .session
                .notify(|| entry.observer.on_exhausted(last_status.as_ref()));
            Tick::Done
        }
    }
}
