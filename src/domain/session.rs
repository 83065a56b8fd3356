use super::category::ResourceCategory;
use super::policy::{self, MIN_POLL_INTERVAL};
use super::status::StatusSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of a monitored resource. At most one active session per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub category: ResourceCategory,
    pub reference: String,
}

impl SessionKey {
    pub fn new(category: ResourceCategory, reference: impl Into<String>) -> Self {
        Self {
            category,
            reference: reference.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.reference)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Active,
    /// A terminal status was observed.
    Completed,
    /// Cancelled by the caller or superseded.
    Stopped,
    /// Attempt budget ran out before a terminal status.
    Errored,
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Active => "active",
            SessionState::Completed => "completed",
            SessionState::Stopped => "stopped",
            SessionState::Errored => "errored",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Stopped | SessionState::Errored
        )
    }
}

/// Caller-supplied replacements for the category defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollingOverrides {
    /// Fixed delay between ticks; disables adaptive intervals for the session.
    /// Used exactly as given: the 10 s floor on category intervals does not
    /// apply, so callers own the load a short interval puts on the backend.
    pub interval: Option<Duration>,
    pub max_attempts: Option<u32>,
}

impl PollingOverrides {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

/// Mutable record of one monitoring task.
#[derive(Debug, Clone)]
pub struct PollingSession {
    pub id: SessionId,
    pub key: SessionKey,
    pub status: Option<StatusSnapshot>,
    pub poll_count: u32,
    pub max_poll_attempts: u32,
    pub current_interval: Duration,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    overrides: PollingOverrides,
}

impl PollingSession {
    pub fn new(key: SessionKey, overrides: PollingOverrides) -> Self {
        let max_poll_attempts = overrides
            .max_attempts
            .unwrap_or_else(|| policy::compute_max_attempts(key.category))
            .max(1);
        let mut session = Self {
            id: SessionId::new(),
            key,
            status: None,
            poll_count: 0,
            max_poll_attempts,
            current_interval: MIN_POLL_INTERVAL,
            state: SessionState::Idle,
            started_at: Utc::now(),
            overrides,
        };
        session.current_interval = session.next_interval();
        session
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn overrides(&self) -> PollingOverrides {
        self.overrides
    }

    pub fn activate(&mut self) {
        if self.state == SessionState::Idle {
            self.state = SessionState::Active;
        }
    }

    pub fn record_status(&mut self, status: StatusSnapshot) {
        self.status = Some(status);
    }

    /// Counts a finished tick. Returns `true` once the budget is spent.
    pub fn count_poll(&mut self) -> bool {
        self.poll_count += 1;
        self.poll_count >= self.max_poll_attempts
    }

    /// Recomputes and stores the delay before the next tick.
    pub fn reschedule(&mut self) -> Duration {
        self.current_interval = self.next_interval();
        self.current_interval
    }

    /// Moves an active session into `state`. Returns `false` if it had already
    /// left the active state.
    pub fn finish(&mut self, state: SessionState) -> bool {
        if self.state.is_finished() {
            return false;
        }
        self.state = state;
        true
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            key: self.key.clone(),
            state: self.state,
            status: self.status.clone(),
            poll_count: self.poll_count,
            max_poll_attempts: self.max_poll_attempts,
            current_interval_ms: self.current_interval.as_millis() as u64,
            started_at: self.started_at,
        }
    }

    fn next_interval(&self) -> Duration {
        match self.overrides.interval {
            Some(fixed) => fixed,
            None => policy::compute_interval(
                self.key.category,
                self.status.as_ref().map(|s| s.status.as_str()),
            ),
        }
    }
}

/// Read-only view of a session, e.g. for progress displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub key: SessionKey,
    pub state: SessionState,
    pub status: Option<StatusSnapshot>,
    pub poll_count: u32,
    pub max_poll_attempts: u32,
    pub current_interval_ms: u64,
    pub started_at: DateTime<Utc>,
}

/// Summary over every session a coordinator knows about.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollingStatus {
    pub active: usize,
    pub completed: usize,
    pub stopped: usize,
    pub errored: usize,
    pub sessions: Vec<SessionSnapshot>,
}

impl PollingStatus {
    pub fn total(&self) -> usize {
        self.sessions.len()
    }
}

impl FromIterator<SessionSnapshot> for PollingStatus {
    fn from_iter<I: IntoIterator<Item = SessionSnapshot>>(iter: I) -> Self {
        let mut summary = PollingStatus::default();
        for snapshot in iter {
            match snapshot.state {
                SessionState::Idle | SessionState::Active => summary.active += 1,
                SessionState::Completed => summary.completed += 1,
                SessionState::Stopped => summary.stopped += 1,
                SessionState::Errored => summary.errored += 1,
            }
            summary.sessions.push(snapshot);
        }
        summary
    }
}
