use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status tokens after which further polling is not useful.
pub const TERMINAL_STATUSES: [&str; 6] = [
    "confirmed",
    "completed",
    "cancelled",
    "failed",
    "expired",
    "rejected",
];

/// Returns `true` when monitoring should stop for `token`.
///
/// Matching is case-insensitive. Unrecognized tokens are never terminal, so a
/// new in-progress status introduced by a backend keeps the session alive.
pub fn is_terminal(token: &str) -> bool {
    let token = token.trim();
    TERMINAL_STATUSES
        .iter()
        .any(|terminal| terminal.eq_ignore_ascii_case(token))
}

/// Coarse grouping of status tokens used to scale the polling interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    InProgress,
    Confirmed,
    Failed,
    Cancelled,
    Unrecognized,
}

impl StatusClass {
    pub fn of(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "processing" | "pending" | "in_progress" | "submitted" => StatusClass::InProgress,
            "confirmed" | "completed" => StatusClass::Confirmed,
            "failed" | "rejected" => StatusClass::Failed,
            "cancelled" | "canceled" | "expired" => StatusClass::Cancelled,
            _ => StatusClass::Unrecognized,
        }
    }
}

/// What a backend adapter hands back from a status fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: String,
    #[serde(default, rename = "lastUpdated")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl StatusReport {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            last_updated: None,
            details: None,
        }
    }
}

/// A normalized status as stored on a session and handed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: String,
    pub last_updated: DateTime<Utc>,
    pub details: Option<serde_json::Value>,
}

impl StatusSnapshot {
    pub fn is_terminal(&self) -> bool {
        is_terminal(&self.status)
    }
}

impl From<StatusReport> for StatusSnapshot {
    fn from(report: StatusReport) -> Self {
        Self {
            status: report.status,
            last_updated: report.last_updated.unwrap_or_else(Utc::now),
            details: report.details,
        }
    }
}
