use super::category::ResourceCategory;
use crate::error::{Result, WatchError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerificationId(Uuid);

impl VerificationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VerificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VerificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

const DECLINED_STATUSES: [&str; 6] = [
    "failed",
    "declined",
    "rejected",
    "cancelled",
    "canceled",
    "error",
];

/// Raw payload returned by a payment-gateway adapter.
///
/// Gateways disagree on how they report success: some set `success`, some set
/// `status: "success"`, some set `verified`. Adapters convert this into a
/// [`PaymentVerdict`] before it reaches the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub verified: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Canonical answer to "did this payment go through?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentVerdict {
    Confirmed {
        status: Option<String>,
        message: Option<String>,
    },
    Declined {
        message: String,
    },
    /// The gateway has not settled the payment yet.
    Pending {
        message: Option<String>,
    },
}

impl From<VerifyResponse> for PaymentVerdict {
    fn from(response: VerifyResponse) -> Self {
        let status_is = |candidates: &[&str]| {
            response.status.as_deref().is_some_and(|status| {
                candidates
                    .iter()
                    .any(|candidate| candidate.eq_ignore_ascii_case(status.trim()))
            })
        };
        let confirmed = response.success == Some(true)
            || response.verified == Some(true)
            || status_is(&["success"]);
        let declined = response.success == Some(false)
            || response.verified == Some(false)
            || status_is(&DECLINED_STATUSES);

        if confirmed {
            return PaymentVerdict::Confirmed {
                status: response.status,
                message: response.message,
            };
        }

        if declined {
            let message = response
                .message
                .or(response.status)
                .unwrap_or_else(|| "payment declined".to_string());
            return PaymentVerdict::Declined { message };
        }

        PaymentVerdict::Pending {
            message: response.message,
        }
    }
}

/// Receipt handed to `on_success`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedPayment {
    pub reference: String,
    pub category: ResourceCategory,
    pub resource_id: Option<String>,
    pub status: Option<String>,
    pub message: Option<String>,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Pending,
    Success(VerifiedPayment),
    Failure(String),
    Timeout,
}

impl VerificationOutcome {
    /// Maps a gateway verdict for `reference` onto an outcome.
    pub fn from_verdict(
        verdict: PaymentVerdict,
        reference: &str,
        category: ResourceCategory,
        resource_id: Option<&str>,
    ) -> Self {
        match verdict {
            PaymentVerdict::Confirmed { status, message } => {
                VerificationOutcome::Success(VerifiedPayment {
                    reference: reference.to_string(),
                    category,
                    resource_id: resource_id.map(str::to_string),
                    status,
                    message,
                    verified_at: Utc::now(),
                })
            }
            PaymentVerdict::Declined { message } => VerificationOutcome::Failure(message),
            PaymentVerdict::Pending { .. } => VerificationOutcome::Pending,
        }
    }

    /// Collapses the outcome into the error taxonomy: only a confirmed payment
    /// is `Ok`.
    pub fn into_result(self, reference: &str, attempts: u32) -> Result<VerifiedPayment> {
        match self {
            VerificationOutcome::Success(payment) => Ok(payment),
            VerificationOutcome::Failure(message) => Err(WatchError::VerificationFailed {
                reference: reference.to_string(),
                message,
            }),
            VerificationOutcome::Pending | VerificationOutcome::Timeout => Err(WatchError::Timeout {
                what: format!("payment {reference}"),
                attempts,
            }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, VerificationOutcome::Pending)
    }

    pub fn label(&self) -> &'static str {
        match self {
            VerificationOutcome::Pending => "pending",
            VerificationOutcome::Success(_) => "success",
            VerificationOutcome::Failure(_) => "failure",
            VerificationOutcome::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationPhase {
    Idle,
    Verifying,
    /// A terminal outcome was reached; see [`VerificationRequest::outcome`].
    Settled,
    Stopped,
}

/// Bookkeeping for one payment reference under verification.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub id: VerificationId,
    pub reference: String,
    pub category: ResourceCategory,
    pub resource_id: Option<String>,
    pub attempt: u32,
    pub max_attempts: u32,
    pub phase: VerificationPhase,
    pub outcome: VerificationOutcome,
}

impl VerificationRequest {
    pub fn new(
        reference: impl Into<String>,
        category: ResourceCategory,
        resource_id: Option<String>,
        max_attempts: u32,
    ) -> Self {
        Self {
            id: VerificationId::new(),
            reference: reference.into(),
            category,
            resource_id,
            attempt: 0,
            max_attempts: max_attempts.max(1),
            phase: VerificationPhase::Idle,
            outcome: VerificationOutcome::Pending,
        }
    }

    pub fn is_verifying(&self) -> bool {
        self.phase == VerificationPhase::Verifying
    }

    pub fn begin(&mut self) {
        if self.phase == VerificationPhase::Idle {
            self.phase = VerificationPhase::Verifying;
        }
    }

    /// Counts a new gateway call. Returns `false` once the request has stopped
    /// verifying.
    pub fn begin_attempt(&mut self) -> bool {
        if !self.is_verifying() {
            return false;
        }
        self.attempt += 1;
        true
    }

    /// Records a terminal outcome. Returns `false` (and changes nothing) if the
    /// request already left `Verifying`.
    pub fn settle(&mut self, outcome: VerificationOutcome) -> bool {
        if !self.is_verifying() || !outcome.is_terminal() {
            return false;
        }
        self.outcome = outcome;
        self.phase = VerificationPhase::Settled;
        true
    }

    pub fn stop(&mut self) -> bool {
        if matches!(self.phase, VerificationPhase::Settled | VerificationPhase::Stopped) {
            return false;
        }
        self.phase = VerificationPhase::Stopped;
        true
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}
