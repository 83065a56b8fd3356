use super::category::ResourceCategory;
use super::status::{StatusReport, StatusSnapshot};
use super::verification::{PaymentVerdict, VerifiedPayment};
use crate::error::{Result, WatchError};
use async_trait::async_trait;
use std::sync::Arc;

/// Fetches the current status of one backend record.
///
/// An `Err` is treated as a transport failure: the session reports it and
/// keeps polling.
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    async fn fetch_status(&self, reference: &str) -> Result<StatusReport>;
}

/// Asks a payment gateway whether a transaction reference has settled.
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    async fn verify(
        &self,
        category: ResourceCategory,
        reference: &str,
        resource_id: Option<&str>,
    ) -> Result<PaymentVerdict>;
}

/// Callbacks for a polling session.
///
/// Called from the session's own task, never concurrently for the same
/// session. Implementations should return quickly; they may call back into
/// the coordinator to read, stop or restart any session, their own included.
pub trait PollingObserver: Send + Sync {
    fn on_status_update(&self, _status: &StatusSnapshot) {}

    fn on_error(&self, _error: &WatchError) {}

    /// A terminal status was observed. Fires at most once per session.
    fn on_complete(&self, _status: &StatusSnapshot) {}

    /// The attempt budget ran out without a terminal status. Fires at most
    /// once per session, and never together with `on_complete`.
    fn on_exhausted(&self, _last_status: Option<&StatusSnapshot>) {}
}

/// Callbacks for a payment verification. Exactly one of them fires per
/// verification unless it is stopped first.
pub trait VerificationObserver: Send + Sync {
    fn on_success(&self, _payment: &VerifiedPayment) {}

    fn on_failure(&self, _error: &WatchError) {}

    fn on_timeout(&self) {}
}

/// Observer that ignores every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PollingObserver for NoopObserver {}

impl VerificationObserver for NoopObserver {}

pub type StatusFetcherRef = Arc<dyn StatusFetcher>;
pub type PaymentVerifierRef = Arc<dyn PaymentVerifier>;
pub type PollingObserverRef = Arc<dyn PollingObserver>;
pub type VerificationObserverRef = Arc<dyn VerificationObserver>;
