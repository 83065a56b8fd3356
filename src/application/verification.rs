use super::{Shared, Tick, shared};
use crate::config::VerificationConfig;
use crate::domain::category::ResourceCategory;
use crate::domain::ports::{PaymentVerifierRef, VerificationObserverRef};
use crate::domain::verification::{
    PaymentVerdict, VerificationId, VerificationOutcome, VerificationPhase, VerificationRequest,
};
use crate::error::{Result, WatchError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Confirms payment-gateway references with a fixed retry budget.
///
/// Unlike status polling the spacing never adapts: attempts run every
/// `attempt_interval` until the gateway confirms or declines, or the attempt
/// ceiling is hit (timeout). At most one verification is active per reference.
#[derive(Clone)]
pub struct VerificationController {
    inner: Arc<Inner>,
}

struct Inner {
    config: VerificationConfig,
    verifier: PaymentVerifierRef,
    registry: Mutex<Registry>,
}

/// As with the polling registry, the registry lock and a request's state lock
/// are never held together.
#[derive(Default)]
struct Registry {
    requests: HashMap<VerificationId, VerificationEntry>,
    active: HashMap<String, VerificationId>,
}

impl Registry {
    fn release(&mut self, id: VerificationId, reference: &str) {
        if self.active.get(reference) == Some(&id) {
            self.active.remove(reference);
        }
    }
}

#[derive(Clone)]
struct VerificationEntry {
    reference: String,
    started_at: Instant,
    request: Shared<VerificationRequest>,
    cancel: CancellationToken,
    observer: VerificationObserverRef,
}

impl VerificationEntry {
    /// Records `outcome` and fires the matching callback, unless the request
    /// was already settled or stopped. The callback runs after the state lock
    /// is released.
    fn settle(&self, outcome: VerificationOutcome) -> bool {
        let attempts = self
            .request
            .with(|request| request.settle(outcome.clone()).then_some(request.attempt));
        let Some(attempts) = attempts else {
            return false;
        };
        self.cancel.cancel();
        self.request
            .notify(|| match outcome.into_result(&self.reference, attempts) {
                Ok(payment) => self.observer.on_success(&payment),
                Err(WatchError::Timeout { .. }) => self.observer.on_timeout(),
                Err(error) => self.observer.on_failure(&error),
            });
        true
    }

    fn halt(&self) -> bool {
        self.cancel.cancel();
        let stopped = self.request.with(|request| request.stop());
        self.request.silence();
        stopped
    }

    fn snapshot(&self) -> VerificationRequest {
        self.request.with(|request| request.clone())
    }

    fn is_finished(&self) -> bool {
        self.request.with(|request| {
            matches!(
                request.phase,
                VerificationPhase::Settled | VerificationPhase::Stopped
            )
        })
    }
}

impl Inner {
    fn release(&self, id: VerificationId, reference: &str) {
        self.registry.lock().release(id, reference);
    }

    fn entry(&self, id: VerificationId) -> Result<VerificationEntry> {
        self.registry
            .lock()
            .requests
            .get(&id)
            .cloned()
            .ok_or(WatchError::VerificationNotFound(id))
    }

    fn entries(&self) -> Vec<(VerificationId, VerificationEntry)> {
        self.registry
            .lock()
            .requests
            .iter()
            .map(|(id, entry)| (*id, entry.clone()))
            .collect()
    }

    fn active_entry(&self, reference: &str) -> Option<(VerificationId, VerificationEntry)> {
        let registry = self.registry.lock();
        let id = *registry.active.get(reference)?;
        registry.requests.get(&id).map(|entry| (id, entry.clone()))
    }

    async fn call_verifier(
        &self,
        category: ResourceCategory,
        reference: &str,
        resource_id: Option<&str>,
    ) -> Result<PaymentVerdict> {
        let limit = self.config.request_timeout();
        tokio::time::timeout(limit, self.verifier.verify(category, reference, resource_id))
            .await
            .unwrap_or_else(|_| {
                Err(WatchError::transport(format!(
                    "payment verification timed out after {}ms",
                    limit.as_millis()
                )))
            })
    }
}

impl VerificationController {
    pub fn new(verifier: PaymentVerifierRef, config: VerificationConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                verifier,
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    /// Begins confirming `reference`, superseding any active verification for
    /// the same reference. The first gateway call happens immediately.
    pub fn start_verification(
        &self,
        reference: impl Into<String>,
        category: ResourceCategory,
        resource_id: Option<String>,
        observer: VerificationObserverRef,
    ) -> VerificationId {
        let reference = reference.into();
        let mut request = VerificationRequest::new(
            reference.clone(),
            category,
            resource_id,
            self.inner.config.max_attempts,
        );
        request.begin();
        let id = request.id;
        let entry = VerificationEntry {
            reference: reference.clone(),
            started_at: Instant::now(),
            request: shared(request),
            cancel: CancellationToken::new(),
            observer,
        };

        let superseded = {
            let mut registry = self.inner.registry.lock();
            registry.requests.insert(id, entry.clone());
            registry
                .active
                .insert(reference.clone(), id)
                .and_then(|previous| registry.requests.get(&previous).cloned())
        };
        if let Some(previous) = superseded
            && previous.halt()
        {
            info!(reference = %reference, "superseded active verification");
        }

        info!(
            verification_id = %id,
            reference = %reference,
            category = %category,
            max_attempts = self.inner.config.max_attempts,
            "payment verification started"
        );
        tokio::spawn(run_verification(Arc::clone(&self.inner), id, entry));
        id
    }

    /// Like [`start_verification`](Self::start_verification), but the
    /// verification is stopped when the guard is dropped.
    pub fn start_scoped(
        &self,
        reference: impl Into<String>,
        category: ResourceCategory,
        resource_id: Option<String>,
        observer: VerificationObserverRef,
    ) -> VerificationGuard {
        let id = self.start_verification(reference, category, resource_id, observer);
        VerificationGuard {
            controller: self.clone(),
            id,
            detached: false,
        }
    }

    /// Cancels outstanding attempts. No callback fires for `id` afterwards.
    pub fn stop_verification(&self, id: VerificationId) -> Result<()> {
        let entry = {
            let mut registry = self.inner.registry.lock();
            let entry = registry
                .requests
                .get(&id)
                .cloned()
                .ok_or(WatchError::VerificationNotFound(id))?;
            registry.release(id, &entry.reference);
            entry
        };
        if entry.halt() {
            info!(verification_id = %id, reference = %entry.reference, "payment verification stopped");
        }
        Ok(())
    }

    /// Restarts the bounded loop from attempt zero for the same reference,
    /// category, resource and observer.
    pub fn retry_verification(&self, id: VerificationId) -> Result<VerificationId> {
        let entry = self.inner.entry(id)?;
        entry.halt();
        let previous = entry.snapshot();
        debug!(verification_id = %id, reference = %entry.reference, "retrying payment verification");
        Ok(self.start_verification(
            previous.reference,
            previous.category,
            previous.resource_id,
            entry.observer,
        ))
    }

    /// Retries the active verification for `reference`, or the most recent
    /// finished one.
    pub fn retry_verification_for(&self, reference: &str) -> Result<VerificationId> {
        let id = {
            let registry = self.inner.registry.lock();
            registry.active.get(reference).copied().or_else(|| {
                registry
                    .requests
                    .iter()
                    .filter(|(_, entry)| entry.reference == reference)
                    .max_by_key(|(_, entry)| entry.started_at)
                    .map(|(id, _)| *id)
            })
        };
        let id = id.ok_or_else(|| WatchError::NotMonitored(reference.to_string()))?;
        self.retry_verification(id)
    }

    /// One gateway call, no retries.
    ///
    /// A transport failure is returned as `Err`. A confirmed or declined
    /// answer also settles the background verification that is active for the
    /// same reference when the call returns, including one started while the
    /// call was in flight, so that loop makes no further calls. A gateway call
    /// the background loop already had in flight is not cancelled on the
    /// gateway side; its result is discarded.
    #[instrument(skip(self))]
    pub async fn verify_once(
        &self,
        category: ResourceCategory,
        reference: &str,
        resource_id: Option<&str>,
    ) -> Result<VerificationOutcome> {
        let verdict = self
            .inner
            .call_verifier(category, reference, resource_id)
            .await?;
        let outcome = VerificationOutcome::from_verdict(verdict, reference, category, resource_id);

        if outcome.is_terminal()
            && let Some((id, entry)) = self.inner.active_entry(reference)
            && entry.settle(outcome.clone())
        {
            self.inner.release(id, reference);
            info!(
                verification_id = %id,
                outcome = outcome.label(),
                "background verification settled by single check"
            );
        }
        Ok(outcome)
    }

    pub fn get_verification(&self, id: VerificationId) -> Option<VerificationRequest> {
        self.inner.entry(id).ok().map(|entry| entry.snapshot())
    }

    /// The active verification for `reference`, if any.
    pub fn verification_for(&self, reference: &str) -> Option<VerificationId> {
        self.inner.registry.lock().active.get(reference).copied()
    }

    /// Forgets settled and stopped verifications. Returns how many were
    /// removed.
    pub fn clear_finished(&self) -> usize {
        let finished: Vec<VerificationId> = self
            .inner
            .entries()
            .into_iter()
            .filter(|(_, entry)| entry.is_finished())
            .map(|(id, _)| id)
            .collect();
        let mut registry = self.inner.registry.lock();
        finished
            .into_iter()
            .filter(|id| registry.requests.remove(id).is_some())
            .count()
    }

    pub fn stop_all_verification(&self) -> usize {
        let entries: Vec<VerificationEntry> = {
            let mut registry = self.inner.registry.lock();
            let ids: Vec<VerificationId> = registry.active.drain().map(|(_, id)| id).collect();
            ids.iter()
                .filter_map(|id| registry.requests.get(id).cloned())
                .collect()
        };
        let stopped = entries.iter().filter(|entry| entry.halt()).count();
        info!(stopped, "stopped all payment verifications");
        stopped
    }
}

/// Stops its verification on drop.
pub struct VerificationGuard {
    controller: VerificationController,
    id: VerificationId,
    detached: bool,
}

impl VerificationGuard {
    pub fn id(&self) -> VerificationId {
        self.id
    }

    pub fn request(&self) -> Option<VerificationRequest> {
        self.controller.get_verification(self.id)
    }

    /// Lets the verification outlive the guard.
    pub fn detach(mut self) -> VerificationId {
        self.detached = true;
        self.id
    }
}

impl Drop for VerificationGuard {
    fn drop(&mut self) {
        if !self.detached {
            let _ = self.controller.stop_verification(self.id);
        }
    }
}

async fn run_verification(inner: Arc<Inner>, id: VerificationId, entry: VerificationEntry) {
    let (category, resource_id) = entry
        .request
        .with(|request| (request.category, request.resource_id.clone()));
    let mut delay = Duration::ZERO;
    loop {
        tokio::select! {
            biased;
            _ = entry.cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        if !entry.request.with(|request| request.begin_attempt()) {
            break;
        }

        let result = tokio::select! {
            biased;
            _ = entry.cancel.cancelled() => break,
            result = inner.call_verifier(category, &entry.reference, resource_id.as_deref()) => result,
        };

        match settle_attempt(&inner, id, &entry, result) {
            Tick::After(next) => delay = next,
            Tick::Done => break,
        }
    }
    debug!(verification_id = %id, "verification task exited");
}

fn settle_attempt(
    inner: &Inner,
    id: VerificationId,
    entry: &VerificationEntry,
    result: Result<PaymentVerdict>,
) -> Tick {
    let current = entry.request.with(|request| {
        request
            .is_verifying()
            .then(|| (request.attempt, request.category, request.resource_id.clone()))
    });
    let Some((attempt, category, resource_id)) = current else {
        debug!(verification_id = %id, "dropping result for inactive verification");
        return Tick::Done;
    };

    match result {
        Ok(verdict) => {
            let outcome = VerificationOutcome::from_verdict(
                verdict,
                &entry.reference,
                category,
                resource_id.as_deref(),
            );
            if outcome.is_terminal() {
                let label = outcome.label();
                if entry.settle(outcome) {
                    info!(verification_id = %id, reference = %entry.reference, attempt, outcome = label, "payment verification settled");
                    inner.release(id, &entry.reference);
                }
                return Tick::Done;
            }
            debug!(verification_id = %id, attempt, "payment still pending");
        }
        Err(error) => {
            warn!(verification_id = %id, reference = %entry.reference, attempt, error = %error, "verification call failed");
        }
    }

    if entry.request.with(|request| request.attempts_exhausted()) {
        if entry.settle(VerificationOutcome::Timeout) {
            info!(verification_id = %id, reference = %entry.reference, attempt, "payment verification timed out");
            inner.release(id, &entry.reference);
        }
        return Tick::Done;
    }
    Tick::After(inner.config.attempt_interval())
}
