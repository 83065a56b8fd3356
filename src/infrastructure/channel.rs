use crate::domain::ports::{PollingObserver, VerificationObserver};
use crate::domain::session::SessionKey;
use crate::domain::status::StatusSnapshot;
use crate::domain::verification::VerifiedPayment;
use crate::error::WatchError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// A callback, turned into a value.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    StatusUpdate(StatusSnapshot),
    FetchError(String),
    Completed(StatusSnapshot),
    Exhausted(Option<StatusSnapshot>),
    Verified(VerifiedPayment),
    Declined(String),
    TimedOut,
}

impl WatchEvent {
    /// Whether this event ends its monitor.
    pub fn is_final(&self) -> bool {
        !matches!(self, WatchEvent::StatusUpdate(_) | WatchEvent::FetchError(_))
    }
}

/// Forwards every callback as `(key, event)` over an unbounded channel.
///
/// Handy for callers that prefer to `await` outcomes instead of implementing
/// observer traits. Sends never block, so callbacks return immediately; if the
/// receiver is gone the event is dropped.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    key: SessionKey,
    tx: UnboundedSender<(SessionKey, WatchEvent)>,
}

impl ChannelObserver {
    pub fn channel() -> (
        UnboundedSender<(SessionKey, WatchEvent)>,
        UnboundedReceiver<(SessionKey, WatchEvent)>,
    ) {
        unbounded_channel()
    }

    pub fn new(key: SessionKey, tx: UnboundedSender<(SessionKey, WatchEvent)>) -> Self {
        Self { key, tx }
    }

    fn send(&self, event: WatchEvent) {
        let _ = self.tx.send((self.key.clone(), event));
    }
}

impl PollingObserver for ChannelObserver {
    fn on_status_update(&self, status: &StatusSnapshot) {
        self.send(WatchEvent::StatusUpdate(status.clone()));
    }

    fn on_error(&self, error: &WatchError) {
        self.send(WatchEvent::FetchError(error.to_string()));
    }

    fn on_complete(&self, status: &StatusSnapshot) {
        self.send(WatchEvent::Completed(status.clone()));
    }

    fn on_exhausted(&self, last_status: Option<&StatusSnapshot>) {
        self.send(WatchEvent::Exhausted(last_status.cloned()));
    }
}

impl VerificationObserver for ChannelObserver {
    fn on_success(&self, payment: &VerifiedPayment) {
        self.send(WatchEvent::Verified(payment.clone()));
    }

    fn on_failure(&self, error: &WatchError) {
        self.send(WatchEvent::Declined(error.to_string()));
    }

    fn on_timeout(&self) {
        self.send(WatchEvent::TimedOut);
    }
}
