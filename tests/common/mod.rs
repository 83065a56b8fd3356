#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use statuswatch::domain::category::ResourceCategory;
use statuswatch::domain::ports::{PaymentVerifier, PollingObserver, StatusFetcher, VerificationObserver};
use statuswatch::domain::status::{StatusReport, StatusSnapshot};
use statuswatch::domain::verification::{PaymentVerdict, VerifiedPayment};
use statuswatch::error::{Result, WatchError};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::{Notify, Semaphore};

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Status(String),
    Error(String),
    Complete(String),
    Exhausted(Option<String>),
    Success(String),
    Failure(String),
    Timeout,
}

impl Recorded {
    pub fn is_final(&self) -> bool {
        !matches!(self, Recorded::Status(_) | Recorded::Error(_))
    }
}

/// Observer that remembers every callback in order.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Recorded>>,
    finished: Notify,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    pub fn finals(&self) -> Vec<Recorded> {
        self.events().into_iter().filter(Recorded::is_final).collect()
    }

    /// Resolves once a final callback has been recorded.
    pub async fn wait_final(&self) {
        loop {
            if self.events().iter().any(Recorded::is_final) {
                return;
            }
            self.finished.notified().await;
        }
    }

    fn record(&self, event: Recorded) {
        let is_final = event.is_final();
        self.events.lock().push(event);
        if is_final {
            self.finished.notify_one();
        }
    }
}

impl PollingObserver for RecordingObserver {
    fn on_status_update(&self, status: &StatusSnapshot) {
        self.record(Recorded::Status(status.status.clone()));
    }

    fn on_error(&self, error: &WatchError) {
        self.record(Recorded::Error(error.to_string()));
    }

    fn on_complete(&self, status: &StatusSnapshot) {
        self.record(Recorded::Complete(status.status.clone()));
    }

    fn on_exhausted(&self, last_status: Option<&StatusSnapshot>) {
        self.record(Recorded::Exhausted(last_status.map(|s| s.status.clone())));
    }
}

impl VerificationObserver for RecordingObserver {
    fn on_success(&self, payment: &VerifiedPayment) {
        self.record(Recorded::Success(payment.reference.clone()));
    }

    fn on_failure(&self, error: &WatchError) {
        self.record(Recorded::Failure(error.to_string()));
    }

    fn on_timeout(&self) {
        self.record(Recorded::Timeout);
    }
}

/// Holds every call until the test lets it through.
pub struct Gate {
    permits: Semaphore,
    calls: AtomicU32,
    entered: Notify,
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            permits: Semaphore::new(0),
            calls: AtomicU32::new(0),
            entered: Notify::new(),
        }
    }
}

impl Gate {
    async fn pass(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.permits
            .acquire()
            .await
            .map_err(|e| WatchError::transport(e.to_string()))?
            .forget();
        Ok(())
    }

    pub fn release(&self) {
        self.permits.add_permits(1);
    }

    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Status fetcher that answers `status` once the gate opens.
pub struct GatedFetcher {
    pub gate: Gate,
    status: String,
}

impl GatedFetcher {
    pub fn new(status: &str) -> Arc<Self> {
        Arc::new(Self {
            gate: Gate::default(),
            status: status.to_string(),
        })
    }
}

#[async_trait]
impl StatusFetcher for GatedFetcher {
    async fn fetch_status(&self, _reference: &str) -> Result<StatusReport> {
        self.gate.pass().await?;
        Ok(StatusReport::new(self.status.clone()))
    }
}

/// Verifier that confirms once the gate opens.
#[derive(Default)]
pub struct GatedVerifier {
    pub gate: Gate,
}

#[async_trait]
impl PaymentVerifier for GatedVerifier {
    async fn verify(
        &self,
        _category: ResourceCategory,
        _reference: &str,
        _resource_id: Option<&str>,
    ) -> Result<PaymentVerdict> {
        self.gate.pass().await?;
        Ok(PaymentVerdict::Confirmed {
            status: Some("success".to_string()),
            message: None,
        })
    }
}

pub fn write_script(path: &Path, rows: &[[&str; 4]]) -> std::io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_path(path)?;
    wtr.write_record(["kind", "category", "reference", "responses"])?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes `rows` random monitors, each with a unique reference and a script
/// that reaches a final answer well inside every budget.
pub fn generate_script(path: &Path, rows: usize) -> std::io::Result<()> {
    use rand::Rng;
    use rand::seq::SliceRandom;

    const CATEGORIES: [&str; 5] = ["flight", "hotel", "visa", "insurance", "package"];
    const POLL_ENDINGS: [&str; 4] = ["confirmed", "failed", "cancelled", "completed"];
    const VERIFY_ENDINGS: [&str; 3] = ["success", "verified", "declined"];

    let mut rng = rand::thread_rng();
    let mut wtr = csv::WriterBuilder::new().from_path(path)?;
    wtr.write_record(["kind", "category", "reference", "responses"])?;
    for i in 0..rows {
        let poll = rng.gen_bool(0.5);
        let (kind, waiting, endings): (&str, &str, &[&str]) = if poll {
            ("poll", "processing", &POLL_ENDINGS[..])
        } else {
            ("verify", "pending", &VERIFY_ENDINGS[..])
        };
        let mut responses: Vec<&str> = vec![waiting; rng.gen_range(0..3)];
        if rng.gen_bool(0.2) {
            responses.push("!flaky");
        }
        responses.push(endings.choose(&mut rng).copied().unwrap_or("confirmed"));

        let category = CATEGORIES.choose(&mut rng).copied().unwrap_or("flight");
        let reference = format!("REF-{i}");
        let responses = responses.join(" ");
        wtr.write_record([kind, category, reference.as_str(), responses.as_str()])?;
    }
    wtr.flush()?;
    Ok(())
}
