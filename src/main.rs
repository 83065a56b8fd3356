use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use statuswatch::application::coordinator::PollingCoordinator;
use statuswatch::application::verification::VerificationController;
use statuswatch::config::WatchConfig;
use statuswatch::domain::ports::StatusFetcherRef;
use statuswatch::domain::session::{PollingOverrides, SessionId, SessionKey};
use statuswatch::domain::verification::{VerificationId, VerificationOutcome};
use statuswatch::infrastructure::channel::ChannelObserver;
use statuswatch::infrastructure::in_memory::{ScriptedStatusFetcher, ScriptedVerifier};
use statuswatch::interfaces::csv::outcome_writer::{OutcomeRecord, OutcomeWriter};
use statuswatch::interfaces::csv::script_reader::{ScriptKind, ScriptReader, ScriptRow};
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay scripted backend replies through the polling and verification engines
    Replay {
        /// Script CSV with columns: kind, category, reference, responses
        script: PathBuf,

        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Fixed delay between polls and between verification attempts
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: Option<u64>,
    },
}

enum Monitor {
    Poll(SessionId),
    Verify(VerificationId),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("statuswatch=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Replay {
            script,
            config,
            interval_ms,
        } => replay(script, config, interval_ms).await,
    }
}

async fn replay(script: PathBuf, config: Option<PathBuf>, interval_ms: Option<u64>) -> Result<()> {
    let mut config = match config {
        Some(path) => WatchConfig::from_path(path).into_diagnostic()?,
        None => WatchConfig::default(),
    };
    let mut overrides = PollingOverrides::default();
    if let Some(ms) = interval_ms {
        overrides = overrides.with_interval(Duration::from_millis(ms));
        config.verification.attempt_interval_ms = ms;
    }

    let file = File::open(script).into_diagnostic()?;
    let mut rows: Vec<ScriptRow> = Vec::new();
    for row in ScriptReader::new(file).rows() {
        match row {
            Ok(row) => rows.push(row),
            Err(e) => error!(error = %e, "skipping malformed script row"),
        }
    }

    let mut fetcher = ScriptedStatusFetcher::new();
    let mut verifier = ScriptedVerifier::new();
    for row in &rows {
        match row.kind {
            ScriptKind::Poll => fetcher = fetcher.with_script(&row.reference, &row.responses),
            ScriptKind::Verify => verifier = verifier.with_script(&row.reference, &row.responses),
        }
    }
    let fetcher: StatusFetcherRef = Arc::new(fetcher);
    let coordinator = PollingCoordinator::new(config.polling.clone());
    let controller = VerificationController::new(Arc::new(verifier), config.verification.clone());

    // Later rows for the same monitor supersede earlier ones, so keep the
    // first position but the last id.
    let (tx, mut rx) = ChannelObserver::channel();
    let mut order: Vec<(ScriptKind, SessionKey)> = Vec::new();
    let mut monitors: HashMap<(ScriptKind, SessionKey), Monitor> = HashMap::new();
    for row in &rows {
        let key = SessionKey::new(row.category, row.reference.clone());
        let observer = Arc::new(ChannelObserver::new(key.clone(), tx.clone()));
        let monitor = match row.kind {
            ScriptKind::Poll => Monitor::Poll(coordinator.start_polling(
                key.clone(),
                Arc::clone(&fetcher),
                observer,
                overrides,
            )),
            ScriptKind::Verify => Monitor::Verify(controller.start_verification(
                row.reference.clone(),
                row.category,
                None,
                observer,
            )),
        };
        let slot = (row.kind, key);
        if monitors.insert(slot.clone(), monitor).is_none() {
            order.push(slot);
        }
    }
    drop(tx);
    info!(monitors = monitors.len(), "replay started");

    let finished = |monitor: &Monitor| match monitor {
        Monitor::Poll(id) => coordinator
            .get_polling_item(*id)
            .is_none_or(|snapshot| snapshot.state.is_finished()),
        Monitor::Verify(id) => controller
            .get_verification(*id)
            .is_none_or(|request| !request.is_verifying()),
    };
    // Every final callback is sent after its record is marked finished, so
    // re-checking on each event cannot miss the last one.
    while !monitors.values().all(&finished) {
        if rx.recv().await.is_none() {
            break;
        }
    }

    let records = order.into_iter().filter_map(|slot| {
        let (kind, key) = slot.clone();
        let record = match monitors.get(&slot)? {
            Monitor::Poll(id) => {
                let snapshot = coordinator.get_polling_item(*id)?;
                OutcomeRecord {
                    kind,
                    category: key.category,
                    reference: key.reference,
                    outcome: snapshot.state.label().to_string(),
                    attempts: snapshot.poll_count,
                    last_status: snapshot.status.map(|s| s.status).unwrap_or_default(),
                }
            }
            Monitor::Verify(id) => {
                let request = controller.get_verification(*id)?;
                let last_status = match &request.outcome {
                    VerificationOutcome::Success(payment) => payment.status.clone().unwrap_or_default(),
                    VerificationOutcome::Failure(message) => message.clone(),
                    VerificationOutcome::Pending | VerificationOutcome::Timeout => String::new(),
                };
                OutcomeRecord {
                    kind,
                    category: key.category,
                    reference: key.reference,
                    outcome: request.outcome.label().to_string(),
                    attempts: request.attempt,
                    last_status,
                }
            }
        };
        Some(record)
    });

    let stdout = io::stdout();
    let mut writer = OutcomeWriter::new(stdout.lock());
    writer.write_outcomes(records).into_diagnostic()?;

    coordinator.stop_all_polling();
    controller.stop_all_verification();
    Ok(())
}
