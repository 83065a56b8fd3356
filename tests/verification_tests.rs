mod common;

use common::{GatedVerifier, Recorded, RecordingObserver};
use statuswatch::application::verification::VerificationController;
use statuswatch::config::VerificationConfig;
use statuswatch::domain::category::ResourceCategory;
use statuswatch::domain::verification::{VerificationOutcome, VerificationPhase};
use statuswatch::error::WatchError;
use statuswatch::infrastructure::in_memory::ScriptedVerifier;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};

const AN_HOUR: Duration = Duration::from_secs(3600);

fn controller(verifier: Arc<ScriptedVerifier>, max_attempts: u32) -> VerificationController {
    VerificationController::new(
        verifier,
        VerificationConfig {
            max_attempts,
            ..VerificationConfig::default()
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_pending_then_success_fires_on_success_once() {
    let verifier = Arc::new(
        ScriptedVerifier::new().with_script("tx-abc", ["pending", "processing", "success"]),
    );
    let controller = controller(verifier.clone(), 12);
    let observer = RecordingObserver::new();
    let started = Instant::now();

    let id = controller.start_verification(
        "tx-abc",
        ResourceCategory::Flight,
        Some("FL-1".to_string()),
        observer.clone(),
    );
    observer.wait_final().await;

    assert_eq!(started.elapsed(), Duration::from_secs(10));
    sleep(AN_HOUR).await;
    assert_eq!(observer.events(), vec![Recorded::Success("tx-abc".into())]);
    assert_eq!(verifier.calls("tx-abc").await, 3);

    let request = controller.get_verification(id).unwrap();
    assert_eq!(request.attempt, 3);
    assert_eq!(request.phase, VerificationPhase::Settled);
    match request.outcome {
        VerificationOutcome::Success(payment) => {
            assert_eq!(payment.resource_id.as_deref(), Some("FL-1"));
            assert_eq!(payment.category, ResourceCategory::Flight);
        }
        other => panic!("expected success, got {other:?}"),
    }
    assert_eq!(controller.verification_for("tx-abc"), None);
}

#[tokio::test(start_paused = true)]
async fn test_declined_fires_on_failure_and_never_success() {
    let verifier = Arc::new(ScriptedVerifier::new().with_script("tx-def", ["declined", "success"]));
    let controller = controller(verifier.clone(), 12);
    let observer = RecordingObserver::new();

    let id = controller.start_verification("tx-def", ResourceCategory::Package, None, observer.clone());
    observer.wait_final().await;
    sleep(AN_HOUR).await;

    let events = observer.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], Recorded::Failure(message) if message.contains("declined")));
    assert_eq!(verifier.calls("tx-def").await, 1);
    assert_eq!(
        controller.get_verification(id).unwrap().outcome,
        VerificationOutcome::Failure("declined".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn test_attempt_ceiling_times_out() {
    let verifier = Arc::new(ScriptedVerifier::new().with_script("tx-ghi", ["pending"]));
    let controller = controller(verifier.clone(), 4);
    let observer = RecordingObserver::new();
    let started = Instant::now();

    let id = controller.start_verification("tx-ghi", ResourceCategory::Hotel, None, observer.clone());
    observer.wait_final().await;

    assert_eq!(started.elapsed(), Duration::from_secs(15));
    sleep(AN_HOUR).await;
    assert_eq!(observer.events(), vec![Recorded::Timeout]);
    assert_eq!(verifier.calls("tx-ghi").await, 4);
    let request = controller.get_verification(id).unwrap();
    assert_eq!(request.attempt, 4);
    assert_eq!(request.outcome, VerificationOutcome::Timeout);
}

#[tokio::test(start_paused = true)]
async fn test_transport_errors_are_retried() {
    let verifier = Arc::new(ScriptedVerifier::new().with_script("tx-jkl", ["!503", "verified"]));
    let controller = controller(verifier, 12);
    let observer = RecordingObserver::new();

    controller.start_verification("tx-jkl", ResourceCategory::Visa, None, observer.clone());
    observer.wait_final().await;

    assert_eq!(observer.events(), vec![Recorded::Success("tx-jkl".into())]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_in_flight_call_suppresses_callbacks() {
    let verifier = Arc::new(GatedVerifier::default());
    let controller = VerificationController::new(verifier.clone(), VerificationConfig::default());
    let observer = RecordingObserver::new();

    let id = controller.start_verification("tx-mno", ResourceCategory::Flight, None, observer.clone());
    verifier.gate.wait_entered().await;
    controller.stop_verification(id).unwrap();
    verifier.gate.release();
    sleep(AN_HOUR).await;

    assert!(observer.events().is_empty());
    assert_eq!(verifier.gate.calls(), 1);
    let request = controller.get_verification(id).unwrap();
    assert_eq!(request.phase, VerificationPhase::Stopped);
    assert_eq!(request.outcome, VerificationOutcome::Pending);
}

#[tokio::test(start_paused = true)]
async fn test_same_reference_supersedes_previous_verification() {
    let verifier = Arc::new(ScriptedVerifier::new().with_script("tx-pqr", ["pending"]));
    let controller = controller(verifier, 3);
    let first_observer = RecordingObserver::new();
    let second_observer = RecordingObserver::new();

    let first = controller.start_verification(
        "tx-pqr",
        ResourceCategory::Insurance,
        None,
        first_observer.clone(),
    );
    let second = controller.start_verification(
        "tx-pqr",
        ResourceCategory::Insurance,
        None,
        second_observer.clone(),
    );
    assert_eq!(controller.verification_for("tx-pqr"), Some(second));

    second_observer.wait_final().await;
    sleep(AN_HOUR).await;

    assert!(first_observer.events().is_empty());
    assert_eq!(second_observer.events(), vec![Recorded::Timeout]);
    assert_eq!(
        controller.get_verification(first).unwrap().phase,
        VerificationPhase::Stopped
    );
    assert_eq!(controller.get_verification(first).unwrap().attempt, 0);
}

#[tokio::test(start_paused = true)]
async fn test_retry_starts_again_from_zero() {
    let verifier = Arc::new(ScriptedVerifier::new().with_script("tx-stu", ["declined", "success"]));
    let controller = controller(verifier, 12);
    let observer = RecordingObserver::new();

    let id = controller.start_verification("tx-stu", ResourceCategory::Hotel, None, observer.clone());
    observer.wait_final().await;

    let retried = controller.retry_verification(id).unwrap();
    assert_ne!(retried, id);
    assert_eq!(controller.get_verification(retried).unwrap().attempt, 0);
    sleep(Duration::from_secs(1)).await;

    let events = observer.events();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], Recorded::Failure(_)));
    assert_eq!(events[1], Recorded::Success("tx-stu".into()));
    assert!(matches!(
        controller.get_verification(id).unwrap().outcome,
        VerificationOutcome::Failure(_)
    ));
    assert_eq!(controller.get_verification(retried).unwrap().attempt, 1);
}

#[tokio::test(start_paused = true)]
async fn test_single_check_settles_background_verification() {
    let verifier = Arc::new(
        ScriptedVerifier::new().with_script("tx-vwx", ["pending", "declined", "success"]),
    );
    let controller = controller(verifier.clone(), 12);
    let observer = RecordingObserver::new();

    let id = controller.start_verification("tx-vwx", ResourceCategory::Flight, None, observer.clone());
    sleep(Duration::from_secs(1)).await;

    let outcome = controller
        .verify_once(ResourceCategory::Flight, "tx-vwx", None)
        .await
        .unwrap();
    assert_eq!(outcome, VerificationOutcome::Failure("declined".to_string()));

    sleep(AN_HOUR).await;
    let events = observer.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], Recorded::Failure(message) if message.contains("declined")));
    assert_eq!(verifier.calls("tx-vwx").await, 2);
    assert_eq!(
        controller.get_verification(id).unwrap().phase,
        VerificationPhase::Settled
    );
    assert_eq!(controller.verification_for("tx-vwx"), None);
}

#[tokio::test(start_paused = true)]
async fn test_single_check_settles_verification_started_during_it() {
    let verifier = Arc::new(GatedVerifier::default());
    let controller = VerificationController::new(verifier.clone(), VerificationConfig::default());
    let observer = RecordingObserver::new();

    let check = tokio::spawn({
        let controller = controller.clone();
        async move {
            controller
                .verify_once(ResourceCategory::Hotel, "tx-mid", None)
                .await
        }
    });
    verifier.gate.wait_entered().await;
    let id = controller.start_verification("tx-mid", ResourceCategory::Hotel, None, observer.clone());
    verifier.gate.release();

    let outcome = check.await.unwrap().unwrap();
    assert!(matches!(outcome, VerificationOutcome::Success(_)));

    sleep(AN_HOUR).await;
    assert_eq!(observer.events(), vec![Recorded::Success("tx-mid".into())]);
    let request = controller.get_verification(id).unwrap();
    assert_eq!(request.phase, VerificationPhase::Settled);
    assert_eq!(controller.verification_for("tx-mid"), None);
}

#[tokio::test(start_paused = true)]
async fn test_single_check_pending_leaves_background_running() {
    let verifier = Arc::new(ScriptedVerifier::new().with_script("tx-yz", ["pending"]));
    let controller = controller(verifier, 12);
    let id = controller.start_verification(
        "tx-yz",
        ResourceCategory::Package,
        None,
        RecordingObserver::new(),
    );

    let outcome = controller
        .verify_once(ResourceCategory::Package, "tx-yz", None)
        .await
        .unwrap();

    assert_eq!(outcome, VerificationOutcome::Pending);
    assert_eq!(controller.verification_for("tx-yz"), Some(id));
}

#[tokio::test(start_paused = true)]
async fn test_single_check_transport_error_is_returned() {
    let verifier = Arc::new(ScriptedVerifier::new().with_script("tx-err", ["!gateway down"]));
    let controller = controller(verifier, 12);

    let result = controller
        .verify_once(ResourceCategory::Visa, "tx-err", None)
        .await;

    assert!(matches!(result, Err(WatchError::Transport(message)) if message == "gateway down"));
}

#[tokio::test(start_paused = true)]
async fn test_stop_all_verification() {
    let verifier = Arc::new(
        ScriptedVerifier::new()
            .with_script("tx-1", ["pending"])
            .with_script("tx-2", ["pending"]),
    );
    let controller = controller(verifier, 12);
    let observer = RecordingObserver::new();
    controller.start_verification("tx-1", ResourceCategory::Flight, None, observer.clone());
    controller.start_verification("tx-2", ResourceCategory::Hotel, None, observer.clone());

    sleep(Duration::from_secs(1)).await;
    assert_eq!(controller.stop_all_verification(), 2);
    sleep(AN_HOUR).await;

    assert!(observer.events().is_empty());
    assert_eq!(controller.verification_for("tx-1"), None);
}
