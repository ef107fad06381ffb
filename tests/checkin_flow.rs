//! End-to-end check-in cycles against the scripted reader and in-memory store

use pilgrim_checkin::domain::{
    FailureKind, Locale, Pilgrim, PilgrimId, PilgrimStatus, ScanError, ScanMode, StoreError,
};
use pilgrim_checkin::io::{InMemoryRecordStore, RecordStore, ScriptStep, ScriptedCardReader};
use pilgrim_checkin::services::{
    CheckinCoordinator, CoordinatorSettings, CycleOutcome, CyclePhase, ScanSession,
};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn roster() -> Arc<InMemoryRecordStore> {
    Arc::new(
        InMemoryRecordStore::with_pilgrims([
            Pilgrim::new("p1", "Aminah Yusuf", "A1", PilgrimStatus::Offboard),
            Pilgrim::new("p2", "Bilal Hassan", "B2", PilgrimStatus::Onboard),
            Pilgrim::new("p3", "Fatima Noor", "C3", PilgrimStatus::Offboard),
        ])
        .unwrap(),
    )
}

fn coordinator_with(
    mode: ScanMode,
    reader: &Arc<ScriptedCardReader>,
    store: &Arc<InMemoryRecordStore>,
    scan_timeout: Duration,
    locale: Locale,
) -> CheckinCoordinator {
    CheckinCoordinator::new(
        mode,
        ScanSession::new(reader.clone()),
        store.clone(),
        CoordinatorSettings { scan_timeout, locale },
    )
    .unwrap()
}

fn coordinator(
    mode: ScanMode,
    reader: &Arc<ScriptedCardReader>,
    store: &Arc<InMemoryRecordStore>,
) -> CheckinCoordinator {
    coordinator_with(mode, reader, store, Duration::from_millis(200), Locale::En)
}

#[tokio::test]
async fn test_offboard_pilgrim_boards() {
    let reader = Arc::new(ScriptedCardReader::with_cards(["A1"]));
    let store = roster();
    let mut coordinator = coordinator(ScanMode::Onboard, &reader, &store);

    let outcome = coordinator.run_cycle().await;

    assert!(matches!(
        outcome,
        CycleOutcome::CheckedIn { ref pilgrim, previous: PilgrimStatus::Offboard }
            if pilgrim.status == PilgrimStatus::Onboard
    ));
    let summary = coordinator.end().await;
    assert_eq!(summary.successful, 1);
    assert_eq!(summary.total, 1);
    assert_eq!(summary.onboard_count, 1);
    assert_eq!(summary.offboard_count, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(store.status_of(&PilgrimId::from("p1")), Some(PilgrimStatus::Onboard));
}

#[tokio::test(start_paused = true)]
async fn test_offboard_scan_timeout_never_touches_store() {
    let reader = Arc::new(ScriptedCardReader::new([ScriptStep::Hang]));
    let store = roster();
    let mut coordinator = coordinator(ScanMode::Offboard, &reader, &store);

    let outcome = coordinator.run_cycle().await;

    assert_eq!(outcome.failure_kind(), Some(FailureKind::ScanTimeout));
    assert_eq!(coordinator.stats().failed(), 1);
    assert_eq!(coordinator.stats().total(), 1);
    assert_eq!(coordinator.stats().failures_of(FailureKind::ScanTimeout), 1);
    assert_eq!(store.lookup_calls(), 0);
    assert_eq!(store.update_calls(), 0);
}

#[tokio::test]
async fn test_already_onboard_twice() {
    let reader = Arc::new(ScriptedCardReader::with_cards(["B2", "B2"]));
    let store = roster();
    let mut coordinator = coordinator(ScanMode::Onboard, &reader, &store);

    let first = coordinator.run_cycle().await;
    assert_eq!(first.failure_kind(), Some(FailureKind::AlreadyOnboard));
    assert_eq!(coordinator.stats().failed(), 1);
    assert_eq!(coordinator.stats().total(), 1);

    let second = coordinator.run_cycle().await;
    assert_eq!(second.failure_kind(), Some(FailureKind::AlreadyOnboard));
    assert_eq!(coordinator.stats().failed(), 2);
    assert_eq!(coordinator.stats().total(), 2);

    assert_eq!(store.update_calls(), 0);
    assert_eq!(store.status_of(&PilgrimId::from("p2")), Some(PilgrimStatus::Onboard));
}

#[tokio::test]
async fn test_unknown_card() {
    let reader = Arc::new(ScriptedCardReader::with_cards(["FFFFFFFFFF"]));
    let store = roster();
    let mut coordinator = coordinator(ScanMode::Onboard, &reader, &store);

    let outcome = coordinator.run_cycle().await;

    assert_eq!(outcome.failure_kind(), Some(FailureKind::PilgrimNotFound));
    assert_eq!(store.update_calls(), 0);
    assert_eq!(coordinator.stats().failures_of(FailureKind::PilgrimNotFound), 1);
}

#[tokio::test]
async fn test_persist_failure_then_retry_succeeds() {
    let reader = Arc::new(ScriptedCardReader::with_cards(["C3", "C3"]));
    let store = roster();
    store.fail_next_update(StoreError::Network("connection reset".to_string()));
    let mut coordinator = coordinator(ScanMode::Onboard, &reader, &store);

    let first = coordinator.run_cycle().await;
    assert_eq!(first.failure_kind(), Some(FailureKind::NetworkError));
    assert_eq!(store.status_of(&PilgrimId::from("p3")), Some(PilgrimStatus::Offboard));

    // A retry is a new attempt and counts on its own
    let second = coordinator.run_cycle().await;
    assert!(matches!(second, CycleOutcome::CheckedIn { .. }));
    assert_eq!(store.status_of(&PilgrimId::from("p3")), Some(PilgrimStatus::Onboard));

    let stats = coordinator.stats();
    assert_eq!(stats.failed(), 1);
    assert_eq!(stats.successful(), 1);
    assert_eq!(stats.total(), 2);
}

#[tokio::test]
async fn test_cancel_while_scanning_changes_no_counters() {
    let reader = Arc::new(ScriptedCardReader::new([ScriptStep::Hang, ScriptStep::card("A1")]));
    let store = roster();
    let mut coordinator =
        coordinator_with(ScanMode::Onboard, &reader, &store, Duration::from_secs(30), Locale::En);
    let phase = coordinator.subscribe_phase();
    let cancel = coordinator.cancel_handle();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });

    let outcome = coordinator.run_cycle().await;
    assert_eq!(outcome, CycleOutcome::Cancelled);
    assert_eq!(coordinator.stats().total(), 0);
    assert_eq!(reader.cancel_count(), 1);
    assert_eq!(*phase.borrow(), CyclePhase::Done);

    // The session is back to idle and can scan again
    let next = coordinator.run_cycle().await;
    assert!(matches!(next, CycleOutcome::CheckedIn { .. }));
    assert_eq!(coordinator.stats().total(), 1);
}

#[tokio::test]
async fn test_reader_availability_rechecked_each_cycle() {
    let reader = Arc::new(ScriptedCardReader::with_cards(["A1"]));
    reader.set_enabled(false);
    let store = roster();
    let mut coordinator = coordinator(ScanMode::Onboard, &reader, &store);

    let first = coordinator.run_cycle().await;
    assert!(matches!(first, CycleOutcome::Unavailable(ref f) if f.kind == FailureKind::Disabled));
    assert_eq!(reader.scan_count(), 0);

    reader.set_enabled(true);
    let second = coordinator.run_cycle().await;
    assert!(matches!(second, CycleOutcome::CheckedIn { .. }));
    assert_eq!(coordinator.stats().total(), 1);
}

#[tokio::test]
async fn test_unsupported_reader() {
    let reader = Arc::new(ScriptedCardReader::with_cards(["A1"]));
    reader.set_capable(false);
    let store = roster();
    let mut coordinator = coordinator(ScanMode::Onboard, &reader, &store);

    let outcome = coordinator.run_cycle().await;
    assert!(matches!(
        outcome,
        CycleOutcome::Unavailable(ref f) if f.kind == FailureKind::NotSupported
    ));
}

#[tokio::test]
async fn test_arabic_failure_messages() {
    let reader = Arc::new(ScriptedCardReader::with_cards(["B2"]));
    let store = roster();
    let timeout = Duration::from_millis(200);
    let mut coordinator = coordinator_with(ScanMode::Onboard, &reader, &store, timeout, Locale::Ar);

    match coordinator.run_cycle().await {
        CycleOutcome::Failed(failure) => {
            assert_eq!(failure.message, FailureKind::AlreadyOnboard.message(Locale::Ar));
            assert_ne!(failure.message, FailureKind::AlreadyOnboard.message(Locale::En));
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_roster_stats_follow_checkins() {
    let reader = Arc::new(ScriptedCardReader::with_cards(["A1", "C3"]));
    let store = roster();
    let before = store.stats().await.unwrap();
    assert_eq!((before.total, before.onboard, before.offboard), (3, 1, 2));

    let mut coordinator = coordinator(ScanMode::Onboard, &reader, &store);
    coordinator.run_cycle().await;
    coordinator.run_cycle().await;

    let after = store.stats().await.unwrap();
    assert_eq!((after.total, after.onboard, after.offboard), (3, 3, 0));
}

#[derive(Debug, Clone)]
enum Attempt {
    Card(usize),
    Unknown,
    ScanFails(ScanError),
    LookupFault,
    PersistFault(usize),
}

fn attempt_strategy() -> impl Strategy<Value = Attempt> {
    prop_oneof![
        (0usize..3).prop_map(Attempt::Card),
        Just(Attempt::Unknown),
        prop_oneof![
            Just(ScanError::Timeout),
            Just(ScanError::InvalidCard),
            Just(ScanError::Unknown)
        ]
        .prop_map(Attempt::ScanFails),
        Just(Attempt::LookupFault),
        (0usize..3).prop_map(Attempt::PersistFault),
    ]
}

const CARDS: [&str; 3] = ["A1", "B2", "C3"];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_total_is_successful_plus_failed(
        onboard_mode in any::<bool>(),
        attempts in prop::collection::vec(attempt_strategy(), 0..24),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let mode = if onboard_mode { ScanMode::Onboard } else { ScanMode::Offboard };
            let reader = Arc::new(ScriptedCardReader::new(Vec::new()));
            let store = roster();
            let mut coordinator = coordinator(mode, &reader, &store);

            for (processed, attempt) in attempts.iter().enumerate() {
                match attempt {
                    Attempt::Card(i) => reader.push(ScriptStep::card(CARDS[*i])),
                    Attempt::Unknown => reader.push(ScriptStep::card("0000000000")),
                    Attempt::ScanFails(error) => reader.push(ScriptStep::Fail(*error)),
                    Attempt::LookupFault => {
                        store.fail_next_lookup(StoreError::Network("offline".to_string()));
                        reader.push(ScriptStep::card(CARDS[0]));
                    }
                    Attempt::PersistFault(i) => {
                        store.fail_next_update(StoreError::Server {
                            status: Some(500),
                            message: "boom".to_string(),
                        });
                        reader.push(ScriptStep::card(CARDS[*i]));
                    }
                }

                coordinator.run_cycle().await;

                let stats = coordinator.stats();
                prop_assert_eq!(stats.total(), stats.successful() + stats.failed());
                prop_assert_eq!(stats.total(), processed as u64 + 1);
                prop_assert_eq!(stats.successful(), stats.onboard_count() + stats.offboard_count());
            }

            let summary = coordinator.end().await;
            prop_assert_eq!(summary.total, attempts.len() as u64);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
