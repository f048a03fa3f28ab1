mod common;

use common::{settings, start, ScriptedTransport, Step};
use proptest::prelude::*;
use question_queue::error::TransportError;
use question_queue::{ErrorKind, KeyValueStore, MemoryStore, RecordState, SubmitError};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

const TIMEOUT: Duration = Duration::from_secs(30);

fn texts(records: &[question_queue::QuestionRecord]) -> Vec<String> {
    records.iter().map(|r| r.question_text.clone()).collect()
}

fn state_of(scheduler: &question_queue::QueueScheduler, question: &str) -> RecordState {
    scheduler
        .snapshot()
        .into_iter()
        .find(|r| r.question_text == question)
        .map(|r| r.state)
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_two_slots_four_questions() {
    let transport = ScriptedTransport::new();
    transport.script("Q1", Step::answer_after(300, "A1"));
    transport.script("Q2", Step::answer_after(100, "A2"));
    transport.script("Q3", Step::answer_after(50, "A3"));
    transport.script("Q4", Step::answer_after(10, "A4"));
    let scheduler = start(transport.clone(), settings(2, 5), TIMEOUT, Arc::new(MemoryStore::new()));

    for q in ["Q1", "Q2", "Q3", "Q4"] {
        assert_ok!(scheduler.submit(q));
    }

    // Q1、Q2 立即派发，Q3、Q4 等待
    assert_eq!(state_of(&scheduler, "Q1"), RecordState::InFlight);
    assert_eq!(state_of(&scheduler, "Q2"), RecordState::InFlight);
    assert_eq!(state_of(&scheduler, "Q3"), RecordState::Pending);
    assert_eq!(state_of(&scheduler, "Q4"), RecordState::Pending);
    assert_eq!(scheduler.active_count(), 2);

    // Q2 在 100ms 结束后 Q3 才被放行
    tokio::time::sleep(Duration::from_millis(99)).await;
    assert_eq!(state_of(&scheduler, "Q3"), RecordState::Pending);
    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(state_of(&scheduler, "Q2"), RecordState::Answered);
    assert_eq!(state_of(&scheduler, "Q3"), RecordState::InFlight);
    assert_eq!(state_of(&scheduler, "Q4"), RecordState::Pending);

    scheduler.wait_idle().await;

    let records = scheduler.snapshot();
    assert_eq!(texts(&records), vec!["Q1", "Q2", "Q3", "Q4"]);
    assert!(records.iter().all(|r| r.state == RecordState::Answered));
    assert_eq!(records[0].answer_text.as_deref(), Some("A1"));
    assert_eq!(records[3].answer_text.as_deref(), Some("A4"));
    assert!(records[3].is_latest);
    assert_eq!(transport.calls(), vec!["Q1", "Q2", "Q3", "Q4"]);
    assert_eq!(transport.peak(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_fails_record_and_frees_slot() {
    let transport = ScriptedTransport::new();
    transport.script("slow", Step::answer_after(60_000, "too late"));
    transport.script("next", Step::answer_after(10, "quick"));
    let scheduler = start(transport.clone(), settings(1, 5), TIMEOUT, Arc::new(MemoryStore::new()));

    scheduler.submit("slow").unwrap();
    scheduler.submit("next").unwrap();
    assert_eq!(state_of(&scheduler, "next"), RecordState::Pending);

    tokio::time::sleep(Duration::from_millis(30_001)).await;
    let records = scheduler.snapshot();
    assert_eq!(records[0].state, RecordState::Failed);
    assert_eq!(
        records[0].answer_text.as_deref(),
        Some(ErrorKind::Timeout.default_message())
    );
    assert_eq!(records[1].state, RecordState::InFlight);

    scheduler.wait_idle().await;
    assert_eq!(state_of(&scheduler, "next"), RecordState::Answered);
    assert_eq!(scheduler.active_count(), 0);
    let stats = scheduler.gate_stats();
    assert_eq!((stats.acquired, stats.released), (2, 2));
}

#[tokio::test(start_paused = true)]
async fn test_too_long_question_rejected_before_dispatch() {
    let transport = ScriptedTransport::new();
    let scheduler = start(transport.clone(), settings(2, 5), TIMEOUT, Arc::new(MemoryStore::new()));

    let long = "a".repeat(1001);
    assert_eq!(
        scheduler.submit(&long),
        Err(SubmitError::TooLong { len: 1001, max: 1000 })
    );
    assert!(scheduler.snapshot().is_empty());
    assert_eq!(scheduler.pending_len(), 0);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(transport.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_sixth_submission_rejected_at_cap() {
    let transport = ScriptedTransport::new();
    let scheduler = start(transport.clone(), settings(2, 5), TIMEOUT, Arc::new(MemoryStore::new()));

    for i in 1..=5 {
        assert_ok!(scheduler.submit(&format!("question {}", i)));
    }
    assert_eq!(
        scheduler.submit("question 6"),
        Err(SubmitError::QueueFull { cap: 5 })
    );
    assert_eq!(scheduler.snapshot().len(), 5);
    assert!(!scheduler.can_submit("question 6"));

    // 有条目退出后可以继续提交
    tokio::time::sleep(Duration::from_millis(11)).await;
    assert!(scheduler.pending_len() < 5);
    assert_ok!(scheduler.submit("question 6"));

    scheduler.wait_idle().await;
    assert_eq!(scheduler.snapshot().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_rejected_without_new_record() {
    let transport = ScriptedTransport::new();
    let scheduler = start(transport.clone(), settings(2, 5), TIMEOUT, Arc::new(MemoryStore::new()));

    let first = scheduler.submit("What is the grace period?").unwrap();
    let err = scheduler.submit("  what is the GRACE period?  ").unwrap_err();
    assert_eq!(err, SubmitError::Duplicate { existing_id: first.id });
    assert_eq!(scheduler.snapshot().len(), 1);

    scheduler.wait_idle().await;
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failures_are_isolated() {
    let transport = ScriptedTransport::new();
    transport.script(
        "missing",
        Step::error_after(
            5,
            TransportError::Status {
                status: 404,
                message: Some("No document uploaded for this session".to_string()),
            },
        ),
    );
    transport.script(
        "busy",
        Step::error_after(
            5,
            TransportError::Status {
                status: 503,
                message: None,
            },
        ),
    );
    transport.script("boom", Step::panic_after(5));
    let scheduler = start(transport.clone(), settings(2, 5), TIMEOUT, Arc::new(MemoryStore::new()));

    for q in ["missing", "busy", "boom", "fine"] {
        scheduler.submit(q).unwrap();
    }
    scheduler.wait_idle().await;

    let records = scheduler.snapshot();
    assert_eq!(texts(&records), vec!["missing", "busy", "boom", "fine"]);
    assert_eq!(records[0].state, RecordState::Failed);
    assert_eq!(
        records[0].answer_text.as_deref(),
        Some("No document uploaded for this session")
    );
    assert_eq!(records[1].state, RecordState::Failed);
    assert!(records[1].answer_text.as_deref().unwrap().contains("503"));
    assert_eq!(records[2].state, RecordState::Failed);
    assert_eq!(
        records[2].answer_text.as_deref(),
        Some(ErrorKind::Unknown.default_message())
    );
    assert_eq!(records[3].state, RecordState::Answered);

    let stats = scheduler.gate_stats();
    assert_eq!((stats.acquired, stats.released), (4, 4));
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_persisted_value_restores_empty() {
    let kv = Arc::new(MemoryStore::new());
    kv.set("scenario-session-questions", "[{\"broken\": tru").unwrap();

    let scheduler = start(ScriptedTransport::new(), settings(2, 5), TIMEOUT, kv.clone());
    assert!(scheduler.snapshot().is_empty());

    scheduler.submit("fresh start").unwrap();
    scheduler.wait_idle().await;
    assert_eq!(scheduler.snapshot().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_restore_after_reload() {
    let kv = Arc::new(MemoryStore::new());
    {
        let scheduler = start(ScriptedTransport::new(), settings(2, 5), TIMEOUT, kv.clone());
        scheduler.submit("first").unwrap();
        scheduler.submit("second").unwrap();
        scheduler.wait_idle().await;
    }

    let reloaded = start(ScriptedTransport::new(), settings(2, 5), TIMEOUT, kv);
    let records = reloaded.snapshot();
    assert_eq!(texts(&records), vec!["first", "second"]);
    assert!(records.iter().all(|r| !r.is_latest));
    assert!(records.iter().all(|r| r.state == RecordState::Answered));
}

#[tokio::test(start_paused = true)]
async fn test_quota_exceeded_keeps_memory_ledger() {
    let kv = Arc::new(MemoryStore::with_quota(16));
    let scheduler = start(ScriptedTransport::new(), settings(2, 5), TIMEOUT, kv.clone());

    scheduler.submit("a question that will not fit in storage").unwrap();
    scheduler.wait_idle().await;

    let records = scheduler.snapshot();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].state, RecordState::Answered);
    assert!(kv.get("scenario-session-questions").unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_submission_during_dispatch_goes_to_tail() {
    let transport = ScriptedTransport::new();
    transport.script("a", Step::answer_after(100, "A"));
    transport.script("b", Step::answer_after(100, "B"));
    let scheduler = start(transport.clone(), settings(1, 5), TIMEOUT, Arc::new(MemoryStore::new()));

    scheduler.submit("a").unwrap();
    scheduler.submit("b").unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    scheduler.submit("c").unwrap();

    scheduler.wait_idle().await;
    assert_eq!(transport.calls(), vec!["a", "b", "c"]);
    assert_eq!(texts(&scheduler.snapshot()), vec!["a", "b", "c"]);
}

#[tokio::test(start_paused = true)]
async fn test_single_latest_flag() {
    let scheduler = start(ScriptedTransport::new(), settings(3, 5), TIMEOUT, Arc::new(MemoryStore::new()));
    assert_eq!(scheduler.snapshot().iter().filter(|r| r.is_latest).count(), 0);

    for q in ["x", "y", "z"] {
        let record = scheduler.submit(q).unwrap();
        let snapshot = scheduler.snapshot();
        let latest: Vec<_> = snapshot.iter().filter(|r| r.is_latest).collect();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id, record.id);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_order_and_gate_pairing_hold(
        latencies in proptest::collection::vec(1u64..2_500, 1..10),
        max_concurrent in 1usize..4,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();

        runtime.block_on(async {
            let transport = ScriptedTransport::new();
            let questions: Vec<String> = (0..latencies.len()).map(|i| format!("question {}", i)).collect();
            for (q, ms) in questions.iter().zip(&latencies) {
                transport.script(q, Step::answer_after(*ms, &format!("answer {}", q)));
            }

            // 1 秒超时，部分问题会超时
            let scheduler = start(
                transport.clone(),
                settings(max_concurrent, 100),
                Duration::from_secs(1),
                Arc::new(MemoryStore::new()),
            );
            let mut views = scheduler.subscribe();
            for q in &questions {
                scheduler.submit(q).unwrap();
                assert!(scheduler.active_count() <= max_concurrent);
            }

            while !views.borrow_and_update().is_idle() {
                assert!(views.borrow().active <= max_concurrent);
                views.changed().await.unwrap();
            }

            let records = scheduler.snapshot();
            assert_eq!(texts(&records), questions);
            for (record, ms) in records.iter().zip(&latencies) {
                if *ms < 1_000 {
                    assert_eq!(record.state, RecordState::Answered);
                } else if *ms > 1_000 {
                    assert_eq!(record.state, RecordState::Failed);
                    assert_eq!(record.answer_text.as_deref(), Some(ErrorKind::Timeout.default_message()));
                } else {
                    assert!(record.is_terminal());
                }
            }
            assert_eq!(records.iter().filter(|r| r.is_latest).count(), 1);

            let stats = scheduler.gate_stats();
            assert_eq!(stats.acquired, questions.len() as u64);
            assert_eq!(stats.released, stats.acquired);
            assert_eq!(scheduler.active_count(), 0);
            assert!(transport.peak() <= max_concurrent);
            assert_eq!(transport.calls(), questions);
        });
    }
}
