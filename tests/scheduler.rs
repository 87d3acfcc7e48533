mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{put, seeded_store};
use murmuration::knowledge::{RetryPolicy, RootId};
use murmuration::path::parse;
use murmuration::process::{SchedulableProcess, body_fn};
use murmuration::scheduler::{ProcessRunner, ProcessState, Scheduler, SchedulerError, Trigger};
use serde_json::json;

fn counting_process(
    id: &str,
    owner: &str,
    trigger: Trigger,
    counter: Arc<AtomicUsize>,
) -> SchedulableProcess {
    SchedulableProcess {
        id: id.to_string(),
        owner: RootId::from(owner),
        trigger,
        parameters: Vec::new(),
        body: body_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    }
}

#[tokio::test(start_paused = true)]
async fn periodic_trigger_fires_on_the_offset_period_grid() {
    let store = seeded_store(&[("c", json!({}))]).await;
    let scheduler = Scheduler::new(store.clone());
    let fired = Arc::new(AtomicUsize::new(0));
    let process = counting_process(
        "c/tick",
        "c",
        Trigger::periodic(Duration::from_millis(100)),
        Arc::clone(&fired),
    );
    scheduler
        .register(Arc::new(ProcessRunner::new(
            process,
            store.clone(),
            RetryPolicy::default(),
        )))
        .unwrap();
    scheduler.start();

    // Simulated instants 0, 100, 200, 300: four fires, none doubled.
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 4);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn periodic_offset_delays_the_first_fire() {
    let store = seeded_store(&[("c", json!({}))]).await;
    let scheduler = Scheduler::new(store.clone());
    let fired = Arc::new(AtomicUsize::new(0));
    let process = counting_process(
        "c/offset",
        "c",
        Trigger::periodic_with_offset(Duration::from_millis(50), Duration::from_millis(100)),
        Arc::clone(&fired),
    );
    scheduler
        .register(Arc::new(ProcessRunner::new(
            process,
            store.clone(),
            RetryPolicy::default(),
        )))
        .unwrap();
    scheduler.start();

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0, "nothing before the offset");
    // Fires at 50, 150, 250.
    tokio::time::sleep(Duration::from_millis(260)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 3);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn knowledge_change_trigger_is_woken_by_exact_path_only() {
    let store = seeded_store(&[(
        "srv",
        json!({"incomingRequests": {"42": 1}, "processedResponses": {"42": 1}}),
    )])
    .await;
    let scheduler = Scheduler::new(store.clone());
    let woken = Arc::new(AtomicUsize::new(0));
    let process = counting_process(
        "srv/handle",
        "srv",
        Trigger::on_change(vec![parse("incomingRequests[42]").unwrap()]),
        Arc::clone(&woken),
    );
    scheduler
        .register(Arc::new(ProcessRunner::new(
            process,
            store.clone(),
            RetryPolicy::default(),
        )))
        .unwrap();
    scheduler.start();
    tokio::time::sleep(Duration::from_millis(5)).await;

    // A sibling path commits: the listener must stay asleep.
    put(&store, "srv", "processedResponses[42]", json!(2)).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(woken.load(Ordering::SeqCst), 0);

    // The watched path commits: exactly one wake-up.
    put(&store, "srv", "incomingRequests[42]", json!(2)).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(woken.load(Ordering::SeqCst), 1);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn deregistration_schedules_nothing_further() {
    let store = seeded_store(&[("c", json!({}))]).await;
    let scheduler = Scheduler::new(store.clone());
    let fired = Arc::new(AtomicUsize::new(0));
    let process = counting_process(
        "c/tick",
        "c",
        Trigger::periodic(Duration::from_millis(100)),
        Arc::clone(&fired),
    );
    scheduler
        .register(Arc::new(ProcessRunner::new(
            process,
            store.clone(),
            RetryPolicy::default(),
        )))
        .unwrap();
    scheduler.start();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 2);

    assert!(scheduler.deregister("c/tick"));
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 2, "no tick after deregistration");
    assert!(!scheduler.deregister("c/tick"), "already gone");

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn registration_is_live_while_the_scheduler_runs() {
    let store = seeded_store(&[("c", json!({}))]).await;
    let scheduler = Scheduler::new(store.clone());
    scheduler.start();

    let fired = Arc::new(AtomicUsize::new(0));
    let process = counting_process(
        "c/late",
        "c",
        Trigger::periodic(Duration::from_millis(100)),
        Arc::clone(&fired),
    );
    let handle = scheduler
        .register(Arc::new(ProcessRunner::new(
            process,
            store.clone(),
            RetryPolicy::default(),
        )))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 2);
    assert_eq!(handle.state(), ProcessState::Waiting);

    scheduler.stop().await;
    assert_eq!(handle.state(), ProcessState::Idle);
}

#[tokio::test]
async fn registration_rejects_duplicates_and_zero_periods() {
    let store = seeded_store(&[("c", json!({}))]).await;
    let scheduler = Scheduler::new(store.clone());
    let counter = Arc::new(AtomicUsize::new(0));

    let ok = counting_process(
        "c/p",
        "c",
        Trigger::periodic(Duration::from_millis(10)),
        Arc::clone(&counter),
    );
    scheduler
        .register(Arc::new(ProcessRunner::new(
            ok.clone(),
            store.clone(),
            RetryPolicy::default(),
        )))
        .unwrap();
    let duplicate = scheduler.register(Arc::new(ProcessRunner::new(
        ok,
        store.clone(),
        RetryPolicy::default(),
    )));
    assert!(matches!(duplicate, Err(SchedulerError::DuplicateId { .. })));

    let broken = counting_process(
        "c/zero",
        "c",
        Trigger::periodic(Duration::ZERO),
        Arc::clone(&counter),
    );
    let rejected = scheduler.register(Arc::new(ProcessRunner::new(
        broken,
        store.clone(),
        RetryPolicy::default(),
    )));
    assert!(matches!(rejected, Err(SchedulerError::InvalidTrigger { .. })));
}
