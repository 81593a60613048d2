//! Coordinator start and shutdown ordering.

use std::time::Duration;

use moorage_resource::testing::{EventLog, MockFactory, RecordingComponent};
use moorage_resource::{Coordinator, Error, Pool, PoolConfig};
use pretty_assertions::assert_eq;

fn events(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

#[tokio::test]
async fn starts_ascending_and_shuts_down_in_two_passes() {
    let log = EventLog::default();
    let mut coordinator = Coordinator::new();
    coordinator
        .attach("heartbeat", RecordingComponent::new("heartbeat", &log).with_priority(2))
        .unwrap();
    coordinator
        .attach("db", RecordingComponent::new("db", &log))
        .unwrap();
    coordinator
        .attach("amqp", RecordingComponent::new("amqp", &log))
        .unwrap();

    coordinator.start().await.unwrap();
    coordinator.shutdown().await;

    assert_eq!(
        log.events(),
        events(&[
            "start:db",
            "start:amqp",
            "start:heartbeat",
            "quiesce:heartbeat",
            "quiesce:amqp",
            "quiesce:db",
            "stop:heartbeat",
            "stop:amqp",
            "stop:db",
        ])
    );
}

#[tokio::test]
async fn failed_start_aborts_later_components() {
    let log = EventLog::default();
    let mut coordinator = Coordinator::new();
    coordinator
        .attach("db", RecordingComponent::new("db", &log))
        .unwrap();
    coordinator
        .attach(
            "broker",
            RecordingComponent::new("broker", &log)
                .with_priority(2)
                .failing_start(),
        )
        .unwrap();
    coordinator
        .attach("web", RecordingComponent::new("web", &log).with_priority(3))
        .unwrap();

    let err = coordinator.start().await.unwrap_err();
    assert!(
        matches!(&err, Error::Startup { component, .. } if component == "broker"),
        "got {err:?}"
    );

    coordinator.shutdown().await;
    assert_eq!(
        log.events(),
        events(&["start:db", "start:broker", "quiesce:db", "stop:db"])
    );
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    let log = EventLog::default();
    let mut coordinator = Coordinator::new();
    coordinator
        .attach("db", RecordingComponent::new("db", &log))
        .unwrap();

    coordinator.start().await.unwrap();
    coordinator.shutdown().await;
    coordinator.shutdown().await;

    assert_eq!(log.events(), events(&["start:db", "quiesce:db", "stop:db"]));
}

#[tokio::test]
async fn run_until_stops_on_signal() {
    let log = EventLog::default();
    let mut coordinator = Coordinator::new();
    coordinator
        .attach("db", RecordingComponent::new("db", &log))
        .unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let stopper = async move {
        tokio::task::yield_now().await;
        tx.send(()).unwrap();
    };
    let (outcome, ()) = tokio::join!(
        coordinator.run_until(async {
            let _ = rx.await;
        }),
        stopper
    );

    outcome.unwrap();
    assert_eq!(log.events(), events(&["start:db", "quiesce:db", "stop:db"]));
}

#[tokio::test]
async fn run_until_unwinds_a_failed_start() {
    let log = EventLog::default();
    let mut coordinator = Coordinator::new();
    coordinator
        .attach("db", RecordingComponent::new("db", &log))
        .unwrap();
    coordinator
        .attach(
            "broken",
            RecordingComponent::new("broken", &log)
                .with_priority(5)
                .failing_start(),
        )
        .unwrap();

    let err = coordinator.run_until(std::future::pending()).await.unwrap_err();
    assert!(matches!(err, Error::Startup { .. }));
    assert_eq!(
        log.events(),
        events(&["start:db", "start:broken", "quiesce:db", "stop:db"])
    );
}

#[tokio::test(start_paused = true)]
async fn pool_participates_as_a_component() {
    let factory = MockFactory::new();
    let pool = Pool::new(factory.clone(), PoolConfig::sized(2, 4)).unwrap();
    let log = EventLog::default();

    let mut coordinator = Coordinator::new();
    coordinator.attach("pool", pool.clone()).unwrap();
    coordinator
        .attach("worker", RecordingComponent::new("worker", &log).with_priority(2))
        .unwrap();

    coordinator.start().await.unwrap();
    assert_eq!(pool.stats().idle, 2);

    let lease = pool.acquire(None).await.unwrap();
    let shutdown = coordinator.shutdown();
    let release = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(factory.destroy_calls(), 0, "pool waits for the lease");
        drop(lease);
    };
    tokio::join!(shutdown, release);

    assert_eq!(factory.destroyed_serials(), vec![1, 2]);
    assert!(pool.stats().closed);
    assert_eq!(log.events(), events(&["start:worker", "quiesce:worker", "stop:worker"]));
}
