//! Pool saturation and hand-off tests

use std::time::Duration;

use moorage_resource::testing::MockFactory;
use moorage_resource::{Error, Pool, PoolConfig};
use tokio::time::Instant;

fn pool(min: usize, max: usize) -> (Pool<MockFactory>, MockFactory) {
    let factory = MockFactory::new();
    let pool = Pool::new(factory.clone(), PoolConfig::sized(min, max)).unwrap();
    (pool, factory)
}

async fn until_waiting(pool: &Pool<MockFactory>, waiters: usize) {
    while pool.stats().waiters < waiters {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn saturated_pool_times_out_without_consuming_a_slot() {
    let (pool, factory) = pool(1, 2);
    pool.init().await.unwrap();

    let _a = pool.acquire(None).await.unwrap();
    let _b = pool.acquire(None).await.unwrap();

    let started = Instant::now();
    let err = pool
        .acquire(Some(Duration::from_millis(100)))
        .await
        .unwrap_err();

    assert!(
        matches!(err, Error::Timeout { timeout_ms: 100, .. }),
        "expected Timeout, got: {err:?}"
    );
    assert!(started.elapsed() >= Duration::from_millis(100));

    let stats = pool.stats();
    assert_eq!(stats.created, 2);
    assert_eq!(stats.leased, 2);
    assert_eq!(stats.waiters, 0);
    assert_eq!(factory.created_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn configured_acquire_timeout_applies_by_default() {
    let factory = MockFactory::new();
    let config = PoolConfig {
        acquire_timeout: Some(Duration::from_millis(40)),
        ..PoolConfig::sized(1, 1)
    };
    let pool = Pool::new(factory, config).unwrap();
    pool.init().await.unwrap();

    let _held = pool.acquire(None).await.unwrap();
    let err = pool.acquire(None).await.unwrap_err();
    assert!(matches!(err, Error::Timeout { timeout_ms: 40, .. }));
}

#[tokio::test]
async fn release_wakes_the_suspended_caller_with_that_handle() {
    let (pool, _) = pool(1, 1);
    pool.init().await.unwrap();

    let held = pool.acquire(None).await.unwrap();
    let held_id = held.id();

    let waiter = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire(None).await }
    });
    until_waiting(&pool, 1).await;

    pool.release(held).await;

    let lease = waiter.await.unwrap().unwrap();
    assert_eq!(lease.id(), held_id);
    assert_eq!(pool.stats().idle, 0, "handed over, never queued idle");
    assert_eq!(pool.stats().leased, 1);
}

#[tokio::test]
async fn waiters_are_served_in_arrival_order() {
    let (pool, _) = pool(1, 1);
    pool.init().await.unwrap();
    let held = pool.acquire(None).await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    for name in ["first", "second", "third"] {
        let task_pool = pool.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let lease = task_pool.acquire(None).await.unwrap();
            tx.send(name).unwrap();
            drop(lease);
        });
        let expected = pool.stats().waiters + 1;
        until_waiting(&pool, expected).await;
    }

    drop(held);
    let mut order = Vec::new();
    for _ in 0..3 {
        order.push(rx.recv().await.unwrap());
    }
    assert_eq!(order, ["first", "second", "third"]);
}

#[tokio::test]
async fn retired_handle_frees_capacity_for_a_waiter() {
    let (pool, factory) = pool(1, 1);
    pool.init().await.unwrap();
    let held = pool.acquire(None).await.unwrap();
    let old_serial = held.serial;

    let waiter = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire(None).await }
    });
    until_waiting(&pool, 1).await;

    factory.fail_resets(true);
    pool.release(held).await;

    let lease = waiter.await.unwrap().unwrap();
    assert_ne!(lease.serial, old_serial, "waiter grew a fresh handle");
    assert_eq!(factory.destroyed_serials(), vec![old_serial]);
    assert_eq!(pool.stats().created, 1);
}

#[tokio::test]
async fn acquire_then_release_leaves_idle_unchanged() {
    let (pool, factory) = pool(3, 5);
    pool.init().await.unwrap();

    for _ in 0..10 {
        let lease = pool.acquire(None).await.unwrap();
        pool.release(lease).await;
        assert_eq!(pool.stats().idle, 3);
    }
    assert_eq!(factory.created_count(), 3, "idle handles are reused");
    assert_eq!(factory.reset_calls(), 10);

    let stats = pool.stats();
    assert_eq!(stats.total_acquisitions, 10);
    assert_eq!(stats.total_releases, 10);
}
