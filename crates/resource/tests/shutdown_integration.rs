//! Two-phase shutdown: quiesce waits for leases, close destroys exactly once,
//! and neither is cut short when the caller stops waiting.

use std::time::Duration;

use moorage_resource::testing::MockFactory;
use moorage_resource::{Error, Pool, PoolConfig};

fn pool_with(factory: &MockFactory, config: PoolConfig) -> Pool<MockFactory> {
    Pool::new(factory.clone(), config).unwrap()
}

#[tokio::test(start_paused = true)]
async fn close_waits_for_outstanding_leases() {
    let factory = MockFactory::new();
    let pool = pool_with(&factory, PoolConfig::sized(2, 2));
    pool.init().await.unwrap();

    let a = pool.acquire(None).await.unwrap();
    let b = pool.acquire(None).await.unwrap();

    let closing = tokio::spawn({
        let pool = pool.clone();
        async move { pool.close().await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(factory.destroy_calls(), 0, "nothing destroyed while leased");
    assert!(a.is_quiesced() && b.is_quiesced());
    assert!(pool.stats().draining);
    assert!(matches!(pool.acquire(None).await, Err(Error::Closed { .. })));

    drop(a);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(factory.destroy_calls(), 0);

    drop(b);
    closing.await.unwrap().unwrap();
    assert_eq!(factory.destroyed_serials(), vec![1, 2]);
    assert_eq!(pool.stats().destroyed, 2);
}

#[tokio::test(start_paused = true)]
async fn drain_timeout_bounds_the_wait() {
    let factory = MockFactory::new();
    let config = PoolConfig {
        drain_timeout: Duration::from_secs(1),
        ..PoolConfig::sized(1, 1)
    };
    let pool = pool_with(&factory, config);
    pool.init().await.unwrap();

    let stuck = pool.acquire(None).await.unwrap();
    let started = tokio::time::Instant::now();
    pool.close().await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(factory.destroyed_serials(), vec![1]);

    drop(stuck);
    let stats = pool.stats();
    assert_eq!(stats.leased, 0);
    assert_eq!(stats.idle, 0);
    assert_eq!(factory.destroy_calls(), 1, "late return is not destroyed again");
}

#[tokio::test]
async fn second_close_is_a_noop() {
    let factory = MockFactory::new();
    let pool = pool_with(&factory, PoolConfig::sized(3, 3));
    pool.init().await.unwrap();

    pool.close().await.unwrap();
    assert_eq!(factory.destroy_calls(), 3);

    pool.close().await.unwrap();
    assert_eq!(factory.destroy_calls(), 3);
}

#[tokio::test]
async fn close_collects_every_destroy_failure() {
    let factory = MockFactory::new();
    let pool = pool_with(&factory, PoolConfig::sized(3, 3));
    pool.init().await.unwrap();
    factory.fail_destroy_of(1);
    factory.fail_destroy_of(3);

    let err = pool.close().await.unwrap_err();
    let Error::Close { failures, .. } = &err else {
        panic!("expected Close, got {err:?}");
    };
    let mut failed: Vec<u64> = failures.iter().map(|f| f.handle.get()).collect();
    failed.sort_unstable();
    assert_eq!(failed, vec![1, 3]);
    assert_eq!(factory.destroy_calls(), 3, "handle 2 was still destroyed");

    let stats = pool.stats();
    assert!(stats.closed);
    assert_eq!(stats.created, 0);
    assert!(pool.close().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn state_machine_misuse_is_reported() {
    let factory = MockFactory::new();
    let pool = pool_with(&factory, PoolConfig::sized(1, 2));

    assert!(matches!(
        pool.acquire(None).await,
        Err(Error::NotInitialized { .. })
    ));

    pool.init().await.unwrap();
    let lease = pool.acquire(None).await.unwrap();
    let _ = pool.close().await;

    pool.release(lease).await;
    assert_eq!(factory.reset_calls(), 0, "release after close skips the reset hook");
    assert_eq!(pool.stats().idle, 0);
    assert!(matches!(pool.acquire(None).await, Err(Error::Closed { .. })));
}

#[tokio::test]
async fn failed_init_destroys_partial_handles() {
    let factory = MockFactory::new();
    let pool = pool_with(&factory, PoolConfig::sized(3, 5));

    factory.fail_creates_after(2);
    let err = pool.init().await.unwrap_err();
    assert!(matches!(err, Error::Initialization { .. }), "got {err:?}");
    assert_eq!(factory.destroyed_serials(), vec![1, 2]);

    let stats = pool.stats();
    assert_eq!(stats.created, 0);
    assert!(!stats.initialized);

    factory.clear_failures();
    pool.init().await.unwrap();
    assert_eq!(pool.stats().idle, 3);
    assert_eq!(factory.live(), 3);
}

#[tokio::test]
async fn quiesce_wakes_suspended_acquirers_with_closed() {
    let factory = MockFactory::new();
    let pool = pool_with(&factory, PoolConfig::sized(1, 1));
    pool.init().await.unwrap();
    let held = pool.acquire(None).await.unwrap();

    let waiter = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire(None).await }
    });
    while pool.stats().waiters == 0 {
        tokio::task::yield_now().await;
    }

    let quiescing = tokio::spawn({
        let pool = pool.clone();
        async move { pool.quiesce().await }
    });

    assert!(matches!(waiter.await.unwrap(), Err(Error::Closed { .. })));
    drop(held);
    quiescing.await.unwrap().unwrap();

    assert_eq!(factory.destroy_calls(), 0, "quiesce does not destroy");
    pool.close().await.unwrap();
    assert_eq!(factory.destroy_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn handle_created_during_shutdown_is_discarded() {
    let factory = MockFactory::new().with_create_delay(Duration::from_millis(100));
    let pool = pool_with(&factory, PoolConfig::sized(1, 2));
    pool.init().await.unwrap();
    let held = pool.acquire(None).await.unwrap();

    let growing = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire(None).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    drop(held);
    pool.close().await.unwrap();
    assert_eq!(
        factory.destroyed_serials(),
        vec![1, 2],
        "close returns only after the late handle is gone"
    );
    assert_eq!(factory.live(), 0);

    assert!(matches!(growing.await.unwrap(), Err(Error::Closed { .. })));
    assert_eq!(factory.created_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn abandoned_close_still_destroys_every_handle() {
    let factory = MockFactory::new().with_destroy_delay(Duration::from_millis(100));
    let pool = pool_with(&factory, PoolConfig::sized(2, 2));
    pool.init().await.unwrap();

    let abandoned = tokio::time::timeout(Duration::from_millis(50), pool.close()).await;
    assert!(abandoned.is_err());

    pool.close().await.unwrap();
    assert_eq!(factory.destroyed_serials(), vec![1, 2]);
    assert_eq!(factory.live(), 0);
    assert_eq!(pool.stats().destroyed, 2);
    assert!(pool.stats().closed);
}

#[tokio::test(start_paused = true)]
async fn abandoned_init_runs_to_completion() {
    let factory = MockFactory::new().with_create_delay(Duration::from_millis(100));
    let pool = pool_with(&factory, PoolConfig::sized(3, 3));

    let abandoned = tokio::time::timeout(Duration::from_millis(250), pool.init()).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_secs(1)).await;
    let stats = pool.stats();
    assert!(stats.initialized);
    assert_eq!(stats.created, 3);
    assert_eq!(stats.idle, 3);
    assert_eq!(factory.live(), 3, "every created handle is owned by the pool");

    pool.close().await.unwrap();
    assert_eq!(factory.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn close_waits_for_an_abandoned_init() {
    let factory = MockFactory::new().with_create_delay(Duration::from_millis(100));
    let pool = pool_with(&factory, PoolConfig::sized(2, 2));

    let abandoned = tokio::time::timeout(Duration::from_millis(50), pool.init()).await;
    assert!(abandoned.is_err());

    pool.close().await.unwrap();
    assert_eq!(factory.created_count(), 2);
    assert_eq!(factory.destroyed_serials(), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn abandoned_quiesce_is_not_repeated_by_close() {
    let factory = MockFactory::new();
    let config = PoolConfig {
        drain_timeout: Duration::from_secs(5),
        ..PoolConfig::sized(2, 2)
    };
    let pool = pool_with(&factory, config);
    pool.init().await.unwrap();
    let held = pool.acquire(None).await.unwrap();

    let abandoned = tokio::time::timeout(Duration::from_millis(50), pool.quiesce()).await;
    assert!(abandoned.is_err());
    assert_eq!(factory.quiesce_calls(), 2);
    assert!(pool.stats().draining);

    drop(held);
    pool.close().await.unwrap();
    assert_eq!(factory.quiesce_calls(), 2, "each handle is quiesced once");
    assert_eq!(factory.destroyed_serials(), vec![1, 2]);
}
