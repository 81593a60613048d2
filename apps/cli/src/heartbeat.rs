//! Periodic liveness messages published through the pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use moorage_resource::{Component, Pool, Result};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::HeartbeatConfig;
use crate::publisher::PublisherFactory;

/// Publishes a heartbeat every `interval` until quiesced.
pub struct Heartbeat {
    pool: Pool<PublisherFactory>,
    config: HeartbeatConfig,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    beats: Arc<AtomicU64>,
}

impl Heartbeat {
    pub fn new(pool: Pool<PublisherFactory>, config: HeartbeatConfig) -> Self {
        Self {
            pool,
            config,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
            beats: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Heartbeats published so far.
    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }
}

async fn beat(pool: &Pool<PublisherFactory>, timeout: Duration, seq: u64) -> Result<()> {
    let payload = serde_json::json!({
        "id": Uuid::new_v4().to_string(),
        "seq": seq,
        "at": Utc::now().to_rfc3339(),
    })
    .to_string();

    let lease = pool.acquire(Some(timeout)).await?;
    let outcome = lease.publish(&payload).await;
    pool.release(lease).await;
    outcome
}

#[async_trait]
impl Component for Heartbeat {
    fn priority(&self) -> i32 {
        self.config.priority
    }

    async fn start(&self) -> Result<()> {
        let pool = self.pool.clone();
        let cancel = self.cancel.clone();
        let beats = Arc::clone(&self.beats);
        let interval = self.config.interval;

        let task = tokio::spawn(
            async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                    let seq = beats.load(Ordering::Relaxed) + 1;
                    match beat(&pool, interval, seq).await {
                        Ok(()) => {
                            beats.store(seq, Ordering::Relaxed);
                            tracing::debug!(seq, "Heartbeat published");
                        }
                        Err(err) => tracing::warn!(seq, error = %err, "Heartbeat failed"),
                    }
                }
            }
            .in_current_span(),
        );
        *self.task.lock() = Some(task);
        tracing::info!(interval = ?interval, "Heartbeat started");
        Ok(())
    }

    async fn quiesce(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(err) = task.await
        {
            tracing::warn!(error = %err, "Heartbeat task ended abnormally");
        }
    }

    async fn stop(&self) {
        self.cancel.cancel();
        tracing::info!(beats = self.beats(), "Heartbeat stopped");
    }
}
