//! Pooled broker publisher over a line-oriented TCP protocol.
//!
//! Each frame is `exchange<TAB>payload<LF>`. A [`Publisher`] keeps one
//! connection, reconnects through its [`Reconnector`] when a write fails, and
//! refuses new publishes once the pool quiesces it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use moorage_resource::{Error, Factory, ReconnectPolicy, Reconnector, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};

use crate::config::{AppConfig, BrokerConfig};

const RESOURCE_ID: &str = "publisher";

/// Creates [`Publisher`] connections to one broker.
#[derive(Debug, Clone)]
pub struct PublisherFactory {
    broker: BrokerConfig,
    policy: ReconnectPolicy,
}

impl PublisherFactory {
    pub fn new(broker: BrokerConfig, policy: ReconnectPolicy) -> Self {
        Self { broker, policy }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let mut policy = ReconnectPolicy::from_pool_config(&config.pool);
        policy.max_attempts = config.broker.connect_attempts;
        Self::new(config.broker.clone(), policy)
    }
}

/// One broker connection.
#[derive(Debug)]
pub struct Publisher {
    address: String,
    exchange: String,
    publish_timeout: Duration,
    reconnector: Reconnector,
    stream: Mutex<Option<TcpStream>>,
    in_flight: AtomicUsize,
    drained: Notify,
    stopping: AtomicBool,
}

/// Counts a publish as in flight until dropped.
struct InFlight<'a>(&'a Publisher);

impl<'a> InFlight<'a> {
    fn enter(publisher: &'a Publisher) -> Self {
        publisher.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(publisher)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.drained.notify_waiters();
        }
    }
}

impl Publisher {
    async fn dial(&self) -> Result<TcpStream> {
        let address = self.address.as_str();
        self.reconnector
            .connect(RESOURCE_ID, || async move {
                TcpStream::connect(address)
                    .await
                    .map_err(|e| Error::create_from(RESOURCE_ID, e))
            })
            .await
    }

    /// Publish one payload to the configured exchange.
    ///
    /// Reconnects while the link is down, bounded by the publish timeout.
    pub async fn publish(&self, payload: &str) -> Result<()> {
        // Counted before the check so quiesce cannot miss a publish that passes it.
        let _in_flight = InFlight::enter(self);
        if self.stopping.load(Ordering::SeqCst) {
            return Err(Error::closed(RESOURCE_ID));
        }
        let frame = format!("{}\t{}\n", self.exchange, payload);

        tokio::time::timeout(self.publish_timeout, self.write_frame(frame.as_bytes()))
            .await
            .map_err(|_| Error::timeout(RESOURCE_ID, self.publish_timeout, "publish"))?
    }

    async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        let mut stream = self.stream.lock().await;
        loop {
            if stream.is_none() {
                *stream = Some(self.dial().await?);
            }
            let Some(conn) = stream.as_mut() else {
                continue;
            };
            match conn.write_all(frame).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::warn!(
                        resource_id = RESOURCE_ID,
                        address = %self.address,
                        error = %err,
                        "Publish failed, reconnecting"
                    );
                    *stream = None;
                    self.reconnector.mark_disconnected();
                }
            }
        }
    }

    /// Publishes currently in progress.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    async fn wait_drained(&self) {
        loop {
            let drained = self.drained.notified();
            if self.in_flight() == 0 {
                return;
            }
            drained.await;
        }
    }
}

#[async_trait]
impl Factory for PublisherFactory {
    type Handle = Publisher;

    fn id(&self) -> &str {
        RESOURCE_ID
    }

    async fn create(&self) -> Result<Publisher> {
        let publisher = Publisher {
            address: self.broker.address.clone(),
            exchange: self.broker.exchange.clone(),
            publish_timeout: self.broker.publish_timeout,
            reconnector: Reconnector::new(self.policy.clone()),
            stream: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
            stopping: AtomicBool::new(false),
        };
        let stream = publisher.dial().await?;
        *publisher.stream.lock().await = Some(stream);
        tracing::debug!(resource_id = RESOURCE_ID, address = %publisher.address, "Connected");
        Ok(publisher)
    }

    async fn quiesce(&self, publisher: &Publisher) {
        publisher.stopping.store(true, Ordering::SeqCst);
        publisher.wait_drained().await;
    }

    async fn destroy(&self, publisher: &Publisher) -> Result<()> {
        publisher.reconnector.stop();
        let stream = publisher.stream.lock().await.take();
        if let Some(mut stream) = stream {
            stream
                .shutdown()
                .await
                .map_err(|e| Error::destroy_from(RESOURCE_ID, e))?;
        }
        Ok(())
    }
}
