//! Ordered startup and two-pass shutdown of named components.
//!
//! Components start in ascending [`Component::priority`] order. Shutdown walks
//! the started components in reverse: first every component is quiesced, then
//! every component is stopped, so nothing is torn down while a peer may still
//! be pushing work into it.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::factory::Factory;
use crate::pool::Pool;

/// A unit with a managed lifetime: a pool, a consumer, a periodic task.
#[async_trait]
pub trait Component: Send + Sync {
    /// Start order; lower starts first and stops last.
    fn priority(&self) -> i32 {
        1
    }

    /// Bring the component up.
    async fn start(&self) -> Result<()>;

    /// Stop accepting new work and let in-flight work finish.
    async fn quiesce(&self) {}

    /// Release everything the component holds.
    async fn stop(&self);
}

#[async_trait]
impl<F: Factory> Component for Pool<F> {
    fn priority(&self) -> i32 {
        self.config().priority
    }

    async fn start(&self) -> Result<()> {
        self.init().await
    }

    async fn quiesce(&self) {
        if let Err(err) = Pool::quiesce(self).await {
            tracing::warn!(resource_id = self.id(), error = %err, "Pool quiesce failed");
        }
    }

    async fn stop(&self) {
        if let Err(err) = self.close().await {
            tracing::error!(resource_id = self.id(), error = %err, "Pool close failed");
        }
    }
}

struct Entry {
    name: String,
    component: Arc<dyn Component>,
}

/// Starts and stops attached components in priority order.
#[derive(Default)]
pub struct Coordinator {
    components: Vec<Entry>,
    /// Indices into `components`, in start order.
    started: Mutex<Vec<usize>>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("components", &self.names())
            .field("started", &self.started.lock().len())
            .finish()
    }
}

impl Coordinator {
    /// Create an empty coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component under a unique name.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyAttached`] if `name` is taken.
    pub fn attach<C>(&mut self, name: impl Into<String>, component: C) -> Result<()>
    where
        C: Component + 'static,
    {
        self.attach_shared(name, Arc::new(component))
    }

    /// Register a component that is also used elsewhere.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyAttached`] if `name` is taken.
    pub fn attach_shared(
        &mut self,
        name: impl Into<String>,
        component: Arc<dyn Component>,
    ) -> Result<()> {
        let name = name.into();
        if self.components.iter().any(|entry| entry.name == name) {
            return Err(Error::AlreadyAttached { name });
        }
        tracing::debug!(component = %name, priority = component.priority(), "Component attached");
        self.components.push(Entry { name, component });
        Ok(())
    }

    /// Attached component names, in attach order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.components.iter().map(|e| e.name.as_str()).collect()
    }

    /// Number of attached components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether no component is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Start every component not started yet, lowest priority first.
    ///
    /// Stops at the first failure; components started before it stay
    /// started and are covered by [`shutdown`](Self::shutdown).
    pub async fn start(&self) -> Result<()> {
        let mut order: Vec<usize> = (0..self.components.len()).collect();
        // Stable sort keeps attach order among equal priorities.
        order.sort_by_key(|&i| self.components[i].component.priority());

        for index in order {
            if self.started.lock().contains(&index) {
                continue;
            }
            let entry = &self.components[index];
            tracing::info!(component = %entry.name, "Starting component");
            if let Err(err) = entry.component.start().await {
                tracing::error!(component = %entry.name, error = %err, "Component failed to start");
                return Err(Error::Startup {
                    component: entry.name.clone(),
                    source: Box::new(err),
                });
            }
            self.started.lock().push(index);
        }

        tracing::info!(components = self.components.len(), "Application started");
        Ok(())
    }

    /// Quiesce then stop every started component, in reverse start order.
    ///
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let started = std::mem::take(&mut *self.started.lock());
        if started.is_empty() {
            return;
        }

        tracing::info!(components = started.len(), "Prepare to stop application");
        for &index in started.iter().rev() {
            let entry = &self.components[index];
            tracing::debug!(component = %entry.name, "Quiescing component");
            entry.component.quiesce().await;
        }

        tracing::info!("Stopping application");
        for &index in started.iter().rev() {
            let entry = &self.components[index];
            tracing::debug!(component = %entry.name, "Stopping component");
            entry.component.stop().await;
        }
        tracing::info!("Application stopped");
    }

    /// Start, wait for `signal`, then shut down.
    ///
    /// On a start failure whatever did start is shut down and the error is
    /// returned.
    pub async fn run_until<S>(&self, signal: S) -> Result<()>
    where
        S: Future<Output = ()> + Send,
    {
        if let Err(err) = self.start().await {
            self.shutdown().await;
            return Err(err);
        }
        signal.await;
        tracing::info!("Shutdown signal received");
        self.shutdown().await;
        Ok(())
    }
}
