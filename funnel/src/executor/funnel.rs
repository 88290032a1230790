//! The coalescing engine.
//!
//! This module hides:
//! - How executor tasks are spawned and how panics are captured
//! - The shared-deadline wait and timeout eviction
//! - Delayed eviction of cached results
//!
//! Callers only see [`Funnel::execute`] and friends.

use super::builder::FunnelBuilder;
use crate::core::{Config, FunnelError, OperationPanic, Outcome, SharedResult, ShouldCache};
use crate::registry::{Record, Registry};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use tracing::{debug, warn, Instrument};

/// Deduplicates concurrent executions of identical operations.
///
/// The first call for an operation id starts the operation in a background
/// task. Every call for the same id that arrives before the result is evicted
/// waits for that single execution and receives the same result.
///
/// `Funnel` is a cheap handle: clones share the same registry and
/// configuration. Separate `Funnel::new()` instances never share operations.
///
/// # Example
///
/// ```no_run
/// use funnel::Funnel;
/// use std::time::Duration;
///
/// # async fn example() {
/// let funnel: Funnel<String, std::io::Error> = Funnel::builder()
///     .cache_ttl(Duration::from_secs(5))
///     .build();
///
/// let profile = funnel
///     .execute("user:42", || async {
///         // Expensive call, executed once no matter how many callers ask.
///         Ok("alice".to_string())
///     })
///     .await;
/// # }
/// ```
pub struct Funnel<T, E> {
    inner: Arc<Inner<T, E>>,
}

struct Inner<T, E> {
    registry: Registry<T, E>,
    config: Config,
    should_cache: Option<ShouldCache<T, E>>,
}

impl<T, E> Funnel<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Creates a funnel with the default configuration
    /// (timeout: 1 minute, cache TTL: 0).
    pub fn new() -> Self {
        Self::from_parts(Config::default(), None)
    }

    pub fn with_config(config: Config) -> Self {
        Self::from_parts(config, None)
    }

    pub fn builder() -> FunnelBuilder<T, E> {
        FunnelBuilder::new()
    }

    pub(super) fn from_parts(config: Config, should_cache: Option<ShouldCache<T, E>>) -> Self {
        if should_cache.is_some() {
            warn!("should-cache predicate configured; completed results are still cached unconditionally");
        }

        Self {
            inner: Arc::new(Inner {
                registry: Registry::new(),
                config,
                should_cache,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The cache-gating predicate, if one was configured.
    pub fn should_cache_predicate(&self) -> Option<&ShouldCache<T, E>> {
        self.inner.should_cache.as_ref()
    }

    /// Executes `operation` once for all concurrent callers of `operation_id`.
    ///
    /// If no live generation exists for the id, `operation` is started in a
    /// new task; otherwise it is dropped and the caller joins the running (or
    /// cached) generation.
    ///
    /// IMPORTANT: the returned value is shared between all callers of the
    /// generation. Use [`Funnel::execute_and_copy_result`] for a dedicated copy.
    ///
    /// # Errors
    ///
    /// - [`FunnelError::Operation`] if the operation returned an error
    /// - [`FunnelError::Timeout`] if the shared deadline passed first; the
    ///   generation is evicted but the operation keeps running
    ///
    /// # Panics
    ///
    /// If the operation body panics, every caller of the generation panics
    /// with the same [`OperationPanic`] payload.
    pub async fn execute<F, Fut>(&self, operation_id: &str, operation: F) -> SharedResult<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let record = self.inner.join(operation_id, move || {
            AssertUnwindSafe(async move { operation().await })
                .catch_unwind()
                .map(|result| match result {
                    Ok(result) => Outcome::from_result(result),
                    Err(payload) => Outcome::Panicked(OperationPanic::from_payload(payload)),
                })
        });

        self.inner.wait(record).await
    }

    /// Same as [`Funnel::execute`] for a synchronous operation body.
    ///
    /// The body runs on tokio's blocking thread pool so it never stalls the
    /// async workers.
    pub async fn execute_blocking<F>(&self, operation_id: &str, operation: F) -> SharedResult<T, E>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let record = self.inner.join(operation_id, move || async move {
            match tokio::task::spawn_blocking(operation).await {
                Ok(result) => Outcome::from_result(result),
                Err(e) if e.is_panic() => Outcome::Panicked(OperationPanic::from_payload(e.into_panic())),
                Err(e) => Outcome::Panicked(OperationPanic::new(e.to_string())),
            }
        });

        self.inner.wait(record).await
    }

    /// Like [`Funnel::execute`], but returns a dedicated deep copy of the value.
    ///
    /// Mutating the returned value is never observed by other callers or by
    /// the cached result.
    pub async fn execute_and_copy_result<F, Fut>(
        &self,
        operation_id: &str,
        operation: F,
    ) -> Result<T, FunnelError<E>>
    where
        T: Clone,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.execute(operation_id, operation)
            .await
            .map(|shared| T::clone(&shared))
    }

    /// Returns true if a generation for `operation_id` is running or cached.
    ///
    /// This is a snapshot and may be stale by the time it returns.
    pub fn is_operation_in_progress(&self, operation_id: &str) -> bool {
        self.inner.registry.contains(operation_id)
    }

    /// Number of live generations (running or cached).
    pub fn in_flight_count(&self) -> usize {
        self.inner.registry.len()
    }
}

impl<T, E> Inner<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Returns the live record for `operation_id`, starting a new generation
    /// with `body` if there is none.
    fn join<B, Fut>(self: &Arc<Self>, operation_id: &str, body: B) -> Arc<Record<T, E>>
    where
        B: FnOnce() -> Fut,
        Fut: Future<Output = Outcome<T, E>> + Send + 'static,
    {
        let (record, created) = self
            .registry
            .get_or_insert_with(operation_id, || Record::new(operation_id));

        if created {
            debug!(operation_id, "starting operation");
            self.spawn_executor(Arc::clone(&record), body());
        } else {
            debug!(
                operation_id,
                elapsed = ?record.elapsed(),
                completed = record.is_completed(),
                "joining existing operation"
            );
        }

        record
    }

    fn spawn_executor<Fut>(self: &Arc<Self>, record: Arc<Record<T, E>>, body: Fut)
    where
        Fut: Future<Output = Outcome<T, E>> + Send + 'static,
    {
        let inner = Arc::clone(self);
        let span = tracing::debug_span!("funnel_operation", operation_id = record.operation_id());

        tokio::spawn(
            async move {
                let outcome = body.await;
                if let Outcome::Panicked(panic) = &outcome {
                    warn!(%panic, "operation panicked; re-raising in every waiting caller");
                }

                record.complete(outcome);
                inner.finish(&record);
            }
            .instrument(span),
        );
    }

    /// Publishes a completed record and schedules its eviction.
    fn finish(self: &Arc<Self>, record: &Arc<Record<T, E>>) {
        let published = self.registry.while_live(record, || record.fire()).is_some();
        if !published {
            // A caller timed out and evicted this generation. Waiters that are
            // still blocked pick the result up via the completed flag.
            debug!(
                elapsed = ?record.elapsed(),
                "operation completed after its generation was evicted"
            );
            return;
        }

        let ttl = self.config.cache_ttl;
        if ttl.is_zero() {
            self.evict(record, "completed");
            return;
        }

        debug!(?ttl, "caching operation result");
        let inner: Weak<Self> = Arc::downgrade(self);
        let record = Arc::clone(record);
        tokio::spawn(
            async move {
                tokio::time::sleep(ttl).await;
                if let Some(inner) = inner.upgrade() {
                    inner.evict(&record, "cache ttl expired");
                }
            }
            .in_current_span(),
        );
    }

    async fn wait(&self, record: Arc<Record<T, E>>) -> SharedResult<T, E> {
        let result = record.wait(self.config.timeout).await;

        if let Err(FunnelError::Timeout { operation_id, timeout }) = &result {
            warn!(
                operation_id = operation_id.as_str(),
                ?timeout,
                "timed out waiting for operation; evicting generation"
            );
            self.evict(&record, "caller timed out");
        }

        result
    }

    fn evict(&self, record: &Arc<Record<T, E>>, reason: &'static str) {
        let operation_id = record.operation_id();
        if self.registry.compare_and_delete(operation_id, record) {
            debug!(operation_id, reason, "evicted operation");
        } else {
            debug!(operation_id, reason, "operation already evicted or superseded");
        }
    }
}

impl<T, E> Clone for Funnel<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> Default for Funnel<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> std::fmt::Debug for Funnel<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Funnel")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .field("should_cache", &self.inner.should_cache)
            .finish()
    }
}
