use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default time a caller waits for an operation before giving up.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default cache time-to-live: results are evicted as soon as they complete.
pub const DEFAULT_CACHE_TTL: Duration = Duration::ZERO;

/// Configuration for a [`Funnel`](crate::Funnel).
///
/// # Example
///
/// ```
/// use funnel::Config;
/// use std::time::Duration;
///
/// let config = Config::default()
///     .with_timeout(Duration::from_secs(3 * 60))
///     .with_cache_ttl(Duration::from_secs(5));
///
/// assert_eq!(config.timeout, Duration::from_secs(180));
/// assert_eq!(config.cache_ttl, Duration::from_secs(5));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum time callers wait for an operation to complete.
    ///
    /// Measured from the moment the operation started, so every caller of one
    /// generation shares the same absolute deadline.
    ///
    /// Default: 1 minute
    pub timeout: Duration,

    /// Time a completed result stays servable before it is evicted.
    ///
    /// Zero disables caching: the result is only shared with callers that
    /// joined while the operation was running.
    ///
    /// Default: 0
    pub cache_ttl: Duration,
}

impl Config {
    /// Sets the caller timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the cache time-to-live.
    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// Predicate deciding whether a completed result may be cached.
///
/// Accepted for API compatibility; completed results are currently cached
/// unconditionally for `cache_ttl`.
pub struct ShouldCache<T, E> {
    predicate: Arc<dyn Fn(Result<&T, &E>) -> bool + Send + Sync>,
}

impl<T, E> ShouldCache<T, E> {
    pub fn new<P>(predicate: P) -> Self
    where
        P: Fn(Result<&T, &E>) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Evaluates the predicate against an operation result.
    ///
    /// The engine never calls this; it is provided so callers can check their
    /// own predicate. Caching is not gated on it.
    pub fn evaluate(&self, result: Result<&T, &E>) -> bool {
        (self.predicate)(result)
    }
}

impl<T, E> Clone for ShouldCache<T, E> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<T, E> fmt::Debug for ShouldCache<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ShouldCache(..)")
    }
}
