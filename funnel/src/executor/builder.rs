use super::Funnel;
use crate::core::{Config, ShouldCache};
use std::time::Duration;

/// Builder for [`Funnel`].
///
/// # Example
///
/// ```
/// use funnel::Funnel;
/// use std::time::Duration;
///
/// // Cache results for 5 seconds, wait at most 3 minutes.
/// let funnel: Funnel<String, std::io::Error> = Funnel::builder()
///     .cache_ttl(Duration::from_secs(5))
///     .timeout(Duration::from_secs(3 * 60))
///     .build();
///
/// assert_eq!(funnel.config().cache_ttl, Duration::from_secs(5));
/// ```
pub struct FunnelBuilder<T, E> {
    config: Config,
    should_cache: Option<ShouldCache<T, E>>,
}

impl<T, E> FunnelBuilder<T, E> {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            should_cache: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Maximum time callers wait for an operation (default: 1 minute).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Time a completed result stays cached (default: 0, no caching).
    pub fn cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.config.cache_ttl = cache_ttl;
        self
    }

    /// Registers a cache-gating predicate.
    ///
    /// The predicate is kept on the funnel but not consulted: completed
    /// results are cached unconditionally for `cache_ttl`.
    pub fn should_cache<P>(mut self, predicate: P) -> Self
    where
        P: Fn(Result<&T, &E>) -> bool + Send + Sync + 'static,
    {
        self.should_cache = Some(ShouldCache::new(predicate));
        self
    }

    pub fn build(self) -> Funnel<T, E>
    where
        T: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        Funnel::from_parts(self.config, self.should_cache)
    }
}

impl<T, E> Default for FunnelBuilder<T, E> {
    fn default() -> Self {
        Self::new()
    }
}
