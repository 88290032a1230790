//! Core types shared by the registry and the executor.
//!
//! # Configuration
//! - [`Config`]: Caller timeout and cache time-to-live
//! - [`ShouldCache`]: Optional cache-gating predicate
//!
//! # Outcomes
//! - [`Outcome`]: The write-once result of one operation generation
//!
//! # Error Handling
//! - [`FunnelError`]: Timeout or application error returned to a caller
//! - [`OperationPanic`]: Panic payload re-raised in every waiting caller

mod config;
mod error;
mod outcome;

pub use config::{Config, ShouldCache, DEFAULT_CACHE_TTL, DEFAULT_TIMEOUT};
pub use error::{FunnelError, OperationPanic, SharedResult};
pub use outcome::Outcome;
