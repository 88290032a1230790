//! Funnel: coalescing of identical concurrent operations.
//!
//! When many tasks ask for the same logical operation at the same time (an
//! expensive API call keyed by an id, say), `funnel` runs it exactly once and
//! hands the result to every caller. Results can optionally stay cached for a
//! while after completion, and every caller of one execution shares the same
//! absolute deadline.
//!
//! # Features
//!
//! - **Coalescing**: One execution per operation id, shared by all concurrent callers
//! - **Result caching**: Completed results stay servable for a configurable TTL
//! - **Shared deadline**: Late joiners only get what is left of the first caller's timeout
//! - **Panic propagation**: A panicking operation panics every waiting caller with the same payload
//! - **Non-cancelling timeouts**: A timed-out caller never stops the running operation
//!
//! # Quick Start
//!
//! ```no_run
//! use funnel::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let funnel: Funnel<String, std::io::Error> = Funnel::builder()
//!         .timeout(Duration::from_secs(3 * 60))
//!         .cache_ttl(Duration::from_secs(5))
//!         .build();
//!
//!     let callers: Vec<_> = (0..10)
//!         .map(|_| {
//!             let funnel = funnel.clone();
//!             tokio::spawn(async move {
//!                 funnel
//!                     .execute("report:2024", || async {
//!                         tokio::time::sleep(Duration::from_millis(100)).await;
//!                         Ok("expensive report".to_string())
//!                     })
//!                     .await
//!             })
//!         })
//!         .collect();
//!
//!     for caller in callers {
//!         println!("{}", caller.await.unwrap().unwrap());
//!     }
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`core`]: Configuration, outcomes and errors
//! - [`executor`]: The [`Funnel`] engine
//!
//! The per-operation records and the concurrent id -> record map stay private
//! to the crate; only the engine creates and evicts them.
//!
//! ```compile_fail
//! use funnel::registry::Registry;
//! ```
//!
//! # Runtime
//!
//! Operations run on tokio tasks; a `Funnel` must be used from within a tokio runtime.

pub mod core;
pub mod executor;
mod registry;

pub use crate::core::{
    Config, FunnelError, OperationPanic, Outcome, SharedResult, ShouldCache, DEFAULT_CACHE_TTL,
    DEFAULT_TIMEOUT,
};
pub use crate::executor::{Funnel, FunnelBuilder};

/// Prelude module for convenient glob imports
///
/// # Example
///
/// ```ignore
/// use funnel::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{Config, FunnelError, OperationPanic, SharedResult};
    pub use crate::executor::{Funnel, FunnelBuilder};

    pub use std::sync::Arc;
}
