//! Execution engine.
//!
//! Following Parnas's information hiding principles:
//! - funnel: Hides executor spawning, the shared-deadline wait and eviction scheduling
//! - builder: Hides how configuration is assembled

mod builder;
mod funnel;

pub use builder::FunnelBuilder;
pub use funnel::Funnel;
