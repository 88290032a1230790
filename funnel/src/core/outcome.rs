use super::error::{FunnelError, OperationPanic, SharedResult};
use std::sync::Arc;

/// Final state of one operation generation.
///
/// Written once by the executor and read by every caller afterwards.
#[derive(Debug)]
pub enum Outcome<T, E> {
    /// The operation returned a value.
    Value(Arc<T>),
    /// The operation returned an application error.
    Failed(Arc<E>),
    /// The operation body panicked.
    Panicked(OperationPanic),
}

impl<T, E> Outcome<T, E> {
    pub(crate) fn from_result(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Outcome::Value(Arc::new(value)),
            Err(e) => Outcome::Failed(Arc::new(e)),
        }
    }

    /// Converts the outcome into the caller-facing result.
    ///
    /// # Panics
    ///
    /// Re-raises the captured panic for [`Outcome::Panicked`].
    pub(crate) fn resolve(&self) -> SharedResult<T, E> {
        match self {
            Outcome::Value(value) => Ok(Arc::clone(value)),
            Outcome::Failed(e) => Err(FunnelError::Operation(Arc::clone(e))),
            Outcome::Panicked(panic) => panic.resume(),
        }
    }
}
