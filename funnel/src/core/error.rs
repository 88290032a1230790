use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Error returned to a caller of [`Funnel`](crate::Funnel).
///
/// The error type is generic over `E`, the application error produced by the
/// operation body. Application errors are never reinterpreted: every caller
/// sharing a generation receives the same `Arc<E>`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FunnelError<E> {
    /// The caller's share of the operation deadline elapsed before the
    /// operation completed. The operation itself keeps running.
    #[error("timeout expired while waiting for operation {operation_id} to complete (timeout={timeout:?})")]
    Timeout {
        operation_id: String,
        timeout: Duration,
    },

    /// The operation body returned an error.
    #[error("operation failed: {0}")]
    Operation(Arc<E>),
}

impl<E> FunnelError<E> {
    /// Returns true if this caller gave up waiting.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FunnelError::Timeout { .. })
    }

    /// Returns the application error, if the operation body produced one.
    pub fn operation_error(&self) -> Option<&Arc<E>> {
        match self {
            FunnelError::Operation(e) => Some(e),
            FunnelError::Timeout { .. } => None,
        }
    }
}

// Manual impl: the derive would require `E: Clone`, but the error is held by `Arc`.
impl<E> Clone for FunnelError<E> {
    fn clone(&self) -> Self {
        match self {
            FunnelError::Timeout {
                operation_id,
                timeout,
            } => FunnelError::Timeout {
                operation_id: operation_id.clone(),
                timeout: *timeout,
            },
            FunnelError::Operation(e) => FunnelError::Operation(Arc::clone(e)),
        }
    }
}

/// Payload of a panic raised inside an operation body.
///
/// The original unwind payload is captured once by the executor and kept
/// behind an `Arc`. Every caller waiting on the same generation unwinds with
/// a clone of the same `OperationPanic`, so payload identity can be checked
/// with [`OperationPanic::same_payload`] and the original value recovered with
/// [`OperationPanic::downcast_cloned`] or [`OperationPanic::with_payload`].
///
/// # Example
///
/// ```no_run
/// use funnel::{Funnel, OperationPanic};
///
/// #[derive(Clone, Debug)]
/// struct Fatal {
///     code: u32,
/// }
///
/// # async fn example() {
/// let funnel: Funnel<String, std::io::Error> = Funnel::new();
/// let caller = funnel.clone();
/// let joined = tokio::spawn(async move {
///     caller
///         .execute("boom", || async {
///             if true {
///                 std::panic::panic_any(Fatal { code: 42 });
///             }
///             Ok(String::new())
///         })
///         .await
/// })
/// .await;
///
/// let payload = joined.unwrap_err().into_panic();
/// let panic = payload.downcast_ref::<OperationPanic>().unwrap();
/// assert_eq!(panic.downcast_cloned::<Fatal>().unwrap().code, 42);
/// # }
/// ```
#[derive(Clone)]
pub struct OperationPanic {
    payload: Arc<Mutex<Box<dyn Any + Send>>>,
    message: Arc<str>,
}

impl OperationPanic {
    /// Builds a panic record from a raw unwind payload.
    ///
    /// The payload is kept as is. `&'static str` and `String` payloads (what
    /// `panic!` produces) also provide the message; any other payload type is
    /// described with a placeholder.
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        if let Some(panic) = payload.downcast_ref::<OperationPanic>() {
            return panic.clone();
        }

        let message: Arc<str> = if let Some(s) = payload.downcast_ref::<&'static str>() {
            Arc::from(*s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            Arc::from(s.as_str())
        } else {
            Arc::from("Box<dyn Any>")
        };

        Self {
            payload: Arc::new(Mutex::new(payload)),
            message,
        }
    }

    pub(crate) fn new(message: impl Into<Arc<str>>) -> Self {
        let message = message.into();
        let payload: Box<dyn Any + Send> = Box::new(message.to_string());
        Self {
            payload: Arc::new(Mutex::new(payload)),
            message,
        }
    }

    /// The panic message, or `"Box<dyn Any>"` for non-string payloads.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if the original payload is of type `P`.
    pub fn is<P: Any>(&self) -> bool {
        self.with_payload(|payload| payload.is::<P>())
    }

    /// Runs `f` with a reference to the original payload.
    pub fn with_payload<R>(&self, f: impl FnOnce(&(dyn Any + Send)) -> R) -> R {
        let payload = self.payload.lock().unwrap_or_else(PoisonError::into_inner);
        f(&**payload)
    }

    /// Runs `f` with the original payload if it is of type `P`.
    pub fn downcast_with<P: Any, R>(&self, f: impl FnOnce(&P) -> R) -> Option<R> {
        self.with_payload(|payload| payload.downcast_ref::<P>().map(f))
    }

    /// Returns a copy of the original payload if it is of type `P`.
    pub fn downcast_cloned<P: Any + Clone>(&self) -> Option<P> {
        self.downcast_with(P::clone)
    }

    /// Returns true if both values were captured from the same panic.
    pub fn same_payload(&self, other: &OperationPanic) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }

    /// Re-raises this panic in the current context.
    pub(crate) fn resume(&self) -> ! {
        std::panic::resume_unwind(Box::new(self.clone()))
    }
}

impl fmt::Debug for OperationPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationPanic")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for OperationPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result of a shared execution: the value is shared by every caller of the generation.
pub type SharedResult<T, E> = std::result::Result<Arc<T>, FunnelError<E>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display_names_operation() {
        let err: FunnelError<String> = FunnelError::Timeout {
            operation_id: "fetch-user".to_string(),
            timeout: Duration::from_millis(50),
        };

        assert!(err.is_timeout());
        assert!(err.operation_error().is_none());
        assert_eq!(
            err.to_string(),
            "timeout expired while waiting for operation fetch-user to complete (timeout=50ms)"
        );
    }

    #[test]
    fn test_operation_error_is_shared_on_clone() {
        let err: FunnelError<String> = FunnelError::Operation(Arc::new("no route".to_string()));
        let cloned = err.clone();

        assert!(!cloned.is_timeout());
        assert_eq!(cloned.to_string(), "operation failed: no route");
        assert!(Arc::ptr_eq(
            err.operation_error().unwrap(),
            cloned.operation_error().unwrap()
        ));
    }

    #[test]
    fn test_panic_payload_messages() {
        let from_str = OperationPanic::from_payload(Box::new("static message"));
        assert_eq!(from_str.message(), "static message");

        let from_string = OperationPanic::from_payload(Box::new(format!("code {}", 7)));
        assert_eq!(from_string.message(), "code 7");

        let opaque = OperationPanic::from_payload(Box::new(42_u32));
        assert_eq!(opaque.message(), "Box<dyn Any>");
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Fatal {
        code: u32,
    }

    #[test]
    fn test_original_payload_is_kept() {
        let panic = OperationPanic::from_payload(Box::new(Fatal { code: 42 }));

        assert!(panic.is::<Fatal>());
        assert!(!panic.is::<String>());
        assert_eq!(panic.downcast_cloned::<Fatal>(), Some(Fatal { code: 42 }));
        assert_eq!(panic.downcast_with(|fatal: &Fatal| fatal.code), Some(42));
        assert_eq!(panic.downcast_cloned::<u32>(), None);

        let from_string = OperationPanic::from_payload(Box::new("static message"));
        assert_eq!(
            from_string.downcast_cloned::<&'static str>(),
            Some("static message")
        );
    }

    #[test]
    fn test_panic_identity() {
        let first = OperationPanic::new("boom");
        let clone = first.clone();
        let other = OperationPanic::new("boom");

        assert!(first.same_payload(&clone));
        assert!(!first.same_payload(&other));

        // Re-capturing an already captured panic keeps its identity.
        let recaptured = OperationPanic::from_payload(Box::new(first.clone()));
        assert!(first.same_payload(&recaptured));
    }

    #[test]
    fn test_resume_unwinds_with_operation_panic() {
        let panic = OperationPanic::new("boom");
        let caught = std::panic::catch_unwind(|| panic.resume()).unwrap_err();
        let payload = caught.downcast_ref::<OperationPanic>().unwrap();
        assert!(payload.same_payload(&panic));
    }
}
