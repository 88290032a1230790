//! Panic propagation tests
//!
//! Verifies that a panic inside the operation body is raised in every caller
//! of the generation, with the same payload, that typed payloads raised with
//! `panic_any` can be recovered by every caller, and that the next call after
//! eviction runs the operation again.

use funnel::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

async fn panicking_operation(executions: Arc<AtomicUsize>) -> Result<String, String> {
    executions.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    panic!("test ends with panic");
}

fn payload_of(err: tokio::task::JoinError) -> OperationPanic {
    let payload = err.into_panic();
    payload
        .downcast_ref::<OperationPanic>()
        .expect("caller should unwind with an OperationPanic")
        .clone()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_caller_observes_same_panic() {
    let funnel: Funnel<String, String> = Funnel::new();
    let executions = Arc::new(AtomicUsize::new(0));

    let callers: Vec<_> = (0..20)
        .map(|_| {
            let funnel = funnel.clone();
            let executions = Arc::clone(&executions);
            tokio::spawn(async move {
                funnel
                    .execute("explodes", move || panicking_operation(executions))
                    .await
            })
        })
        .collect();

    let mut payloads = Vec::new();
    for caller in callers {
        let err = caller.await.expect_err("caller should panic");
        assert!(err.is_panic());
        payloads.push(payload_of(err));
    }

    assert_eq!(executions.load(Ordering::SeqCst), 1);
    let first = &payloads[0];
    assert_eq!(first.message(), "test ends with panic");
    assert!(payloads.iter().all(|p| p.same_payload(first)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_late_callers_panic_in_new_generation() {
    let funnel: Funnel<String, String> = Funnel::new();
    let executions = Arc::new(AtomicUsize::new(0));

    let mut callers = Vec::new();
    for caller in 0..10 {
        let funnel = funnel.clone();
        let executions = Arc::clone(&executions);
        callers.push(tokio::spawn(async move {
            if caller % 2 == 1 {
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            funnel
                .execute("explodes", move || panicking_operation(executions))
                .await
        }));
    }

    for caller in callers {
        let payload = payload_of(caller.await.expect_err("caller should panic"));
        assert_eq!(payload.message(), "test ends with panic");
    }

    assert_eq!(executions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_panicked_generation_is_evicted() {
    let funnel: Funnel<String, String> = Funnel::new();

    let caller = funnel.clone();
    let joined = tokio::spawn(async move {
        caller
            .execute("flaky", || async {
                if true {
                    panic!("first attempt fails");
                }
                Ok(String::new())
            })
            .await
    })
    .await;
    assert!(joined.unwrap_err().is_panic());

    let value = funnel
        .execute("flaky", || async { Ok("recovered".to_string()) })
        .await
        .unwrap();
    assert_eq!(*value, "recovered");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_panic_is_propagated() {
    let funnel: Funnel<u32, String> = Funnel::new();

    let caller = funnel.clone();
    let joined = tokio::spawn(async move {
        caller
            .execute_blocking("sync-explodes", || {
                if true {
                    panic!("blocking body failed");
                }
                Ok(0)
            })
            .await
    })
    .await;

    let payload = payload_of(joined.unwrap_err());
    assert_eq!(payload.message(), "blocking body failed");
}

#[derive(Clone, Debug, PartialEq)]
struct Fatal {
    code: u32,
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_typed_panic_payload_reaches_every_caller() {
    let funnel: Funnel<String, String> = Funnel::new();
    let executions = Arc::new(AtomicUsize::new(0));

    let callers: Vec<_> = (0..10)
        .map(|_| {
            let funnel = funnel.clone();
            let executions = Arc::clone(&executions);
            tokio::spawn(async move {
                funnel
                    .execute("typed-fatal", move || async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        if true {
                            std::panic::panic_any(Fatal { code: 42 });
                        }
                        Ok(String::new())
                    })
                    .await
            })
        })
        .collect();

    let mut payloads = Vec::new();
    for caller in callers {
        payloads.push(payload_of(caller.await.expect_err("caller should panic")));
    }

    assert_eq!(executions.load(Ordering::SeqCst), 1);
    let first = &payloads[0];
    for payload in &payloads {
        assert!(payload.same_payload(first));
        assert_eq!(payload.downcast_cloned::<Fatal>(), Some(Fatal { code: 42 }));
    }
    assert_eq!(first.message(), "Box<dyn Any>");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_typed_panic_payload_from_blocking_body() {
    let funnel: Funnel<u32, String> = Funnel::new();

    let caller = funnel.clone();
    let joined = tokio::spawn(async move {
        caller
            .execute_blocking("sync-typed-fatal", || {
                if true {
                    std::panic::panic_any(Fatal { code: 7 });
                }
                Ok(0)
            })
            .await
    })
    .await;

    let payload = payload_of(joined.unwrap_err());
    assert_eq!(payload.downcast_with(|fatal: &Fatal| fatal.code), Some(7));
}
