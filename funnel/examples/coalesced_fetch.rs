//! Coalesced fetch demo
//!
//! Simulates a burst of requests for the same slow upstream resource and shows
//! that the upstream is hit once per generation, how cached results are
//! served, and what a timed-out caller sees.
//!
//! Run with:
//! ```bash
//! RUST_LOG=funnel=debug cargo run --example coalesced_fetch
//! ```

use funnel::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug)]
struct Profile {
    user_id: u64,
    display_name: String,
}

#[derive(Debug, thiserror::Error)]
#[error("upstream error: {0}")]
struct UpstreamError(String);

async fn fetch_profile(user_id: u64, upstream_calls: Arc<AtomicUsize>) -> Result<Profile, UpstreamError> {
    upstream_calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;
    Ok(Profile {
        user_id,
        display_name: format!("user-{}", user_id),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let funnel: Funnel<Profile, UpstreamError> = Funnel::builder()
        .timeout(Duration::from_secs(1))
        .cache_ttl(Duration::from_millis(500))
        .build();
    let upstream_calls = Arc::new(AtomicUsize::new(0));

    // Burst of 100 identical requests
    let start = Instant::now();
    let requests: Vec<_> = (0..100)
        .map(|_| {
            let funnel = funnel.clone();
            let upstream_calls = Arc::clone(&upstream_calls);
            tokio::spawn(async move {
                funnel
                    .execute("profile:7", move || fetch_profile(7, upstream_calls))
                    .await
            })
        })
        .collect();

    for request in requests {
        request.await??;
    }
    info!(
        upstream_calls = upstream_calls.load(Ordering::SeqCst),
        elapsed = ?start.elapsed(),
        "burst of 100 requests served"
    );

    // Served from cache
    let cached = {
        let upstream_calls = Arc::clone(&upstream_calls);
        funnel
            .execute_and_copy_result("profile:7", move || fetch_profile(7, upstream_calls))
            .await?
    };
    info!(
        user_id = cached.user_id,
        name = %cached.display_name,
        upstream_calls = upstream_calls.load(Ordering::SeqCst),
        "cached copy served"
    );

    // A caller with a tight deadline gives up; the upstream call still completes.
    let impatient: Funnel<Profile, UpstreamError> = Funnel::builder()
        .timeout(Duration::from_millis(50))
        .build();
    let result = {
        let upstream_calls = Arc::clone(&upstream_calls);
        impatient
            .execute("profile:8", move || fetch_profile(8, upstream_calls))
            .await
    };
    match result {
        Err(FunnelError::Timeout { operation_id, timeout }) => {
            info!(%operation_id, ?timeout, "impatient caller timed out")
        }
        other => info!(?other, "unexpected result"),
    }

    Ok(())
}
