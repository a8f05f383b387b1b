//! Helpers for testing memoized computations.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - Create the computations under test through a [`CallCounter`]. It records how often the
//!    computation was actually invoked, which is the number that deduplication is all about.
//!
//!  - Prefer `#[tokio::test(start_paused = true)]` for anything that asserts on latencies. With
//!    paused time, sleeping computations complete instantly while `tokio::time::Instant` still
//!    reports the simulated elapsed time.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `memoflight` crate and mutes all
///    other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("memoflight=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// The error produced by failing test computations.
///
/// It carries the number of the invocation that failed, starting at `1`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("computation #{0} failed")]
pub struct TestError(pub usize);

/// The type of the computations created by a [`CallCounter`].
pub type Computation<T, E> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T, E>> + Send>;

/// Creates expensive computations and counts how often they were invoked.
///
/// Clones share the same count.
#[derive(Clone, Debug, Default)]
pub struct CallCounter {
    calls: Arc<AtomicUsize>,
}

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of times any computation of this counter was invoked.
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// A computation that sleeps for `latency` and then returns `value`.
    pub fn returning<T>(&self, latency: Duration, value: T) -> Computation<T, TestError>
    where
        T: Send + 'static,
    {
        self.scripted(latency, move |_attempt| Ok(value))
    }

    /// A computation that sleeps for `latency` and then fails.
    pub fn failing<T>(&self, latency: Duration) -> Computation<T, TestError>
    where
        T: Send + 'static,
    {
        self.scripted(latency, |attempt| Err(TestError(attempt)))
    }

    /// A computation that sleeps for `latency` and then returns what `outcome` makes of the
    /// invocation number, starting at `1`.
    ///
    /// The invocation is counted as soon as the computation is called, before its future is
    /// polled.
    pub fn scripted<T, E, O>(&self, latency: Duration, outcome: O) -> Computation<T, E>
    where
        T: Send + 'static,
        E: Send + 'static,
        O: FnOnce(usize) -> Result<T, E> + Send + 'static,
    {
        let calls = Arc::clone(&self.calls);
        Box::new(move || -> BoxFuture<'static, Result<T, E>> {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Box::pin(async move {
                if !latency.is_zero() {
                    tokio::time::sleep(latency).await;
                }
                outcome(attempt)
            })
        })
    }
}
