use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::config::MemoConfig;
use crate::error::ExecuteError;
use crate::inflight;
use crate::store::{Lookup, Store};

/// Memoizes an expensive, idempotent computation per key.
///
/// Concurrent calls for the same key are deduplicated, only the first one runs the computation
/// and everyone else waits for its outcome. Successful values are kept in the [`Store`] forever
/// and returned right away on later calls. Failures are delivered to everyone that waited for
/// them, but the key is reset so the next call retries.
///
/// Computations are spawned on the tokio runtime, so [`execute`](Self::execute) has to be called
/// from within one.
pub struct Invoker<K, T, E> {
    name: Arc<str>,
    wait_timeout: Option<Duration>,
    store: Arc<Store<K, T, E>>,
}

impl<K, T, E> Clone for Invoker<K, T, E> {
    fn clone(&self) -> Self {
        // https://github.com/rust-lang/rust/issues/26925
        Invoker {
            name: Arc::clone(&self.name),
            wait_timeout: self.wait_timeout,
            store: Arc::clone(&self.store),
        }
    }
}

impl<K, T, E> fmt::Debug for Invoker<K, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoker")
            .field("name", &self.name)
            .field("wait_timeout", &self.wait_timeout)
            .field("store", &self.store)
            .finish()
    }
}

impl<K, T, E> Invoker<K, T, E>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates an invoker with its own, empty [`Store`].
    pub fn new(config: MemoConfig) -> Self {
        Self::with_store(config, Arc::new(Store::new()))
    }

    /// Creates an invoker working on an existing [`Store`].
    ///
    /// All invokers sharing a store also share its entries, so they have to agree on what a key
    /// means.
    pub fn with_store(config: MemoConfig, store: Arc<Store<K, T, E>>) -> Self {
        Invoker {
            name: config.name.into(),
            wait_timeout: config.wait_timeout,
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The store backing this invoker.
    pub fn store(&self) -> &Arc<Store<K, T, E>> {
        &self.store
    }

    /// Returns the value for `key`, calling `computation` only if nobody computed it yet.
    ///
    /// - If the key was resolved before, the cached value is returned without calling
    ///   `computation`.
    /// - If another call for the key is in flight, this waits for its outcome.
    /// - Otherwise `computation` is called exactly once, and its future is spawned. On success the
    ///   value is cached, on failure the key is reset. Either way, the outcome is published to
    ///   everyone waiting for it.
    ///
    /// # Errors
    ///
    /// [`ExecuteError::Failed`] carries the error of the computation this call observed, which
    /// might have been started by a different caller. [`ExecuteError::Timeout`] means that this
    /// caller stopped waiting after the configured `wait_timeout`, while the computation goes on.
    pub async fn execute<F, Fut>(&self, key: K, computation: F) -> Result<T, ExecuteError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let name = &self.name;

        let waiter = match self.store.lookup_or_create(&key) {
            Lookup::Resolved(value) => {
                metric!(counter(&format!("memo.{name}.resolved.hit")) += 1);
                return Ok(value);
            }
            Lookup::Pending(waiter) => {
                // A concurrent call was deduplicated.
                tracing::trace!(name = %name, ?key, "waiting for computation in flight");
                metric!(counter(&format!("memo.{name}.channel.hit")) += 1);
                waiter
            }
            Lookup::Created(ticket) => {
                metric!(counter(&format!("memo.{name}.channel.miss")) += 1);
                inflight::launch(&self.store, Arc::clone(name), key, ticket, computation)
            }
        };

        let result = waiter.wait(self.wait_timeout).await;

        if let Err(err) = &result {
            if let ExecuteError::Timeout(timeout) = err {
                tracing::debug!(name = %name, ?timeout, "gave up waiting for computation");
            }
            metric!(
                counter(&format!("memo.{name}.execute.error")) += 1,
                "error" => err.metrics_tag(),
            );
        }

        result
    }
}
