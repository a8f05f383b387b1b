//! Coordination of the single execution per key.
//!
//! Every pending entry owns a one-shot broadcast: a [`Publisher`] used exactly once by the
//! execution that owns the entry, and any number of [`Waiter`]s handed out to callers that
//! arrive while the execution is still running. The broadcast is scoped to its entry, so unrelated
//! keys never contend with each other here.

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use sentry::{Hub, SentryFutureExt};

use crate::error::ExecuteError;
use crate::store::Store;
use crate::utils::defer::defer;

type Channel<T, E> = Shared<oneshot::Receiver<Result<T, E>>>;

/// Creates a new one-shot broadcast.
pub(crate) fn broadcast<T: Clone, E: Clone>() -> (Publisher<T, E>, Waiter<T, E>) {
    let (sender, receiver) = oneshot::channel();
    let waiter = Waiter {
        channel: receiver.shared(),
    };
    (Publisher { sender }, waiter)
}

/// The sending half of a broadcast.
///
/// Dropping it without publishing releases all waiters with [`ExecuteError::Aborted`].
pub(crate) struct Publisher<T, E> {
    sender: oneshot::Sender<Result<T, E>>,
}

impl<T, E> Publisher<T, E> {
    /// Releases every current and future waiter with a clone of `outcome`.
    pub fn publish(self, outcome: Result<T, E>) {
        // Nobody might be waiting anymore, which is fine.
        self.sender.send(outcome).ok();
    }
}

/// The receiving half of a broadcast, cheap to clone.
pub(crate) struct Waiter<T, E> {
    channel: Channel<T, E>,
}

impl<T: Clone, E: Clone> Clone for Waiter<T, E> {
    fn clone(&self) -> Self {
        Waiter {
            channel: self.channel.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Waiter<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter").finish_non_exhaustive()
    }
}

impl<T: Clone, E: Clone> Waiter<T, E> {
    /// Suspends until the outcome is published, or until `timeout` elapses.
    ///
    /// Giving up, either through the timeout or by dropping the returned future, only affects this
    /// waiter.
    pub async fn wait(self, timeout: Option<Duration>) -> Result<T, ExecuteError<E>> {
        let outcome = match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.channel).await {
                Ok(outcome) => outcome,
                Err(_elapsed) => return Err(ExecuteError::Timeout(timeout)),
            },
            None => self.channel.await,
        };

        match outcome {
            Ok(result) => result.map_err(ExecuteError::Failed),
            Err(oneshot::Canceled) => Err(ExecuteError::Aborted),
        }
    }
}

/// Ownership of a freshly created pending entry.
///
/// Only the caller that created the entry receives a ticket, and only the ticket allows to
/// resolve or remove that entry.
pub(crate) struct Ticket<T, E> {
    pub(crate) id: u64,
    publisher: Publisher<T, E>,
    waiter: Waiter<T, E>,
}

impl<T, E> Ticket<T, E> {
    pub(crate) fn new(id: u64, publisher: Publisher<T, E>, waiter: Waiter<T, E>) -> Self {
        Ticket {
            id,
            publisher,
            waiter,
        }
    }
}

impl<T, E> fmt::Debug for Ticket<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket").field("id", &self.id).finish()
    }
}

/// Spawns the single execution of `computation` for the entry owned by `ticket`.
///
/// `computation` is called right away, on the current task, and the resulting future is driven
/// to completion on the tokio runtime, independent of whoever awaits the returned [`Waiter`].
/// Once finished, the store is updated first and the outcome published second, so that any caller
/// either receives a waiter that will be released, or sees the final state of the entry.
///
/// If the execution never gets to publish, because it panicked or the runtime shut down, the
/// pending entry is evicted and all waiters are released with [`ExecuteError::Aborted`].
pub(crate) fn launch<K, T, E, F, Fut>(
    store: &Arc<Store<K, T, E>>,
    name: Arc<str>,
    key: K,
    ticket: Ticket<T, E>,
    computation: F,
) -> Waiter<T, E>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let Ticket {
        id,
        publisher,
        waiter,
    } = ticket;

    let abandon_token = {
        let store = Arc::clone(store);
        let key = key.clone();
        let name = Arc::clone(&name);
        defer(move || {
            if store.remove(&key, id) {
                tracing::error!(name = %name, ?key, "computation aborted without a result");
                metric!(counter(&format!("memo.{name}.compute")) += 1, "status" => "aborted");
            }
        })
    };

    tracing::trace!(name = %name, ?key, "spawning computation");
    let future = computation();

    let store = Arc::clone(store);
    let task = async move {
        let start = Instant::now();
        let outcome = future.await;

        let status = match &outcome {
            Ok(value) => {
                store.resolve(&key, id, value.clone());
                "positive"
            }
            Err(_) => {
                tracing::debug!(name = %name, ?key, "computation failed, key is retryable");
                store.remove(&key, id);
                "failed"
            }
        };
        abandon_token.disarm();

        metric!(counter(&format!("memo.{name}.compute")) += 1, "status" => status);
        metric!(
            timer(&format!("memo.{name}.compute.duration")) = start.elapsed(),
            "status" => status,
        );
        metric!(gauge(&format!("memo.{name}.entries")) = store.len() as u64);

        publisher.publish(outcome);
    }
    .bind_hub(Hub::new_from_top(Hub::current()));

    tokio::spawn(task);

    waiter
}
