//! The per-key bookkeeping of memoized calls.

use std::fmt;
use std::hash::Hash;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::inflight::{self, Ticket, Waiter};

/// The state of a single key.
enum Entry<T, E> {
    /// The computation is running, later callers attach to its broadcast.
    Pending { id: u64, waiter: Waiter<T, E> },
    /// The computation succeeded, the value is permanent.
    Resolved(T),
}

impl<T, E> Entry<T, E> {
    fn is_pending(&self, ticket_id: u64) -> bool {
        matches!(self, Entry::Pending { id, .. } if *id == ticket_id)
    }
}

/// The result of [`Store::lookup_or_create`].
#[derive(Debug)]
pub(crate) enum Lookup<T, E> {
    /// The key was resolved before, this is the cached value.
    Resolved(T),
    /// Another caller is already computing the value for this key.
    Pending(Waiter<T, E>),
    /// The key was absent, the caller is now responsible for computing it.
    Created(Ticket<T, E>),
}

struct Entries<K, T, E> {
    map: FxHashMap<K, Entry<T, E>>,
    next_id: u64,
}

/// Holds, per key, either nothing, a pending computation, or a resolved value.
///
/// A single lock guards the map, but it is only ever held for the check-and-insert of
/// [`lookup_or_create`](Self::lookup_or_create) and for the state transitions. Computations and
/// waiting happen outside of it.
///
/// Resolved values are cloned out of the store on every hit, so expensive values should be wrapped
/// in an [`Arc`](std::sync::Arc).
pub struct Store<K, T, E> {
    entries: Mutex<Entries<K, T, E>>,
}

impl<K, T, E> Default for Store<K, T, E> {
    fn default() -> Self {
        Store {
            entries: Mutex::new(Entries {
                map: FxHashMap::default(),
                next_id: 0,
            }),
        }
    }
}

impl<K, T, E> fmt::Debug for Store<K, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (pending, resolved) = self
            .entries
            .try_lock()
            .map(|entries| {
                let pending = entries
                    .map
                    .values()
                    .filter(|entry| matches!(entry, Entry::Pending { .. }))
                    .count();
                (pending, entries.map.len() - pending)
            })
            .unwrap_or_default();
        f.debug_struct("Store")
            .field("pending", &pending)
            .field("resolved", &resolved)
            .finish()
    }
}

impl<K: Eq + Hash, T: Clone, E: Clone> Store<K, T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically looks up `key`, installing a pending entry if it is absent.
    ///
    /// Out of any number of concurrent callers for an absent key, exactly one gets
    /// [`Lookup::Created`]. Everyone else observes the entry it installed.
    pub(crate) fn lookup_or_create(&self, key: &K) -> Lookup<T, E>
    where
        K: Clone,
    {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.map.get(key) {
            return match entry {
                Entry::Resolved(value) => Lookup::Resolved(value.clone()),
                Entry::Pending { waiter, .. } => Lookup::Pending(waiter.clone()),
            };
        }

        let id = entries.next_id;
        entries.next_id += 1;

        let (publisher, waiter) = inflight::broadcast();
        let entry = Entry::Pending {
            id,
            waiter: waiter.clone(),
        };
        entries.map.insert(key.clone(), entry);

        Lookup::Created(Ticket::new(id, publisher, waiter))
    }

    /// Marks the pending entry created with `ticket_id` as resolved.
    ///
    /// Returns `false` if that entry no longer exists.
    pub(crate) fn resolve(&self, key: &K, ticket_id: u64, value: T) -> bool {
        let mut entries = self.entries.lock();
        match entries.map.get_mut(key) {
            Some(entry) if entry.is_pending(ticket_id) => {
                *entry = Entry::Resolved(value);
                true
            }
            _ => false,
        }
    }

    /// Removes the pending entry created with `ticket_id`, making the key retryable.
    ///
    /// Returns `false` if that entry no longer exists.
    pub(crate) fn remove(&self, key: &K, ticket_id: u64) -> bool {
        let mut entries = self.entries.lock();
        let owned = entries
            .map
            .get(key)
            .is_some_and(|entry| entry.is_pending(ticket_id));
        if owned {
            entries.map.remove(key);
        }
        owned
    }

    /// Returns the resolved value of `key`, without waiting for pending computations.
    pub fn get(&self, key: &K) -> Option<T> {
        match self.entries.lock().map.get(key)? {
            Entry::Resolved(value) => Some(value.clone()),
            Entry::Pending { .. } => None,
        }
    }

    /// Drops all resolved values, returning how many were dropped.
    ///
    /// Pending entries are kept, their computations will still resolve them.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.map.len();
        entries
            .map
            .retain(|_, entry| matches!(entry, Entry::Pending { .. }));
        before - entries.map.len()
    }

    /// The number of keys that are either pending or resolved.
    pub fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
