//! Single-flight memoization of expensive, idempotent calls.
//!
//! The [`Invoker`] wraps an arbitrary asynchronous computation. Concurrent callers asking for the
//! same [`Key`] share a single execution, callers asking for different keys run in parallel, and
//! successful results are remembered for every later call. Failures are handed to everyone that
//! was waiting on them, but are never cached.

#[macro_use]
pub mod metrics;

pub mod config;
pub mod error;
mod inflight;
pub mod invoker;
pub mod key;
pub mod logging;
pub mod store;
pub mod utils;

pub use error::ExecuteError;
pub use invoker::Invoker;
pub use key::{Key, KeyBuilder};
pub use store::Store;
