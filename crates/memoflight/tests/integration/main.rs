mod cancellation;
mod failures;
mod parallelism;
mod single_flight;

use memoflight::Invoker;
use memoflight::config::MemoConfig;
use memoflight_test::TestError;

pub use memoflight_test::{CallCounter, setup};

/// An invoker keyed by plain strings, for tests that do not care about key derivation.
pub fn invoker<T>() -> Invoker<&'static str, T, TestError>
where
    T: Clone + Send + Sync + 'static,
{
    Invoker::new(MemoConfig::named("integration"))
}
