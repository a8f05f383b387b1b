use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use memoflight::{ExecuteError, Invoker, Key};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
pub struct WorkloadsConfig {
    pub workloads: Vec<Workload>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Workload {
    /// How many calls are in flight at the same time.
    pub concurrency: usize,
    /// How many distinct keys the calls are spread over.
    pub keys: NonZeroUsize,
    /// The latency of a single simulated call.
    #[serde(with = "humantime_serde")]
    pub latency: Duration,
    /// Every n-th execution of the simulated call fails.
    #[serde(default)]
    pub fail_every: Option<NonZeroUsize>,
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("simulated failure of execution #{0}")]
pub struct SimulatedFailure(usize);

pub type StressInvoker = Invoker<Key, Arc<str>, SimulatedFailure>;

/// A simulated expensive remote call, counting its real executions.
#[derive(Debug)]
pub struct ExpensiveCall {
    workload: usize,
    keys: NonZeroUsize,
    latency: Duration,
    fail_every: Option<NonZeroUsize>,
    executions: Arc<AtomicUsize>,
}

impl ExpensiveCall {
    pub fn new(workload: usize, config: &Workload) -> Self {
        ExpensiveCall {
            workload,
            keys: config.keys,
            latency: config.latency,
            fail_every: config.fail_every,
            executions: Default::default(),
        }
    }

    /// The number of times the call was actually executed, as opposed to served by the invoker.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::Relaxed)
    }

    pub fn keys(&self) -> usize {
        self.keys.get()
    }

    /// The key of the `n`-th request, cycling through all keys of the workload.
    fn key(&self, n: usize) -> Key {
        let mut builder = Key::builder();
        builder
            .write_param("workload", self.workload)
            .write_param("key", n % self.keys);
        builder.build()
    }

    /// Performs the `n`-th request through `invoker`.
    pub async fn process(
        &self,
        invoker: &StressInvoker,
        n: usize,
    ) -> Result<Arc<str>, ExecuteError<SimulatedFailure>> {
        let key = self.key(n);
        let value: Arc<str> = format!("workload {} key {}", self.workload, n % self.keys).into();
        let executions = Arc::clone(&self.executions);
        let latency = self.latency;
        let fail_every = self.fail_every;

        invoker
            .execute(key, move || {
                let execution = executions.fetch_add(1, Ordering::Relaxed) + 1;
                async move {
                    tokio::time::sleep(latency).await;
                    match fail_every {
                        Some(every) if execution % every == 0 => Err(SimulatedFailure(execution)),
                        _ => Ok(value),
                    }
                }
            })
            .await
    }
}
