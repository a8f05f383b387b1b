use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use memoflight::Invoker;
use memoflight::config::Config;
use sentry::SentryFutureExt;
use sketches_ddsketch::DDSketch;
use tokio::sync::Semaphore;

use crate::workloads::{ExpensiveCall, StressInvoker, WorkloadsConfig};

struct WorkloadReport {
    concurrency: usize,
    call: Arc<ExpensiveCall>,
    task_durations: DDSketch,
    errors: usize,
}

pub async fn perform_stresstest(
    config: Config,
    workloads: WorkloadsConfig,
    duration: Duration,
) -> Result<()> {
    let invoker: StressInvoker = Invoker::new(config.memo);

    // initialize workloads
    let workloads: Vec<_> = workloads
        .workloads
        .iter()
        .enumerate()
        .map(|(i, workload)| {
            (
                workload.concurrency,
                Arc::new(ExpensiveCall::new(i, workload)),
            )
        })
        .collect();

    // warmup: run the first request of each workload once
    {
        let start = Instant::now();

        let futures = workloads.iter().map(|(_, call)| {
            let invoker = invoker.clone();
            let call = Arc::clone(call);
            tokio::spawn(async move { call.process(&invoker, 0).await })
        });

        let _results = futures::future::join_all(futures).await;

        println!("Warmup: {:?}", start.elapsed());
    };
    println!();

    // run the workloads concurrently
    let mut tasks = Vec::with_capacity(workloads.len());
    for (concurrency, call) in workloads.into_iter() {
        let deadline = tokio::time::Instant::now() + duration;
        let invoker = invoker.clone();

        let task = tokio::spawn(async move {
            let task_durations = Arc::new(Mutex::new(DDSketch::default()));
            let errors = Arc::new(AtomicUsize::new(0));
            let semaphore = Arc::new(Semaphore::new(concurrency));

            // See <https://docs.rs/tokio/latest/tokio/time/struct.Sleep.html#examples>
            let sleep = tokio::time::sleep_until(deadline);
            tokio::pin!(sleep);

            let mut request = 0;
            loop {
                tokio::select! {
                    permit = semaphore.clone().acquire_owned() => {
                        let Ok(permit) = permit else {
                            break;
                        };
                        let call = Arc::clone(&call);
                        let invoker = invoker.clone();
                        let task_durations = Arc::clone(&task_durations);
                        let errors = Arc::clone(&errors);
                        let n = request;
                        request += 1;

                        let hub = sentry::Hub::new_from_top(sentry::Hub::current());
                        let future = async move {
                            let task_start = Instant::now();
                            if call.process(&invoker, n).await.is_err() {
                                errors.fetch_add(1, Ordering::Relaxed);
                            }

                            task_durations
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .add(task_start.elapsed().as_secs_f64());

                            drop(permit);
                        };

                        tokio::spawn(future.bind_hub(hub));
                    }
                    _ = &mut sleep => {
                        break;
                    }
                }
            }

            // by acquiring *all* the semaphores, we essentially wait for all outstanding tasks to finish
            let _permits = semaphore.acquire_many(concurrency as u32).await;

            let task_durations = std::mem::take(
                &mut *task_durations
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );

            WorkloadReport {
                concurrency,
                call,
                task_durations,
                errors: errors.load(Ordering::Relaxed),
            }
        });
        tasks.push(task);
    }

    let finished_tasks = futures::future::join_all(tasks).await;

    for (i, task) in finished_tasks.into_iter().enumerate() {
        let WorkloadReport {
            concurrency,
            call,
            task_durations,
            errors,
        } = task.context("workload task panicked")?;

        let ops = task_durations.count();
        let ops_ps = ops as f32 / duration.as_secs_f32();
        println!(
            "Workload {i} (concurrency: {concurrency}, keys: {}): {ops} operations, {ops_ps:.2} ops/s",
            call.keys()
        );
        println!(
            "  executions: {}; errors: {errors}",
            call.executions()
        );

        if ops == 0 {
            continue;
        }
        let quantile = |q| {
            let secs = task_durations.quantile(q).ok().flatten().unwrap_or_default();
            Duration::from_secs_f64(secs)
        };
        let avg = Duration::from_secs_f64(task_durations.sum().unwrap_or_default() / ops as f64);
        let p50 = quantile(0.5);
        let p90 = quantile(0.9);
        let p99 = quantile(0.99);
        println!("  avg: {avg:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}");
    }

    println!();
    println!("{:?}", invoker.store());

    Ok(())
}
