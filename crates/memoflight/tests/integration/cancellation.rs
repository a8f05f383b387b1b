use std::time::Duration;

use memoflight::config::MemoConfig;
use memoflight::{ExecuteError, Invoker, Store};
use memoflight_test::TestError;

use crate::{CallCounter, invoker, setup};

#[tokio::test(start_paused = true)]
async fn test_dropped_waiter_does_not_cancel_computation() {
    setup();

    let invoker = invoker::<u32>();
    let counter = CallCounter::new();

    let creator = tokio::spawn({
        let invoker = invoker.clone();
        let computation = counter.returning(Duration::from_millis(100), 5);
        async move { invoker.execute("k", computation).await }
    });
    tokio::task::yield_now().await;

    let waiter = tokio::spawn({
        let invoker = invoker.clone();
        let computation = counter.returning(Duration::from_millis(100), 6);
        async move { invoker.execute("k", computation).await }
    });
    tokio::task::yield_now().await;

    // both the creator and a waiter stop waiting
    creator.abort();
    waiter.abort();
    assert!(creator.await.unwrap_err().is_cancelled());

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(invoker.store().get(&"k"), Some(5));
    assert_eq!(counter.count(), 1);

    let result = invoker
        .execute("k", counter.returning(Duration::ZERO, 7))
        .await;
    assert_eq!(result, Ok(5));
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_waiter_leaves_others_unaffected() {
    setup();

    let store = std::sync::Arc::new(Store::new());
    let patient: Invoker<&str, u32, TestError> =
        Invoker::with_store(MemoConfig::named("patient"), store.clone());
    let impatient = Invoker::with_store(
        MemoConfig {
            name: "impatient".into(),
            wait_timeout: Some(Duration::from_millis(20)),
        },
        store.clone(),
    );
    let counter = CallCounter::new();

    let first = tokio::spawn({
        let patient = patient.clone();
        let computation = counter.returning(Duration::from_millis(100), 3);
        async move { patient.execute("k", computation).await }
    });
    tokio::task::yield_now().await;

    let timed_out = impatient
        .execute("k", counter.returning(Duration::ZERO, 4))
        .await;
    assert_eq!(
        timed_out,
        Err(ExecuteError::Timeout(Duration::from_millis(20)))
    );

    assert_eq!(first.await.unwrap(), Ok(3));
    assert_eq!(store.get(&"k"), Some(3));
    assert_eq!(counter.count(), 1);

    // the impatient invoker is served from the store now
    let cached = impatient
        .execute("k", counter.returning(Duration::ZERO, 4))
        .await;
    assert_eq!(cached, Ok(3));
}

#[tokio::test]
async fn test_panicking_computation_is_retryable() {
    setup();

    let invoker = invoker::<u32>();
    let counter = CallCounter::new();

    let panicking = counter.scripted(Duration::ZERO, |_attempt| -> Result<u32, TestError> {
        panic!("computation panicked")
    });
    let aborted = invoker.execute("k", panicking).await;
    assert_eq!(aborted, Err(ExecuteError::Aborted));
    assert!(invoker.store().is_empty());

    let retried = invoker
        .execute("k", counter.returning(Duration::ZERO, 8))
        .await;
    assert_eq!(retried, Ok(8));
    assert_eq!(counter.count(), 2);
}
