use std::time::Duration;

use futures::future::join_all;
use memoflight::ExecuteError;
use memoflight_test::TestError;

use crate::{CallCounter, invoker, setup};

#[tokio::test]
async fn test_failures_are_not_cached() {
    setup();

    let invoker = invoker::<u32>();
    let counter = CallCounter::new();

    let first = invoker
        .execute("k", counter.failing(Duration::ZERO))
        .await;
    assert_eq!(first, Err(ExecuteError::Failed(TestError(1))));
    assert!(invoker.store().is_empty());

    let second = invoker
        .execute("k", counter.failing(Duration::ZERO))
        .await;
    assert_eq!(second, Err(ExecuteError::Failed(TestError(2))));

    assert_eq!(counter.count(), 2);
}

#[tokio::test]
async fn test_retry_after_failure_succeeds() {
    setup();

    let invoker = invoker::<u32>();
    let counter = CallCounter::new();
    let flaky = |counter: &CallCounter| {
        counter.scripted(Duration::ZERO, |attempt| match attempt {
            1 => Err(TestError(attempt)),
            _ => Ok(10),
        })
    };

    let first = invoker.execute("k", flaky(&counter)).await;
    assert!(first.unwrap_err().failure().is_some());

    let second = invoker.execute("k", flaky(&counter)).await;
    assert_eq!(second, Ok(10));
    assert_eq!(counter.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_the_failure() {
    setup();

    let invoker = invoker::<u32>();
    let counter = CallCounter::new();

    let calls = (0..5).map(|_| {
        let invoker = invoker.clone();
        let computation = counter.failing(Duration::from_millis(30));
        tokio::spawn(async move { invoker.execute("k", computation).await })
    });
    let results = join_all(calls).await;

    for result in results {
        assert_eq!(result.unwrap(), Err(ExecuteError::Failed(TestError(1))));
    }
    assert_eq!(counter.count(), 1);
}

#[tokio::test]
async fn test_failure_does_not_poison_other_keys() {
    setup();

    let invoker = invoker::<u32>();
    let counter = CallCounter::new();

    let good = invoker
        .execute("good", counter.returning(Duration::ZERO, 1))
        .await;
    let bad = invoker
        .execute("bad", counter.failing(Duration::ZERO))
        .await;

    assert_eq!(good, Ok(1));
    assert!(bad.is_err());
    assert_eq!(invoker.store().get(&"good"), Some(1));
    assert_eq!(invoker.store().len(), 1);
}

#[tokio::test]
async fn test_failure_is_passed_through() {
    setup();

    let invoker = invoker::<u32>();
    let counter = CallCounter::new();

    let err = invoker
        .execute("k", counter.failing(Duration::ZERO))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "computation #1 failed");
    assert_eq!(err.into_failure(), Some(TestError(1)));
}
