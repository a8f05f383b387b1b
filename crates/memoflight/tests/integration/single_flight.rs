use std::time::Duration;

use futures::future::join_all;
use memoflight::config::MemoConfig;
use memoflight::{Invoker, Key};
use memoflight_test::TestError;

use crate::{CallCounter, invoker, setup};

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_execution() {
    setup();

    let invoker: Invoker<Key, u32, TestError> = Invoker::new(MemoConfig::named("m"));
    let counter = CallCounter::new();

    let calls = (0..10).map(|_| {
        let invoker = invoker.clone();
        let computation = counter.returning(Duration::from_millis(50), 42);
        tokio::spawn(async move { invoker.execute(Key::new("m|hello"), computation).await })
    });
    let results = join_all(calls).await;

    for result in results {
        assert_eq!(result.unwrap(), Ok(42));
    }
    assert_eq!(counter.count(), 1);
    assert_eq!(invoker.store().get(&Key::new("m|hello")), Some(42));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_across_threads() {
    setup();

    let invoker = invoker::<u64>();
    let counter = CallCounter::new();

    let calls = (0..64).map(|_| {
        let invoker = invoker.clone();
        let computation = counter.returning(Duration::from_millis(20), 7);
        tokio::spawn(async move { invoker.execute("shared", computation).await })
    });
    let results = join_all(calls).await;

    assert!(results.into_iter().all(|result| result.unwrap() == Ok(7)));
    assert_eq!(counter.count(), 1);
}

#[tokio::test]
async fn test_later_calls_are_served_from_the_store() {
    setup();

    let invoker = invoker::<String>();
    let counter = CallCounter::new();

    let first = invoker
        .execute("k", counter.returning(Duration::ZERO, "value".to_owned()))
        .await;
    assert_eq!(first.as_deref(), Ok("value"));

    for _ in 0..5 {
        let again = invoker
            .execute("k", counter.returning(Duration::ZERO, "other".to_owned()))
            .await;
        assert_eq!(again.as_deref(), Ok("value"));
    }

    assert_eq!(counter.count(), 1);
}

#[tokio::test]
async fn test_derived_keys() {
    setup();

    let invoker: Invoker<Key, u32, TestError> = Invoker::new(MemoConfig::default());
    let counter = CallCounter::new();

    let key = |id: u32| {
        let mut builder = Key::builder();
        builder.write_param("method", "lookup").write_param("id", id);
        builder.build()
    };

    invoker
        .execute(key(1), counter.returning(Duration::ZERO, 1))
        .await
        .unwrap();
    invoker
        .execute(key(1), counter.returning(Duration::ZERO, 1))
        .await
        .unwrap();
    invoker
        .execute(key(2), counter.returning(Duration::ZERO, 2))
        .await
        .unwrap();

    assert_eq!(counter.count(), 2);
    assert_eq!(invoker.store().len(), 2);
}

#[tokio::test]
async fn test_clear_forces_recomputation() {
    setup();

    let invoker = invoker::<u32>();
    let counter = CallCounter::new();

    invoker
        .execute("k", counter.returning(Duration::ZERO, 1))
        .await
        .unwrap();
    assert_eq!(invoker.store().clear(), 1);

    let result = invoker
        .execute("k", counter.returning(Duration::ZERO, 2))
        .await;

    assert_eq!(result, Ok(2));
    assert_eq!(counter.count(), 2);
}
