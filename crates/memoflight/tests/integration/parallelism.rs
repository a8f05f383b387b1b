use std::time::Duration;

use tokio::time::Instant;

use crate::{CallCounter, invoker, setup};

#[tokio::test(start_paused = true)]
async fn test_distinct_keys_run_in_parallel() {
    setup();

    let invoker = invoker::<&'static str>();
    let counter = CallCounter::new();
    let latency = Duration::from_millis(100);

    let start = Instant::now();
    let (a, b) = tokio::join!(
        invoker.execute("a", counter.returning(latency, "a")),
        invoker.execute("b", counter.returning(latency, "b")),
    );
    let elapsed = start.elapsed();

    assert_eq!(a, Ok("a"));
    assert_eq!(b, Ok("b"));
    assert_eq!(counter.count(), 2);
    assert!(elapsed >= latency);
    assert!(elapsed < latency * 2, "took {elapsed:?}");
}

#[tokio::test]
async fn test_distinct_keys_run_in_parallel_wall_clock() {
    setup();

    let invoker = invoker::<u32>();
    let counter = CallCounter::new();
    let latency = Duration::from_millis(100);

    let start = std::time::Instant::now();
    let calls = (0..8).map(|i| {
        let invoker = invoker.clone();
        let key: &'static str = ["0", "1", "2", "3", "4", "5", "6", "7"][i];
        let computation = counter.returning(latency, i as u32);
        tokio::spawn(async move { invoker.execute(key, computation).await })
    });
    let results = futures::future::join_all(calls).await;
    let elapsed = start.elapsed();

    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap(), Ok(i as u32));
    }
    assert_eq!(counter.count(), 8);
    assert!(elapsed < latency * 4, "took {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_slow_key_does_not_block_fast_key() {
    setup();

    let invoker = invoker::<u32>();
    let counter = CallCounter::new();

    let slow = tokio::spawn({
        let invoker = invoker.clone();
        let computation = counter.returning(Duration::from_secs(10), 1);
        async move { invoker.execute("slow", computation).await }
    });
    tokio::task::yield_now().await;

    let start = Instant::now();
    let fast = invoker
        .execute("fast", counter.returning(Duration::from_millis(10), 2))
        .await;

    assert_eq!(fast, Ok(2));
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(invoker.store().get(&"slow"), None);

    assert_eq!(slow.await.unwrap(), Ok(1));
}
