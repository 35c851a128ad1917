use std::sync::Arc;

use fcfs_bucket::RateBucket;
use tokio::time::{self, Duration};

#[tokio::test(start_paused = true)]
async fn test_try_get() -> anyhow::Result<()> {
    let bucket = RateBucket::builder().capacity(10).rate(1).initial(1).build()?;

    assert!(bucket.try_get(1));
    assert!(!bucket.try_get(1));
    assert!(bucket.try_get(0));

    time::sleep(bucket.interval() * 2).await;

    assert!(bucket.try_get(1));
    assert!(bucket.try_get(1));
    assert!(!bucket.try_get(1));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_try_get_respects_waiters() -> anyhow::Result<()> {
    let bucket = Arc::new(
        RateBucket::builder().capacity(10).rate(1).initial(5).build()?,
    );

    let waiter = tokio::spawn({
        let bucket = bucket.clone();
        async move { bucket.get(10).await }
    });

    time::sleep(Duration::from_millis(1)).await;

    // There is volume, but the waiter was here first.
    assert_eq!(bucket.volume(), 5);
    assert!(!bucket.try_get(1));

    waiter.await?;
    assert_eq!(bucket.waiting(), 0);

    time::sleep(bucket.interval()).await;
    assert!(bucket.try_get(1));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_try_get_failure_keeps_volume() -> anyhow::Result<()> {
    let bucket = RateBucket::builder().capacity(10).initial(3).build()?;

    assert!(!bucket.try_get(4));
    assert_eq!(bucket.volume(), 3);
    assert!(bucket.try_get(3));
    assert_eq!(bucket.volume(), 0);
    Ok(())
}
