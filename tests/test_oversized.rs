use std::sync::Arc;

use fcfs_bucket::{Error, RateBucket};
use tokio::time::{self, Duration, Instant};

#[tokio::test(start_paused = true)]
async fn test_oversized_blocks_forever() -> anyhow::Result<()> {
    let bucket = Arc::new(RateBucket::new(10, 1)?);

    let oversized = tokio::spawn({
        let bucket = bucket.clone();
        async move { bucket.get(11).await }
    });

    time::sleep(Duration::from_millis(1)).await;

    let behind = tokio::spawn({
        let bucket = bucket.clone();
        async move { bucket.get(1).await }
    });

    time::sleep(Duration::from_secs(600)).await;

    assert!(!oversized.is_finished());
    assert!(!behind.is_finished());
    assert_eq!(bucket.volume(), 10);
    assert_eq!(bucket.waiting(), 2);

    // Cancelling the oversized request unblocks the line.
    oversized.abort();
    let start = Instant::now();
    behind.await?;

    assert_eq!(Instant::now().duration_since(start), Duration::ZERO);
    assert_eq!(bucket.waiting(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_checked_get() -> anyhow::Result<()> {
    let bucket = RateBucket::new(10, 1)?;

    assert_eq!(
        bucket.checked_get(11).err(),
        Some(Error::InvalidRequest {
            requested: 11,
            capacity: 10,
        })
    );
    assert_eq!(bucket.waiting(), 0);

    let start = Instant::now();
    bucket.checked_get(10)?.await;
    assert_eq!(
        Instant::now().duration_since(start),
        Duration::from_secs(10)
    );
    Ok(())
}
