use std::sync::Arc;

use anyhow::Result;
use fcfs_bucket::RateBucket;
use tokio::time::{self, Duration};

#[tokio::main]
async fn main() -> Result<()> {
    helpers::init_logging();

    let bucket = Arc::new(RateBucket::new(10, 5)?);

    if let Err(error) = bucket.checked_get(11) {
        println!("rejected up front: {error}");
    }

    // This request can never be admitted and holds the head of the line.
    let oversized = tokio::spawn({
        let bucket = bucket.clone();
        async move { bucket.get(11).await }
    });

    time::sleep(Duration::from_millis(10)).await;

    println!("Waiting behind an oversized request...");
    let behind = time::timeout(Duration::from_secs(5), bucket.get(1)).await;
    println!("timed out: {}", behind.is_err());

    oversized.abort();
    println!("Cancelled the oversized request");

    bucket.get(1).await;
    println!("I made it! {bucket:?}");
    Ok(())
}
