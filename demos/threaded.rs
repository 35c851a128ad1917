use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use fcfs_bucket::RateBucket;
use tokio::time::Instant;

const VOLUMES: [u64; 12] = [8, 1, 5, 2, 10, 1, 3, 7, 1, 4, 6, 2];

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> Result<()> {
    helpers::init_logging();

    let bucket = Arc::new(
        RateBucket::builder()
            .capacity(10)
            .rate(5)
            .interval(Duration::from_millis(100))
            .build()?,
    );

    let sequence = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    let mut tasks = Vec::new();

    for (arrival, volume) in VOLUMES.into_iter().enumerate() {
        let bucket = bucket.clone();
        let sequence = sequence.clone();

        tasks.push(tokio::spawn(async move {
            bucket.get(volume).await;
            let admission = sequence.fetch_add(1, Ordering::SeqCst);
            (arrival, admission, volume, start.elapsed())
        }));

        // Give the task time to join the line before the next one arrives.
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    println!("arrival  admission  volume  elapsed");

    for task in tasks {
        let (arrival, admission, volume, elapsed) = task.await?;
        println!("{arrival:>7}  {admission:>9}  {volume:>6}  {elapsed:?}");
    }

    Ok(())
}
