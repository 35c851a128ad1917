//! Delayed gets and puts against a single bucket.
//!
//! Run with `cargo run --example fcfs --features tracing` to see the
//! admission trace.

use std::sync::Arc;

use anyhow::Result;
use fcfs_bucket::RateBucket;
use tokio::time::{self, Duration, Instant};

#[derive(Debug, Clone, Copy)]
enum Call {
    Get(u64),
    Put(u64),
}

#[tokio::main]
async fn main() -> Result<()> {
    helpers::init_logging();

    let bucket = Arc::new(RateBucket::new(100, 2)?);
    let start = Instant::now();

    let schedule = [
        (Duration::from_secs(0), Call::Get(10)),
        (Duration::from_secs(1), Call::Get(5)),
        (Duration::from_secs(2), Call::Put(3)),
    ];

    let mut tasks = Vec::new();

    for (delay, call) in schedule {
        let bucket = bucket.clone();

        tasks.push(tokio::spawn(async move {
            time::sleep(delay).await;
            println!("call {call:?} at {:?}", start.elapsed());

            match call {
                Call::Get(volume) => bucket.get(volume).await,
                Call::Put(volume) => bucket.put(volume),
            }

            println!("exit {call:?} at {:?}", start.elapsed());
        }));
    }

    for task in tasks {
        task.await?;
    }

    println!("{bucket:?}");
    Ok(())
}
