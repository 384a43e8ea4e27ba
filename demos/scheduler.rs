//! Schedules a burst of requests against a bucket that only lets a few of them
//! through every second.
//!
//! Run with `RUST_LOG=ratekeeper=trace` to follow admissions and refills.

use std::sync::Arc;
use std::time::Duration;

use ratekeeper::{duration, FixedWindowCounter, Priority, Scheduler};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ratekeeper::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Three tokens per second, at most two requests running at once.
    let scheduler = Scheduler::builder()
        .bucket(FixedWindowCounter::new(3.0, duration::SECOND)?)
        .max_concurrency(2)
        .max_pending(16)
        .build()?;
    scheduler.enter().await?;
    let scheduler = Arc::new(scheduler);
    let start = tokio::time::Instant::now();

    let mut tasks = tokio::task::JoinSet::new();
    for (id, priority) in Priority::ALL.into_iter().cycle().take(10).enumerate() {
        let scheduler = Arc::clone(&scheduler);
        tasks.spawn(async move {
            let _permit = scheduler.schedule(1.0, priority, false).await?;
            println!(
                "[{:>5} ms] request #{id} ({priority:?}) running",
                start.elapsed().as_millis()
            );
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, ratekeeper::Error>(())
        });
    }

    let attempt = scheduler.schedule(1.0, Priority::Low, true).await;
    println!("Fill or kill attempt admitted: {}", attempt.is_ok());
    drop(attempt);

    while let Some(finished) = tasks.join_next().await {
        if let Ok(Err(err)) = finished {
            println!("A request failed: {err}");
        }
    }
    scheduler.exit().await;
    Ok(())
}
