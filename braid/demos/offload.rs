//! Keeps the control thread responsive while CPU-bound work runs on a
//! thread pool and blocking calls run on the runtime's blocking pool.

use braid::bridge::submit_to_pool;
use braid::pool::ThreadPool;
use braid::task;
use braid::time::{instrumented, sleep, with_timeout};

use std::convert::Infallible;
use std::time::Duration;

fn count_primes(limit: u64) -> u64 {
    (2..limit)
        .filter(|&n| (2..).take_while(|d| d * d <= n).all(|d| n % d != 0))
        .count() as u64
}

#[braid::main(blocking_threads = 2)]
async fn main() -> braid::Result<()> {
    let pool = ThreadPool::builder().workers(4).name("primes").build()?;

    let heartbeat = task::spawn(async {
        for beat in 1..=5 {
            sleep(Duration::from_millis(20)).await;
            println!("heartbeat {beat}");
        }
    });

    let jobs: Vec<_> = [200_000, 300_000, 400_000]
        .into_iter()
        .map(|limit| submit_to_pool(&pool, move || Ok::<_, Infallible>(count_primes(limit))))
        .collect();

    let (counts, elapsed) = instrumented(task::try_await_all(jobs)).await;
    println!("prime counts {:?} in {elapsed:?}", counts?);

    let hostname = task::spawn_blocking(|| std::fs::read_to_string("/etc/hostname"));
    match with_timeout(Duration::from_secs(1), hostname).await {
        Ok(read) => println!("hostname: {:?}", read?.map(|name| name.trim().to_string())),
        Err(err) => println!("hostname lookup gave up: {err}"),
    }

    heartbeat.await?;
    pool.shutdown();
    Ok(())
}
