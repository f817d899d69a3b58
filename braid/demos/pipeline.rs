//! A three-stage pipeline: a producer, a pool of parsers limited by a
//! semaphore, and a summing sink, connected by bounded queues.

use braid::sync::{BoundedQueue, Semaphore};
use braid::task;
use braid::time::sleep;

use std::rc::Rc;
use std::time::Duration;

const PARSERS: usize = 4;

#[braid::main]
async fn main() -> braid::Result<()> {
    let lines = Rc::new(BoundedQueue::new(8));
    let numbers = Rc::new(BoundedQueue::new(8));
    let slots = Rc::new(Semaphore::new(2));

    let producer = task::spawn({
        let lines = lines.clone();
        async move {
            for n in 1..=50u64 {
                lines.put(format!("{n}")).await?;
            }
            lines.close().await
        }
    });

    let parsers: Vec<_> = (0..PARSERS)
        .map(|_| {
            let lines = lines.clone();
            let numbers = numbers.clone();
            let slots = slots.clone();

            task::spawn(async move {
                while let Ok(line) = lines.get().await {
                    let _slot = slots.acquire().await;
                    sleep(Duration::from_millis(2)).await;

                    if let Ok(n) = line.parse::<u64>() {
                        numbers.put(n).await?;
                    }
                }
                Ok::<_, braid::Error>(())
            })
        })
        .collect();

    let sink = task::spawn({
        let numbers = numbers.clone();
        async move {
            let mut total = 0;
            while let Ok(n) = numbers.get().await {
                total += n;
            }
            total
        }
    });

    producer.await??;
    for result in task::await_all(parsers).await {
        result??;
    }
    numbers.close().await?;

    println!("sum: {}", sink.await?);
    Ok(())
}
