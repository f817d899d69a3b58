use braid::sync::{BoundedQueue, TryPutError};
use braid::time::sleep;
use braid::{Error, RuntimeBuilder, task, yield_now};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_items_arrive_in_order_under_backpressure() {
    let rt = RuntimeBuilder::new().build();
    let high_water = Rc::new(Cell::new(0));

    let mark = high_water.clone();
    let received = rt.block_on(async move {
        let queue = Rc::new(BoundedQueue::new(2));

        let producer = task::spawn({
            let queue = queue.clone();
            async move {
                for n in 0..20 {
                    queue.put(n).await?;
                    mark.set(mark.get().max(queue.len()));
                }
                queue.close().await
            }
        });

        let mut received = Vec::new();
        while let Ok(n) = queue.get().await {
            received.push(n);
            yield_now().await;
        }

        producer.await.unwrap().unwrap();
        received
    });

    assert_eq!(received, (0..20).collect::<Vec<_>>());
    assert!(high_water.get() <= 2);
}

#[test]
fn test_two_consumers_drain_a_small_queue() {
    let rt = RuntimeBuilder::new().build();

    let (mut received, high_water) = rt.block_on(async {
        let queue = Rc::new(BoundedQueue::new(5));

        let consumers: Vec<_> = (0..2)
            .map(|_| {
                let queue = queue.clone();
                task::spawn(async move {
                    let mut taken = Vec::new();
                    while let Ok(n) = queue.get().await {
                        taken.push(n);
                        sleep(Duration::from_millis(2)).await;
                    }
                    taken
                })
            })
            .collect();

        let mut high_water = 0;
        for n in 0..20 {
            queue.put(n).await.unwrap();
            assert!(queue.len() <= 5, "queue grew to {}", queue.len());
            high_water = high_water.max(queue.len());
        }
        queue.close().await.unwrap();

        let mut received = Vec::new();
        for consumer in consumers {
            let taken = consumer.await.unwrap();
            assert!(!taken.is_empty(), "a consumer got no items");
            received.extend(taken);
        }
        (received, high_water)
    });

    received.sort_unstable();
    assert_eq!(received, (0..20).collect::<Vec<_>>());
    assert_eq!(high_water, 5);
}

#[test]
fn test_full_queue_suspends_the_producer() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let queue = Rc::new(BoundedQueue::new(2));
        queue.try_put(1).unwrap();
        queue.try_put(2).unwrap();
        assert_eq!(queue.try_put(3), Err(TryPutError::Full(3)));

        let producer = task::spawn({
            let queue = queue.clone();
            async move { queue.put(3).await }
        });

        yield_now().await;
        assert!(!producer.is_finished());
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.get().await.unwrap(), 1);
        producer.await.unwrap().unwrap();

        assert_eq!(queue.get().await.unwrap(), 2);
        assert_eq!(queue.get().await.unwrap(), 3);
    });
}

#[test]
fn test_every_consumer_sees_the_sentinel() {
    let rt = RuntimeBuilder::new().build();

    let (consumed, closed) = rt.block_on(async {
        let queue = Rc::new(BoundedQueue::new(4));

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                task::spawn(async move {
                    let mut taken = 0;
                    loop {
                        match queue.get().await {
                            Ok(_) => taken += 1,
                            Err(Error::QueueClosed) => return taken,
                            Err(err) => panic!("unexpected error: {err}"),
                        }
                    }
                })
            })
            .collect();

        for n in 0..10 {
            queue.put(n).await.unwrap();
        }
        queue.close().await.unwrap();

        let mut consumed = 0;
        let mut closed = 0;
        for consumer in consumers {
            consumed += consumer.await.unwrap();
            closed += 1;
        }

        assert!(matches!(queue.put(99).await, Err(Error::QueueClosed)));
        assert!(matches!(queue.try_get(), Err(Error::QueueClosed)));

        (consumed, closed)
    });

    assert_eq!(consumed, 10);
    assert_eq!(closed, 3);
}

#[test]
fn test_try_operations() {
    let queue = BoundedQueue::new(1);

    assert!(queue.try_get().unwrap().is_none());
    queue.try_put("a").unwrap();
    assert_eq!(queue.try_put("b"), Err(TryPutError::Full("b")));
    assert_eq!(queue.try_get().unwrap(), Some("a"));

    queue.try_close().unwrap();
    assert!(queue.is_closed());
    assert_eq!(queue.try_put("c").unwrap_err().into_inner(), "c");
}

#[test]
fn test_zero_maxsize_is_unbounded() {
    let queue = BoundedQueue::new(0);

    for n in 0..1000 {
        queue.try_put(n).unwrap();
    }

    assert_eq!(queue.maxsize(), 0);
    assert_eq!(queue.len(), 1000);
}

#[test]
fn test_worker_thread_feeds_a_task() {
    let rt = RuntimeBuilder::new().build();
    let queue = Arc::new(BoundedQueue::new(3));

    let feeder = thread::spawn({
        let queue = queue.clone();
        move || {
            for n in 1..=50u64 {
                queue.put_blocking(n).unwrap();
            }
            queue.close_blocking().unwrap();
        }
    });

    let shared = queue.clone();
    let total = rt.block_on(async move {
        let mut total = 0;
        while let Ok(n) = shared.get().await {
            total += n;
        }
        total
    });

    feeder.join().unwrap();
    assert_eq!(total, 1275);
}

#[test]
fn test_task_feeds_a_worker_thread() {
    let rt = RuntimeBuilder::new().build();
    let queue = Arc::new(BoundedQueue::new(2));

    let drain = thread::spawn({
        let queue = queue.clone();
        move || {
            let mut seen = Vec::new();
            while let Ok(item) = queue.get_blocking() {
                seen.push(item);
            }
            seen
        }
    });

    let shared = queue.clone();
    rt.block_on(async move {
        for word in ["alpha", "beta", "gamma", "delta"] {
            shared.put(word).await.unwrap();
        }
        shared.close().await.unwrap();
    });

    assert_eq!(drain.join().unwrap(), ["alpha", "beta", "gamma", "delta"]);
}
