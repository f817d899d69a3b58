use braid::Error;
use braid::pool::ThreadPool;
use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

#[test]
fn test_jobs_run_on_named_workers() {
    let pool = ThreadPool::builder().workers(3).name("crunch").build().unwrap();
    let barrier = Arc::new(Barrier::new(3));

    let futures: Vec<_> = (0..3)
        .map(|_| {
            let barrier = barrier.clone();
            pool.submit(move || {
                // Every worker must be busy at once for this to return.
                barrier.wait();
                Ok::<_, io::Error>(thread::current().name().map(str::to_owned))
            })
        })
        .collect();

    let names: HashSet<_> = futures
        .into_iter()
        .map(|future| future.wait_blocking().unwrap().unwrap())
        .collect();

    assert_eq!(pool.workers(), 3);
    assert_eq!(names.len(), 3);
    assert!(names.iter().all(|name| name.starts_with("crunch-")));
}

#[test]
fn test_job_error_keeps_the_original() {
    let pool = ThreadPool::builder().workers(1).build().unwrap();

    let result = pool
        .submit(|| Err::<(), _>(io::Error::new(io::ErrorKind::NotFound, "missing.txt")))
        .wait_blocking();

    let err = result.unwrap_err();
    let original = err
        .job_error()
        .and_then(|inner| inner.downcast_ref::<io::Error>())
        .expect("the io::Error travels unchanged");
    assert_eq!(original.kind(), io::ErrorKind::NotFound);
}

#[test]
fn test_panicking_job_fails_alone() {
    let pool = ThreadPool::builder().workers(1).build().unwrap();

    let crashed = pool
        .submit(|| -> Result<(), io::Error> { panic!("corrupt input") })
        .wait_blocking();

    match crashed {
        Err(Error::WorkerCrashed { worker, reason }) => {
            assert_eq!(worker, 0);
            assert_eq!(reason, "corrupt input");
        }
        other => panic!("expected a crash, got {other:?}"),
    }

    let next = pool.submit(|| Ok::<_, io::Error>(5)).wait_blocking();
    assert_eq!(next.unwrap(), 5, "the worker survives a panicking job");
}

#[test]
fn test_shutdown_drains_queued_jobs() {
    let pool = ThreadPool::builder().workers(2).build().unwrap();
    let done = Arc::new(AtomicUsize::new(0));

    let futures: Vec<_> = (0..20)
        .map(|i| {
            let done = done.clone();
            pool.submit(move || {
                thread::sleep(Duration::from_millis(1));
                done.fetch_add(1, Ordering::SeqCst);
                Ok::<_, io::Error>(i)
            })
        })
        .collect();

    pool.shutdown();

    assert_eq!(done.load(Ordering::SeqCst), 20);
    assert!(futures.iter().all(|future| future.is_complete()));

    let sum: i32 = futures.into_iter().map(|future| future.wait_blocking().unwrap()).sum();
    assert_eq!(sum, (0..20).sum::<i32>());
}

#[test]
fn test_dropped_future_skips_a_queued_job() {
    let pool = ThreadPool::builder().workers(1).build().unwrap();
    let gate = Arc::new(Barrier::new(2));
    let ran = Arc::new(Mutex::new(Vec::new()));

    let blocker = pool.submit({
        let (gate, ran) = (gate.clone(), ran.clone());
        move || {
            gate.wait();
            ran.lock().unwrap().push("blocker");
            Ok::<_, io::Error>(())
        }
    });

    let skipped = pool.submit({
        let ran = ran.clone();
        move || {
            ran.lock().unwrap().push("skipped");
            Ok::<_, io::Error>(())
        }
    });

    drop(skipped);
    gate.wait();

    blocker.wait_blocking().unwrap();
    pool.shutdown();

    assert_eq!(*ran.lock().unwrap(), ["blocker"]);
}

#[test]
fn test_scope_shuts_the_pool_down() {
    let counter = Arc::new(AtomicUsize::new(0));

    let futures = ThreadPool::scope(4, |pool| {
        (0..8)
            .map(|_| {
                let counter = counter.clone();
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, io::Error>(())
                })
            })
            .collect::<Vec<_>>()
    })
    .unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 8);
    assert!(futures.iter().all(|future| future.is_complete()));
}

#[test]
#[should_panic(expected = "workers must be > 0")]
fn test_zero_workers_panics() {
    let _ = ThreadPool::builder().workers(0);
}
