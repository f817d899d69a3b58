use braid::tools::{Backoff, retry};
use braid::{Error, RuntimeBuilder};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[test]
fn test_retry_succeeds_before_limit() {
    let rt = RuntimeBuilder::new().build();
    let attempts = Arc::new(AtomicUsize::new(0));

    let result = rt.block_on({
        let attempts = attempts.clone();
        async move {
            retry(5, move || {
                let attempts = attempts.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    if n < 2 { Err("fail") } else { Ok(42) }
                }
            })
            .await
        }
    });

    assert_eq!(result, Ok(42), "Retry should succeed before limit");
    assert_eq!(attempts.load(Ordering::SeqCst), 3, "Should have made 3 attempts");
}

#[test]
fn test_retry_fails_after_limit() {
    let rt = RuntimeBuilder::new().build();
    let attempts = Arc::new(AtomicUsize::new(0));

    let result = rt.block_on({
        let attempts = attempts.clone();
        async move {
            retry(3, move || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<usize, &'static str>("fail")
                }
            })
            .await
        }
    });

    assert_eq!(result, Err("fail"));
    assert_eq!(
        attempts.load(Ordering::SeqCst),
        3,
        "The first attempt counts toward the limit"
    );
}

#[test]
fn test_zero_attempts_still_runs_once() {
    let rt = RuntimeBuilder::new().build();
    let attempts = Arc::new(AtomicUsize::new(0));

    let counter = attempts.clone();
    let result = rt.block_on(retry(0, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>("nope") }
    }));

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[test]
fn test_retry_with_backoff() {
    let rt = RuntimeBuilder::new().build();
    let timestamps = Arc::new(Mutex::new(Vec::new()));

    let recorded = timestamps.clone();
    let result = rt.block_on(
        retry(4, move || {
            recorded.lock().unwrap().push(Instant::now());
            async { Err::<(), _>("still failing") }
        })
        .backoff(Backoff::exponential(
            Duration::from_millis(10),
            Duration::from_millis(25),
        )),
    );

    assert!(result.is_err());

    let timestamps = timestamps.lock().unwrap();
    assert_eq!(timestamps.len(), 4);

    let gaps: Vec<_> = timestamps.windows(2).map(|w| w[1] - w[0]).collect();
    for (gap, expected) in gaps.iter().zip([10, 20, 25]) {
        assert!(*gap >= Duration::from_millis(expected), "gap {gap:?} < {expected}ms");
    }
}

#[test]
fn test_transient_only_stops_on_fatal_errors() {
    let rt = RuntimeBuilder::new().build();
    let attempts = Arc::new(AtomicUsize::new(0));

    let counter = attempts.clone();
    let result = rt.block_on(
        retry(5, move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                let kind = if n == 0 {
                    io::ErrorKind::TimedOut
                } else {
                    io::ErrorKind::PermissionDenied
                };
                Err::<(), Error>(io::Error::from(kind).into())
            }
        })
        .transient_only(),
    );

    assert!(matches!(result, Err(Error::Io(_))));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_retry_if_predicate() {
    let rt = RuntimeBuilder::new().build();
    let attempts = Arc::new(AtomicUsize::new(0));

    let counter = attempts.clone();
    let result = rt.block_on(
        retry(10, move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Err::<(), usize>(n) }
        })
        .retry_if(|n| *n < 3),
    );

    assert_eq!(result, Err(3));
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
}
