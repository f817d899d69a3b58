use braid::promise::{Completion, CompletionMode, Promise};
use braid::{Error, RuntimeBuilder, task};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

#[test]
fn test_task_awaits_a_cross_thread_publish() {
    let rt = RuntimeBuilder::new().build();

    let value = rt.block_on(async {
        let (promise, resolver) = Promise::new();

        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            resolver.resolve(String::from("from a worker")).unwrap();
        });

        let value = promise.await.unwrap();
        producer.join().unwrap();
        value
    });

    assert_eq!(value, "from a worker");
}

#[test]
fn test_rejection_is_raised_at_the_await() {
    let rt = RuntimeBuilder::new().build();

    let result = rt.block_on(async {
        let (promise, resolver) = Promise::<u32>::new();
        resolver.reject(Error::QueueClosed).unwrap();
        promise.await
    });

    assert!(matches!(result, Err(Error::QueueClosed)));
}

#[test]
fn test_dropped_resolver_cancels_the_waiting_task() {
    let rt = RuntimeBuilder::new().build();

    let result = rt.block_on(async {
        let (promise, resolver) = Promise::<u32>::new();

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            drop(resolver);
        });

        promise.await
    });

    assert!(matches!(result, Err(Error::Cancelled)));
}

#[test]
fn test_runtime_completion_mode_applies_to_its_cells() {
    let strict = RuntimeBuilder::new()
        .completion_mode(CompletionMode::Strict)
        .build();

    let second = strict.block_on(async {
        let (_promise, resolver) = Promise::new();
        resolver.resolve(1).unwrap();
        resolver.resolve(2)
    });
    assert!(matches!(second, Err(Error::InvalidState(_))));

    let lenient = RuntimeBuilder::new().build();

    let second = lenient.block_on(async {
        let (_promise, resolver) = Promise::new();
        resolver.resolve(1).unwrap();
        resolver.resolve(2)
    });
    assert!(second.is_ok());
}

#[test]
fn test_strict_runtime_still_ignores_its_own_settlements() {
    let rt = RuntimeBuilder::new()
        .completion_mode(CompletionMode::Strict)
        .build();

    let result = rt.block_on(async {
        let handle = task::spawn(async { 5 });
        handle.cancel();
        handle.await
    });

    assert!(matches!(result, Err(Error::Cancelled)));
}

#[test]
fn test_blocking_waiters_and_callbacks() {
    let (promise, resolver) = Promise::with_mode(CompletionMode::Lenient);
    let (tx, rx) = mpsc::channel();

    let waiter = {
        let tx = tx.clone();
        thread::spawn(move || {
            let value = promise.wait_blocking().unwrap();
            tx.send(format!("thread saw {value}")).unwrap();
        })
    };

    thread::sleep(Duration::from_millis(20));
    resolver.resolve(9).unwrap();
    waiter.join().unwrap();

    let (late, late_resolver) = Promise::with_mode(CompletionMode::Lenient);
    late_resolver.resolve(10).unwrap();
    late.on_complete(move |outcome: braid::Result<i32>| {
        tx.send(format!("callback saw {}", outcome.unwrap())).unwrap();
    });

    let seen: Vec<_> = rx.try_iter().collect();
    assert_eq!(seen, ["thread saw 9", "callback saw 10"]);
}

#[test]
fn test_consumer_cancel_marks_the_cell() {
    let (promise, resolver) = Promise::<()>::with_mode(CompletionMode::Strict);

    assert!(promise.cancel());
    assert!(!promise.cancel());
    assert_eq!(promise.completion(), Some(Completion::Cancelled));

    assert!(resolver.is_cancelled());
    assert!(matches!(resolver.resolve(()), Err(Error::InvalidState(_))));
}
