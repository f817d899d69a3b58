use braid::sync::Event;
use braid::task::{self, TaskState};
use braid::{Error, RuntimeBuilder, yield_now};
use std::cell::RefCell;
use std::rc::Rc;
use std::thread;

#[test]
fn test_block_on_returns_the_output() {
    let rt = RuntimeBuilder::new().build();

    let result = rt.block_on(async { 42 });

    assert_eq!(result, 42);
}

#[test]
fn test_tasks_start_in_spawn_order() {
    let rt = RuntimeBuilder::new().build();
    let order = Rc::new(RefCell::new(Vec::new()));

    let recorded = order.clone();
    rt.block_on(async move {
        let handles: Vec<_> = (0..5)
            .map(|i| {
                let order = recorded.clone();
                task::spawn(async move { order.borrow_mut().push(i) })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
    });

    assert_eq!(*order.borrow(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_yield_now_interleaves_ready_tasks() {
    let rt = RuntimeBuilder::new().build();
    let trace = Rc::new(RefCell::new(Vec::new()));

    let recorded = trace.clone();
    rt.block_on(async move {
        let worker = |name: &'static str| {
            let trace = recorded.clone();
            task::spawn(async move {
                for step in 0..3 {
                    trace.borrow_mut().push(format!("{name}{step}"));
                    yield_now().await;
                }
            })
        };

        let a = worker("a");
        let b = worker("b");

        a.await.unwrap();
        b.await.unwrap();
    });

    assert_eq!(*trace.borrow(), ["a0", "b0", "a1", "b1", "a2", "b2"]);
}

#[test]
fn test_task_states_follow_the_lifecycle() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let event = Rc::new(Event::new());

        let mut handle = task::spawn({
            let event = event.clone();
            async move {
                event.wait().await;
                "released"
            }
        });

        assert_eq!(handle.state(), Some(TaskState::Ready));
        assert_eq!(task::state(handle.id()), Some(TaskState::Ready));

        yield_now().await;
        assert_eq!(handle.state(), Some(TaskState::Suspended));
        assert!(!handle.is_finished());

        event.set();
        assert_eq!((&mut handle).await.unwrap(), "released");

        assert_eq!(handle.state(), Some(TaskState::Done));
        assert_eq!(task::state(handle.id()), None);
    });
}

#[test]
fn test_current_task_id() {
    let rt = RuntimeBuilder::new().build();

    assert_eq!(task::current(), None);

    rt.block_on(async {
        let root = task::current().expect("root runs as a task");

        let child = task::spawn(async { task::current() });
        let child_id = child.id();

        assert_eq!(child.await.unwrap(), Some(child_id));
        assert_ne!(root, child_id);
    });
}

async fn explode() -> u8 {
    yield_now().await;
    panic!("boom")
}

async fn fail_root() {
    panic!("root failure")
}

#[test]
fn test_panicking_task_fails_alone() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let mut failing = task::spawn(explode());
        let healthy = task::spawn(async {
            yield_now().await;
            7
        });

        match (&mut failing).await {
            Err(Error::Panicked(message)) => assert_eq!(message, "boom"),
            other => panic!("expected a panic, got {other:?}"),
        }
        assert_eq!(failing.state(), Some(TaskState::Failed));
        assert_eq!(healthy.await.unwrap(), 7);
    });
}

#[test]
#[should_panic(expected = "root failure")]
fn test_block_on_resumes_the_root_panic() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(fail_root());
}

#[test]
#[should_panic(expected = "must be called within the context of a runtime")]
fn test_spawn_outside_runtime_panics() {
    let _ = task::spawn(async {});
}

#[test]
#[should_panic(expected = "cannot start a runtime from within a runtime")]
fn test_nested_runtime_is_rejected() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let inner = RuntimeBuilder::new().build();
        inner.block_on(async {});
    });
}

#[test]
fn test_blocking_call_inside_a_task_is_refused() {
    let rt = RuntimeBuilder::new().build();

    let outcome = rt.block_on(async {
        task::spawn(async {
            let event = Event::new();
            event.wait_blocking();
        })
        .await
    });

    match outcome {
        Err(Error::Panicked(message)) => assert!(message.contains("would block the runtime thread")),
        other => panic!("expected the blocking call to be refused, got {other:?}"),
    }
}

#[test]
fn test_spawn_then_run_until_complete() {
    let rt = RuntimeBuilder::new().build();

    let handle = rt.spawn(async { 7 });
    let result = rt.run_until_complete(handle).unwrap();

    assert_eq!(result.unwrap(), 7);
}

#[test]
fn test_dropping_the_runtime_cancels_unfinished_tasks() {
    let rt = RuntimeBuilder::new().build();
    let event = Rc::new(Event::new());

    let stuck = rt.spawn({
        let event = event.clone();
        async move { event.wait().await }
    });

    rt.block_on(yield_now());
    assert!(!stuck.is_finished());

    drop(rt);

    assert_eq!(stuck.state(), Some(TaskState::Cancelled));
}

#[test]
fn test_independent_runtimes_on_separate_threads() {
    let threads: Vec<_> = (0..4)
        .map(|i| {
            thread::spawn(move || {
                let rt = RuntimeBuilder::new().build();
                rt.block_on(async move {
                    let doubled = task::spawn(async move { i * 2 });
                    yield_now().await;
                    doubled.await.unwrap()
                })
            })
        })
        .collect();

    let results: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();

    assert_eq!(results, vec![0, 2, 4, 6]);
}
