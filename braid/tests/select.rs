use braid::sync::BoundedQueue;
use braid::time::sleep;
use braid::{select, task};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

/// Flips its flag when dropped.
struct DropFlag(Rc<Cell<bool>>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.set(true);
    }
}

#[braid::test]
async fn test_select_single_future() {
    let result = select! {
        async { 42 } => |v| v * 2,
    };

    assert_eq!(result, 84);
}

#[braid::test]
async fn test_select_prefers_the_earlier_branch() {
    let result = select! {
        async { 10 } => |v| v,
        async { 20 } => |v| v,
    };

    assert_eq!(result, 10);
}

#[braid::test]
async fn test_select_different_types() {
    let result = select! {
        sleep(Duration::from_millis(50)) => |_| String::from("timer"),
        async { "hello" } => |v| format!("string: {v}"),
    };

    assert_eq!(result, "string: hello");
}

#[braid::test]
async fn test_select_first_to_finish_wins() {
    let result = select! {
        async {
            sleep(Duration::from_millis(200)).await;
            "slow"
        } => |v| v,
        async {
            sleep(Duration::from_millis(10)).await;
            "fast"
        } => |v| v,
    };

    assert_eq!(result, "fast");
}

#[braid::test]
async fn test_select_drops_the_losers() {
    let dropped = Rc::new(Cell::new(false));

    let flag = dropped.clone();
    let result = select! {
        async move {
            let _guard = DropFlag(flag);
            sleep(Duration::from_secs(10)).await;
            0
        } => |v| v,
        sleep(Duration::from_millis(10)) => |_| 1,
    };

    assert_eq!(result, 1);
    assert!(dropped.get());
}

#[braid::test]
async fn test_select_as_a_receive_timeout() {
    let queue = Rc::new(BoundedQueue::new(1));

    let producer = task::spawn({
        let queue = queue.clone();
        async move {
            sleep(Duration::from_millis(10)).await;
            queue.put("message").await
        }
    });

    let received = select! {
        queue.get() => |item| item.ok(),
        sleep(Duration::from_secs(5)) => |_| None,
    };

    producer.await.unwrap().unwrap();
    assert_eq!(received, Some("message"));
}

#[braid::test(blocking_threads = 1)]
async fn test_select_with_runtime_options() {
    let result = select! {
        task::spawn_blocking(|| 6 * 7) => |v| v.unwrap(),
    };

    assert_eq!(result, 42);
}
