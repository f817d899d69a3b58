use braid::sync::{Event, LockOrder};
use braid::time::with_timeout;
use braid::{Error, RuntimeBuilder, task, yield_now};
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_ascending_acquisition_succeeds() {
    let rt = RuntimeBuilder::new().build();

    let total = rt.block_on(async {
        let order = Arc::new(LockOrder::new(["accounts", "ledger", "audit"]).checked(true));
        let accounts = order.mutex("accounts", 100)?;
        let ledger = order.mutex("ledger", Vec::new())?;
        let audit = order.mutex("audit", 0)?;

        let mut accounts = accounts.lock().await?;
        let mut ledger = ledger.lock().await?;
        let mut audit = audit.lock().await?;

        *accounts -= 30;
        ledger.push(30);
        *audit += 1;

        assert_eq!(order.held_by_current(), ["accounts", "ledger", "audit"]);
        Ok::<_, Error>(*accounts + ledger.iter().sum::<i32>())
    });

    assert_eq!(total.unwrap(), 100);
}

#[test]
fn test_descending_acquisition_fails_before_waiting() {
    let rt = RuntimeBuilder::new().build();

    let outcome = rt.block_on(async {
        let order = Arc::new(LockOrder::new(["a", "b"]).checked(true));
        let a = Rc::new(order.mutex("a", ())?);
        let b = order.mutex("b", ())?;

        // Someone else holds `a`, so a blocking acquisition would hang.
        let other = task::spawn({
            let a = a.clone();
            async move {
                let _a = a.lock().await;
                yield_now().await;
                yield_now().await;
            }
        });
        yield_now().await;

        let _b = b.lock().await?;
        let attempt = with_timeout(Duration::from_secs(1), a.lock()).await?;

        other.await?;
        Ok::<_, Error>(attempt.map(drop))
    });

    match outcome.unwrap() {
        Err(Error::LockOrderViolation {
            requested,
            rank,
            held,
            held_rank,
        }) => {
            assert_eq!((requested, rank), ("a", 1));
            assert_eq!((held, held_rank), ("b", 2));
        }
        other => panic!("expected a lock order violation, got {other:?}"),
    }
}

#[test]
fn test_held_ranks_are_tracked_per_task() {
    let rt = RuntimeBuilder::new().build();

    let result = rt.block_on(async {
        let order = Arc::new(LockOrder::new(["a", "b"]).checked(true));
        let a = Rc::new(order.mutex("a", 0)?);
        let b = Rc::new(order.mutex("b", 0)?);

        let high = task::spawn({
            let b = b.clone();
            async move {
                let mut b = b.lock().await?;
                yield_now().await;
                *b += 1;
                Ok::<_, Error>(())
            }
        });

        let low = task::spawn({
            let a = a.clone();
            async move {
                // Another task holding `b` does not constrain this one.
                let mut a = a.lock().await?;
                *a += 1;
                Ok::<_, Error>(())
            }
        });

        high.await??;
        low.await??;

        assert!(order.held_by_current().is_empty());
        Ok::<_, Error>(())
    });

    assert!(result.is_ok());
}

#[test]
fn test_held_ranks_are_tracked_per_runtime() {
    let order = Arc::new(LockOrder::new(["a", "b"]).checked(true));
    let a = Arc::new(order.mutex("a", ()).unwrap());
    let b = Arc::new(order.mutex("b", ()).unwrap());
    let b_held = Arc::new(Event::new());
    let a_taken = Arc::new(Event::new());

    let high = thread::spawn({
        let (b_held, a_taken) = (b_held.clone(), a_taken.clone());
        move || {
            RuntimeBuilder::new().build().block_on(async move {
                let _b = b.lock().await?;
                b_held.set();
                a_taken.wait().await;
                Ok::<_, Error>(())
            })
        }
    });

    // The root task here has the same id as the one holding `b`.
    let low = RuntimeBuilder::new().build().block_on(async move {
        b_held.wait().await;
        let taken = a.lock().await.map(drop);
        a_taken.set();
        taken
    });

    assert!(low.is_ok(), "{low:?}");
    assert!(high.join().unwrap().is_ok());
}

#[test]
fn test_unchecked_order_records_nothing() {
    let order = Arc::new(LockOrder::new(["a", "b"]).checked(false));
    let a = order.mutex("a", ()).unwrap();
    let b = order.mutex("b", ()).unwrap();

    let _b = b.try_lock().unwrap().expect("free");
    let _a = a.try_lock().unwrap().expect("free");

    assert!(!order.is_checked());
    assert!(order.held_by_current().is_empty());
}

#[test]
fn test_unknown_lock_name() {
    let order = Arc::new(LockOrder::new(["a"]));

    assert!(matches!(order.mutex("z", ()), Err(Error::UnknownLock("z"))));
}
