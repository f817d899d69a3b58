use braid::task::{self, Pending};
use braid::time::sleep;
use braid::{Error, RuntimeBuilder};
use std::time::Duration;

#[test]
fn test_await_all_keeps_submission_order() {
    let rt = RuntimeBuilder::new().build();

    let results = rt.block_on(async {
        let handles: Vec<_> = [30u64, 5, 15]
            .into_iter()
            .map(|millis| {
                task::spawn(async move {
                    sleep(Duration::from_millis(millis)).await;
                    millis
                })
            })
            .collect();

        task::await_all(handles).await
    });

    let results: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    assert_eq!(results, vec![30, 5, 15]);
}

#[test]
fn test_await_all_of_nothing() {
    let rt = RuntimeBuilder::new().build();

    let results = rt.block_on(task::await_all(Vec::<task::JoinHandle<()>>::new()));

    assert!(results.is_empty());
}

#[test]
fn test_try_await_all_fails_fast() {
    let rt = RuntimeBuilder::new().build();

    let result = rt.block_on(async {
        let jobs: Vec<_> = (0..4u64)
            .map(|i| async move {
                sleep(Duration::from_millis(5 * (i + 1))).await;
                if i == 1 { Err(format!("job {i} failed")) } else { Ok(i) }
            })
            .collect();

        task::try_await_all(jobs).await
    });

    assert_eq!(result, Err(String::from("job 1 failed")));
}

#[test]
fn test_try_await_all_collects_successes() {
    let rt = RuntimeBuilder::new().build();

    let result = rt.block_on(task::try_await_all(
        (0..5).map(|i| async move { Ok::<_, Error>(i * i) }),
    ));

    assert_eq!(result.unwrap(), vec![0, 1, 4, 9, 16]);
}

#[test]
fn test_await_first_hands_back_the_rest() {
    let rt = RuntimeBuilder::new().build();

    let (index, output, leftovers) = rt.block_on(async {
        let handles: Vec<_> = [100u64, 10, 200]
            .into_iter()
            .map(|millis| {
                task::spawn(async move {
                    sleep(Duration::from_millis(millis)).await;
                    millis
                })
            })
            .collect();

        let first = task::await_first(handles).await;
        let indices: Vec<_> = first.pending.iter().map(|pending| pending.index).collect();
        assert_eq!(indices, vec![0, 2]);

        let rest = first.pending.into_iter().map(Pending::into_inner).collect();
        let leftovers = task::cancel_all(rest).await;

        (first.index, first.output, leftovers)
    });

    assert_eq!(index, 1);
    assert_eq!(output.unwrap(), 10);
    assert_eq!(leftovers.len(), 2);
    assert!(leftovers.iter().all(|result| matches!(result, Err(Error::Cancelled))));
}

#[test]
#[should_panic(expected = "await_first requires at least one future")]
fn test_await_first_of_nothing_panics() {
    let _ = task::await_first(Vec::<task::JoinHandle<()>>::new());
}
