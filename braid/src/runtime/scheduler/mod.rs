//! The single-threaded cooperative scheduler.
//!
//! One scheduler drives every task of a runtime on the control thread.
//! Each turn of the loop:
//! 1. **Resume**: moves tasks whose wait-key was satisfied (woken,
//!    timer fired, descriptor ready) from the wait registry to the
//!    ready queue.
//! 2. **Run**: polls the tasks that were ready at the start of the pass,
//!    in FIFO order, each until it suspends or finishes.
//! 3. **Poll**: when nothing is ready, blocks in the driver until the
//!    next timer deadline, a descriptor event or a cross-thread wakeup.
//!
//! A task that never suspends keeps the control thread for itself; such
//! polls are reported through `tracing` once they exceed the configured
//! threshold.

mod ready;
mod registry;
mod timer;

pub(crate) use registry::{WaitKey, next_object_id};
pub(crate) use timer::TimerId;

use ready::ReadyQueue;
use registry::WaitRegistry;
use timer::TimerHeap;

use crate::error::{Error, Result, panic_message};
use crate::pool::ThreadPool;
use crate::promise::{CompletionMode, Promise};
use crate::runtime::builder::Config;
use crate::runtime::driver::Driver;
use crate::runtime::task::waker::{Inbox, make_waker};
use crate::runtime::task::{Body, CancelHandle, JoinHandle, Task, TaskId, TaskState};
use crate::utils::Slab;

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Source of runtime ids; task ids are only unique within one runtime.
static NEXT_RUNTIME: AtomicU64 = AtomicU64::new(1);

pub(crate) struct Scheduler {
    /// Process-wide id of this runtime.
    id: u64,

    tasks: RefCell<Slab<Task>>,
    ready: RefCell<ReadyQueue>,
    registry: RefCell<WaitRegistry>,
    timers: RefCell<TimerHeap>,
    driver: RefCell<Driver>,

    /// Wakeups recorded by task wakers, from any thread.
    inbox: Arc<Inbox>,

    /// The task being polled.
    running: Cell<Option<TaskId>>,

    /// Wait-key declared by the running task during its current poll.
    pending_key: RefCell<Option<WaitKey>>,

    config: Config,

    /// Default pool behind `spawn_blocking`, started on first use.
    blocking: RefCell<Option<ThreadPool>>,
}

impl Scheduler {
    pub(crate) fn new(config: Config) -> Result<Rc<Self>> {
        let driver = Driver::new()?;
        let inbox = Inbox::new(driver.unparker());

        Ok(Rc::new(Self {
            id: NEXT_RUNTIME.fetch_add(1, Ordering::Relaxed),
            tasks: RefCell::new(Slab::with_capacity(64)),
            ready: RefCell::new(ReadyQueue::new()),
            registry: RefCell::new(WaitRegistry::new()),
            timers: RefCell::new(TimerHeap::new()),
            driver: RefCell::new(driver),
            inbox,
            running: Cell::new(None),
            pending_key: RefCell::new(None),
            config,
            blocking: RefCell::new(None),
        }))
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Wraps `future` in a task and queues it.
    pub(crate) fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let (promise, resolver) = Promise::with_mode(self.config.completion_mode);
        let settle = Box::new(resolver.clone());

        let body: Body = Box::pin(async move {
            let output = future.await;
            let _ = resolver.resolve(output);
        });

        let flag = Arc::new(AtomicBool::new(false));

        let (id, waker) = {
            let mut tasks = self.tasks.borrow_mut();
            let key = tasks.insert_with(|key| {
                let id = TaskId(key);
                Task::new(id, body, flag.clone(), make_waker(id, self.inbox.clone()), settle)
            });

            let task = tasks
                .get_mut(key)
                .unwrap_or_else(|| unreachable!("task {key} vanished during spawn"));
            task.transition(TaskState::Ready);

            (task.id, task.waker.clone())
        };

        self.ready.borrow_mut().push(id);
        debug!(task.id = %id, "task spawned");

        JoinHandle {
            id,
            promise,
            cancel: CancelHandle { flag, waker },
        }
    }

    /// Drives the loop until `done` returns `true`.
    pub(crate) fn run_until(&self, done: impl Fn() -> bool) -> Result<()> {
        loop {
            self.drain_inbox();
            self.fire_timers();

            if done() {
                return Ok(());
            }

            let batch = self.ready.borrow().len();
            for _ in 0..batch {
                let Some(id) = self.ready.borrow_mut().pop() else {
                    break;
                };

                self.run_task(id);
                self.drain_inbox();
            }

            if done() {
                return Ok(());
            }

            if self.ready.borrow().is_empty() {
                self.park()?;
            }
        }
    }

    /// Polls one task until it suspends or finishes.
    ///
    /// No scheduler borrow is held while the body is polled or dropped:
    /// both run user code that may spawn, wake or cancel timers.
    fn run_task(&self, id: TaskId) {
        let (body, waker, cancel) = {
            let mut tasks = self.tasks.borrow_mut();
            let Some(task) = tasks.get_mut(id.0) else {
                return;
            };

            task.transition(TaskState::Running);
            (task.body.take(), task.waker.clone(), task.cancel.clone())
        };

        let Some(mut body) = body else {
            panic!("scheduler invariant violated: task {id} has no continuation");
        };

        if cancel.load(Ordering::Acquire) {
            drop(body);
            self.finish(id, TaskState::Cancelled, None);
            return;
        }

        self.running.set(Some(id));
        self.pending_key.borrow_mut().take();

        let started = Instant::now();
        let mut cx = Context::from_waker(&waker);
        let poll = panic::catch_unwind(AssertUnwindSafe(|| body.as_mut().poll(&mut cx)));
        let elapsed = started.elapsed();

        self.running.set(None);
        let key = self.pending_key.borrow_mut().take();

        trace!(task.id = %id, ?elapsed, "task polled");
        if elapsed > self.config.slow_poll_threshold {
            warn!(
                task.id = %id,
                ?elapsed,
                threshold = ?self.config.slow_poll_threshold,
                "task ran without suspending, blocking every other task"
            );
        }

        match poll {
            Ok(Poll::Ready(())) => {
                drop(body);
                self.finish(id, TaskState::Done, None);
            }
            Ok(Poll::Pending) if cancel.load(Ordering::Acquire) => {
                drop(body);
                self.finish(id, TaskState::Cancelled, None);
            }
            Ok(Poll::Pending) => {
                if let Some(task) = self.tasks.borrow_mut().get_mut(id.0) {
                    task.body = Some(body);
                    task.transition(TaskState::Suspended);
                }

                self.registry
                    .borrow_mut()
                    .insert(id, key.unwrap_or(WaitKey::Wake));
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                drop(body);
                self.finish(id, TaskState::Failed, Some(message));
            }
        }
    }

    /// Moves a running task to its terminal state and settles its cell.
    fn finish(&self, id: TaskId, state: TaskState, failure: Option<String>) {
        let Some(mut task) = self.tasks.borrow_mut().remove(id.0) else {
            return;
        };

        task.transition(state);

        match state {
            TaskState::Cancelled => {
                debug!(task.id = %id, "task cancelled");
                task.settle.cancel();
            }
            TaskState::Failed => {
                let message = failure.unwrap_or_default();
                warn!(task.id = %id, panic = %message, "task panicked");
                task.settle.fail(Error::Panicked(message));
            }
            _ => debug!(task.id = %id, "task finished"),
        }
    }

    /// Moves a suspended task back to the ready queue.
    ///
    /// Wakeups for tasks that are already queued, running or gone are
    /// ignored; a running task that wakes itself is resumed once it
    /// has suspended.
    fn make_ready(&self, id: TaskId) {
        {
            let mut tasks = self.tasks.borrow_mut();
            let Some(task) = tasks.get_mut(id.0) else {
                return;
            };

            if task.state() != TaskState::Suspended {
                return;
            }

            task.transition(TaskState::Ready);
        }

        self.registry.borrow_mut().remove(id);
        self.ready.borrow_mut().push(id);
    }

    fn drain_inbox(&self) {
        for id in self.inbox.drain() {
            self.make_ready(id);
        }
    }

    fn fire_timers(&self) {
        let fired = self.timers.borrow_mut().expire(Instant::now());

        for timer in fired {
            let waiting = self.registry.borrow().waiting_on(&WaitKey::Timer(timer));
            trace!(timer = timer.0, waiting = waiting.len(), "timer fired");

            for id in waiting {
                self.make_ready(id);
            }
        }
    }

    /// Blocks in the driver until some wait-key may be satisfied.
    fn park(&self) -> Result<()> {
        let timeout = if self.inbox.is_empty() {
            self.timers
                .borrow_mut()
                .next_deadline()
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
        } else {
            Some(Duration::ZERO)
        };

        let interests = self.registry.borrow().io_interests();
        let ready = self.driver.borrow_mut().poll(&interests, timeout)?;

        for (fd, interest) in ready {
            let waiting = self.registry.borrow().waiting_on(&WaitKey::Io(fd, interest));

            for id in waiting {
                self.make_ready(id);
            }
        }

        Ok(())
    }

    /// Records the wait-key of the running task.
    ///
    /// Keys declared by several leaves during one poll are merged into
    /// one composite key.
    pub(crate) fn declare(&self, key: WaitKey) {
        if self.running.get().is_none() {
            return;
        }

        let mut pending = self.pending_key.borrow_mut();
        *pending = Some(match pending.take() {
            Some(previous) => previous.merge(key),
            None => key,
        });
    }

    pub(crate) fn running(&self) -> Option<TaskId> {
        self.running.get()
    }

    pub(crate) fn state_of(&self, id: TaskId) -> Option<TaskState> {
        self.tasks.borrow().get(id.0).map(Task::state)
    }

    pub(crate) fn completion_mode(&self) -> CompletionMode {
        self.config.completion_mode
    }

    pub(crate) fn register_timer(&self, deadline: Instant) -> TimerId {
        self.timers.borrow_mut().insert(deadline)
    }

    pub(crate) fn cancel_timer(&self, timer: TimerId) {
        self.timers.borrow_mut().cancel(timer);
    }

    /// Runs `f` with the default blocking pool, starting it if needed.
    pub(crate) fn with_blocking_pool<R>(&self, f: impl FnOnce(&ThreadPool) -> R) -> Result<R> {
        let mut blocking = self.blocking.borrow_mut();

        if blocking.is_none() {
            let pool = ThreadPool::builder()
                .workers(self.config.blocking_threads)
                .name("braid-blocking")
                .build()?;

            *blocking = Some(pool);
        }

        match blocking.as_ref() {
            Some(pool) => Ok(f(pool)),
            None => Err(Error::PoolShutdown),
        }
    }

    /// Drops every remaining task and stops the blocking pool.
    ///
    /// Dropping a task's body releases its registrations; its cell is
    /// cancelled so that outside observers are not left waiting.
    pub(crate) fn shutdown(&self) {
        let tasks = self.tasks.borrow_mut().drain();
        let remaining = tasks.len();

        for task in &tasks {
            task.settle.cancel();
        }
        drop(tasks);

        if remaining > 0 {
            debug!(tasks = remaining, "runtime dropped with unfinished tasks");
        }

        let pool = self.blocking.borrow_mut().take();
        if let Some(pool) = pool {
            pool.shutdown();
        }
    }
}
