use super::timer::TimerId;
use crate::runtime::driver::Interest;
use crate::runtime::task::TaskId;

use std::collections::{HashMap, VecDeque};
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of identifiers for promises and primitives.
static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a process-unique identifier for a waitable object.
pub(crate) fn next_object_id() -> u64 {
    NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)
}

/// What a suspended task is waiting on.
///
/// Timers and I/O keys are satisfied by the scheduler itself. Promise,
/// primitive and yield keys are satisfied through the task's waker; the
/// registry only records them. `Many` is the single composite key of a
/// task that polled several leaves in one poll.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum WaitKey {
    Timer(TimerId),
    Io(RawFd, Interest),
    Promise(u64),
    Primitive(u64),
    Yield,
    Wake,
    Many(Vec<WaitKey>),
}

impl WaitKey {
    /// Combines two keys declared during the same poll.
    pub(crate) fn merge(self, other: WaitKey) -> WaitKey {
        let mut parts = self.into_parts();
        for part in other.into_parts() {
            if !parts.contains(&part) {
                parts.push(part);
            }
        }

        if parts.len() == 1 {
            parts.pop().unwrap_or(WaitKey::Wake)
        } else {
            WaitKey::Many(parts)
        }
    }

    fn into_parts(self) -> Vec<WaitKey> {
        match self {
            WaitKey::Many(parts) => parts,
            key => vec![key],
        }
    }

    fn parts(&self) -> &[WaitKey] {
        match self {
            WaitKey::Many(parts) => parts,
            key => std::slice::from_ref(key),
        }
    }
}

/// Maps wait-keys to the tasks suspended on them.
///
/// Each task is registered under exactly one key; a composite key is
/// indexed under each of its parts so that satisfying any part finds
/// the task. Waiters on a key are kept in suspension order.
#[derive(Default)]
pub(crate) struct WaitRegistry {
    by_key: HashMap<WaitKey, VecDeque<TaskId>>,
    by_task: HashMap<TaskId, WaitKey>,
}

impl WaitRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers `task` as suspended on `key`.
    ///
    /// # Panics
    ///
    /// Panics if the task is already registered. That means the state
    /// machine is corrupted and the run cannot continue.
    pub(crate) fn insert(&mut self, task: TaskId, key: WaitKey) {
        if let Some(existing) = self.by_task.get(&task) {
            panic!(
                "scheduler invariant violated: task {task} is waiting on {existing:?} and {key:?}"
            );
        }

        for part in key.parts() {
            self.by_key.entry(part.clone()).or_default().push_back(task);
        }

        self.by_task.insert(task, key);
    }

    /// Unregisters `task`, returning the key it was waiting on.
    pub(crate) fn remove(&mut self, task: TaskId) -> Option<WaitKey> {
        let key = self.by_task.remove(&task)?;

        for part in key.parts() {
            if let Some(waiters) = self.by_key.get_mut(part) {
                waiters.retain(|id| *id != task);
                if waiters.is_empty() {
                    self.by_key.remove(part);
                }
            }
        }

        Some(key)
    }

    /// Returns the tasks waiting on `key`, in suspension order.
    pub(crate) fn waiting_on(&self, key: &WaitKey) -> Vec<TaskId> {
        self.by_key
            .get(key)
            .map(|waiters| waiters.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns every descriptor some task waits on.
    pub(crate) fn io_interests(&self) -> Vec<(RawFd, Interest)> {
        self.by_key
            .keys()
            .filter_map(|key| match key {
                WaitKey::Io(fd, interest) => Some((*fd, *interest)),
                _ => None,
            })
            .collect()
    }

    /// Number of suspended tasks.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.by_task.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Slab;

    fn ids(n: usize) -> Vec<TaskId> {
        let mut slab = Slab::with_capacity(n);
        (0..n).map(|_| TaskId(slab.insert_with(|_| ()))).collect()
    }

    #[test]
    fn waiters_are_kept_in_suspension_order() {
        let tasks = ids(3);
        let mut registry = WaitRegistry::new();
        let key = WaitKey::Timer(TimerId(7));

        for task in &tasks {
            registry.insert(*task, key.clone());
        }

        assert_eq!(registry.waiting_on(&key), tasks);
    }

    #[test]
    fn composite_keys_are_released_as_a_whole() {
        let tasks = ids(1);
        let mut registry = WaitRegistry::new();
        let key = WaitKey::Timer(TimerId(1)).merge(WaitKey::Promise(9));

        registry.insert(tasks[0], key.clone());
        assert_eq!(registry.waiting_on(&WaitKey::Promise(9)), tasks);

        assert_eq!(registry.remove(tasks[0]), Some(key));
        assert!(registry.waiting_on(&WaitKey::Timer(TimerId(1))).is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn merge_flattens_and_dedups() {
        let key = WaitKey::Yield
            .merge(WaitKey::Timer(TimerId(2)))
            .merge(WaitKey::Yield);

        assert_eq!(
            key,
            WaitKey::Many(vec![WaitKey::Yield, WaitKey::Timer(TimerId(2))])
        );
    }

    #[test]
    #[should_panic(expected = "scheduler invariant violated")]
    fn double_registration_is_fatal() {
        let tasks = ids(1);
        let mut registry = WaitRegistry::new();
        registry.insert(tasks[0], WaitKey::Yield);
        registry.insert(tasks[0], WaitKey::Wake);
    }
}
