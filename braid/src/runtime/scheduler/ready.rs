use crate::runtime::task::TaskId;

use std::collections::{HashSet, VecDeque};

/// FIFO of runnable tasks.
///
/// A task appears at most once; pushing a queued task is a no-op.
#[derive(Default)]
pub(crate) struct ReadyQueue {
    queue: VecDeque<TaskId>,
    queued: HashSet<TaskId>,
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends `task`, returning `false` if it was already queued.
    pub(crate) fn push(&mut self, task: TaskId) -> bool {
        if !self.queued.insert(task) {
            return false;
        }

        self.queue.push_back(task);
        true
    }

    /// Pops the oldest runnable task.
    pub(crate) fn pop(&mut self) -> Option<TaskId> {
        let task = self.queue.pop_front()?;
        self.queued.remove(&task);
        Some(task)
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Slab;

    #[test]
    fn fifo_without_duplicates() {
        let mut slab = Slab::with_capacity(3);
        let ids: Vec<TaskId> = (0..3).map(|_| TaskId(slab.insert_with(|_| ()))).collect();

        let mut ready = ReadyQueue::new();
        for id in &ids {
            assert!(ready.push(*id));
        }
        assert!(!ready.push(ids[1]));
        assert_eq!(ready.len(), 3);

        assert_eq!(ready.pop(), Some(ids[0]));
        assert_eq!(ready.pop(), Some(ids[1]));

        assert!(ready.push(ids[0]));
        assert_eq!(ready.pop(), Some(ids[2]));
        assert_eq!(ready.pop(), Some(ids[0]));
        assert!(ready.is_empty());
    }
}
