use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Instant;

/// Identifier of a scheduled timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct TimerId(pub(crate) u64);

/// An entry in the timer heap.
struct TimerEntry {
    /// The time at which the timer should fire.
    deadline: Instant,

    /// Identifier used to find the waiting tasks.
    id: TimerId,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}

impl Ord for TimerEntry {
    /// Orders entries by deadline, then by creation order.
    ///
    /// The comparison is **reversed** so that a `BinaryHeap<TimerEntry>`
    /// pops the earliest deadline first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.0.cmp(&self.id.0))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Dead entries tolerated before the heap is compacted.
const COMPACT_SLACK: usize = 64;

/// Min-heap of pending timers.
///
/// Cancelled timers are removed lazily: they stay in the heap but are
/// skipped when they reach the top. Once they outnumber the live timers
/// the heap is rebuilt, so cancelled entries behind a far deadline do not
/// pile up.
pub(crate) struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
    live: HashSet<TimerId>,
    next: u64,
}

impl TimerHeap {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashSet::new(),
            next: 0,
        }
    }

    /// Schedules a timer firing at `deadline`.
    pub(crate) fn insert(&mut self, deadline: Instant) -> TimerId {
        let id = TimerId(self.next);
        self.next += 1;

        self.heap.push(TimerEntry { deadline, id });
        self.live.insert(id);

        id
    }

    /// Cancels a timer. Cancelling a fired timer is a no-op.
    pub(crate) fn cancel(&mut self, id: TimerId) {
        if !self.live.remove(&id) {
            return;
        }

        if self.heap.len() > 2 * self.live.len() + COMPACT_SLACK {
            let live = &self.live;
            self.heap.retain(|entry| live.contains(&entry.id));
        }
    }

    /// Returns the earliest live deadline.
    pub(crate) fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(entry) = self.heap.peek() {
            if self.live.contains(&entry.id) {
                return Some(entry.deadline);
            }
            self.heap.pop();
        }

        None
    }

    /// Removes and returns every live timer due at `now`, earliest first.
    pub(crate) fn expire(&mut self, now: Instant) -> Vec<TimerId> {
        let mut fired = Vec::new();

        while let Some(entry) = self.heap.peek() {
            if entry.deadline > now {
                break;
            }

            if let Some(entry) = self.heap.pop() {
                if self.live.remove(&entry.id) {
                    fired.push(entry.id);
                }
            }
        }

        fired
    }

    /// Number of live timers.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.live.len()
    }

    /// Number of heap entries, cancelled ones included.
    #[cfg(test)]
    fn entries(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn expires_in_deadline_order() {
        let now = Instant::now();
        let mut timers = TimerHeap::new();

        let late = timers.insert(now + Duration::from_millis(30));
        let early = timers.insert(now + Duration::from_millis(10));
        let middle = timers.insert(now + Duration::from_millis(20));

        let fired = timers.expire(now + Duration::from_millis(40));
        assert_eq!(fired, vec![early, middle, late]);
        assert_eq!(timers.len(), 0);
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let now = Instant::now();
        let mut timers = TimerHeap::new();

        let first = timers.insert(now);
        let second = timers.insert(now + Duration::from_millis(5));
        timers.cancel(first);

        assert_eq!(timers.next_deadline(), Some(now + Duration::from_millis(5)));
        assert_eq!(timers.expire(now + Duration::from_millis(5)), vec![second]);
    }

    #[test]
    fn future_timers_stay_pending() {
        let now = Instant::now();
        let mut timers = TimerHeap::new();
        timers.insert(now + Duration::from_secs(60));

        assert!(timers.expire(now).is_empty());
        assert_eq!(timers.len(), 1);
    }

    #[test]
    fn cancelled_entries_behind_a_live_timer_are_compacted() {
        let now = Instant::now();
        let mut timers = TimerHeap::new();
        let soon = timers.insert(now + Duration::from_secs(1));

        for _ in 0..100_000 {
            let far = timers.insert(now + Duration::from_secs(3600));
            timers.cancel(far);
        }

        assert_eq!(timers.len(), 1);
        assert!(timers.entries() <= 2 + COMPACT_SLACK, "{} entries", timers.entries());
        assert_eq!(timers.expire(now + Duration::from_secs(1)), vec![soon]);
    }
}
