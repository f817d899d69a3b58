use super::mutex::{Mutex, MutexGuard};
use super::waiter::Holder;
use crate::error::{Error, Result};

use parking_lot::Mutex as StateLock;
use tracing::warn;

use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// A global ranking of named locks.
///
/// Ranks follow the order in which names are declared, starting at 1.
/// With checking on, a holder may only acquire locks in non-decreasing
/// rank order; the first out-of-order request fails with
/// [`Error::LockOrderViolation`] before it waits, turning a potential
/// deadlock into an error at the offending call site.
///
/// Checking defaults to on in debug builds and off in release builds.
///
/// # Examples
///
/// ```rust,ignore
/// let order = Arc::new(LockOrder::new(["config", "cache"]));
/// let config = order.mutex("config", Config::default())?;
/// let cache = order.mutex("cache", Cache::default())?;
///
/// let _config = config.lock().await?;
/// let _cache = cache.lock().await?; // fine: rank 1 then rank 2
/// ```
pub struct LockOrder {
    names: Vec<&'static str>,
    checked: bool,
    held: StateLock<HashMap<Holder, Vec<(u32, &'static str)>>>,
}

impl LockOrder {
    pub fn new(names: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            names: names.into_iter().collect(),
            checked: cfg!(debug_assertions),
            held: StateLock::new(HashMap::new()),
        }
    }

    /// Turns rank checking on or off.
    pub fn checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    pub fn is_checked(&self) -> bool {
        self.checked
    }

    /// Rank of `name`, if declared.
    pub fn rank(&self, name: &str) -> Option<u32> {
        self.names
            .iter()
            .position(|declared| *declared == name)
            .map(|index| index as u32 + 1)
    }

    /// Creates a mutex ranked under `name`.
    ///
    /// Fails with [`Error::UnknownLock`] if `name` was not declared.
    pub fn mutex<T>(self: &Arc<Self>, name: &'static str, value: T) -> Result<OrderedMutex<T>> {
        let rank = self.rank(name).ok_or(Error::UnknownLock(name))?;

        Ok(OrderedMutex {
            name,
            rank,
            order: self.clone(),
            inner: Mutex::new(value),
        })
    }

    /// Names of the ranked locks the current task or thread holds.
    pub fn held_by_current(&self) -> Vec<&'static str> {
        self.held
            .lock()
            .get(&Holder::current())
            .map(|held| held.iter().map(|(_, name)| *name).collect())
            .unwrap_or_default()
    }

    /// Fails if `holder` holds a lock ranked above `rank`.
    fn check(&self, holder: Holder, name: &'static str, rank: u32) -> Result<()> {
        if !self.checked {
            return Ok(());
        }

        let held = self.held.lock();
        let highest = held
            .get(&holder)
            .and_then(|held| held.iter().max_by_key(|(rank, _)| *rank));

        match highest {
            Some(&(held_rank, held_name)) if held_rank > rank => {
                warn!(
                    requested = name,
                    rank,
                    held = held_name,
                    held_rank,
                    "lock order violation"
                );

                Err(Error::LockOrderViolation {
                    requested: name,
                    rank,
                    held: held_name,
                    held_rank,
                })
            }
            _ => Ok(()),
        }
    }

    fn record(&self, holder: Holder, name: &'static str, rank: u32) {
        if self.checked {
            self.held.lock().entry(holder).or_default().push((rank, name));
        }
    }

    fn forget(&self, holder: Holder, name: &'static str) {
        if !self.checked {
            return;
        }

        let mut held = self.held.lock();

        if let Some(ranks) = held.get_mut(&holder) {
            if let Some(position) = ranks.iter().rposition(|(_, held)| *held == name) {
                ranks.remove(position);
            }

            if ranks.is_empty() {
                held.remove(&holder);
            }
        }
    }
}

impl fmt::Debug for LockOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockOrder")
            .field("names", &self.names)
            .field("checked", &self.checked)
            .finish()
    }
}

/// A [`Mutex`] with a place in a [`LockOrder`].
pub struct OrderedMutex<T> {
    name: &'static str,
    rank: u32,
    order: Arc<LockOrder>,
    inner: Mutex<T>,
}

impl<T> OrderedMutex<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }

    /// Acquires the mutex, checking the rank order first.
    pub async fn lock(&self) -> Result<OrderedMutexGuard<'_, T>> {
        let holder = Holder::current();
        self.order.check(holder, self.name, self.rank)?;

        let guard = self.inner.lock().await;
        Ok(self.guarded(holder, guard))
    }

    /// Blocking counterpart of [`lock`](Self::lock) for worker threads.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a running task.
    pub fn lock_blocking(&self) -> Result<OrderedMutexGuard<'_, T>> {
        let holder = Holder::current();
        self.order.check(holder, self.name, self.rank)?;

        let guard = self.inner.lock_blocking();
        Ok(self.guarded(holder, guard))
    }

    /// Acquires the mutex if it is free, checking the rank order first.
    pub fn try_lock(&self) -> Result<Option<OrderedMutexGuard<'_, T>>> {
        let holder = Holder::current();
        self.order.check(holder, self.name, self.rank)?;

        Ok(self.inner.try_lock().map(|guard| self.guarded(holder, guard)))
    }

    fn guarded<'a>(&'a self, holder: Holder, guard: MutexGuard<'a, T>) -> OrderedMutexGuard<'a, T> {
        self.order.record(holder, self.name, self.rank);

        OrderedMutexGuard {
            lock: self,
            holder,
            guard,
        }
    }
}

impl<T> fmt::Debug for OrderedMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedMutex")
            .field("name", &self.name)
            .field("rank", &self.rank)
            .field("locked", &self.inner.is_locked())
            .finish()
    }
}

/// Guard returned by [`OrderedMutex::lock`].
#[must_use = "the mutex is unlocked as soon as the guard is dropped"]
pub struct OrderedMutexGuard<'a, T> {
    lock: &'a OrderedMutex<T>,
    holder: Holder,
    guard: MutexGuard<'a, T>,
}

impl<T> Deref for OrderedMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for OrderedMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for OrderedMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.order.forget(self.holder, self.lock.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_follow_declaration_order() {
        let order = Arc::new(LockOrder::new(["a", "b", "c"]));

        assert_eq!(order.rank("a"), Some(1));
        assert_eq!(order.rank("c"), Some(3));
        assert_eq!(order.rank("z"), None);
        assert!(matches!(order.mutex("z", ()), Err(Error::UnknownLock("z"))));
    }

    #[test]
    fn descending_acquisition_is_rejected() {
        let order = Arc::new(LockOrder::new(["low", "high"]).checked(true));
        let low = order.mutex("low", 0).unwrap();
        let high = order.mutex("high", 0).unwrap();

        let _high = high.lock_blocking().unwrap();
        let err = low.lock_blocking().err().expect("violation");

        assert!(matches!(
            err,
            Error::LockOrderViolation {
                requested: "low",
                rank: 1,
                held: "high",
                held_rank: 2,
            }
        ));
        assert!(!low.inner.is_locked());
    }

    #[test]
    fn released_locks_are_forgotten() {
        let order = Arc::new(LockOrder::new(["low", "high"]).checked(true));
        let low = order.mutex("low", 0).unwrap();
        let high = order.mutex("high", 0).unwrap();

        drop(high.lock_blocking().unwrap());
        assert!(order.held_by_current().is_empty());

        let _low = low.lock_blocking().unwrap();
        let _high = high.lock_blocking().unwrap();
        assert_eq!(order.held_by_current(), vec!["low", "high"]);
    }

    #[test]
    fn unchecked_order_allows_anything() {
        let order = Arc::new(LockOrder::new(["low", "high"]).checked(false));
        let low = order.mutex("low", 0).unwrap();
        let high = order.mutex("high", 0).unwrap();

        let _high = high.lock_blocking().unwrap();
        assert!(low.lock_blocking().is_ok());
    }
}
