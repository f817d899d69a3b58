use std::fmt;
use std::mem;

/// A stable handle into a [`Slab`].
///
/// The generation counter makes stale handles harmless: once a slot is
/// freed and reused, handles to the previous occupant no longer resolve.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct Key {
    index: u32,
    generation: u32,
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

enum Entry<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

/// A generational slab allocator.
///
/// A `Slab` stores values in a contiguous vector and hands out [`Key`]s
/// that remain valid until the value is removed. Freed slots are reused,
/// and every reuse bumps the slot's generation.
pub(crate) struct Slab<T> {
    /// Storage for entries.
    entries: Vec<Entry<T>>,
    /// Stack of vacant indices that can be reused.
    free: Vec<u32>,
    /// Number of occupied entries.
    len: usize,
}

impl<T> Slab<T> {
    /// Creates an empty slab with room for `capacity` entries.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Inserts the value built by `make`, which receives the entry's key.
    pub(crate) fn insert_with(&mut self, make: impl FnOnce(Key) -> T) -> Key {
        let (index, generation) = match self.free.pop() {
            Some(index) => {
                let generation = match &self.entries[index as usize] {
                    Entry::Vacant { generation } => generation.wrapping_add(1),
                    Entry::Occupied { .. } => unreachable!("free list points at an occupied slot"),
                };
                (index, generation)
            }
            None => {
                self.entries.push(Entry::Vacant { generation: 0 });
                ((self.entries.len() - 1) as u32, 0)
            }
        };

        let key = Key { index, generation };
        self.entries[index as usize] = Entry::Occupied {
            generation,
            value: make(key),
        };
        self.len += 1;

        key
    }

    /// Returns a shared reference to the value behind `key`.
    pub(crate) fn get(&self, key: Key) -> Option<&T> {
        match self.entries.get(key.index as usize) {
            Some(Entry::Occupied { generation, value }) if *generation == key.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Returns a mutable reference to the value behind `key`.
    pub(crate) fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        match self.entries.get_mut(key.index as usize) {
            Some(Entry::Occupied { generation, value }) if *generation == key.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Removes and returns the value behind `key`.
    ///
    /// Returns `None` if the key is stale.
    pub(crate) fn remove(&mut self, key: Key) -> Option<T> {
        let slot = self.entries.get_mut(key.index as usize)?;

        match slot {
            Entry::Occupied { generation, .. } if *generation == key.generation => {}
            _ => return None,
        }

        let vacant = Entry::Vacant {
            generation: key.generation,
        };

        match mem::replace(slot, vacant) {
            Entry::Occupied { value, .. } => {
                self.free.push(key.index);
                self.len -= 1;
                Some(value)
            }
            Entry::Vacant { .. } => None,
        }
    }

    /// Removes every value, returning them in slot order.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len);

        for (index, slot) in self.entries.iter_mut().enumerate() {
            if let Entry::Occupied { generation, .. } = slot {
                let generation = *generation;
                if let Entry::Occupied { value, .. } = mem::replace(slot, Entry::Vacant { generation })
                {
                    out.push(value);
                    self.free.push(index as u32);
                }
            }
        }

        self.len = 0;
        out
    }

    /// Returns the number of occupied entries.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_keys_do_not_resolve() {
        let mut slab = Slab::with_capacity(2);
        let a = slab.insert_with(|_| "a");
        assert_eq!(slab.remove(a), Some("a"));

        let b = slab.insert_with(|_| "b");
        assert_eq!(slab.get(a), None);
        assert_eq!(slab.get(b), Some(&"b"));
        assert_ne!(a, b);
    }

    #[test]
    fn insert_with_sees_its_own_key() {
        let mut slab = Slab::with_capacity(1);
        let key = slab.insert_with(|key| key);
        assert_eq!(slab.get(key), Some(&key));
    }

    #[test]
    fn drain_empties_the_slab() {
        let mut slab = Slab::with_capacity(4);
        for i in 0..4 {
            slab.insert_with(|_| i);
        }

        let values = slab.drain();
        assert_eq!(values, vec![0, 1, 2, 3]);
        assert_eq!(slab.len(), 0);
    }
}
