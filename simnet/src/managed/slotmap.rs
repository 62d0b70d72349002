use core::fmt;

/// A vector with stable generational keys.
///
/// A slotmap provides a `Vec`-like interface where each entry is associated with a stable
/// index-like key. Lookup with the key will detect if an entry has been removed but does not
/// require any lifetime relation, so devices and interfaces can refer to each other by key
/// without owning each other.
///
/// ## Usage
///
/// ```
/// # use simnet::managed::SlotMap;
/// let mut map = SlotMap::new();
/// let index = map.insert(42);
/// assert_eq!(map.get(index).cloned(), Some(42));
/// assert_eq!(map.remove(index), Some(42));
/// assert_eq!(map.get(index), None);
/// ```
#[derive(Clone)]
pub struct SlotMap<T> {
    slots: Vec<Slot<T>>,
    generation: Generation,
    /// Head of the free list of vacant slots.
    free_top: Option<usize>,
    len: usize,
}

#[derive(Clone)]
enum Slot<T> {
    Occupied {
        generation: Generation,
        value: T,
    },
    Vacant {
        next_free: Option<usize>,
    },
}

/// An index into a slotmap.
///
/// The index remains valid until the entry is removed. If accessing the slotmap with the index
/// again after the entry was removed will fail, even if the index where the element was previously
/// stored has been reused for another element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    idx: usize,
    generation: Generation,
}

/// The generation counter.
///
/// Has strictly positive values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Generation(u64);

impl<T> SlotMap<T> {
    /// Create an empty map.
    pub fn new() -> Self {
        SlotMap {
            slots: Vec::new(),
            generation: Generation::default(),
            free_top: None,
            len: 0,
        }
    }

    /// The number of occupied entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Query whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Retrieve a value by index.
    pub fn get(&self, index: Key) -> Option<&T> {
        match self.slots.get(index.idx)? {
            Slot::Occupied { generation, value } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// Retrieve a mutable value by index.
    pub fn get_mut(&mut self, index: Key) -> Option<&mut T> {
        match self.slots.get_mut(index.idx)? {
            Slot::Occupied { generation, value } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// Retrieve two distinct values mutably at the same time.
    ///
    /// Returns `None` if either key is stale or both keys are equal.
    pub fn get2_mut(&mut self, a: Key, b: Key) -> Option<(&mut T, &mut T)> {
        if a.idx == b.idx {
            return None;
        }
        self.get(a)?;
        self.get(b)?;

        let (low, high) = (a.idx.min(b.idx), a.idx.max(b.idx));
        let (head, tail) = self.slots.split_at_mut(high);
        let (first, second) = match (&mut head[low], &mut tail[0]) {
            (Slot::Occupied { value: first, .. }, Slot::Occupied { value: second, .. }) => {
                (first, second)
            },
            _ => return None,
        };

        if a.idx < b.idx {
            Some((first, second))
        } else {
            Some((second, first))
        }
    }

    /// Query whether the key refers to a live entry.
    pub fn contains_key(&self, index: Key) -> bool {
        self.get(index).is_some()
    }

    /// Insert a value, reusing a vacant slot if there is one.
    pub fn insert(&mut self, value: T) -> Key {
        let generation = self.generation;
        self.generation.advance();
        self.len += 1;

        let slot = Slot::Occupied { generation, value };
        let idx = match self.free_top {
            Some(idx) => {
                self.free_top = match self.slots[idx] {
                    Slot::Vacant { next_free } => next_free,
                    Slot::Occupied { .. } => unreachable!("free list points to an occupied slot"),
                };
                self.slots[idx] = slot;
                idx
            },
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            },
        };

        Key { idx, generation }
    }

    /// Remove an element.
    ///
    /// Returns `None` if the provided index did not refer to a live element.
    pub fn remove(&mut self, index: Key) -> Option<T> {
        self.get(index)?;

        let vacant = Slot::Vacant { next_free: self.free_top };
        let old = core::mem::replace(&mut self.slots[index.idx], vacant);
        self.free_top = Some(index.idx);
        self.len -= 1;

        match old {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    /// Iterate over all entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item=(Key, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| match slot {
            Slot::Occupied { generation, value } => {
                Some((Key { idx, generation: *generation }, value))
            },
            Slot::Vacant { .. } => None,
        })
    }

    /// Iterate mutably over all entries in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item=(Key, &mut T)> + '_ {
        self.slots.iter_mut().enumerate().filter_map(|(idx, slot)| match slot {
            Slot::Occupied { generation, value } => {
                Some((Key { idx, generation: *generation }, value))
            },
            Slot::Vacant { .. } => None,
        })
    }

    /// Collect the keys of all entries.
    pub fn keys(&self) -> Vec<Key> {
        self.iter().map(|(key, _)| key).collect()
    }
}

impl<T> Default for SlotMap<T> {
    fn default() -> Self {
        SlotMap::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for SlotMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl Key {
    /// The slot of this key.
    ///
    /// Only unique among the live keys of one map.
    pub fn index(self) -> usize {
        self.idx
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}v{}", self.idx, self.generation.0)
    }
}

impl Generation {
    fn advance(&mut self) {
        assert!(self.0 > 0);
        self.0 = self.0.wrapping_add(1).max(1)
    }
}

impl Default for Generation {
    fn default() -> Self {
        Generation(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple() {
        let mut map = SlotMap::new();
        let key42 = map.insert(42);
        let keylo = map.insert('K' as u32);

        assert_eq!(map.len(), 2);
        assert_eq!(map.get(key42).cloned(), Some(42));
        assert_eq!(map.get(keylo).cloned(), Some('K' as u32));
    }

    #[test]
    fn retained() {
        let mut map = SlotMap::new();
        let key = map.insert(0xde);
        map.remove(key).unwrap();
        assert_eq!(map.get(key), None);

        let new_key = map.insert(0xad);
        assert_eq!(new_key.index(), key.index());

        assert_eq!(map.get(key), None);
        assert_eq!(map.get(new_key).cloned(), Some(0xad));

        assert_eq!(map.remove(key), None);
        map.remove(new_key).unwrap();

        assert_eq!(map.get(key), None);
        assert_eq!(map.get(new_key), None);
        assert!(map.is_empty());
    }

    #[test]
    fn pair_access() {
        let mut map = SlotMap::new();
        let a = map.insert(1);
        let b = map.insert(2);

        {
            let (x, y) = map.get2_mut(b, a).unwrap();
            assert_eq!((*x, *y), (2, 1));
            *x += 10;
            *y += 20;
        }
        assert_eq!(map.get(a).cloned(), Some(21));
        assert_eq!(map.get(b).cloned(), Some(12));
        assert!(map.get2_mut(a, a).is_none());

        map.remove(b);
        assert!(map.get2_mut(a, b).is_none());
    }

    #[test]
    fn iteration_order() {
        let mut map = SlotMap::new();
        let a = map.insert("a");
        let b = map.insert("b");
        let c = map.insert("c");
        map.remove(b);
        assert_eq!(map.keys(), vec![a, c]);
        let d = map.insert("d");
        let values: Vec<_> = map.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec!["a", "d", "c"]);
        assert_eq!(map.keys(), vec![a, d, c]);
    }
}
