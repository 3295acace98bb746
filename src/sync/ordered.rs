//! Keyed, ordered collection shared by the conversation list and the active thread.
//!
//! Both views keep a REST-seeded sequence that live events then patch: the list
//! moves entries to the front, the thread appends entries it has not seen. Keys
//! are unique; every mutation keeps it that way.

use std::cmp::Ordering;

pub trait Keyed {
    type Key: PartialEq + ?Sized;

    fn key(&self) -> &Self::Key;
}

#[derive(Debug, Clone)]
pub struct OrderedMap<T> {
    entries: Vec<T>,
}

impl<T> Default for OrderedMap<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Keyed> OrderedMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an arbitrary sequence: later duplicates of a key are dropped,
    /// then entries are stably sorted with `cmp`.
    pub fn from_unordered<I, F>(items: I, cmp: F) -> Self
    where
        I: IntoIterator<Item = T>,
        F: FnMut(&T, &T) -> Ordering,
    {
        let mut map = Self::new();
        for item in items {
            map.append_if_absent(item);
        }
        map.sort_by(cmp);
        map
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.entries.iter_mut()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn position(&self, key: &T::Key) -> Option<usize> {
        self.entries.iter().position(|e| e.key() == key)
    }

    pub fn contains(&self, key: &T::Key) -> bool {
        self.position(key).is_some()
    }

    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.entries.iter().find(|e| e.key() == key)
    }

    pub fn get_mut(&mut self, key: &T::Key) -> Option<&mut T> {
        self.entries.iter_mut().find(|e| e.key() == key)
    }

    /// Stable sort; entries comparing equal keep their relative order.
    pub fn sort_by<F>(&mut self, cmp: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.entries.sort_by(cmp);
    }

    /// Returns the index the entry was moved from.
    pub fn move_to_front(&mut self, key: &T::Key) -> Option<usize> {
        let idx = self.position(key)?;
        if idx > 0 {
            let item = self.entries.remove(idx);
            self.entries.insert(0, item);
        }
        Some(idx)
    }

    /// Returns `false` if an entry with the same key already exists.
    pub fn append_if_absent(&mut self, item: T) -> bool {
        if self.contains(item.key()) {
            return false;
        }
        self.entries.push(item);
        true
    }

    /// Place `item` before the first entry that sorts strictly after it,
    /// replacing any existing entry with the same key.
    pub fn insert_ordered<F>(&mut self, item: T, mut cmp: F) -> usize
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        if let Some(idx) = self.position(item.key()) {
            self.entries.remove(idx);
        }
        let idx = self
            .entries
            .iter()
            .position(|e| cmp(&item, e) == Ordering::Less)
            .unwrap_or(self.entries.len());
        self.entries.insert(idx, item);
        idx
    }

    /// Replace the entry at `index` keeping its slot.
    ///
    /// If another entry already carries the new key, the slot is dropped
    /// instead so keys stay unique.
    pub fn replace_at(&mut self, index: usize, item: T) -> Option<T> {
        if index >= self.entries.len() {
            return None;
        }
        let duplicate = self
            .entries
            .iter()
            .enumerate()
            .any(|(i, e)| i != index && e.key() == item.key());
        if duplicate {
            return Some(self.entries.remove(index));
        }
        Some(std::mem::replace(&mut self.entries[index], item))
    }

    pub fn remove(&mut self, key: &T::Key) -> Option<T> {
        let idx = self.position(key)?;
        Some(self.entries.remove(idx))
    }
}
