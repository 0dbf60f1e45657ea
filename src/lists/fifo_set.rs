//! Insertion-ordered set with O(1) membership, removal and append.
//!
//! A [`FifoSet`] pairs an [`EntryList`] with a lookup map from element to
//! entry handle. Adding an element that is already present moves it to the
//! tail instead of storing it twice.

use std::collections::HashMap;
use std::hash::Hash;

use crate::lists::entry::{Entry, EntryId, EntryList};
use crate::lists::error::ListError;

#[derive(Debug)]
pub struct FifoSet<T> {
    list: EntryList<T>,
    lookup: HashMap<T, EntryId>,
}

impl<T> Default for FifoSet<T> {
    fn default() -> Self {
        Self {
            list: EntryList::new(),
            lookup: HashMap::new(),
        }
    }
}

impl<T: Clone + Eq + Hash> FifoSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    pub fn contains(&self, value: &T) -> bool {
        self.lookup.contains_key(value)
    }

    /// Appends `value` at the tail.
    ///
    /// Returns `false` when the element was already present; its old entry is
    /// discarded and it now sits at the tail.
    pub fn add(&mut self, value: T) -> bool {
        let fresh = self.remove(&value).is_none();
        self.link_before(None, value, 0);
        fresh
    }

    pub fn remove(&mut self, value: &T) -> Option<T> {
        let id = self.lookup.get(value).copied()?;
        self.unlink(id).map(Entry::into_value)
    }

    pub fn first(&self) -> Option<&T> {
        self.list.head().and_then(|id| self.list.value(id))
    }

    pub fn last(&self) -> Option<&T> {
        self.list.tail().and_then(|id| self.list.value(id))
    }

    pub fn pop_first(&mut self) -> Option<T> {
        let head = self.list.head()?;
        self.unlink(head).map(Entry::into_value)
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: &self.list,
            next: self.list.head(),
            end: None,
        }
    }

    pub fn clear(&mut self) {
        self.list.clear();
        self.lookup.clear();
    }

    /// Range view over `[from, to)`; a `None` bound is open on that side.
    ///
    /// The view is bound to the entries holding `from` and `to` right now.
    /// Its length is not cached: [`Range::len`] walks the range.
    pub fn range(&self, from: Option<&T>, to: Option<&T>) -> Result<Range, ListError> {
        let from = match from {
            Some(value) => Some(self.bound_of(value)?),
            None => None,
        };
        let to = match to {
            Some(value) => Some(self.bound_of(value)?),
            None => None,
        };

        if let (Some(start), Some(end)) = (from, to) {
            let reachable = self.list.iter_from(Some(start)).any(|(id, _)| id == end);
            if !reachable {
                return Err(ListError::invalid("range end precedes range start"));
            }
        }

        Ok(Range { from, to })
    }

    /// Everything strictly before `to`.
    pub fn head_range(&self, to: &T) -> Result<Range, ListError> {
        self.range(None, Some(to))
    }

    /// Everything from `from` to the tail.
    pub fn tail_range(&self, from: &T) -> Result<Range, ListError> {
        self.range(Some(from), None)
    }

    fn bound_of(&self, value: &T) -> Result<EntryId, ListError> {
        self.lookup
            .get(value)
            .copied()
            .ok_or_else(|| ListError::invalid("range bound is not in the set"))
    }

    // ─── crate-internal entry access ─────────────────────────

    pub(crate) fn entries(&self) -> &EntryList<T> {
        &self.list
    }

    pub(crate) fn entry_id(&self, value: &T) -> Option<EntryId> {
        self.lookup.get(value).copied()
    }

    /// Links a value that is not currently present in front of `before`
    /// (at the tail for `None`).
    pub(crate) fn link_before(
        &mut self,
        before: Option<EntryId>,
        value: T,
        priority: usize,
    ) -> EntryId {
        debug_assert!(!self.lookup.contains_key(&value));
        let id = self.list.insert_before(before, value.clone(), priority);
        self.lookup.insert(value, id);
        id
    }

    pub(crate) fn unlink(&mut self, id: EntryId) -> Option<Entry<T>> {
        let entry = self.list.remove(id)?;
        self.lookup.remove(entry.value());
        Some(entry)
    }
}

/// Iterator over the elements of a [`FifoSet`] or a [`Range`] of it.
pub struct Iter<'a, T> {
    list: &'a EntryList<T>,
    next: Option<EntryId>,
    end: Option<EntryId>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        if Some(id) == self.end {
            self.next = None;
            return None;
        }
        let entry = self.list.get(id)?;
        self.next = entry.next();
        Some(entry.value())
    }
}

/// Half-open view `[from, to)` over a [`FifoSet`].
///
/// A range holds entry handles only. If one of its delimiting entries has
/// since been removed the range no longer knows where it starts or stops and
/// behaves as empty; it never fails on a stale bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    from: Option<EntryId>,
    to: Option<EntryId>,
}

impl Range {
    /// `true` while both delimiting entries (if any) are still in the set.
    pub fn is_intact<T>(&self, set: &FifoSet<T>) -> bool {
        self.from.map_or(true, |id| set.list.contains(id))
            && self.to.map_or(true, |id| set.list.contains(id))
    }

    pub fn is_closed(&self) -> bool {
        self.to.is_some()
    }

    pub fn iter<'a, T>(&self, set: &'a FifoSet<T>) -> Iter<'a, T> {
        let next = if self.is_intact(set) {
            self.from.or(set.list.head())
        } else {
            None
        };
        Iter {
            list: &set.list,
            next,
            end: self.to,
        }
    }

    /// Walks the range; O(n).
    pub fn len<T>(&self, set: &FifoSet<T>) -> usize {
        self.iter(set).count()
    }

    pub fn is_empty<T>(&self, set: &FifoSet<T>) -> bool {
        self.iter(set).next().is_none()
    }

    pub fn first<'a, T>(&self, set: &'a FifoSet<T>) -> Option<&'a T> {
        self.iter(set).next()
    }

    pub fn contains<T: Clone + Eq + Hash>(&self, set: &FifoSet<T>, value: &T) -> bool {
        match set.entry_id(value) {
            Some(target) => self.ids(set).any(|id| id == target),
            None => false,
        }
    }

    /// Appends through the view. Only an open-ended range can accept new
    /// elements, since appending always lands at the tail.
    pub fn add<T: Clone + Eq + Hash>(
        &self,
        set: &mut FifoSet<T>,
        value: T,
    ) -> Result<bool, ListError> {
        if !self.is_intact(set) {
            return Err(ListError::invalid("range bound has been removed"));
        }
        if self.is_closed() {
            return Err(ListError::invalid("element would land past the range end"));
        }
        if self.from.is_some() && self.from == set.entry_id(&value) {
            return Err(ListError::invalid("cannot re-add the range start"));
        }
        Ok(set.add(value))
    }

    /// Removes `value` if it lies inside the range.
    pub fn remove<T: Clone + Eq + Hash>(&self, set: &mut FifoSet<T>, value: &T) -> Option<T> {
        if self.contains(set, value) {
            set.remove(value)
        } else {
            None
        }
    }

    fn ids<'a, T>(&self, set: &'a FifoSet<T>) -> impl Iterator<Item = EntryId> + 'a {
        let start = if self.is_intact(set) {
            self.from.or(set.list.head())
        } else {
            None
        };
        let end = self.to;
        set.list
            .iter_from(start)
            .map(|(id, _)| id)
            .take_while(move |id| Some(*id) != end)
    }
}
