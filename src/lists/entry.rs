//! Arena-backed doubly linked list of entries.
//!
//! Entries live in a slot arena and are addressed by [`EntryId`], a slot index
//! plus a generation. Removing an entry bumps its slot generation, so every
//! handle to it goes stale at once and a later insert that reuses the slot can
//! never be mistaken for the removed entry.

use std::fmt;

/// Stable handle to an entry of one [`EntryList`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId {
    index: u32,
    generation: u32,
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId({}v{})", self.index, self.generation)
    }
}

/// One element in the list.
#[derive(Debug)]
pub struct Entry<T> {
    value: T,
    priority: usize,
    valid: bool,
    prev: Option<EntryId>,
    next: Option<EntryId>,
}

impl<T> Entry<T> {
    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn priority(&self) -> usize {
        self.priority
    }

    /// `false` once the entry has been unlinked.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn next(&self) -> Option<EntryId> {
        self.next
    }

    pub fn prev(&self) -> Option<EntryId> {
        self.prev
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

#[derive(Debug)]
enum Slot<T> {
    Occupied { generation: u32, entry: Entry<T> },
    Vacant { generation: u32, next_free: Option<u32> },
}

/// Doubly linked list whose nodes are stored in a slot arena.
///
/// The list owns every entry. `prev` links are navigation only; unlinking an
/// entry clears both of its links so a stale handle cannot walk back into the
/// live list.
#[derive(Debug)]
pub struct EntryList<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    head: Option<EntryId>,
    tail: Option<EntryId>,
    len: usize,
    // Generation given to newly pushed slots. Raised past every generation
    // handed out so far when the arena is released on `clear`.
    fresh_generation: u32,
}

impl<T> Default for EntryList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EntryList<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            head: None,
            tail: None,
            len: 0,
            fresh_generation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn head(&self) -> Option<EntryId> {
        self.head
    }

    pub fn tail(&self) -> Option<EntryId> {
        self.tail
    }

    pub fn get(&self, id: EntryId) -> Option<&Entry<T>> {
        match self.slots.get(id.index as usize)? {
            Slot::Occupied { generation, entry } if *generation == id.generation => Some(entry),
            _ => None,
        }
    }

    fn get_mut(&mut self, id: EntryId) -> Option<&mut Entry<T>> {
        match self.slots.get_mut(id.index as usize)? {
            Slot::Occupied { generation, entry } if *generation == id.generation => Some(entry),
            _ => None,
        }
    }

    /// `true` while `id` refers to a linked entry.
    pub fn contains(&self, id: EntryId) -> bool {
        self.get(id).is_some_and(Entry::is_valid)
    }

    pub fn value(&self, id: EntryId) -> Option<&T> {
        self.get(id).map(Entry::value)
    }

    pub fn priority(&self, id: EntryId) -> Option<usize> {
        self.get(id).map(Entry::priority)
    }

    pub fn next_of(&self, id: EntryId) -> Option<EntryId> {
        self.get(id).and_then(Entry::next)
    }

    pub fn prev_of(&self, id: EntryId) -> Option<EntryId> {
        self.get(id).and_then(Entry::prev)
    }

    fn allocate(&mut self, value: T, priority: usize) -> EntryId {
        let entry = Entry {
            value,
            priority,
            valid: true,
            prev: None,
            next: None,
        };
        match self.free_head {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                let (generation, next_free) = match slot {
                    Slot::Vacant { generation, next_free } => (*generation, *next_free),
                    Slot::Occupied { .. } => unreachable!("free list points at an occupied slot"),
                };
                self.free_head = next_free;
                *slot = Slot::Occupied { generation, entry };
                EntryId { index, generation }
            }
            None => {
                let index = self.slots.len() as u32;
                let generation = self.fresh_generation;
                self.slots.push(Slot::Occupied { generation, entry });
                EntryId { index, generation }
            }
        }
    }

    /// Appends a new entry at the tail.
    pub fn push_back(&mut self, value: T, priority: usize) -> EntryId {
        self.insert_before(None, value, priority)
    }

    /// Inserts a new entry in front of `before`, or at the tail when `before`
    /// is `None` or no longer linked.
    pub fn insert_before(&mut self, before: Option<EntryId>, value: T, priority: usize) -> EntryId {
        let id = self.allocate(value, priority);
        let before = before.filter(|b| self.contains(*b));

        match before {
            Some(before) => {
                let prev = self.prev_of(before);
                if let Some(node) = self.get_mut(id) {
                    node.prev = prev;
                    node.next = Some(before);
                }
                if let Some(node) = self.get_mut(before) {
                    node.prev = Some(id);
                }
                match prev {
                    Some(prev) => {
                        if let Some(node) = self.get_mut(prev) {
                            node.next = Some(id);
                        }
                    }
                    None => self.head = Some(id),
                }
            }
            None => {
                let tail = self.tail;
                if let Some(node) = self.get_mut(id) {
                    node.prev = tail;
                }
                match tail {
                    Some(tail) => {
                        if let Some(node) = self.get_mut(tail) {
                            node.next = Some(id);
                        }
                    }
                    None => self.head = Some(id),
                }
                self.tail = Some(id);
            }
        }

        self.len += 1;
        id
    }

    /// Unlinks and frees an entry, returning it marked invalid.
    pub fn remove(&mut self, id: EntryId) -> Option<Entry<T>> {
        let (prev, next) = {
            let node = self.get(id)?;
            (node.prev, node.next)
        };

        match prev {
            Some(prev) => {
                if let Some(node) = self.get_mut(prev) {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(next) => {
                if let Some(node) = self.get_mut(next) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        let index = id.index;
        let vacant = Slot::Vacant {
            generation: id.generation.wrapping_add(1),
            next_free: self.free_head,
        };
        let slot = std::mem::replace(&mut self.slots[index as usize], vacant);
        self.free_head = Some(index);
        self.len -= 1;

        match slot {
            Slot::Occupied { mut entry, .. } => {
                entry.valid = false;
                entry.prev = None;
                entry.next = None;
                Some(entry)
            }
            Slot::Vacant { .. } => None,
        }
    }

    /// Drops every entry and releases the arena. Outstanding handles go
    /// stale: slots pushed afterwards start above every generation in use.
    pub fn clear(&mut self) {
        let newest = self
            .slots
            .iter()
            .map(|slot| match slot {
                Slot::Occupied { generation, .. } | Slot::Vacant { generation, .. } => *generation,
            })
            .max();
        if let Some(newest) = newest {
            self.fresh_generation = self.fresh_generation.max(newest.wrapping_add(1));
        }
        self.slots = Vec::new();
        self.free_head = None;
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// Walks from `start` (inclusive) towards the tail.
    pub fn iter_from(&self, start: Option<EntryId>) -> EntryIter<'_, T> {
        EntryIter {
            list: self,
            next: start.filter(|id| self.contains(*id)),
        }
    }

    pub fn iter(&self) -> EntryIter<'_, T> {
        self.iter_from(self.head)
    }
}

/// Iterator over `(id, entry)` pairs in list order.
pub struct EntryIter<'a, T> {
    list: &'a EntryList<T>,
    next: Option<EntryId>,
}

impl<'a, T> Iterator for EntryIter<'a, T> {
    type Item = (EntryId, &'a Entry<T>);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let entry = self.list.get(id)?;
        self.next = entry.next;
        Some((id, entry))
    }
}
