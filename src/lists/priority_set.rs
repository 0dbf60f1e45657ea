//! FIFO set with discrete priority levels.
//!
//! All elements share one linked list ordered by level (0 first) and, within a
//! level, by arrival. A per-level head pointer makes insertion O(1) apart from
//! a bounded scan over the levels themselves to find the next non-empty one.

use std::hash::Hash;

use crate::lists::capability::Element;
use crate::lists::entry::{EntryId, EntryList};
use crate::lists::error::ListError;
use crate::lists::fifo_set::{FifoSet, Iter, Range};

/// Number of levels a destination queue uses unless configured otherwise.
pub const DEFAULT_LEVELS: usize = 11;

#[derive(Debug)]
pub struct PriorityFifoSet<T> {
    set: FifoSet<T>,
    level_heads: Vec<Option<EntryId>>,
    default_priority: usize,
}

impl<T: Clone + Eq + Hash> PriorityFifoSet<T> {
    /// A set with `levels` priorities; the default priority is `levels / 2`.
    ///
    /// A zero level count is raised to one.
    pub fn new(levels: usize) -> Self {
        let levels = levels.max(1);
        Self {
            set: FifoSet::new(),
            level_heads: vec![None; levels],
            default_priority: levels / 2,
        }
    }

    pub fn levels(&self) -> usize {
        self.level_heads.len()
    }

    pub fn default_priority(&self) -> usize {
        self.default_priority
    }

    pub fn set_default_priority(&mut self, priority: usize) -> Result<(), ListError> {
        self.check_priority(priority)?;
        self.default_priority = priority;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn contains(&self, value: &T) -> bool {
        self.set.contains(value)
    }

    pub fn priority_of(&self, value: &T) -> Option<usize> {
        let id = self.set.entry_id(value)?;
        self.set.entries().priority(id)
    }

    pub fn first(&self) -> Option<&T> {
        self.set.first()
    }

    pub fn last(&self) -> Option<&T> {
        self.set.last()
    }

    pub fn iter(&self) -> Iter<'_, T> {
        self.set.iter()
    }

    /// Read access to the underlying ordered set, e.g. to walk a [`Range`].
    pub fn as_fifo(&self) -> &FifoSet<T> {
        &self.set
    }

    pub fn range(&self, from: Option<&T>, to: Option<&T>) -> Result<Range, ListError> {
        self.set.range(from, to)
    }

    pub fn check_priority(&self, priority: usize) -> Result<(), ListError> {
        if priority >= self.levels() {
            return Err(ListError::PriorityExceeded {
                priority,
                levels: self.levels(),
            });
        }
        Ok(())
    }

    /// Adds at the default priority.
    pub fn add(&mut self, value: T) -> bool {
        self.insert_at(self.default_priority, value).1
    }

    /// Adds at the tail of `priority`, replacing any existing entry for the
    /// same element. Returns `true` if the element was not present before.
    pub fn add_at(&mut self, priority: usize, value: T) -> Result<bool, ListError> {
        self.check_priority(priority)?;
        Ok(self.insert_at(priority, value).1)
    }

    pub fn remove(&mut self, value: &T) -> Option<T> {
        let id = self.set.entry_id(value)?;
        self.unlink(id)
    }

    pub fn pop_first(&mut self) -> Option<T> {
        let head = self.set.entries().head()?;
        self.unlink(head)
    }

    pub fn clear(&mut self) {
        self.set.clear();
        self.level_heads.iter_mut().for_each(|head| *head = None);
    }

    /// Inserts `values` at the front of `priority`, in the order given.
    pub fn add_all_to_front<I>(&mut self, values: I, priority: usize) -> Result<(), ListError>
    where
        I: IntoIterator<Item = T>,
    {
        self.check_priority(priority)?;
        let values: Vec<T> = values.into_iter().collect();
        self.front_insert(values, priority);
        Ok(())
    }

    // ─── crate-internal ──────────────────────────────────────

    pub(crate) fn entries(&self) -> &EntryList<T> {
        self.set.entries()
    }

    pub(crate) fn entry_id(&self, value: &T) -> Option<EntryId> {
        self.set.entry_id(value)
    }

    /// Head of the first non-empty level strictly after `priority`.
    fn successor_head(&self, priority: usize) -> Option<EntryId> {
        self.level_heads[priority + 1..].iter().find_map(|head| *head)
    }

    /// Appends at the tail of a validated level.
    ///
    /// Returns the new entry and whether the element was absent before.
    pub(crate) fn insert_at(&mut self, priority: usize, value: T) -> (EntryId, bool) {
        let fresh = self.remove(&value).is_none();
        let before = self.successor_head(priority);
        let id = self.set.link_before(before, value, priority);
        if self.level_heads[priority].is_none() {
            self.level_heads[priority] = Some(id);
        }
        (id, fresh)
    }

    /// Links a value that is not present directly in front of `before`, which
    /// must be the level's head, a later entry of the same level, or the
    /// first entry of a later level.
    pub(crate) fn insert_before(
        &mut self,
        before: Option<EntryId>,
        priority: usize,
        value: T,
    ) -> EntryId {
        let head = self.level_heads[priority];
        let id = self.set.link_before(before, value, priority);
        if head.is_none() || head == before {
            self.level_heads[priority] = Some(id);
        }
        id
    }

    /// Inserts at the front of a validated level. Returns the ids in order.
    pub(crate) fn front_insert(&mut self, values: Vec<T>, priority: usize) -> Vec<EntryId> {
        // Pull out existing copies first so the anchor cannot be one of them.
        for value in &values {
            self.remove(value);
        }
        let anchor = self.level_heads[priority].or_else(|| self.successor_head(priority));
        let mut ids = Vec::with_capacity(values.len());
        for value in values {
            if self.set.contains(&value) {
                // Repeated within the batch: the later copy wins.
                self.remove(&value);
            }
            ids.push(self.insert_before(anchor, priority, value));
        }
        ids.retain(|id| self.set.entries().contains(*id));
        ids
    }

    pub(crate) fn unlink(&mut self, id: EntryId) -> Option<T> {
        let (priority, next) = {
            let entry = self.set.entries().get(id)?;
            (entry.priority(), entry.next())
        };
        if self.level_heads[priority] == Some(id) {
            let next_same = next.filter(|n| self.set.entries().priority(*n) == Some(priority));
            self.level_heads[priority] = next_same;
        }
        self.set.unlink(id).map(|entry| entry.into_value())
    }
}

impl<T: Element> PriorityFifoSet<T> {
    /// Re-inserts `values` at the positions their order tags describe.
    ///
    /// Each tagged element goes to its tag's priority, after every entry of
    /// that level with a smaller tag and before the first one with a larger
    /// tag (untagged entries count as newer than any tag). Untagged values are
    /// appended at the default priority. No element is inserted if any tag
    /// names a priority outside the configured levels.
    pub fn add_all_ordered<I>(&mut self, values: I) -> Result<(), ListError>
    where
        I: IntoIterator<Item = T>,
    {
        let values: Vec<T> = values.into_iter().collect();
        self.ordered_insert(values)?;
        Ok(())
    }

    pub(crate) fn ordered_insert(&mut self, values: Vec<T>) -> Result<Vec<EntryId>, ListError> {
        for value in &values {
            if let Some(tag) = value.current_tag() {
                self.check_priority(tag.priority)?;
            }
        }

        let mut ids = Vec::with_capacity(values.len());
        for value in values {
            self.remove(&value);
            let id = match value.current_tag() {
                Some(tag) => {
                    let before = self.ordered_position(tag.priority, |existing| {
                        existing.current_tag().map_or(true, |other| other > tag)
                    });
                    self.insert_before(before, tag.priority, value)
                }
                None => self.insert_at(self.default_priority, value).0,
            };
            ids.push(id);
        }
        Ok(ids)
    }

    /// First entry of `priority` for which `goes_after` holds, or the head of
    /// the next non-empty level.
    fn ordered_position<F>(&self, priority: usize, goes_after: F) -> Option<EntryId>
    where
        F: Fn(&T) -> bool,
    {
        let Some(start) = self.level_heads[priority] else {
            return self.successor_head(priority);
        };
        for (id, entry) in self.set.entries().iter_from(Some(start)) {
            if entry.priority() != priority || goes_after(entry.value()) {
                return Some(id);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lists::capability::{OrderTag, Ordered};
    use std::sync::Mutex;

    fn order(set: &PriorityFifoSet<&'static str>) -> Vec<&'static str> {
        set.iter().copied().collect()
    }

    #[test]
    fn fifo_within_priority() {
        let mut set = PriorityFifoSet::new(4);
        set.add_at(2, "c1").unwrap();
        set.add_at(0, "a1").unwrap();
        set.add_at(3, "d1").unwrap();
        set.add_at(2, "c2").unwrap();
        set.add_at(0, "a2").unwrap();
        set.add_at(1, "b1").unwrap();
        assert_eq!(order(&set), vec!["a1", "a2", "b1", "c1", "c2", "d1"]);
    }

    #[test]
    fn priority_out_of_range_is_rejected() {
        let mut set = PriorityFifoSet::new(3);
        let err = set.add_at(3, "x").unwrap_err();
        assert_eq!(err, ListError::PriorityExceeded { priority: 3, levels: 3 });
        assert!(set.is_empty());
    }

    #[test]
    fn re_add_moves_between_levels() {
        let mut set = PriorityFifoSet::new(3);
        set.add_at(1, "a").unwrap();
        set.add_at(1, "b").unwrap();
        assert_eq!(set.add_at(0, "b"), Ok(false));
        assert_eq!(order(&set), vec!["b", "a"]);
        assert_eq!(set.priority_of(&"b"), Some(0));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn removing_level_head_advances_it() {
        let mut set = PriorityFifoSet::new(3);
        set.add_at(1, "a").unwrap();
        set.add_at(1, "b").unwrap();
        set.add_at(2, "c").unwrap();
        set.remove(&"a");
        set.add_at(1, "d").unwrap();
        assert_eq!(order(&set), vec!["b", "d", "c"]);
        set.remove(&"b");
        set.remove(&"d");
        set.add_at(1, "e").unwrap();
        assert_eq!(order(&set), vec!["e", "c"]);
    }

    #[test]
    fn pop_first_takes_highest_priority() {
        let mut set = PriorityFifoSet::new(3);
        set.add_at(2, "low").unwrap();
        set.add_at(0, "high").unwrap();
        assert_eq!(set.pop_first(), Some("high"));
        assert_eq!(set.pop_first(), Some("low"));
        assert_eq!(set.pop_first(), None);
    }

    #[test]
    fn add_all_to_front_preserves_batch_order() {
        let mut set = PriorityFifoSet::new(3);
        set.add_at(0, "a").unwrap();
        set.add_at(1, "x").unwrap();
        set.add_at(2, "z").unwrap();
        set.add_all_to_front(vec!["p", "q", "x"], 1).unwrap();
        assert_eq!(order(&set), vec!["a", "p", "q", "x", "z"]);

        set.add_all_to_front(vec!["m"], 2).unwrap();
        assert_eq!(order(&set), vec!["a", "p", "q", "x", "m", "z"]);
        set.pop_first();
        set.add_at(1, "tail1").unwrap();
        assert_eq!(order(&set), vec!["p", "q", "x", "tail1", "m", "z"]);
    }

    #[test]
    fn add_all_to_front_on_empty_level() {
        let mut set = PriorityFifoSet::new(3);
        set.add_at(2, "z").unwrap();
        set.add_all_to_front(vec!["a", "b"], 1).unwrap();
        assert_eq!(order(&set), vec!["a", "b", "z"]);
        assert_eq!(set.priority_of(&"a"), Some(1));
    }

    #[derive(Debug)]
    struct Tagged {
        id: u32,
        tag: Mutex<Option<OrderTag>>,
    }

    #[derive(Debug, Clone)]
    struct Item(std::sync::Arc<Tagged>);

    impl Item {
        fn new(id: u32, tag: Option<(usize, u64)>) -> Self {
            Item(std::sync::Arc::new(Tagged {
                id,
                tag: Mutex::new(tag.map(|(p, s)| OrderTag::new(p, s))),
            }))
        }
    }

    impl PartialEq for Item {
        fn eq(&self, other: &Self) -> bool {
            self.0.id == other.0.id
        }
    }
    impl Eq for Item {}
    impl std::hash::Hash for Item {
        fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
            self.0.id.hash(state);
        }
    }

    impl Ordered for Item {
        fn order_tag(&self) -> Option<OrderTag> {
            *self.0.tag.lock().unwrap()
        }
        fn set_order_tag(&self, tag: OrderTag) {
            *self.0.tag.lock().unwrap() = Some(tag);
        }
    }

    impl Element for Item {
        fn as_ordered(&self) -> Option<&dyn Ordered> {
            Some(self)
        }
    }

    fn ids(set: &PriorityFifoSet<Item>) -> Vec<u32> {
        set.iter().map(|item| item.0.id).collect()
    }

    #[test]
    fn add_all_ordered_splices_front_middle_and_end() {
        let mut set = PriorityFifoSet::new(3);
        set.add_at(1, Item::new(2, Some((1, 20)))).unwrap();
        set.add_at(1, Item::new(4, Some((1, 40)))).unwrap();
        set.add_at(2, Item::new(9, Some((2, 5)))).unwrap();

        set.add_all_ordered(vec![
            Item::new(5, Some((1, 50))),
            Item::new(1, Some((1, 10))),
            Item::new(3, Some((1, 30))),
            Item::new(0, Some((0, 99))),
        ])
        .unwrap();

        assert_eq!(ids(&set), vec![0, 1, 2, 3, 4, 5, 9]);
        assert_eq!(set.priority_of(&Item::new(1, None)), Some(1));
    }

    #[test]
    fn add_all_ordered_untagged_goes_to_default_tail() {
        let mut set = PriorityFifoSet::new(3);
        set.add_at(1, Item::new(1, Some((1, 1)))).unwrap();
        set.add_all_ordered(vec![Item::new(7, None)]).unwrap();
        assert_eq!(ids(&set), vec![1, 7]);
        assert_eq!(set.priority_of(&Item::new(7, None)), Some(1));
    }

    #[test]
    fn add_all_ordered_checks_every_tag_first() {
        let mut set = PriorityFifoSet::new(2);
        let err = set
            .add_all_ordered(vec![Item::new(1, Some((0, 1))), Item::new(2, Some((5, 1)))])
            .unwrap_err();
        assert!(matches!(err, ListError::PriorityExceeded { priority: 5, .. }));
        assert!(set.is_empty());
    }
}
