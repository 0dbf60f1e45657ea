//! Plumbing shared by the live views of sets and maps.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::lists::broadcast::EventBroadcastHelper;
use crate::lists::event::{Event, EventType, EventValue, Reason, Source, ViewId};
use crate::lists::weak_map::ReclaimHandle;

/// Predicate selecting the elements of a filtered view.
pub type Filter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Total order for a comparator view.
pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// State of one registered view, owned by the view handle and reachable from
/// the parent only through a weak reference.
///
/// `state` is only ever locked while the parent's lock is held.
pub(crate) struct ViewCore<S, E> {
    pub(crate) id: ViewId,
    pub(crate) source: Source,
    pub(crate) state: Mutex<S>,
    pub(crate) events: EventBroadcastHelper<E>,
    destroyed: AtomicBool,
    _reclaim: ReclaimHandle<ViewId>,
}

impl<S, E> ViewCore<S, E> {
    pub(crate) fn new(
        id: ViewId,
        name: &Arc<str>,
        state: S,
        reclaim: ReclaimHandle<ViewId>,
    ) -> Self {
        Self {
            id,
            source: Source::view(name, id),
            state: Mutex::new(state),
            events: EventBroadcastHelper::new(),
            destroyed: AtomicBool::new(false),
            _reclaim: reclaim,
        }
    }

    pub(crate) fn mark_destroyed(&self) -> bool {
        !self.destroyed.swap(true, AtomicOrdering::AcqRel)
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(AtomicOrdering::Acquire)
    }

    pub(crate) fn empty_notice(&self, reason: Reason, now_empty: bool) -> Event<E> {
        Event::new(
            EventType::Empty,
            reason,
            self.source.clone(),
            EventValue::Flag(!now_empty),
            EventValue::Flag(now_empty),
        )
    }
}

impl<S, E> fmt::Debug for ViewCore<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewCore")
            .field("id", &self.id)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

struct SortKey<T> {
    value: T,
    seq: u64,
    order: Comparator<T>,
}

impl<T> PartialEq for SortKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for SortKey<T> {}

impl<T> PartialOrd for SortKey<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for SortKey<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.order)(&self.value, &other.value).then(self.seq.cmp(&other.seq))
    }
}

/// Ordered copy of a collection's elements.
///
/// Elements the comparator considers equal are kept in arrival order rather
/// than collapsed into one.
pub(crate) struct ComparatorState<T> {
    cmp: Comparator<T>,
    tree: BTreeSet<SortKey<T>>,
    seqs: HashMap<T, u64>,
    next_seq: u64,
}

impl<T: Clone + Eq + Hash> ComparatorState<T> {
    pub(crate) fn new<I>(cmp: Comparator<T>, initial: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let mut state = Self {
            cmp,
            tree: BTreeSet::new(),
            seqs: HashMap::new(),
            next_seq: 0,
        };
        for value in initial {
            state.insert(value);
        }
        state
    }

    pub(crate) fn len(&self) -> usize {
        self.tree.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub(crate) fn contains(&self, value: &T) -> bool {
        self.seqs.contains_key(value)
    }

    pub(crate) fn insert(&mut self, value: T) {
        self.remove(&value);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.seqs.insert(value.clone(), seq);
        self.tree.insert(SortKey {
            value,
            seq,
            order: Arc::clone(&self.cmp),
        });
    }

    pub(crate) fn remove(&mut self, value: &T) -> bool {
        let Some(seq) = self.seqs.remove(value) else {
            return false;
        };
        self.tree.remove(&SortKey {
            value: value.clone(),
            seq,
            order: Arc::clone(&self.cmp),
        })
    }

    pub(crate) fn first(&self) -> Option<&T> {
        self.tree.first().map(|key| &key.value)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.tree.iter().map(|key| &key.value)
    }

    pub(crate) fn clear(&mut self) {
        self.tree.clear();
        self.seqs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn by_len() -> Comparator<&'static str> {
        Arc::new(|a: &&'static str, b: &&'static str| a.len().cmp(&b.len()))
    }

    #[test]
    fn keeps_comparator_order_and_ties_in_arrival_order() {
        let mut state = ComparatorState::new(by_len(), ["ccc", "a", "bb", "dd"]);
        let order: Vec<_> = state.iter().copied().collect();
        assert_eq!(order, vec!["a", "bb", "dd", "ccc"]);
        assert_eq!(state.len(), 4);

        assert!(state.remove(&"bb"));
        assert!(!state.remove(&"bb"));
        assert_eq!(state.first(), Some(&"a"));
        state.insert("e");
        assert_eq!(state.first(), Some(&"a"));
        let order: Vec<_> = state.iter().copied().collect();
        assert_eq!(order, vec!["a", "e", "dd", "ccc"]);
    }

    #[test]
    fn reinsert_does_not_duplicate() {
        let mut state = ComparatorState::new(by_len(), ["x"]);
        state.insert("x");
        assert_eq!(state.len(), 1);
        assert!(state.contains(&"x"));
        state.clear();
        assert!(state.is_empty());
    }
}
