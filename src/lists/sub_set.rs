//! Live views over a [`NflPriorityFifoSet`].
//!
//! A [`FilterSet`] copies nothing: it keeps a count and a cursor into the
//! parent's list and walks the parent when asked for elements. A
//! [`ComparatorSet`] keeps its own ordered copy. Both are updated by the
//! parent, under the parent's lock, on every structural change, and both are
//! registered with the parent only weakly: dropping the last handle to a view
//! stops its maintenance.

use std::sync::Arc;

use tracing::trace;

use crate::lists::broadcast::{EventListener, ListenerId, UserData};
use crate::lists::capability::Element;
use crate::lists::entry::{EntryId, EntryList};
use crate::lists::error::ListError;
use crate::lists::event::{EventType, EventValue, Reason, ViewId};
use crate::lists::nfl_set::NflPriorityFifoSet;
use crate::lists::view::{ComparatorState, Filter, ViewCore};

pub(crate) type SetView<T> = ViewCore<SetViewState<T>, T>;

/// Where a new entry landed relative to the rest of its level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    /// Appended after every existing entry of its level.
    LevelTail,
    /// Spliced somewhere else (front of a level, ordered re-insertion).
    Spliced,
}

/// Count plus a cursor into the parent list.
///
/// Invariant: no matching entry precedes `cursor`. `None` means "start from
/// the head", which is always safe.
pub(crate) struct FilterState<T> {
    filter: Filter<T>,
    count: usize,
    cursor: Option<EntryId>,
}

impl<T> FilterState<T> {
    pub(crate) fn new(filter: Filter<T>, entries: &EntryList<T>) -> Self {
        let count = entries.iter().filter(|(_, e)| filter(e.value())).count();
        Self {
            filter,
            count,
            cursor: None,
        }
    }

    pub(crate) fn matches(&self, value: &T) -> bool {
        (self.filter)(value)
    }

    fn on_add(&mut self, entries: &EntryList<T>, id: EntryId, value: &T, placement: Placement) {
        if !self.matches(value) {
            return;
        }
        self.count += 1;
        let Some(cursor) = self.cursor else {
            return;
        };
        match placement {
            Placement::LevelTail => {
                if let (Some(added), Some(current)) =
                    (entries.priority(id), entries.priority(cursor))
                {
                    if added < current {
                        self.cursor = Some(id);
                    }
                }
            }
            Placement::Spliced => self.cursor = None,
        }
    }

    fn on_remove(&mut self, id: EntryId, next: Option<EntryId>, value: &T) {
        if self.matches(value) {
            self.count = self.count.saturating_sub(1);
        }
        if self.cursor == Some(id) {
            self.cursor = next;
        }
    }

    fn on_clear(&mut self) {
        self.count = 0;
        self.cursor = None;
    }

    /// First matching entry, advancing the cursor past non-matching ones.
    /// A cursor whose entry is gone falls back to the head.
    pub(crate) fn first_match(&mut self, entries: &EntryList<T>) -> Option<EntryId> {
        if self.count == 0 {
            return None;
        }
        let start = self
            .cursor
            .filter(|id| entries.contains(*id))
            .or(entries.head());
        let found = entries
            .iter_from(start)
            .find(|(_, entry)| entry.is_valid() && (self.filter)(entry.value()))
            .map(|(id, _)| id);
        self.cursor = found;
        found
    }

    pub(crate) fn collect(&mut self, entries: &EntryList<T>) -> Vec<T>
    where
        T: Clone,
    {
        let Some(start) = self.first_match(entries) else {
            return Vec::new();
        };
        entries
            .iter_from(Some(start))
            .filter(|(_, entry)| (self.filter)(entry.value()))
            .map(|(_, entry)| entry.value().clone())
            .collect()
    }
}

pub(crate) enum SetViewState<T> {
    Filter(FilterState<T>),
    Sorted(ComparatorState<T>),
}

impl<T: Element> SetViewState<T> {
    pub(crate) fn on_add(
        &mut self,
        entries: &EntryList<T>,
        id: EntryId,
        value: &T,
        placement: Placement,
    ) {
        match self {
            SetViewState::Filter(state) => state.on_add(entries, id, value, placement),
            SetViewState::Sorted(state) => state.insert(value.clone()),
        }
    }

    pub(crate) fn on_remove(&mut self, id: EntryId, next: Option<EntryId>, value: &T) {
        match self {
            SetViewState::Filter(state) => state.on_remove(id, next, value),
            SetViewState::Sorted(state) => {
                state.remove(value);
            }
        }
    }

    pub(crate) fn on_clear(&mut self) {
        match self {
            SetViewState::Filter(state) => state.on_clear(),
            SetViewState::Sorted(state) => state.clear(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            SetViewState::Filter(state) => state.count,
            SetViewState::Sorted(state) => state.len(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Elements of the parent that pass a filter, in the parent's order.
pub struct FilterSet<T: Element> {
    parent: NflPriorityFifoSet<T>,
    core: Arc<SetView<T>>,
}

impl<T: Element> Clone for FilterSet<T> {
    fn clone(&self) -> Self {
        Self {
            parent: self.parent.clone(),
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Element> std::fmt::Debug for FilterSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterSet")
            .field("parent", &self.parent.name())
            .field("id", &self.core.id)
            .finish()
    }
}

impl<T: Element> FilterSet<T> {
    pub(crate) fn new(parent: NflPriorityFifoSet<T>, core: Arc<SetView<T>>) -> Self {
        Self { parent, core }
    }

    pub fn id(&self) -> ViewId {
        self.core.id
    }

    pub fn parent(&self) -> &NflPriorityFifoSet<T> {
        &self.parent
    }

    pub fn is_destroyed(&self) -> bool {
        self.core.is_destroyed()
    }

    fn with_state<R>(
        &self,
        empty: R,
        f: impl FnOnce(&mut FilterState<T>, &EntryList<T>) -> R,
    ) -> R {
        if self.core.is_destroyed() {
            return empty;
        }
        let inner = self.parent.shared.inner.lock();
        let mut state = self.core.state.lock();
        match &mut *state {
            SetViewState::Filter(filter) => f(filter, inner.set.entries()),
            SetViewState::Sorted(_) => empty,
        }
    }

    pub fn len(&self) -> usize {
        self.with_state(0, |state, _| state.count)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn matches(&self, element: &T) -> bool {
        self.with_state(false, |state, _| state.matches(element))
    }

    pub fn contains(&self, element: &T) -> bool {
        self.matches(element) && self.parent.contains(element)
    }

    /// Snapshot of the matching elements in parent order.
    pub fn to_vec(&self) -> Vec<T> {
        self.with_state(Vec::new(), |state, entries| state.collect(entries))
    }

    pub fn iter(&self) -> std::vec::IntoIter<T> {
        self.to_vec().into_iter()
    }

    pub fn peek_next(&self) -> Option<T> {
        self.with_state(None, |state, entries| {
            state
                .first_match(entries)
                .and_then(|id| entries.value(id).cloned())
        })
    }

    /// Removes and returns the first matching element of the parent.
    pub fn remove_next(&self, reason: Reason) -> Result<T, ListError> {
        if self.core.is_destroyed() {
            return Err(ListError::invalid("view has been destroyed"));
        }
        self.parent.announce(reason, None, None);
        self.parent.mutate(reason, |inner, views, changes| {
            let id = match &mut *self.core.state.lock() {
                SetViewState::Filter(state) => state.first_match(inner.set.entries()),
                SetViewState::Sorted(_) => None,
            }
            .ok_or(ListError::NoSuchElement)?;
            let value = inner.unlink_entry(views, id).ok_or(ListError::NoSuchElement)?;
            changes.push((EventValue::Element(value.clone()), EventValue::None));
            Ok(value)
        })
    }

    /// Adds through the view. The element must pass the filter.
    pub fn add(&self, priority: usize, element: T, reason: Reason) -> Result<(), ListError> {
        if self.core.is_destroyed() {
            return Err(ListError::invalid("view has been destroyed"));
        }
        if !self.matches(&element) {
            return Err(ListError::invalid("element rejected by the view filter"));
        }
        self.parent.add(priority, element, reason)
    }

    pub fn add_default(&self, element: T, reason: Reason) -> Result<(), ListError> {
        self.add(self.parent.default_priority(), element, reason)
    }

    /// Removes `element` from the parent if it belongs to this view.
    pub fn remove(&self, element: &T, reason: Reason) -> bool {
        self.matches(element) && self.parent.remove(element, reason)
    }

    pub fn add_event_listener(
        &self,
        listener: Arc<dyn EventListener<T>>,
        event_type: EventType,
        reason: Option<Reason>,
        user_data: Option<UserData>,
    ) -> ListenerId {
        self.core.events.add_listener(listener, event_type, reason, user_data)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> Option<Arc<dyn EventListener<T>>> {
        self.core.events.remove_listener(id)
    }

    /// Unregisters the view now instead of when its last handle drops.
    pub fn destroy(&self) {
        self.parent.unregister_view(&self.core);
    }
}

/// The parent's elements ordered by a comparator.
pub struct ComparatorSet<T: Element> {
    parent: NflPriorityFifoSet<T>,
    core: Arc<SetView<T>>,
}

impl<T: Element> Clone for ComparatorSet<T> {
    fn clone(&self) -> Self {
        Self {
            parent: self.parent.clone(),
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Element> std::fmt::Debug for ComparatorSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComparatorSet")
            .field("parent", &self.parent.name())
            .field("id", &self.core.id)
            .finish()
    }
}

impl<T: Element> ComparatorSet<T> {
    pub(crate) fn new(parent: NflPriorityFifoSet<T>, core: Arc<SetView<T>>) -> Self {
        Self { parent, core }
    }

    pub fn id(&self) -> ViewId {
        self.core.id
    }

    pub fn parent(&self) -> &NflPriorityFifoSet<T> {
        &self.parent
    }

    pub fn is_destroyed(&self) -> bool {
        self.core.is_destroyed()
    }

    fn with_state<R>(&self, empty: R, f: impl FnOnce(&ComparatorState<T>) -> R) -> R {
        if self.core.is_destroyed() {
            return empty;
        }
        let _inner = self.parent.shared.inner.lock();
        let state = self.core.state.lock();
        match &*state {
            SetViewState::Sorted(sorted) => f(sorted),
            SetViewState::Filter(_) => empty,
        }
    }

    pub fn len(&self) -> usize {
        self.with_state(0, |state| state.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, element: &T) -> bool {
        self.with_state(false, |state| state.contains(element))
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.with_state(Vec::new(), |state| state.iter().cloned().collect())
    }

    pub fn iter(&self) -> std::vec::IntoIter<T> {
        self.to_vec().into_iter()
    }

    pub fn first(&self) -> Option<T> {
        self.with_state(None, |state| state.first().cloned())
    }

    /// Removes the comparator-first element from the parent.
    pub fn remove_next(&self, reason: Reason) -> Result<T, ListError> {
        if self.core.is_destroyed() {
            return Err(ListError::invalid("view has been destroyed"));
        }
        self.parent.announce(reason, None, None);
        self.parent.mutate(reason, |inner, views, changes| {
            let first = match &*self.core.state.lock() {
                SetViewState::Sorted(state) => state.first().cloned(),
                SetViewState::Filter(_) => None,
            }
            .ok_or(ListError::NoSuchElement)?;
            let value = inner
                .remove_value(views, &first)
                .ok_or(ListError::NoSuchElement)?;
            changes.push((EventValue::Element(value.clone()), EventValue::None));
            Ok(value)
        })
    }

    pub fn add(&self, priority: usize, element: T, reason: Reason) -> Result<(), ListError> {
        if self.core.is_destroyed() {
            return Err(ListError::invalid("view has been destroyed"));
        }
        self.parent.add(priority, element, reason)
    }

    pub fn add_default(&self, element: T, reason: Reason) -> Result<(), ListError> {
        self.add(self.parent.default_priority(), element, reason)
    }

    pub fn remove(&self, element: &T, reason: Reason) -> bool {
        !self.core.is_destroyed() && self.parent.remove(element, reason)
    }

    pub fn add_event_listener(
        &self,
        listener: Arc<dyn EventListener<T>>,
        event_type: EventType,
        reason: Option<Reason>,
        user_data: Option<UserData>,
    ) -> ListenerId {
        self.core.events.add_listener(listener, event_type, reason, user_data)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> Option<Arc<dyn EventListener<T>>> {
        self.core.events.remove_listener(id)
    }

    pub fn destroy(&self) {
        self.parent.unregister_view(&self.core);
    }
}

pub(crate) fn log_registered(collection: &str, id: ViewId, kind: &'static str) {
    trace!(collection = %collection, view = %id, kind, "view registered");
}
