//! Limitable, notifying priority FIFO set.
//!
//! One mutex covers membership, byte accounting, statistics, limit checks and
//! the fan-out into live views, so a reader never sees a half-applied change.
//! Events are built while that lock is held and delivered after it is
//! released; a delivery may therefore interleave with the next mutation.
//!
//! Listener panics are not caught. A panicking listener unwinds out of the
//! mutating call after the change has been committed and skips every event
//! still queued for that call.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::config::ListsConfig;
use crate::lists::broadcast::{EventBroadcastHelper, EventListener, ListenerId, UserData};
use crate::lists::capability::{Element, OrderTag};
use crate::lists::entry::EntryId;
use crate::lists::error::ListError;
use crate::lists::event::{Event, EventType, EventValue, Reason, Source, ViewId};
use crate::lists::limits::{Limit, Limits};
use crate::lists::notice::{Notices, Occupancy};
use crate::lists::priority_set::{PriorityFifoSet, DEFAULT_LEVELS};
use crate::lists::stats::Statistics;
use crate::lists::sub_set::{
    log_registered, ComparatorSet, FilterSet, FilterState, Placement, SetView, SetViewState,
};
use crate::lists::view::{Comparator, ComparatorState, Filter, ViewCore};
use crate::lists::weak_map::WeakValueHashMap;

pub(crate) type Change<T> = (EventValue<T>, EventValue<T>);

/// Point-in-time description of a set, for logs and admin output.
#[derive(Debug, Clone, Serialize)]
pub struct SetSnapshot {
    pub name: String,
    pub levels: usize,
    pub default_priority: usize,
    pub size: usize,
    pub bytes: u64,
    pub full: bool,
    pub limits: Limits,
    pub statistics: Statistics,
    pub views: usize,
    pub listeners: usize,
}

pub(crate) struct SetInner<T: Element> {
    pub(crate) set: PriorityFifoSet<T>,
    limits: Limits,
    stats: Statistics,
    total_bytes: u64,
    next_sequence: u64,
    views: WeakValueHashMap<ViewId, SetView<T>>,
}

impl<T: Element> SetInner<T> {
    fn occupancy(&self) -> Occupancy {
        let count = self.set.len();
        Occupancy {
            count,
            bytes: self.total_bytes,
            full: self.limits.is_full(count, self.total_bytes),
        }
    }

    fn stored_bytes(&self, value: &T) -> Option<u64> {
        let id = self.set.entry_id(value)?;
        let stored = self.set.entries().value(id)?;
        Some(stored.reported_bytes().unwrap_or(0))
    }

    /// Validates a batch of insertions against priorities, size capability
    /// and limits, as if all of them were applied. Later copies of the same
    /// element within the batch replace earlier ones.
    fn plan<'a, I>(&self, items: I) -> Result<(), ListError>
    where
        I: IntoIterator<Item = (usize, &'a T)>,
    {
        let mut sizes: HashMap<&T, u64> = HashMap::new();
        let mut largest = 0;
        for (priority, value) in items {
            self.set.check_priority(priority)?;
            let bytes = self.limits.element_bytes(value)?;
            largest = largest.max(bytes);
            sizes.insert(value, bytes);
        }

        let mut count = self.set.len();
        let mut bytes = self.total_bytes;
        for (value, size) in sizes {
            match self.stored_bytes(value) {
                Some(old) => bytes = bytes.saturating_sub(old) + size,
                None => {
                    count += 1;
                    bytes += size;
                }
            }
        }
        self.limits.check(count, bytes, largest)
    }

    /// Gives an untagged orderable element its arrival tag.
    fn stamp(&mut self, priority: usize, value: &T) {
        if let Some(ordered) = value.as_ordered() {
            if ordered.order_tag().is_none() {
                ordered.set_order_tag(OrderTag::new(priority, self.next_sequence));
                self.next_sequence += 1;
            }
        }
    }

    /// Accounts for a freshly linked entry and tells every view about it.
    fn linked(&mut self, views: &[Arc<SetView<T>>], id: EntryId, placement: Placement) {
        let entries = self.set.entries();
        let Some(value) = entries.value(id) else {
            return;
        };
        let bytes = value.reported_bytes().unwrap_or(0);
        for view in views {
            view.state.lock().on_add(entries, id, value, placement);
        }
        self.total_bytes += bytes;
        self.stats.record_element(bytes);
    }

    fn link_at(&mut self, views: &[Arc<SetView<T>>], priority: usize, value: T) {
        self.stamp(priority, &value);
        let (id, _) = self.set.insert_at(priority, value);
        self.linked(views, id, Placement::LevelTail);
    }

    pub(crate) fn unlink_entry(&mut self, views: &[Arc<SetView<T>>], id: EntryId) -> Option<T> {
        let entries = self.set.entries();
        let next = entries.next_of(id);
        let value = entries.value(id)?;
        for view in views {
            view.state.lock().on_remove(id, next, value);
        }
        let value = self.set.unlink(id)?;
        self.total_bytes = self
            .total_bytes
            .saturating_sub(value.reported_bytes().unwrap_or(0));
        Some(value)
    }

    pub(crate) fn remove_value(&mut self, views: &[Arc<SetView<T>>], value: &T) -> Option<T> {
        let id = self.set.entry_id(value)?;
        self.unlink_entry(views, id)
    }

    /// Removes existing copies of a batch before it is spliced back in.
    fn detach_all(
        &mut self,
        views: &[Arc<SetView<T>>],
        values: &[T],
        changes: &mut Vec<Change<T>>,
    ) {
        let mut replaced: HashMap<T, T> = HashMap::new();
        for value in values {
            if let Some(old) = self.remove_value(views, value) {
                replaced.insert(value.clone(), old);
            }
        }
        for value in values {
            let old = replaced.remove(value).map_or(EventValue::None, EventValue::Element);
            changes.push((old, EventValue::Element(value.clone())));
        }
    }
}

pub(crate) struct SetShared<T: Element> {
    name: Arc<str>,
    pub(crate) inner: Mutex<SetInner<T>>,
    events: EventBroadcastHelper<T>,
}

/// Priority FIFO set with count/byte limits, statistics, listeners and live
/// views. Cloning yields another handle to the same set.
pub struct NflPriorityFifoSet<T: Element> {
    pub(crate) shared: Arc<SetShared<T>>,
}

impl<T: Element> Clone for NflPriorityFifoSet<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Element> std::fmt::Debug for NflPriorityFifoSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("NflPriorityFifoSet")
            .field("name", &self.shared.name)
            .field("size", &inner.set.len())
            .field("bytes", &inner.total_bytes)
            .field("limits", &inner.limits)
            .finish()
    }
}

impl<T: Element> NflPriorityFifoSet<T> {
    pub fn new(name: impl Into<Arc<str>>, levels: usize) -> Self {
        Self::with_limits(name, levels, Limits::default())
    }

    pub fn with_default_levels(name: impl Into<Arc<str>>) -> Self {
        Self::new(name, DEFAULT_LEVELS)
    }

    fn with_limits(name: impl Into<Arc<str>>, levels: usize, limits: Limits) -> Self {
        Self {
            shared: Arc::new(SetShared {
                name: name.into(),
                inner: Mutex::new(SetInner {
                    set: PriorityFifoSet::new(levels),
                    limits,
                    stats: Statistics::default(),
                    total_bytes: 0,
                    next_sequence: 0,
                    views: WeakValueHashMap::new(),
                }),
                events: EventBroadcastHelper::new(),
            }),
        }
    }

    /// Builds a set from configuration. Fails if the configured default
    /// priority is not one of the configured levels.
    pub fn from_config(name: impl Into<Arc<str>>, config: &ListsConfig) -> Result<Self, ListError> {
        let set = Self::with_limits(name, config.levels, config.limits());
        if let Some(priority) = config.default_priority {
            set.set_default_priority(priority)?;
        }
        set.shared.events.set_order_maintained(config.order_maintained);
        Ok(set)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    fn source(&self) -> Source {
        Source::collection(&self.shared.name)
    }

    pub fn levels(&self) -> usize {
        self.shared.inner.lock().set.levels()
    }

    pub fn default_priority(&self) -> usize {
        self.shared.inner.lock().set.default_priority()
    }

    pub fn set_default_priority(&self, priority: usize) -> Result<(), ListError> {
        self.shared.inner.lock().set.set_default_priority(priority)
    }

    // ---- limits ----

    fn update_limits(&self, change: impl FnOnce(&mut Limits)) {
        let notices = {
            let mut inner = self.shared.inner.lock();
            let was_full = inner.occupancy().full;
            change(&mut inner.limits);
            let is_full = inner.occupancy().full;
            let mut notices: Notices<T, SetViewState<T>> = Notices::default();
            notices.fullness_changed(&self.shared.events, &self.source(), was_full, is_full);
            notices
        };
        notices.deliver(&self.shared.events);
    }

    pub fn set_capacity(&self, limit: impl Into<Limit>) {
        let limit = limit.into();
        self.update_limits(|limits| limits.set_capacity(limit));
    }

    pub fn set_byte_capacity(&self, limit: impl Into<Limit>) {
        let limit = limit.into();
        self.update_limits(|limits| limits.set_byte_capacity(limit));
    }

    pub fn set_max_element_bytes(&self, limit: impl Into<Limit>) {
        let limit = limit.into();
        self.update_limits(|limits| limits.set_max_element_bytes(limit));
    }

    /// With enforcement off, bounds only drive `Full` notifications.
    pub fn set_enforce_limits(&self, enforce: bool) {
        self.shared.inner.lock().limits.enforce = enforce;
    }

    pub fn enforces_limits(&self) -> bool {
        self.shared.inner.lock().limits.enforce
    }

    pub fn limits(&self) -> Limits {
        self.shared.inner.lock().limits
    }

    pub fn capacity(&self) -> Limit {
        self.shared.inner.lock().limits.capacity
    }

    pub fn byte_capacity(&self) -> Limit {
        self.shared.inner.lock().limits.byte_capacity
    }

    pub fn max_element_bytes(&self) -> Limit {
        self.shared.inner.lock().limits.max_element_bytes
    }

    pub fn is_full(&self) -> bool {
        self.shared.inner.lock().occupancy().full
    }

    /// Elements that can still be added; `None` when the count is unbounded.
    pub fn free_space(&self) -> Option<u64> {
        let inner = self.shared.inner.lock();
        inner.limits.capacity.remaining(inner.set.len() as u64)
    }

    /// Bytes that can still be added; `None` when bytes are unbounded.
    pub fn free_bytes(&self) -> Option<u64> {
        let inner = self.shared.inner.lock();
        inner.limits.byte_capacity.remaining(inner.total_bytes)
    }

    // ---- mutation ----

    /// Raises the informational pre-mutation notice. It cannot veto.
    pub(crate) fn announce(&self, reason: Reason, old: Option<&T>, new: Option<&T>) {
        let events = &self.shared.events;
        if !events.has_listeners(EventType::SetChangedRequest) {
            return;
        }
        let wrap = |value: Option<&T>| value.cloned().map_or(EventValue::None, EventValue::Element);
        events.notify(&Event::new(
            EventType::SetChangedRequest,
            reason,
            self.source(),
            wrap(old),
            wrap(new),
        ));
    }

    /// Runs `op` under the set lock, then delivers the events it caused.
    ///
    /// `op` must validate before it mutates: an error leaves the set as it
    /// was and raises nothing. An `op` that pushes no change is a no-op and
    /// neither samples the statistics nor raises events.
    pub(crate) fn mutate<R, F>(&self, reason: Reason, op: F) -> Result<R, ListError>
    where
        F: FnOnce(
            &mut SetInner<T>,
            &[Arc<SetView<T>>],
            &mut Vec<Change<T>>,
        ) -> Result<R, ListError>,
    {
        let (result, notices) = {
            let mut inner = self.shared.inner.lock();
            let views = inner.views.values();
            let before = inner.occupancy();
            let views_empty: Vec<bool> = views.iter().map(|v| v.state.lock().is_empty()).collect();

            let mut changes = Vec::new();
            let result = match op(&mut *inner, &views, &mut changes) {
                Ok(result) => result,
                Err(err) => {
                    debug!(
                        collection = %self.shared.name,
                        reason = %reason,
                        error = %err,
                        "mutation rejected"
                    );
                    return Err(err);
                }
            };

            if changes.is_empty() {
                return Ok(result);
            }

            let after = inner.occupancy();
            inner.stats.record(after.count, after.bytes);

            let mut notices: Notices<T, SetViewState<T>> = Notices::default();
            notices.occupancy_changed(
                &self.shared.events,
                &self.source(),
                reason,
                before,
                after,
                changes,
            );
            for (view, was_empty) in views.iter().zip(views_empty) {
                let now_empty = view.state.lock().is_empty();
                if was_empty != now_empty {
                    notices.view_emptiness(view, reason, now_empty);
                }
            }
            (result, notices)
        };
        notices.deliver(&self.shared.events);
        Ok(result)
    }

    /// Adds `element` at the tail of `priority`. An element already present
    /// is moved there instead of duplicated.
    pub fn add(&self, priority: usize, element: T, reason: Reason) -> Result<(), ListError> {
        self.announce(reason, None, Some(&element));
        self.mutate(reason, |inner, views, changes| {
            inner.plan(std::iter::once((priority, &element)))?;
            let old = inner.remove_value(views, &element);
            inner.link_at(views, priority, element.clone());
            changes.push((
                old.map_or(EventValue::None, EventValue::Element),
                EventValue::Element(element),
            ));
            Ok(())
        })
    }

    pub fn add_default(&self, element: T, reason: Reason) -> Result<(), ListError> {
        self.add(self.default_priority(), element, reason)
    }

    /// Removes `element`; returns whether it was present.
    pub fn remove(&self, element: &T, reason: Reason) -> bool {
        self.announce(reason, Some(element), None);
        self.mutate(reason, |inner, views, changes| {
            Ok(match inner.remove_value(views, element) {
                Some(old) => {
                    changes.push((EventValue::Element(old), EventValue::None));
                    true
                }
                None => false,
            })
        })
        .unwrap_or(false)
    }

    /// Removes the first element: lowest priority number, earliest arrival.
    pub fn remove_next(&self, reason: Reason) -> Result<T, ListError> {
        self.announce(reason, None, None);
        self.mutate(reason, |inner, views, changes| {
            let head = inner.set.entries().head().ok_or(ListError::NoSuchElement)?;
            let value = inner.unlink_entry(views, head).ok_or(ListError::NoSuchElement)?;
            changes.push((EventValue::Element(value.clone()), EventValue::None));
            Ok(value)
        })
    }

    pub fn peek_next(&self) -> Option<T> {
        self.shared.inner.lock().set.first().cloned()
    }

    /// Inserts `elements` in front of everything already at `priority`,
    /// keeping their relative order. Limits are checked for the whole batch
    /// before anything changes.
    pub fn add_all_to_front<I>(
        &self,
        elements: I,
        priority: usize,
        reason: Reason,
    ) -> Result<(), ListError>
    where
        I: IntoIterator<Item = T>,
    {
        self.shared.inner.lock().set.check_priority(priority)?;
        let elements: Vec<T> = elements.into_iter().collect();
        if elements.is_empty() {
            return Ok(());
        }
        for element in &elements {
            self.announce(reason, None, Some(element));
        }
        self.mutate(reason, |inner, views, changes| {
            inner.plan(elements.iter().map(|e| (priority, e)))?;
            inner.detach_all(views, &elements, changes);
            for element in &elements {
                inner.stamp(priority, element);
            }
            let ids = inner.set.front_insert(elements, priority);
            for id in ids {
                inner.linked(views, id, Placement::Spliced);
            }
            Ok(())
        })
    }

    /// Puts elements back where their order tags say they belong, typically
    /// after they were delivered and then returned. Untagged elements go to
    /// the tail of the default priority.
    pub fn add_all_ordered<I>(&self, elements: I, reason: Reason) -> Result<(), ListError>
    where
        I: IntoIterator<Item = T>,
    {
        let elements: Vec<T> = elements.into_iter().collect();
        if elements.is_empty() {
            return Ok(());
        }
        for element in &elements {
            self.announce(reason, None, Some(element));
        }
        self.mutate(reason, |inner, views, changes| {
            let default = inner.set.default_priority();
            let priorities: Vec<usize> = elements
                .iter()
                .map(|e| e.current_tag().map_or(default, |tag| tag.priority))
                .collect();
            inner.plan(priorities.iter().copied().zip(elements.iter()))?;
            inner.detach_all(views, &elements, changes);
            for element in elements.iter().filter(|e| e.current_tag().is_none()) {
                inner.stamp(default, element);
            }
            let ids = inner.set.ordered_insert(elements)?;
            for id in ids {
                if inner.set.entries().contains(id) {
                    inner.linked(views, id, Placement::Spliced);
                }
            }
            Ok(())
        })
    }

    /// Removes every element matching `filter`, in set order.
    pub fn remove_all<F>(&self, filter: F, reason: Reason) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        self.mutate(reason, |inner, views, changes| {
            let doomed: Vec<EntryId> = inner
                .set
                .entries()
                .iter()
                .filter(|(_, entry)| filter(entry.value()))
                .map(|(id, _)| id)
                .collect();
            let mut removed = Vec::with_capacity(doomed.len());
            for id in doomed {
                if let Some(value) = inner.unlink_entry(views, id) {
                    changes.push((EventValue::Element(value.clone()), EventValue::None));
                    removed.push(value);
                }
            }
            Ok(removed)
        })
        .unwrap_or_default()
    }

    /// Removes everything and resets the statistics. Returns how many
    /// elements were dropped.
    pub fn clear(&self, reason: Reason) -> usize {
        self.mutate(reason, |inner, views, changes| {
            let removed = inner.set.len();
            changes.extend(
                inner
                    .set
                    .iter()
                    .map(|value| (EventValue::Element(value.clone()), EventValue::None)),
            );
            for view in views {
                view.state.lock().on_clear();
            }
            inner.set.clear();
            inner.total_bytes = 0;
            inner.stats.reset();
            Ok(removed)
        })
        .unwrap_or(0)
    }

    /// Clears the set, detaches every view and drops every listener.
    pub fn destroy(&self) {
        let removed = self.clear(Reason::DESTROYED);
        let views = {
            let mut inner = self.shared.inner.lock();
            let views = inner.views.values();
            inner.views.clear();
            inner.stats.reset();
            views
        };
        for view in &views {
            view.mark_destroyed();
            view.events.clear();
        }
        self.shared.events.clear();
        info!(collection = %self.shared.name, removed, views = views.len(), "collection destroyed");
    }

    // ---- reads ----

    pub fn len(&self) -> usize {
        self.shared.inner.lock().set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.inner.lock().set.is_empty()
    }

    /// Sum of the byte sizes of the current elements.
    pub fn byte_size(&self) -> u64 {
        self.shared.inner.lock().total_bytes
    }

    pub fn contains(&self, element: &T) -> bool {
        self.shared.inner.lock().set.contains(element)
    }

    pub fn priority_of(&self, element: &T) -> Option<usize> {
        self.shared.inner.lock().set.priority_of(element)
    }

    /// Snapshot of the elements in set order.
    pub fn to_vec(&self) -> Vec<T> {
        self.shared.inner.lock().set.iter().cloned().collect()
    }

    pub fn iter(&self) -> std::vec::IntoIter<T> {
        self.to_vec().into_iter()
    }

    /// Snapshot of the elements matching `filter`, in set order.
    pub fn get_all<F>(&self, filter: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        self.shared
            .inner
            .lock()
            .set
            .iter()
            .filter(|value| filter(value))
            .cloned()
            .collect()
    }

    // ---- views ----

    fn register_view(
        &self,
        state: impl FnOnce(&SetInner<T>) -> SetViewState<T>,
        kind: &'static str,
    ) -> Arc<SetView<T>> {
        let mut inner = self.shared.inner.lock();
        let id = ViewId::new();
        let reclaim = inner.views.reclaim_handle(id);
        let core = Arc::new(ViewCore::new(id, &self.shared.name, state(&*inner), reclaim));
        inner.views.put(id, &core);
        log_registered(&self.shared.name, id, kind);
        core
    }

    /// A live view of the elements matching `filter`, in set order.
    pub fn sub_set<F>(&self, filter: F) -> FilterSet<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let filter: Filter<T> = Arc::new(filter);
        let core = self.register_view(
            |inner| SetViewState::Filter(FilterState::new(filter, inner.set.entries())),
            "filter",
        );
        FilterSet::new(self.clone(), core)
    }

    /// A live view of every element, ordered by `comparator`.
    pub fn sub_set_by<C>(&self, comparator: C) -> ComparatorSet<T>
    where
        C: Fn(&T, &T) -> std::cmp::Ordering + Send + Sync + 'static,
    {
        let comparator: Comparator<T> = Arc::new(comparator);
        let core = self.register_view(
            |inner| {
                SetViewState::Sorted(ComparatorState::new(comparator, inner.set.iter().cloned()))
            },
            "comparator",
        );
        ComparatorSet::new(self.clone(), core)
    }

    pub(crate) fn unregister_view(&self, core: &Arc<SetView<T>>) {
        if !core.mark_destroyed() {
            return;
        }
        {
            let mut inner = self.shared.inner.lock();
            inner.views.remove(&core.id);
            core.state.lock().on_clear();
        }
        trace!(collection = %self.shared.name, view = %core.id, "view destroyed");
    }

    /// Views still maintained. Views whose handles were all dropped are
    /// purged before counting.
    pub fn view_count(&self) -> usize {
        self.shared.inner.lock().views.len()
    }

    // ---- listeners ----

    pub fn add_event_listener(
        &self,
        listener: Arc<dyn EventListener<T>>,
        event_type: EventType,
        reason: Option<Reason>,
        user_data: Option<UserData>,
    ) -> ListenerId {
        self.shared.events.add_listener(listener, event_type, reason, user_data)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> Option<Arc<dyn EventListener<T>>> {
        self.shared.events.remove_listener(id)
    }

    /// When off, repeated notifications rotate which listener goes first.
    pub fn set_order_maintained(&self, maintained: bool) {
        self.shared.events.set_order_maintained(maintained);
    }

    // ---- statistics ----

    pub fn statistics(&self) -> Statistics {
        self.shared.inner.lock().stats.clone()
    }

    pub fn high_water_count(&self) -> usize {
        self.shared.inner.lock().stats.high_water_count()
    }

    pub fn high_water_bytes(&self) -> u64 {
        self.shared.inner.lock().stats.high_water_bytes()
    }

    pub fn high_water_largest_element_bytes(&self) -> u64 {
        self.shared.inner.lock().stats.high_water_largest_element_bytes()
    }

    pub fn average_count(&self) -> f64 {
        self.shared.inner.lock().stats.average_count()
    }

    pub fn average_bytes(&self) -> f64 {
        self.shared.inner.lock().stats.average_bytes()
    }

    pub fn average_element_bytes(&self) -> f64 {
        self.shared.inner.lock().stats.average_element_bytes()
    }

    pub fn snapshot(&self) -> SetSnapshot {
        let mut inner = self.shared.inner.lock();
        let occupancy = inner.occupancy();
        SetSnapshot {
            name: self.shared.name.to_string(),
            levels: inner.set.levels(),
            default_priority: inner.set.default_priority(),
            size: occupancy.count,
            bytes: occupancy.bytes,
            full: occupancy.full,
            limits: inner.limits,
            statistics: inner.stats.clone(),
            views: inner.views.len(),
            listeners: self.shared.events.listener_count(),
        }
    }
}
