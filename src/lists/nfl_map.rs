//! Limitable, notifying hash map.
//!
//! Same limit, statistics and event contract as
//! [`NflPriorityFifoSet`](crate::lists::NflPriorityFifoSet), without ordering.
//! Byte accounting uses the size of the values; keys are free.
//!
//! Filtered views of a map are materialized copies, updated entry by entry on
//! every mutation of the parent. An unordered map has no stable positions a
//! cursor could point into.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::config::ListsConfig;
use crate::lists::broadcast::{EventBroadcastHelper, EventListener, ListenerId, UserData};
use crate::lists::capability::Element;
use crate::lists::error::ListError;
use crate::lists::event::{Event, EventType, EventValue, Reason, Source, ViewId};
use crate::lists::limits::{Limit, Limits};
use crate::lists::notice::{Notices, Occupancy};
use crate::lists::stats::Statistics;
use crate::lists::view::{Comparator, ComparatorState, ViewCore};
use crate::lists::weak_map::WeakValueHashMap;

/// Predicate selecting the entries of a [`FilterMap`].
pub type MapFilter<K, V> = Arc<dyn Fn(&K, &V) -> bool + Send + Sync>;

type MapView<K, V> = ViewCore<MapViewState<K, V>, (K, V)>;
type MapChange<K, V> = (EventValue<(K, V)>, EventValue<(K, V)>);

/// Result of a conditional put or remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompareOutcome<V> {
    /// The change was made; carries the value previously mapped, if any.
    Applied(Option<V>),
    /// The current mapping differed from the expected value. Nothing changed.
    Mismatch,
}

impl<V> CompareOutcome<V> {
    pub fn is_applied(&self) -> bool {
        matches!(self, CompareOutcome::Applied(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MapSnapshot {
    pub name: String,
    pub size: usize,
    pub bytes: u64,
    pub full: bool,
    pub limits: Limits,
    pub statistics: Statistics,
    pub views: usize,
    pub listeners: usize,
}

enum MapViewState<K, V> {
    Filter {
        filter: MapFilter<K, V>,
        entries: HashMap<K, V>,
    },
    Sorted(ComparatorState<(K, V)>),
}

impl<K: Element, V: Element> MapViewState<K, V> {
    fn on_put(&mut self, key: &K, old: Option<&V>, value: &V) {
        match self {
            MapViewState::Filter { filter, entries } => {
                if filter(key, value) {
                    entries.insert(key.clone(), value.clone());
                } else {
                    entries.remove(key);
                }
            }
            MapViewState::Sorted(state) => {
                if let Some(old) = old {
                    state.remove(&(key.clone(), old.clone()));
                }
                state.insert((key.clone(), value.clone()));
            }
        }
    }

    fn on_remove(&mut self, key: &K, value: &V) {
        match self {
            MapViewState::Filter { entries, .. } => {
                entries.remove(key);
            }
            MapViewState::Sorted(state) => {
                state.remove(&(key.clone(), value.clone()));
            }
        }
    }

    fn on_clear(&mut self) {
        match self {
            MapViewState::Filter { entries, .. } => entries.clear(),
            MapViewState::Sorted(state) => state.clear(),
        }
    }

    fn len(&self) -> usize {
        match self {
            MapViewState::Filter { entries, .. } => entries.len(),
            MapViewState::Sorted(state) => state.len(),
        }
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct MapInner<K: Element, V: Element> {
    map: HashMap<K, V>,
    limits: Limits,
    stats: Statistics,
    total_bytes: u64,
    views: WeakValueHashMap<ViewId, MapView<K, V>>,
}

impl<K: Element, V: Element> MapInner<K, V> {
    fn occupancy(&self) -> Occupancy {
        let count = self.map.len();
        Occupancy {
            count,
            bytes: self.total_bytes,
            full: self.limits.is_full(count, self.total_bytes),
        }
    }

    /// Validates a put without applying it. Returns the value's size.
    fn plan_put(&self, key: &K, value: &V) -> Result<u64, ListError> {
        let bytes = self.limits.element_bytes(value)?;
        let (count, total) = match self.map.get(key) {
            Some(old) => (
                self.map.len(),
                self.total_bytes.saturating_sub(old.reported_bytes().unwrap_or(0)) + bytes,
            ),
            None => (self.map.len() + 1, self.total_bytes + bytes),
        };
        self.limits.check(count, total, bytes)?;
        Ok(bytes)
    }

    fn put(&mut self, views: &[Arc<MapView<K, V>>], key: K, value: V, bytes: u64) -> Option<V> {
        let old = self.map.get(&key);
        for view in views {
            view.state.lock().on_put(&key, old, &value);
        }
        let old = self.map.insert(key, value);
        let freed = old.as_ref().and_then(|v| v.reported_bytes()).unwrap_or(0);
        self.total_bytes = self.total_bytes.saturating_sub(freed) + bytes;
        self.stats.record_element(bytes);
        old
    }

    fn remove(&mut self, views: &[Arc<MapView<K, V>>], key: &K) -> Option<V> {
        let value = self.map.remove(key)?;
        for view in views {
            view.state.lock().on_remove(key, &value);
        }
        self.total_bytes = self
            .total_bytes
            .saturating_sub(value.reported_bytes().unwrap_or(0));
        Some(value)
    }
}

struct MapShared<K: Element, V: Element> {
    name: Arc<str>,
    inner: Mutex<MapInner<K, V>>,
    events: EventBroadcastHelper<(K, V)>,
}

/// Hash map with count/byte limits, statistics, listeners and views.
/// Cloning yields another handle to the same map.
pub struct SimpleNflHashMap<K: Element, V: Element> {
    shared: Arc<MapShared<K, V>>,
}

impl<K: Element, V: Element> Clone for SimpleNflHashMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K: Element, V: Element> std::fmt::Debug for SimpleNflHashMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("SimpleNflHashMap")
            .field("name", &self.shared.name)
            .field("size", &inner.map.len())
            .field("bytes", &inner.total_bytes)
            .finish()
    }
}

impl<K: Element, V: Element> SimpleNflHashMap<K, V> {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self::with_limits(name, Limits::default())
    }

    fn with_limits(name: impl Into<Arc<str>>, limits: Limits) -> Self {
        Self {
            shared: Arc::new(MapShared {
                name: name.into(),
                inner: Mutex::new(MapInner {
                    map: HashMap::new(),
                    limits,
                    stats: Statistics::default(),
                    total_bytes: 0,
                    views: WeakValueHashMap::new(),
                }),
                events: EventBroadcastHelper::new(),
            }),
        }
    }

    /// Builds a map from configuration. Priority settings do not apply.
    pub fn from_config(name: impl Into<Arc<str>>, config: &ListsConfig) -> Self {
        let map = Self::with_limits(name, config.limits());
        map.shared.events.set_order_maintained(config.order_maintained);
        map
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    fn source(&self) -> Source {
        Source::collection(&self.shared.name)
    }

    fn update_limits(&self, change: impl FnOnce(&mut Limits)) {
        let notices = {
            let mut inner = self.shared.inner.lock();
            let was_full = inner.occupancy().full;
            change(&mut inner.limits);
            let is_full = inner.occupancy().full;
            let mut notices: Notices<(K, V), MapViewState<K, V>> = Notices::default();
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

    pub fn set_enforce_limits(&self, enforce: bool) {
        self.shared.inner.lock().limits.enforce = enforce;
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

    pub fn is_full(&self) -> bool {
        self.shared.inner.lock().occupancy().full
    }

    pub fn free_space(&self) -> Option<u64> {
        let inner = self.shared.inner.lock();
        inner.limits.capacity.remaining(inner.map.len() as u64)
    }

    pub fn free_bytes(&self) -> Option<u64> {
        let inner = self.shared.inner.lock();
        inner.limits.byte_capacity.remaining(inner.total_bytes)
    }

    fn announce(&self, reason: Reason, old: Option<(&K, &V)>, new: Option<(&K, &V)>) {
        let events = &self.shared.events;
        if !events.has_listeners(EventType::SetChangedRequest) {
            return;
        }
        let wrap = |entry: Option<(&K, &V)>| {
            entry.map_or(EventValue::None, |(k, v)| EventValue::Element((k.clone(), v.clone())))
        };
        events.notify(&Event::new(
            EventType::SetChangedRequest,
            reason,
            self.source(),
            wrap(old),
            wrap(new),
        ));
    }

    fn mutate<R, F>(&self, reason: Reason, op: F) -> Result<R, ListError>
    where
        F: FnOnce(
            &mut MapInner<K, V>,
            &[Arc<MapView<K, V>>],
            &mut Vec<MapChange<K, V>>,
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

            let mut notices: Notices<(K, V), MapViewState<K, V>> = Notices::default();
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

    /// Maps `key` to `value`, returning the previous value.
    pub fn put(&self, key: K, value: V, reason: Reason) -> Result<Option<V>, ListError> {
        self.announce(reason, None, Some((&key, &value)));
        self.mutate(reason, |inner, views, changes| {
            let bytes = inner.plan_put(&key, &value)?;
            let old = inner.put(views, key.clone(), value.clone(), bytes);
            changes.push((
                old.clone().map_or(EventValue::None, |old| EventValue::Element((key.clone(), old))),
                EventValue::Element((key, value)),
            ));
            Ok(old)
        })
    }

    /// Puts only if the current mapping equals `expected`. `None` means
    /// "don't care".
    pub fn put_if(
        &self,
        key: K,
        value: V,
        expected: Option<&V>,
        reason: Reason,
    ) -> Result<CompareOutcome<V>, ListError> {
        self.announce(reason, None, Some((&key, &value)));
        self.mutate(reason, |inner, views, changes| {
            if let Some(expected) = expected {
                if inner.map.get(&key) != Some(expected) {
                    return Ok(CompareOutcome::Mismatch);
                }
            }
            let bytes = inner.plan_put(&key, &value)?;
            let old = inner.put(views, key.clone(), value.clone(), bytes);
            changes.push((
                old.clone().map_or(EventValue::None, |old| EventValue::Element((key.clone(), old))),
                EventValue::Element((key, value)),
            ));
            Ok(CompareOutcome::Applied(old))
        })
    }

    pub fn remove(&self, key: &K, reason: Reason) -> Option<V> {
        match self.remove_with_value(key, None, reason) {
            CompareOutcome::Applied(old) => old,
            CompareOutcome::Mismatch => None,
        }
    }

    /// Removes `key` only if it currently maps to `expected`. `None` means
    /// "don't care".
    pub fn remove_with_value(
        &self,
        key: &K,
        expected: Option<&V>,
        reason: Reason,
    ) -> CompareOutcome<V> {
        if self.shared.events.has_listeners(EventType::SetChangedRequest) {
            let current = expected.cloned().or_else(|| self.get(key));
            self.announce(reason, current.as_ref().map(|v| (key, v)), None);
        }
        self.mutate(reason, |inner, views, changes| {
            if let Some(expected) = expected {
                if inner.map.get(key) != Some(expected) {
                    return Ok(CompareOutcome::Mismatch);
                }
            }
            let old = inner.remove(views, key);
            if let Some(old) = &old {
                changes.push((EventValue::Element((key.clone(), old.clone())), EventValue::None));
            }
            Ok(CompareOutcome::Applied(old))
        })
        .unwrap_or(CompareOutcome::Mismatch)
    }

    /// Removes everything and resets the statistics.
    pub fn clear(&self, reason: Reason) -> usize {
        self.mutate(reason, |inner, views, changes| {
            let removed = inner.map.len();
            changes.extend(
                inner
                    .map
                    .drain()
                    .map(|entry| (EventValue::Element(entry), EventValue::None)),
            );
            for view in views {
                view.state.lock().on_clear();
            }
            inner.total_bytes = 0;
            inner.stats.reset();
            Ok(removed)
        })
        .unwrap_or(0)
    }

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

    pub fn get(&self, key: &K) -> Option<V> {
        self.shared.inner.lock().map.get(key).cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.shared.inner.lock().map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.shared.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.inner.lock().map.is_empty()
    }

    pub fn byte_size(&self) -> u64 {
        self.shared.inner.lock().total_bytes
    }

    pub fn keys(&self) -> Vec<K> {
        self.shared.inner.lock().map.keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<V> {
        self.shared.inner.lock().map.values().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(K, V)> {
        let inner = self.shared.inner.lock();
        inner.map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Snapshot of the entries matching `filter`.
    pub fn get_all<F>(&self, filter: F) -> Vec<(K, V)>
    where
        F: Fn(&K, &V) -> bool,
    {
        let inner = self.shared.inner.lock();
        inner
            .map
            .iter()
            .filter(|(k, v)| filter(k, v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn register_view(
        &self,
        state: impl FnOnce(&HashMap<K, V>) -> MapViewState<K, V>,
        kind: &'static str,
    ) -> Arc<MapView<K, V>> {
        let mut inner = self.shared.inner.lock();
        let id = ViewId::new();
        let reclaim = inner.views.reclaim_handle(id);
        let core = Arc::new(ViewCore::new(id, &self.shared.name, state(&inner.map), reclaim));
        inner.views.put(id, &core);
        trace!(collection = %self.shared.name, view = %id, kind, "view registered");
        core
    }

    /// A copy of the entries matching `filter`, kept up to date as the map
    /// changes.
    pub fn sub_map<F>(&self, filter: F) -> FilterMap<K, V>
    where
        F: Fn(&K, &V) -> bool + Send + Sync + 'static,
    {
        let filter: MapFilter<K, V> = Arc::new(filter);
        let core = self.register_view(
            |map| {
                let entries = map
                    .iter()
                    .filter(|(k, v)| filter(k, v))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                MapViewState::Filter { filter, entries }
            },
            "filter",
        );
        FilterMap {
            parent: self.clone(),
            core,
        }
    }

    /// Every entry, ordered by `comparator`.
    pub fn sub_set_by<C>(&self, comparator: C) -> MapComparatorSet<K, V>
    where
        C: Fn(&(K, V), &(K, V)) -> Ordering + Send + Sync + 'static,
    {
        let comparator: Comparator<(K, V)> = Arc::new(comparator);
        let core = self.register_view(
            |map| {
                let initial = map.iter().map(|(k, v)| (k.clone(), v.clone()));
                MapViewState::Sorted(ComparatorState::new(comparator, initial))
            },
            "comparator",
        );
        MapComparatorSet {
            parent: self.clone(),
            core,
        }
    }

    fn unregister_view(&self, core: &Arc<MapView<K, V>>) {
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

    pub fn view_count(&self) -> usize {
        self.shared.inner.lock().views.len()
    }

    pub fn add_event_listener(
        &self,
        listener: Arc<dyn EventListener<(K, V)>>,
        event_type: EventType,
        reason: Option<Reason>,
        user_data: Option<UserData>,
    ) -> ListenerId {
        self.shared.events.add_listener(listener, event_type, reason, user_data)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> Option<Arc<dyn EventListener<(K, V)>>> {
        self.shared.events.remove_listener(id)
    }

    pub fn set_order_maintained(&self, maintained: bool) {
        self.shared.events.set_order_maintained(maintained);
    }

    pub fn statistics(&self) -> Statistics {
        self.shared.inner.lock().stats.clone()
    }

    pub fn snapshot(&self) -> MapSnapshot {
        let mut inner = self.shared.inner.lock();
        let occupancy = inner.occupancy();
        MapSnapshot {
            name: self.shared.name.to_string(),
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

/// Materialized copy of the entries of a map that pass a filter.
pub struct FilterMap<K: Element, V: Element> {
    parent: SimpleNflHashMap<K, V>,
    core: Arc<MapView<K, V>>,
}

impl<K: Element, V: Element> FilterMap<K, V> {
    pub fn id(&self) -> ViewId {
        self.core.id
    }

    fn with_entries<R>(&self, empty: R, f: impl FnOnce(&HashMap<K, V>) -> R) -> R {
        if self.core.is_destroyed() {
            return empty;
        }
        let _parent = self.parent.shared.inner.lock();
        match &*self.core.state.lock() {
            MapViewState::Filter { entries, .. } => f(entries),
            MapViewState::Sorted(_) => empty,
        }
    }

    pub fn len(&self) -> usize {
        self.with_entries(0, |entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.with_entries(None, |entries| entries.get(key).cloned())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.with_entries(false, |entries| entries.contains_key(key))
    }

    pub fn entries(&self) -> Vec<(K, V)> {
        self.with_entries(Vec::new(), |entries| {
            entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        })
    }

    pub fn add_event_listener(
        &self,
        listener: Arc<dyn EventListener<(K, V)>>,
        event_type: EventType,
        reason: Option<Reason>,
        user_data: Option<UserData>,
    ) -> ListenerId {
        self.core.events.add_listener(listener, event_type, reason, user_data)
    }

    pub fn destroy(&self) {
        self.parent.unregister_view(&self.core);
    }
}

/// A map's entries ordered by a comparator, kept up to date as the map
/// changes.
pub struct MapComparatorSet<K: Element, V: Element> {
    parent: SimpleNflHashMap<K, V>,
    core: Arc<MapView<K, V>>,
}

impl<K: Element, V: Element> MapComparatorSet<K, V> {
    pub fn id(&self) -> ViewId {
        self.core.id
    }

    fn with_state<R>(&self, empty: R, f: impl FnOnce(&ComparatorState<(K, V)>) -> R) -> R {
        if self.core.is_destroyed() {
            return empty;
        }
        let _parent = self.parent.shared.inner.lock();
        match &*self.core.state.lock() {
            MapViewState::Sorted(state) => f(state),
            MapViewState::Filter { .. } => empty,
        }
    }

    pub fn len(&self) -> usize {
        self.with_state(0, |state| state.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn first(&self) -> Option<(K, V)> {
        self.with_state(None, |state| state.first().cloned())
    }

    pub fn to_vec(&self) -> Vec<(K, V)> {
        self.with_state(Vec::new(), |state| state.iter().cloned().collect())
    }

    /// Removes the comparator-first entry from the parent map.
    pub fn remove_first(&self, reason: Reason) -> Result<(K, V), ListError> {
        if self.core.is_destroyed() {
            return Err(ListError::invalid("view has been destroyed"));
        }
        loop {
            let (key, value) = self.first().ok_or(ListError::NoSuchElement)?;
            // Lost a race with another remover: try the new first entry.
            if self.parent.remove_with_value(&key, Some(&value), reason).is_applied() {
                return Ok((key, value));
            }
        }
    }

    pub fn add_event_listener(
        &self,
        listener: Arc<dyn EventListener<(K, V)>>,
        event_type: EventType,
        reason: Option<Reason>,
        user_data: Option<UserData>,
    ) -> ListenerId {
        self.core.events.add_listener(listener, event_type, reason, user_data)
    }

    pub fn destroy(&self) {
        self.parent.unregister_view(&self.core);
    }
}
