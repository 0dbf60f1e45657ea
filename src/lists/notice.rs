//! Building the event batch a mutation raises.
//!
//! Events are assembled under the collection's lock from before/after
//! snapshots and delivered after the lock is released.

use std::sync::Arc;

use crate::lists::broadcast::EventBroadcastHelper;
use crate::lists::event::{Event, EventType, EventValue, Reason, Source};
use crate::lists::view::ViewCore;

/// Size, bytes and fullness of a collection at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Occupancy {
    pub(crate) count: usize,
    pub(crate) bytes: u64,
    pub(crate) full: bool,
}

/// Events waiting to be delivered once the collection lock is released.
pub(crate) struct Notices<E, S> {
    collection: Vec<Event<E>>,
    views: Vec<(Arc<ViewCore<S, E>>, Event<E>)>,
}

impl<E, S> Default for Notices<E, S> {
    fn default() -> Self {
        Self {
            collection: Vec::new(),
            views: Vec::new(),
        }
    }
}

impl<E, S> Notices<E, S> {
    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.collection.is_empty() && self.views.is_empty()
    }

    /// Appends the collection events for a mutation, in their fixed order:
    /// size, bytes, one `SetChanged` per change, empty, full. Only event types
    /// with at least one listener are built.
    pub(crate) fn occupancy_changed(
        &mut self,
        helper: &EventBroadcastHelper<E>,
        source: &Source,
        reason: Reason,
        before: Occupancy,
        after: Occupancy,
        changes: Vec<(EventValue<E>, EventValue<E>)>,
    ) {
        let mut push = |event_type: EventType, old: EventValue<E>, new: EventValue<E>| {
            if helper.has_listeners(event_type) {
                self.collection
                    .push(Event::new(event_type, reason, source.clone(), old, new));
            }
        };

        if before.count != after.count {
            push(
                EventType::SizeChanged,
                EventValue::Count(before.count),
                EventValue::Count(after.count),
            );
        }
        if before.bytes != after.bytes {
            push(
                EventType::BytesChanged,
                EventValue::Bytes(before.bytes),
                EventValue::Bytes(after.bytes),
            );
        }
        if helper.has_listeners(EventType::SetChanged) {
            for (old, new) in changes {
                push(EventType::SetChanged, old, new);
            }
        }
        let was_empty = before.count == 0;
        let is_empty = after.count == 0;
        if was_empty != is_empty {
            push(
                EventType::Empty,
                EventValue::Flag(was_empty),
                EventValue::Flag(is_empty),
            );
        }
        if before.full != after.full {
            push(
                EventType::Full,
                EventValue::Flag(before.full),
                EventValue::Flag(after.full),
            );
        }
    }

    /// A `Full` transition caused by changing a bound rather than contents.
    pub(crate) fn fullness_changed(
        &mut self,
        helper: &EventBroadcastHelper<E>,
        source: &Source,
        was_full: bool,
        is_full: bool,
    ) {
        if was_full != is_full && helper.has_listeners(EventType::Full) {
            self.collection.push(Event::new(
                EventType::Full,
                Reason::LIMITS_CHANGED,
                source.clone(),
                EventValue::Flag(was_full),
                EventValue::Flag(is_full),
            ));
        }
    }

    /// Queues a view's own empty ↔ non-empty notice.
    pub(crate) fn view_emptiness(
        &mut self,
        view: &Arc<ViewCore<S, E>>,
        reason: Reason,
        now_empty: bool,
    ) {
        if view.events.has_listeners(EventType::Empty) {
            let event = view.empty_notice(reason, now_empty);
            self.views.push((Arc::clone(view), event));
        }
    }

    /// Delivers collection events first, then view notices.
    pub(crate) fn deliver(self, helper: &EventBroadcastHelper<E>) {
        for event in &self.collection {
            helper.notify(event);
        }
        for (view, event) in &self.views {
            view.events.notify(event);
        }
    }
}
