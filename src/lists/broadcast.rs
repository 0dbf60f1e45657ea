//! Listener registry and dispatch for collection events.
//!
//! Registration and removal take the registry's write lock; dispatch takes
//! the read lock only long enough to snapshot the matching listeners, then
//! calls them with no lock held. A listener may therefore register or remove
//! listeners (or touch the collection) from inside its callback. Listeners
//! added during a dispatch are not called until the next one.
//!
//! A panicking listener is not isolated: the panic unwinds out of `notify`
//! and the remaining listeners for that event are skipped.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::lists::event::{Event, EventType, Reason};

/// Opaque data handed back to a listener with every event.
pub type UserData = Arc<dyn Any + Send + Sync>;

pub trait EventListener<T>: Send + Sync {
    fn event_occurred(&self, event: &Event<T>, user_data: Option<&UserData>);
}

impl<T, F> EventListener<T> for F
where
    F: Fn(&Event<T>, Option<&UserData>) + Send + Sync,
{
    fn event_occurred(&self, event: &Event<T>, user_data: Option<&UserData>) {
        self(event, user_data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration<T> {
    id: ListenerId,
    reason: Option<Reason>,
    listener: Arc<dyn EventListener<T>>,
    user_data: Option<UserData>,
}

impl<T> Registration<T> {
    fn matches(&self, reason: Reason) -> bool {
        self.reason.map_or(true, |wanted| wanted == reason)
    }
}

struct Registry<T> {
    by_type: [Vec<Arc<Registration<T>>>; EventType::COUNT],
    types: HashMap<ListenerId, EventType>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            by_type: std::array::from_fn(|_| Vec::new()),
            types: HashMap::new(),
        }
    }
}

pub struct EventBroadcastHelper<T> {
    registry: RwLock<Registry<T>>,
    counts: [AtomicUsize; EventType::COUNT],
    offsets: [AtomicUsize; EventType::COUNT],
    order_maintained: AtomicBool,
    next_id: AtomicU64,
}

impl<T> Default for EventBroadcastHelper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EventBroadcastHelper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBroadcastHelper")
            .field("listeners", &self.listener_count())
            .field("order_maintained", &self.is_order_maintained())
            .finish()
    }
}

impl<T> EventBroadcastHelper<T> {
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            counts: std::array::from_fn(|_| AtomicUsize::new(0)),
            offsets: std::array::from_fn(|_| AtomicUsize::new(0)),
            order_maintained: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
        }
    }

    /// When disabled, each event type rotates the listener that is called
    /// first, so the earliest registration is not always favoured.
    pub fn set_order_maintained(&self, maintained: bool) {
        self.order_maintained.store(maintained, Ordering::Relaxed);
    }

    pub fn is_order_maintained(&self) -> bool {
        self.order_maintained.load(Ordering::Relaxed)
    }

    /// Registers `listener` for `event_type`. With `reason` set, only events
    /// raised for that reason are delivered.
    pub fn add_listener(
        &self,
        listener: Arc<dyn EventListener<T>>,
        event_type: EventType,
        reason: Option<Reason>,
        user_data: Option<UserData>,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let registration = Arc::new(Registration {
            id,
            reason,
            listener,
            user_data,
        });

        let mut registry = self.registry.write();
        registry.by_type[event_type.index()].push(registration);
        registry.types.insert(id, event_type);
        self.counts[event_type.index()].fetch_add(1, Ordering::Release);
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> Option<Arc<dyn EventListener<T>>> {
        let mut registry = self.registry.write();
        let event_type = registry.types.remove(&id)?;
        let list = &mut registry.by_type[event_type.index()];
        let position = list.iter().position(|r| r.id == id)?;
        let removed = list.remove(position);
        self.counts[event_type.index()].fetch_sub(1, Ordering::Release);
        Some(Arc::clone(&removed.listener))
    }

    pub fn has_listeners(&self, event_type: EventType) -> bool {
        self.counts[event_type.index()].load(Ordering::Acquire) > 0
    }

    pub fn listener_count(&self) -> usize {
        self.counts.iter().map(|c| c.load(Ordering::Acquire)).sum()
    }

    pub fn clear(&self) {
        let mut registry = self.registry.write();
        *registry = Registry::default();
        for count in &self.counts {
            count.store(0, Ordering::Release);
        }
    }

    /// Delivers `event` to every listener registered for its type whose
    /// reason filter is empty or equal to the event's reason.
    pub fn notify(&self, event: &Event<T>) {
        let kind = event.event_type.index();
        if self.counts[kind].load(Ordering::Acquire) == 0 {
            return;
        }

        let targets: Vec<Arc<Registration<T>>> = {
            let registry = self.registry.read();
            let listeners = &registry.by_type[kind];
            if listeners.is_empty() {
                return;
            }
            let start = if self.is_order_maintained() {
                0
            } else {
                self.offsets[kind].fetch_add(1, Ordering::Relaxed) % listeners.len()
            };
            listeners[start..]
                .iter()
                .chain(listeners[..start].iter())
                .filter(|r| r.matches(event.reason))
                .cloned()
                .collect()
        };

        for registration in targets {
            registration
                .listener
                .event_occurred(event, registration.user_data.as_ref());
        }
    }
}
