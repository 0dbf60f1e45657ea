//! What happened to a collection, why, and what changed.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of notification a collection raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Raised before a mutation is applied. Informational; it cannot veto.
    SetChangedRequest,
    SizeChanged,
    BytesChanged,
    SetChanged,
    /// Raised on the 0 ↔ 1 size transitions. `new_value` is `Flag(true)` when
    /// the collection became empty.
    Empty,
    /// Raised when occupancy crosses a configured bound. `new_value` is
    /// `Flag(true)` when the collection became full.
    Full,
}

impl EventType {
    pub const COUNT: usize = 6;

    pub const ALL: [EventType; EventType::COUNT] = [
        EventType::SetChangedRequest,
        EventType::SizeChanged,
        EventType::BytesChanged,
        EventType::SetChanged,
        EventType::Empty,
        EventType::Full,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            EventType::SetChangedRequest => 0,
            EventType::SizeChanged => 1,
            EventType::BytesChanged => 2,
            EventType::SetChanged => 3,
            EventType::Empty => 4,
            EventType::Full => 5,
        }
    }
}

/// Why a mutation happened.
///
/// Reasons compare by code only. The broker layer defines its own reasons
/// with [`Reason::new`]; the constants here cover the collection's own needs
/// and the common destination paths.
#[derive(Clone, Copy, Eq, Serialize)]
pub struct Reason {
    code: u16,
    name: &'static str,
}

impl Reason {
    pub const UNKNOWN: Reason = Reason::new(0, "unknown");
    pub const ADDED: Reason = Reason::new(1, "added");
    pub const REMOVED: Reason = Reason::new(2, "removed");
    pub const CLEARED: Reason = Reason::new(3, "cleared");
    pub const LIMITS_CHANGED: Reason = Reason::new(4, "limits_changed");
    pub const DELIVERED: Reason = Reason::new(5, "delivered");
    pub const ACKNOWLEDGED: Reason = Reason::new(6, "acknowledged");
    pub const EXPIRED: Reason = Reason::new(7, "expired");
    pub const PURGED: Reason = Reason::new(8, "purged");
    pub const REQUEUED: Reason = Reason::new(9, "requeued");
    pub const DESTROYED: Reason = Reason::new(10, "destroyed");

    pub const fn new(code: u16, name: &'static str) -> Self {
        Self { code, name }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for Reason {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl std::hash::Hash for Reason {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.code.hash(state);
    }
}

impl fmt::Debug for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reason({}:{})", self.code, self.name)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Opaque identifier of a live view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewId(Uuid);

impl ViewId {
    pub(crate) fn new() -> Self {
        ViewId(Uuid::new_v4())
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The collection (and, for view notices, the view) an event came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub collection: Arc<str>,
    pub view: Option<ViewId>,
}

impl Source {
    pub(crate) fn collection(name: &Arc<str>) -> Self {
        Self {
            collection: Arc::clone(name),
            view: None,
        }
    }

    pub(crate) fn view(name: &Arc<str>, id: ViewId) -> Self {
        Self {
            collection: Arc::clone(name),
            view: Some(id),
        }
    }
}

/// Old or new value carried by an event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventValue<T> {
    None,
    Count(usize),
    Bytes(u64),
    Flag(bool),
    Element(T),
}

impl<T> EventValue<T> {
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            EventValue::Flag(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<usize> {
        match self {
            EventValue::Count(count) => Some(*count),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<u64> {
        match self {
            EventValue::Bytes(bytes) => Some(*bytes),
            _ => None,
        }
    }

    pub fn as_element(&self) -> Option<&T> {
        match self {
            EventValue::Element(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Event<T> {
    pub event_type: EventType,
    pub reason: Reason,
    pub source: Source,
    pub old_value: EventValue<T>,
    pub new_value: EventValue<T>,
}

impl<T> Event<T> {
    pub fn new(
        event_type: EventType,
        reason: Reason,
        source: Source,
        old_value: EventValue<T>,
        new_value: EventValue<T>,
    ) -> Self {
        Self {
            event_type,
            reason,
            source,
            old_value,
            new_value,
        }
    }
}
