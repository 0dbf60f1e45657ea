#![allow(dead_code)]

use std::hash::{Hash, Hasher};
use std::sync::{Arc, Once};

use parking_lot::Mutex;

use blipmq_lists::lists::{
    ByteSized, Element, Event, EventType, EventValue, NflPriorityFifoSet, OrderTag, Ordered, Reason,
    UserData,
};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        blipmq_lists::logging::try_init_logging();
    });
}

#[derive(Debug)]
struct MsgInner {
    id: String,
    size: u64,
    tag: Mutex<Option<OrderTag>>,
}

/// Test message: identified by `id`, sized, and orderable.
#[derive(Debug, Clone)]
pub struct Msg(Arc<MsgInner>);

impl Msg {
    pub fn new(id: &str, size: u64) -> Self {
        Msg(Arc::new(MsgInner {
            id: id.to_string(),
            size,
            tag: Mutex::new(None),
        }))
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn tag(&self) -> Option<OrderTag> {
        *self.0.tag.lock()
    }
}

impl PartialEq for Msg {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Msg {}

impl Hash for Msg {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl ByteSized for Msg {
    fn byte_size(&self) -> u64 {
        self.0.size
    }
}

impl Ordered for Msg {
    fn order_tag(&self) -> Option<OrderTag> {
        self.tag()
    }

    fn set_order_tag(&self, tag: OrderTag) {
        *self.0.tag.lock() = Some(tag);
    }
}

impl Element for Msg {
    fn as_sized(&self) -> Option<&dyn ByteSized> {
        Some(self)
    }

    fn as_ordered(&self) -> Option<&dyn Ordered> {
        Some(self)
    }
}

pub fn msg(id: &str) -> Msg {
    Msg::new(id, 10)
}

pub fn ids(messages: &[Msg]) -> Vec<String> {
    messages.iter().map(|m| m.id().to_string()).collect()
}

/// One recorded event, with element values reduced to their ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Seen {
    pub event_type: EventType,
    pub reason: Reason,
    pub old: EventValue<String>,
    pub new: EventValue<String>,
}

fn simplify(value: &EventValue<Msg>) -> EventValue<String> {
    match value {
        EventValue::None => EventValue::None,
        EventValue::Count(c) => EventValue::Count(*c),
        EventValue::Bytes(b) => EventValue::Bytes(*b),
        EventValue::Flag(f) => EventValue::Flag(*f),
        EventValue::Element(m) => EventValue::Element(m.id().to_string()),
    }
}

pub fn recorder(log: &Arc<Mutex<Vec<Seen>>>) -> Arc<dyn blipmq_lists::lists::EventListener<Msg>> {
    let log = Arc::clone(log);
    Arc::new(move |e: &Event<Msg>, _: Option<&UserData>| {
        log.lock().push(Seen {
            event_type: e.event_type,
            reason: e.reason,
            old: simplify(&e.old_value),
            new: simplify(&e.new_value),
        })
    })
}

/// Registers a recorder for the given event types.
pub fn record(set: &NflPriorityFifoSet<Msg>, types: &[EventType]) -> Arc<Mutex<Vec<Seen>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for kind in types {
        set.add_event_listener(recorder(&log), *kind, None, None);
    }
    log
}

pub fn kinds(log: &Arc<Mutex<Vec<Seen>>>) -> Vec<EventType> {
    log.lock().iter().map(|s| s.event_type).collect()
}
