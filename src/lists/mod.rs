//! Capacity-bounded, priority-ordered, event-broadcasting collections.
//!
//! * [`FifoSet`] / [`PriorityFifoSet`] – plain ordered sets over an arena of
//!   generation-checked entries.
//! * [`NflPriorityFifoSet`] – the notifying, limitable set destinations hold
//!   their messages in, with live [`FilterSet`] and [`ComparatorSet`] views.
//! * [`SimpleNflHashMap`] – the same contract for keyed data.
//! * [`EventBroadcastHelper`] – listener registry used by all of the above.
//! * [`WeakValueHashMap`] – weak registry that lets dropped views go away on
//!   their own.

pub mod broadcast;
pub mod capability;
pub mod entry;
pub mod error;
pub mod event;
pub mod fifo_set;
pub mod limits;
pub mod nfl_map;
pub mod nfl_set;
mod notice;
pub mod priority_set;
pub mod stats;
pub mod sub_set;
pub mod view;
pub mod weak_map;

pub use broadcast::{EventBroadcastHelper, EventListener, ListenerId, UserData};
pub use capability::{ByteSized, Element, OrderTag, Ordered};
pub use entry::EntryId;
pub use error::ListError;
pub use event::{Event, EventType, EventValue, Reason, Source, ViewId};
pub use fifo_set::{FifoSet, Range};
pub use limits::{Limit, Limits};
pub use nfl_map::{
    CompareOutcome, FilterMap, MapComparatorSet, MapFilter, MapSnapshot, SimpleNflHashMap,
};
pub use nfl_set::{NflPriorityFifoSet, SetSnapshot};
pub use priority_set::{PriorityFifoSet, DEFAULT_LEVELS};
pub use stats::Statistics;
pub use sub_set::{ComparatorSet, FilterSet};
pub use view::{Comparator, Filter};
pub use weak_map::{ReclaimHandle, WeakValueHashMap};
