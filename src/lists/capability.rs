//! Capabilities an element stored in a list may expose.
//!
//! Limits on bytes only work for elements that can report their size, and
//! ordered re-insertion only works for elements that carry an order tag.
//! Both are optional: an element advertises them through [`Element`], and the
//! collections check for them at insertion time.

use std::cmp::Ordering;
use std::hash::Hash;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Reports the number of bytes an element accounts for.
pub trait ByteSized {
    fn byte_size(&self) -> u64;
}

/// Position assigned to an element the first time it entered an ordered set.
///
/// Tags compare by priority first, then by sequence, which is the global
/// order of a priority set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderTag {
    pub priority: usize,
    pub sequence: u64,
}

impl OrderTag {
    pub fn new(priority: usize, sequence: u64) -> Self {
        Self { priority, sequence }
    }
}

impl Ord for OrderTag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for OrderTag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Carries an [`OrderTag`] across removal and re-insertion.
///
/// The tag is set through a shared reference because the same element is
/// usually referenced from several places (a set, its views, the caller).
pub trait Ordered {
    fn order_tag(&self) -> Option<OrderTag>;
    fn set_order_tag(&self, tag: OrderTag);
}

/// Anything that can be stored in a list.
///
/// Identity is `Eq + Hash`: two equal values are the same element, and adding
/// one replaces the other. The capability accessors default to "not supported".
pub trait Element: Clone + Eq + Hash + Send + Sync + 'static {
    fn as_sized(&self) -> Option<&dyn ByteSized> {
        None
    }

    fn as_ordered(&self) -> Option<&dyn Ordered> {
        None
    }

    /// Shorthand for the reported size, if any.
    fn reported_bytes(&self) -> Option<u64> {
        self.as_sized().map(|sized| sized.byte_size())
    }

    /// Shorthand for the current order tag, if any.
    fn current_tag(&self) -> Option<OrderTag> {
        self.as_ordered().and_then(|ordered| ordered.order_tag())
    }
}

impl ByteSized for Bytes {
    fn byte_size(&self) -> u64 {
        self.len() as u64
    }
}

impl Element for Bytes {
    fn as_sized(&self) -> Option<&dyn ByteSized> {
        Some(self)
    }
}

impl ByteSized for String {
    fn byte_size(&self) -> u64 {
        self.len() as u64
    }
}

impl Element for String {
    fn as_sized(&self) -> Option<&dyn ByteSized> {
        Some(self)
    }
}

impl ByteSized for &'static str {
    fn byte_size(&self) -> u64 {
        self.len() as u64
    }
}

impl Element for &'static str {
    fn as_sized(&self) -> Option<&dyn ByteSized> {
        Some(self)
    }
}

macro_rules! plain_element {
    ($($ty:ty),* $(,)?) => {
        $(impl Element for $ty {})*
    };
}

plain_element!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, char);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_order_by_priority_then_sequence() {
        let a = OrderTag::new(0, 10);
        let b = OrderTag::new(1, 1);
        let c = OrderTag::new(1, 2);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn strings_are_sized_numbers_are_not() {
        assert_eq!("abcd".reported_bytes(), Some(4));
        assert_eq!(String::from("xy").reported_bytes(), Some(2));
        assert_eq!(Bytes::from_static(b"123").reported_bytes(), Some(3));
        assert_eq!(7u64.reported_bytes(), None);
        assert!(7u64.current_tag().is_none());
    }
}
