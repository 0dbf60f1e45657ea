//! Count and byte bounds shared by the notifying collections.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::lists::capability::Element;
use crate::lists::error::ListError;

/// A bound that is either disabled or a positive maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Limit {
    #[default]
    Unlimited,
    AtMost(u64),
}

impl Limit {
    /// Normalizes a zero bound to [`Limit::Unlimited`].
    pub fn new(bound: u64) -> Self {
        if bound == 0 {
            Limit::Unlimited
        } else {
            Limit::AtMost(bound)
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Limit::Unlimited)
    }

    pub fn bound(&self) -> Option<u64> {
        match self {
            Limit::Unlimited => None,
            Limit::AtMost(bound) => Some(*bound),
        }
    }

    /// `true` if `value` does not go past the bound.
    pub fn allows(&self, value: u64) -> bool {
        self.bound().map_or(true, |bound| value <= bound)
    }

    /// `true` once `value` has reached the bound.
    pub fn reached_by(&self, value: u64) -> bool {
        self.bound().is_some_and(|bound| value >= bound)
    }

    /// Room left below the bound; `None` when unlimited.
    pub fn remaining(&self, value: u64) -> Option<u64> {
        self.bound().map(|bound| bound.saturating_sub(value))
    }

    fn normalized(self) -> Self {
        match self {
            Limit::AtMost(0) => Limit::Unlimited,
            other => other,
        }
    }
}

/// Non-positive values mean unlimited, which is how bounds are written in
/// configuration files.
impl From<i64> for Limit {
    fn from(value: i64) -> Self {
        if value <= 0 {
            Limit::Unlimited
        } else {
            Limit::AtMost(value as u64)
        }
    }
}

impl From<u64> for Limit {
    fn from(value: u64) -> Self {
        Limit::new(value)
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Unlimited => f.write_str("unlimited"),
            Limit::AtMost(bound) => write!(f, "{bound}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub capacity: Limit,
    pub byte_capacity: Limit,
    pub max_element_bytes: Limit,
    /// When `false`, bounds are tracked for `Full` notifications but never
    /// reject a mutation.
    pub enforce: bool,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            capacity: Limit::Unlimited,
            byte_capacity: Limit::Unlimited,
            max_element_bytes: Limit::Unlimited,
            enforce: true,
        }
    }
}

impl Limits {
    pub fn set_capacity(&mut self, limit: Limit) {
        self.capacity = limit.normalized();
    }

    pub fn set_byte_capacity(&mut self, limit: Limit) {
        self.byte_capacity = limit.normalized();
    }

    pub fn set_max_element_bytes(&mut self, limit: Limit) {
        self.max_element_bytes = limit.normalized();
    }

    /// Byte bounds only make sense for elements that report a size.
    pub fn requires_size(&self) -> bool {
        !self.byte_capacity.is_unlimited() || !self.max_element_bytes.is_unlimited()
    }

    pub fn is_full(&self, count: usize, bytes: u64) -> bool {
        self.capacity.reached_by(count as u64) || self.byte_capacity.reached_by(bytes)
    }

    /// Size an element accounts for, or `TypeMismatch` when a byte bound is
    /// configured and the element cannot report one.
    pub(crate) fn element_bytes<T: Element>(&self, element: &T) -> Result<u64, ListError> {
        match element.reported_bytes() {
            Some(bytes) => Ok(bytes),
            None if self.requires_size() => Err(ListError::TypeMismatch { capability: "sized" }),
            None => Ok(0),
        }
    }

    /// Checks a prospective state. `count_after`/`bytes_after` describe the
    /// collection once the change is applied; `largest` is the biggest single
    /// element being inserted.
    pub(crate) fn check(
        &self,
        count_after: usize,
        bytes_after: u64,
        largest: u64,
    ) -> Result<(), ListError> {
        if !self.enforce {
            return Ok(());
        }
        if !self.max_element_bytes.allows(largest) {
            return Err(ListError::ItemSizeExceeded {
                attempted: largest,
                limit: self.max_element_bytes.bound().unwrap_or_default(),
            });
        }
        if !self.capacity.allows(count_after as u64) {
            return Err(ListError::CountExceeded {
                attempted: count_after as u64,
                limit: self.capacity.bound().unwrap_or_default(),
            });
        }
        if !self.byte_capacity.allows(bytes_after) {
            return Err(ListError::ByteCapacityExceeded {
                attempted: bytes_after,
                limit: self.byte_capacity.bound().unwrap_or_default(),
            });
        }
        Ok(())
    }
}
