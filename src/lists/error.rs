use thiserror::Error;

/// Errors raised synchronously by list operations.
///
/// A call that returns one of the limit or validation errors has made no
/// change to the collection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListError {
    #[error("count limit exceeded: {attempted} elements, limit {limit}")]
    CountExceeded { attempted: u64, limit: u64 },

    #[error("byte capacity exceeded: {attempted} bytes, limit {limit}")]
    ByteCapacityExceeded { attempted: u64, limit: u64 },

    #[error("element size exceeded: {attempted} bytes, limit {limit}")]
    ItemSizeExceeded { attempted: u64, limit: u64 },

    #[error("priority {priority} out of range for {levels} levels")]
    PriorityExceeded { priority: usize, levels: usize },

    #[error("element does not support the {capability} capability")]
    TypeMismatch { capability: &'static str },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("no more elements")]
    NoSuchElement,
}

impl ListError {
    /// `true` for the limit family (count, bytes, element size, priority).
    pub fn is_out_of_limits(&self) -> bool {
        matches!(
            self,
            ListError::CountExceeded { .. }
                | ListError::ByteCapacityExceeded { .. }
                | ListError::ItemSizeExceeded { .. }
                | ListError::PriorityExceeded { .. }
        )
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ListError::InvalidState(msg.into())
    }
}
