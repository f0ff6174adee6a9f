//! Error types for thread sessions and record store adapters.
//!
//! Orphaned replies are deliberately absent: they are absorbed by the index
//! and reported as diagnostics, never raised.

use thiserror::Error;

use crate::thread::domain::record::NodeId;

/// Failure reported by a record store adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Network, backend or transport failure.
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the write (permission, duplicate id, ...).
    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("reply {0} not found in store")]
    NotFound(NodeId),
}

/// Error surfaced to callers of a thread session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThreadError {
    /// Rejected before anything reached the store.
    #[error("invalid reply: {0}")]
    Validation(String),

    /// The store rejected an append or like write. Not retried here.
    #[error("write failed: {0}")]
    Write(#[source] StoreError),

    /// Opening the update stream failed.
    #[error("subscribe failed: {0}")]
    Subscribe(#[source] StoreError),

    #[error("unknown reply {0}")]
    UnknownNode(NodeId),

    /// The view was closed; late results are discarded.
    #[error("thread view closed")]
    Closed,
}

impl ThreadError {
    /// Whether a user-facing retry affordance makes sense.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Write(StoreError::Unavailable(_)) | Self::Subscribe(StoreError::Unavailable(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_failures_are_retryable() {
        assert!(ThreadError::Write(StoreError::Unavailable("down".into())).is_retryable());
        assert!(!ThreadError::Write(StoreError::Rejected("nope".into())).is_retryable());
        assert!(!ThreadError::Validation("empty".into()).is_retryable());
        assert!(!ThreadError::Closed.is_retryable());
    }

    #[test]
    fn messages_name_the_reply() {
        let err = ThreadError::UnknownNode(NodeId::new("c9"));
        assert_eq!(err.to_string(), "unknown reply c9");
    }
}
