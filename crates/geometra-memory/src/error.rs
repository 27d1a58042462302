//! Error types for memory operations.

use crate::model::Tier;
use std::time::Duration;

/// Failures raised by a backing store client (key-value or vector store).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// The store could not be reached or dropped the connection.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The call did not complete before its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The store rejected the request or answered with something unexpected.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Stored data could not be decoded into a record.
    #[error("decode error: {0}")]
    Decode(String),
    /// The embedding capability failed.
    #[error("embedding error: {0}")]
    Embedding(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

/// Errors returned by the memory stores and the coordinator.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Input was rejected before any store I/O happened.
    #[error("validation error: {0}")]
    Validation(String),
    /// A tier could not serve the request.
    #[error("{tier} store unavailable: {source}")]
    StoreUnavailable {
        tier: Tier,
        #[source]
        source: ClientError,
    },
}

impl MemoryError {
    /// Build a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        MemoryError::Validation(message.into())
    }

    /// Build a store-unavailable error for the given tier.
    pub fn unavailable(tier: Tier, source: ClientError) -> Self {
        MemoryError::StoreUnavailable { tier, source }
    }

    /// Tier that failed, if the error came from a store.
    pub fn tier(&self) -> Option<Tier> {
        match self {
            MemoryError::Validation(_) => None,
            MemoryError::StoreUnavailable { tier, .. } => Some(*tier),
        }
    }

    /// True when the failure was a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            MemoryError::StoreUnavailable {
                source: ClientError::Timeout(_),
                ..
            }
        )
    }
}
