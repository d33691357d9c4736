//! Error types for subscription management.

use crate::types::Version;
use thiserror::Error;

/// Main error type for subscription and sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "A subscription with the name '{name}' already exists but has a different query. \
         If you meant to update it, remove `throw_on_update` from the subscription options."
    )]
    DuplicateSubscriptionName { name: String },

    #[error("Invalid query: {0}")]
    Validation(String),

    #[error("{message}")]
    ServerRejected { version: Version, message: String },

    #[error("Subscription set at {version:?} was superseded by {current:?}; fetch the current set from the realm")]
    Superseded { version: Version, current: Version },

    #[error("Subscription sets cannot be updated from inside another update callback")]
    NestedUpdate,

    #[error("`wait_for_synchronization` cannot be called before creating a subscription set using `update`")]
    NothingCommitted,

    #[error(
        "`subscriptions` can only be accessed if flexible sync is enabled, \
         but sync is currently disabled for this realm"
    )]
    SyncDisabled,

    #[error(
        "`subscriptions` can only be accessed if flexible sync is enabled, \
         but partition based sync is currently enabled for this realm"
    )]
    PartitionSyncEnabled,

    #[error("Realm is closed")]
    RealmClosed,

    #[error("Unknown subscription set version {version:?} (latest is {latest:?})")]
    UnknownVersion { version: Version, latest: Version },

    #[error("Update aborted: {0}")]
    Aborted(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid realm format: {0}")]
    InvalidFormat(String),

    #[error("Realm is locked by another process")]
    Locked,

    #[error("Realm not initialized")]
    NotInitialized,
}

impl SyncError {
    /// Programmer errors that are reported immediately and never retried.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            SyncError::Superseded { .. }
                | SyncError::NestedUpdate
                | SyncError::NothingCommitted
                | SyncError::SyncDisabled
                | SyncError::PartitionSyncEnabled
                | SyncError::RealmClosed
        )
    }

    /// Errors discovered after a round trip to the server.
    pub fn is_remote(&self) -> bool {
        matches!(self, SyncError::ServerRejected { .. })
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for SyncError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for SyncError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        SyncError::Deserialization(e.to_string())
    }
}

/// Result type for subscription operations.
pub type Result<T> = std::result::Result<T, SyncError>;
