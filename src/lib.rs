//! # flexsync
//!
//! Client-side flexible sync subscription management for an embedded,
//! synced realm.
//!
//! ## Core Concepts
//!
//! - **Subscriptions**: named or anonymous queries that decide which
//!   objects the server sends
//! - **Subscription sets**: immutable, versioned snapshots of all
//!   subscriptions; every committed update creates the next version
//! - **States**: each version is `pending` until the server answers, then
//!   `complete` or `error`; older versions are `superseded`
//! - **Durability**: commits and state changes go through a checksummed
//!   write-ahead log before they become visible
//!
//! The write-ahead log is an implementation detail of the realm directory
//! and is not reachable from outside the crate:
//!
//! ```compile_fail
//! use flexsync::wal::WriteAheadLog;
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use flexsync::{channel_transport, Query, Realm, RealmConfig, SubscriptionOptions, SyncConfig};
//!
//! let (transport, requests) = channel_transport();
//! let realm = Realm::open(RealmConfig {
//!     path: "./my-realm".into(),
//!     sync: Some(SyncConfig::flexible(transport)),
//!     ..Default::default()
//! })?;
//!
//! let mut subs = realm.subscriptions()?;
//! let synced = subs.update(|mutable, _realm| {
//!     mutable.add(&Query::objects("Cat"), SubscriptionOptions::named("allCats"))?;
//!     Ok(())
//! })?;
//!
//! // The server answers through the session.
//! let request = requests.recv()?;
//! realm.sync_session()?.acknowledge(request.version)?;
//! synced.await?;
//! ```

pub mod error;
pub mod events;
pub mod query;
pub mod realm;
pub mod schema;
pub mod subscriptions;
pub mod sync;
pub mod types;
pub(crate) mod wal;

// Re-exports
pub use error::{Result, SyncError};
pub use events::{
    ChangeSet, DropReason, EventConfig, EventFilter, EventHandle, ListenerId, NotificationHub,
    SubscriberId, SyncEvent,
};
pub use query::{Query, QueryDescriptor, TRUE_PREDICATE};
pub use realm::{InitialSubscriptions, InitialUpdate, Realm, RealmConfig, SyncConfig, SyncMode};
pub use schema::{ObjectSchema, Schema};
pub use subscriptions::{
    MutableSubscriptionSet, Subscription, SubscriptionOptions, SubscriptionSet, SyncWait,
    VersionStatus,
};
pub use sync::{
    channel_transport, ChannelTransport, NullTransport, SyncRequest, SyncSession, SyncTransport,
};
pub use types::*;
