//! Flexible sync subscription sets.
//!
//! A realm's subscriptions are a versioned list of queries. Each
//! [`SubscriptionSet`] is an immutable snapshot of one version; changes go
//! through [`SubscriptionSet::update`], which hands a
//! [`MutableSubscriptionSet`] to a callback and commits the result as the
//! next version.
//!
//! ```ignore
//! let mut subs = realm.subscriptions()?;
//! let wait = subs.update(|mutable, _realm| {
//!     mutable.add(&Query::objects("Cat"), SubscriptionOptions::named("allCats"))?;
//!     Ok(())
//! })?;
//! assert_eq!(subs.state(), SubscriptionSetState::Pending);
//! wait.await?;
//! ```

mod mutable;
mod set;
mod store;
mod types;
mod wait;

pub use mutable::MutableSubscriptionSet;
pub use set::SubscriptionSet;
pub use types::{Subscription, SubscriptionOptions, VersionStatus};
pub use wait::SyncWait;

pub(crate) use store::SubscriptionStore;
