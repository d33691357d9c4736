//! Read handle on one committed version of a realm's subscriptions.

use super::mutable::MutableSubscriptionSet;
use super::types::{self, SetSnapshot, Subscription};
use super::wait::SyncWait;
use crate::error::{Result, SyncError};
use crate::query::Query;
use crate::realm::Realm;
use crate::types::{SubscriptionSetState, Version};
use std::fmt;
use std::ops::Index;
use std::sync::Arc;
use tracing::debug;

/// An ordered, immutable snapshot of a realm's subscriptions.
///
/// Obtained from [`Realm::subscriptions`]. The contents never change; the
/// `state` is read live from the realm, so a handle whose version has been
/// replaced by a newer commit reports [`SubscriptionSetState::Superseded`].
#[derive(Clone)]
pub struct SubscriptionSet {
    realm: Realm,
    snapshot: Arc<SetSnapshot>,
}

impl SubscriptionSet {
    pub(crate) fn new(realm: Realm, snapshot: Arc<SetSnapshot>) -> Self {
        Self { realm, snapshot }
    }

    pub fn version(&self) -> Version {
        self.snapshot.version
    }

    pub fn len(&self) -> usize {
        self.snapshot.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.subscriptions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Subscription> {
        self.snapshot.subscriptions.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Subscription> {
        self.snapshot.subscriptions.iter()
    }

    pub fn to_vec(&self) -> Vec<Subscription> {
        self.snapshot.subscriptions.clone()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Subscription> {
        types::find_by_name(&self.snapshot.subscriptions, name)
    }

    /// First subscription on the same object type and filter. Sort
    /// descriptors are ignored.
    pub fn find_by_query(&self, query: &Query) -> Option<&Subscription> {
        types::find_by_query(&self.snapshot.subscriptions, query)
    }

    pub fn state(&self) -> SubscriptionSetState {
        self.realm.store().status_of(self.snapshot.version).0
    }

    /// Server message, only present in the `Error` state.
    pub fn error(&self) -> Option<String> {
        self.realm.store().status_of(self.snapshot.version).1
    }

    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    /// Resolves once the server has acknowledged the latest version.
    ///
    /// Ready immediately when the set is `Complete` (`Ok`) or `Error`
    /// (`ServerRejected`). A superseded set follows the newest version.
    pub fn wait_for_synchronization(&self) -> SyncWait {
        SyncWait::new(self.realm.clone(), self.snapshot.version)
    }

    /// Mutate the subscriptions and commit the result as a new version,
    /// without waiting for the server.
    ///
    /// `callback` runs synchronously against a mutable copy of the latest
    /// version. If it returns an error nothing is committed and the error
    /// is returned unchanged. On success this handle moves to the new
    /// version. A callback that leaves the set unchanged does not create a
    /// version unless the latest one is in the `Error` state.
    pub fn update_no_wait<T, F>(&mut self, callback: F) -> Result<T>
    where
        F: FnOnce(&mut MutableSubscriptionSet<'_>, &Realm) -> Result<T>,
    {
        let store = self.realm.store();
        store.ensure_open()?;

        let current = store.latest_version();
        if self.snapshot.version < current {
            return Err(SyncError::Superseded {
                version: self.snapshot.version,
                current,
            });
        }

        let (value, snapshot) = {
            let guard = store.begin_write()?;
            let base = store.latest();
            let mut mutable = MutableSubscriptionSet::new(&self.realm, &base);
            let value = callback(&mut mutable, &self.realm).map_err(|e| {
                debug!(version = %base.version, error = %e, "update callback failed, nothing committed");
                e
            })?;
            let snapshot = store.commit(&guard, mutable.into_subscriptions())?;
            (value, snapshot)
        };

        self.snapshot = snapshot;
        store.events().drain();
        Ok(value)
    }

    /// Commit like [`update_no_wait`](Self::update_no_wait), then return a
    /// future for the server's answer on the committed version.
    ///
    /// Local failures are returned here; server rejections only through
    /// the future.
    pub fn update<F>(&mut self, callback: F) -> Result<SyncWait>
    where
        F: FnOnce(&mut MutableSubscriptionSet<'_>, &Realm) -> Result<()>,
    {
        self.update_no_wait(callback)?;
        Ok(self.wait_for_synchronization())
    }
}

impl Index<usize> for SubscriptionSet {
    type Output = Subscription;

    fn index(&self, index: usize) -> &Subscription {
        &self.snapshot.subscriptions[index]
    }
}

impl<'a> IntoIterator for &'a SubscriptionSet {
    type Item = &'a Subscription;
    type IntoIter = std::slice::Iter<'a, Subscription>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for SubscriptionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionSet")
            .field("version", &self.snapshot.version)
            .field("subscriptions", &self.snapshot.subscriptions)
            .finish()
    }
}
