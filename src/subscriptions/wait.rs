//! Future resolving when the server answers a committed version.

use crate::error::Result;
use crate::realm::Realm;
use crate::types::Version;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Returned by [`SubscriptionSet::wait_for_synchronization`] and
/// [`SubscriptionSet::update`].
///
/// Resolves with:
/// - `Ok(())` once the latest version is `Complete`
/// - `Err(ServerRejected)` once it is `Error`
/// - `Err(NothingCommitted)` if the realm never committed a version
/// - `Err(RealmClosed)` if the realm is closed first
///
/// If newer versions are committed while waiting, the outcome is that of
/// the newest one. There is no timeout; race it against one if needed.
/// Dropping the future unregisters it from the realm.
///
/// [`SubscriptionSet::wait_for_synchronization`]: super::SubscriptionSet::wait_for_synchronization
/// [`SubscriptionSet::update`]: super::SubscriptionSet::update
#[must_use = "futures do nothing unless polled"]
pub struct SyncWait {
    realm: Realm,
    version: Version,
    waiter: u64,
}

impl SyncWait {
    pub(crate) fn new(realm: Realm, version: Version) -> Self {
        let waiter = realm.store().register_waiter();
        Self {
            realm,
            version,
            waiter,
        }
    }

    /// Version the wait was started on.
    pub fn version(&self) -> Version {
        self.version
    }
}

impl Future for SyncWait {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.realm
            .store()
            .poll_synchronized(self.waiter, self.version, cx)
    }
}

impl Drop for SyncWait {
    fn drop(&mut self) {
        self.realm.store().forget_waiter(self.waiter);
    }
}

impl fmt::Debug for SyncWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncWait")
            .field("version", &self.version)
            .finish()
    }
}
