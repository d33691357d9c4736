//! Incoming side of the sync session.

use crate::error::Result;
use crate::realm::Realm;
use crate::types::Version;

/// Entry points for the sync service's answers about committed versions.
///
/// Obtained from [`Realm::sync_session`]. Cheap to clone and safe to use
/// from any thread; waiters and listeners are notified on the calling
/// thread.
#[derive(Clone, Debug)]
pub struct SyncSession {
    realm: Realm,
}

impl SyncSession {
    pub(crate) fn new(realm: Realm) -> Self {
        Self { realm }
    }

    /// The server accepted `version` and sent all matching data.
    ///
    /// Answers for superseded versions are ignored. Fails with
    /// `UnknownVersion` for a version that was never committed.
    pub fn acknowledge(&self, version: Version) -> Result<()> {
        self.realm.store().acknowledge(version)
    }

    /// The server refused `version`. The latest set moves to `Error` and
    /// sync stays paused until the next commit.
    pub fn reject(&self, version: Version, message: impl Into<String>) -> Result<()> {
        self.realm.store().reject(version, message)
    }

    /// Deliver the latest version again if it is still pending. Returns
    /// whether a request was sent.
    pub fn resend(&self) -> Result<bool> {
        self.realm.store().resend()
    }

    /// True after a rejection, until the next commit.
    pub fn is_paused(&self) -> bool {
        self.realm.store().is_paused()
    }

    /// Last version handed to the transport.
    pub fn last_delivered(&self) -> Option<Version> {
        self.realm.store().last_delivered()
    }
}
