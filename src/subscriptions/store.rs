//! Commit engine for one realm's subscription sets.
//!
//! Holds the latest committed snapshot and its status. Every transition
//! goes through the WAL first, then becomes visible, then raises events.
//! Events are only queued here; callers drain them once no lock is held.

use super::types::{SetSnapshot, Subscription, VersionStatus};
use crate::error::{Result, SyncError};
use crate::events::{ChangeSet, NotificationHub, SyncEvent};
use crate::sync::{SyncRequest, SyncTransport};
use crate::types::{SubscriptionSetState, Version};
use crate::wal::{WalOperation, WriteAheadLog};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::{self, ThreadId};
use tracing::{debug, info, trace, warn};

struct CoreState {
    latest: Arc<SetSnapshot>,
    status: VersionStatus,
    /// Tasks suspended in `SyncWait`, by wait id. A wait removes its
    /// entry when dropped, so this never outgrows the live waits.
    waiters: HashMap<u64, Waker>,
}

impl CoreState {
    fn wake_all(&mut self) {
        let waiters = std::mem::take(&mut self.waiters);
        trace!(count = waiters.len(), "waking sync waiters");
        for waker in waiters.into_values() {
            waker.wake();
        }
    }
}

#[derive(Default)]
struct SessionState {
    /// Set by a rejection, cleared by the next commit.
    paused: bool,
    last_delivered: Option<Version>,
}

/// Admits one mutation scope at a time.
struct WriterGate {
    holder: Mutex<Option<ThreadId>>,
    released: Condvar,
}

/// Releases the writer gate on drop, including when the callback panics.
pub(crate) struct WriteGuard<'a> {
    gate: &'a WriterGate,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        *self.gate.holder.lock() = None;
        self.gate.released.notify_one();
    }
}

impl WriterGate {
    fn new() -> Self {
        Self {
            holder: Mutex::new(None),
            released: Condvar::new(),
        }
    }

    /// Fails with `NestedUpdate` if this thread already holds the gate,
    /// waits if another thread does.
    fn acquire(&self) -> Result<WriteGuard<'_>> {
        let me = thread::current().id();
        let mut holder = self.holder.lock();
        loop {
            match *holder {
                None => {
                    *holder = Some(me);
                    return Ok(WriteGuard { gate: self });
                }
                Some(owner) if owner == me => return Err(SyncError::NestedUpdate),
                Some(_) => self.released.wait(&mut holder),
            }
        }
    }
}

pub(crate) struct SubscriptionStore {
    wal: WriteAheadLog,
    core: Mutex<CoreState>,
    gate: WriterGate,
    events: NotificationHub,
    transport: Arc<dyn SyncTransport>,
    session: Mutex<SessionState>,
    compact_threshold: usize,
    closed: AtomicBool,
    next_waiter: AtomicU64,
}

impl SubscriptionStore {
    /// Open the WAL at `wal_path` and rebuild the latest version from it.
    pub fn open(
        wal_path: &Path,
        transport: Arc<dyn SyncTransport>,
        compact_threshold: usize,
    ) -> Result<Self> {
        let wal = WriteAheadLog::open(wal_path)?;

        let mut latest = SetSnapshot::default();
        let mut status = VersionStatus::Pending;
        let entries = wal.entries()?;
        if let Some(last) = entries.last() {
            debug!(entries = entries.len(), last_write = ?last.timestamp, "replaying WAL");
        }
        for entry in entries {
            match entry.operation {
                WalOperation::Commit {
                    version,
                    subscriptions,
                } => {
                    latest = SetSnapshot::new(version, subscriptions);
                    status = VersionStatus::Pending;
                }
                WalOperation::State {
                    version,
                    status: recorded,
                } if version == latest.version => status = recorded,
                WalOperation::State { version, .. } => {
                    debug!(%version, latest = %latest.version, "skipping stale state entry");
                }
            }
        }

        info!(
            version = %latest.version,
            subscriptions = latest.subscriptions.len(),
            state = %status.state(),
            "subscription store opened"
        );

        let store = Self {
            wal,
            core: Mutex::new(CoreState {
                latest: Arc::new(latest),
                status,
                waiters: HashMap::new(),
            }),
            gate: WriterGate::new(),
            events: NotificationHub::new(),
            transport,
            session: Mutex::new(SessionState::default()),
            compact_threshold,
            closed: AtomicBool::new(false),
            next_waiter: AtomicU64::new(1),
        };

        {
            let core = store.core.lock();
            if let VersionStatus::Error(_) = core.status {
                store.session.lock().paused = true;
            }
            store.compact_if_needed(&core);
        }

        Ok(store)
    }

    // --- Reads ---

    pub fn latest(&self) -> Arc<SetSnapshot> {
        Arc::clone(&self.core.lock().latest)
    }

    pub fn latest_version(&self) -> Version {
        self.core.lock().latest.version
    }

    /// State and error message as seen by a handle on `version`.
    pub fn status_of(&self, version: Version) -> (SubscriptionSetState, Option<String>) {
        let core = self.core.lock();
        if version < core.latest.version {
            return (SubscriptionSetState::Superseded, None);
        }
        (
            core.status.state(),
            core.status.error().map(str::to_string),
        )
    }

    pub fn events(&self) -> &NotificationHub {
        &self.events
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(SyncError::RealmClosed);
        }
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.session.lock().paused
    }

    pub fn last_delivered(&self) -> Option<Version> {
        self.session.lock().last_delivered
    }

    // --- Writes ---

    /// Enter a mutation scope.
    pub fn begin_write(&self) -> Result<WriteGuard<'_>> {
        self.gate.acquire()
    }

    /// Commit `subscriptions` as the next version.
    ///
    /// Must be called while holding the write guard. Returns the latest
    /// snapshot, which is the previous one when nothing changed and the
    /// latest version is not in error.
    pub fn commit(
        &self,
        _guard: &WriteGuard<'_>,
        subscriptions: Vec<Subscription>,
    ) -> Result<Arc<SetSnapshot>> {
        self.ensure_open()?;

        let (snapshot, request) = {
            let mut core = self.core.lock();
            let previous = Arc::clone(&core.latest);
            let changes = ChangeSet::between(&previous.subscriptions, &subscriptions);

            let retrying = matches!(core.status, VersionStatus::Error(_));
            if changes.is_empty() && !retrying {
                debug!(version = %previous.version, "commit without changes, keeping version");
                return Ok(previous);
            }

            let version = previous.version.next();
            self.wal.log(WalOperation::Commit {
                version,
                subscriptions: subscriptions.clone(),
            })?;

            let request = SyncRequest {
                version,
                queries: subscriptions.iter().map(Subscription::descriptor).collect(),
            };
            let snapshot = Arc::new(SetSnapshot::new(version, subscriptions));
            core.latest = Arc::clone(&snapshot);
            core.status = VersionStatus::Pending;

            debug!(
                %version,
                inserted = changes.insertions.len(),
                deleted = changes.deletions.len(),
                modified = changes.modifications.len(),
                "subscription set committed"
            );

            self.events.enqueue(SyncEvent::Committed { version, changes });
            if !previous.version.is_initial() {
                self.events.enqueue(SyncEvent::Superseded {
                    version: previous.version,
                    by: version,
                });
            }
            self.events.enqueue(SyncEvent::StateChanged {
                version,
                state: SubscriptionSetState::Pending,
                error: None,
            });

            // Waiters on older versions now follow this one.
            core.wake_all();
            self.compact_if_needed(&core);
            (snapshot, request)
        };

        {
            let mut session = self.session.lock();
            session.paused = false;
            session.last_delivered = Some(request.version);
        }

        let version = request.version;
        if let Err(e) = self.transport.deliver(request) {
            warn!(%version, error = %e, "failed to deliver subscription set, will retry on resend");
        }

        Ok(snapshot)
    }

    /// Server accepted `version` and sent all matching data.
    pub fn acknowledge(&self, version: Version) -> Result<()> {
        self.ensure_open()?;
        {
            let mut core = self.core.lock();
            let latest = core.latest.version;
            if version > latest {
                return Err(SyncError::UnknownVersion { version, latest });
            }
            if version < latest || version.is_initial() {
                debug!(%version, %latest, "ignoring acknowledgement for superseded version");
                return Ok(());
            }
            match core.status {
                VersionStatus::Pending => {}
                VersionStatus::Complete => return Ok(()),
                VersionStatus::Error(_) => {
                    debug!(%version, "ignoring acknowledgement for rejected version");
                    return Ok(());
                }
            }

            self.wal.log(WalOperation::State {
                version,
                status: VersionStatus::Complete,
            })?;
            core.status = VersionStatus::Complete;
            info!(%version, "subscription set complete");

            self.events.enqueue(SyncEvent::StateChanged {
                version,
                state: SubscriptionSetState::Complete,
                error: None,
            });
            core.wake_all();
            self.compact_if_needed(&core);
        }
        self.events.drain();
        Ok(())
    }

    /// Server rejected `version`. Sync pauses until the next commit.
    pub fn reject(&self, version: Version, message: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        let message = message.into();
        {
            let mut core = self.core.lock();
            let latest = core.latest.version;
            if version > latest {
                return Err(SyncError::UnknownVersion { version, latest });
            }
            if version < latest || version.is_initial() {
                debug!(%version, %latest, "ignoring rejection for superseded version");
                return Ok(());
            }
            if core.status.error() == Some(message.as_str()) {
                return Ok(());
            }

            let status = VersionStatus::Error(message.clone());
            self.wal.log(WalOperation::State {
                version,
                status: status.clone(),
            })?;
            core.status = status;
            self.session.lock().paused = true;
            warn!(%version, error = %message, "subscription set rejected by server");

            self.events.enqueue(SyncEvent::StateChanged {
                version,
                state: SubscriptionSetState::Error,
                error: Some(message),
            });
            core.wake_all();
            self.compact_if_needed(&core);
        }
        self.events.drain();
        Ok(())
    }

    /// Deliver the latest version again if it is still pending.
    ///
    /// Returns whether a request was sent.
    pub fn resend(&self) -> Result<bool> {
        self.ensure_open()?;
        let request = {
            let core = self.core.lock();
            if core.latest.version.is_initial() || core.status != VersionStatus::Pending {
                return Ok(false);
            }
            SyncRequest {
                version: core.latest.version,
                queries: core
                    .latest
                    .subscriptions
                    .iter()
                    .map(Subscription::descriptor)
                    .collect(),
            }
        };
        let version = request.version;
        self.transport.deliver(request)?;
        self.session.lock().last_delivered = Some(version);
        debug!(%version, "pending subscription set re-delivered");
        Ok(true)
    }

    /// Id for a new `SyncWait`.
    pub fn register_waiter(&self) -> u64 {
        self.next_waiter.fetch_add(1, Ordering::Relaxed)
    }

    /// Drop the waker stored for `waiter`, if any.
    pub fn forget_waiter(&self, waiter: u64) {
        self.core.lock().waiters.remove(&waiter);
    }

    #[cfg(test)]
    pub(crate) fn waiter_count(&self) -> usize {
        self.core.lock().waiters.len()
    }

    /// Poll for the outcome of the latest version on behalf of `waiter`.
    pub fn poll_synchronized(
        &self,
        waiter: u64,
        version: Version,
        cx: &mut Context<'_>,
    ) -> Poll<Result<()>> {
        let mut core = self.core.lock();
        // Checked under the core lock so `close` cannot slip in between.
        if self.is_closed() {
            return Poll::Ready(Err(SyncError::RealmClosed));
        }
        if core.latest.version.is_initial() {
            return Poll::Ready(Err(SyncError::NothingCommitted));
        }
        match core.status.clone() {
            VersionStatus::Complete => Poll::Ready(Ok(())),
            VersionStatus::Error(message) => Poll::Ready(Err(SyncError::ServerRejected {
                version: core.latest.version,
                message,
            })),
            VersionStatus::Pending => {
                trace!(%version, latest = %core.latest.version, "waiting for synchronization");
                match core.waiters.get_mut(&waiter) {
                    Some(waker) if waker.will_wake(cx.waker()) => {}
                    Some(waker) => *waker = cx.waker().clone(),
                    None => {
                        core.waiters.insert(waiter, cx.waker().clone());
                    }
                }
                Poll::Pending
            }
        }
    }

    /// Reject pending waits and drop event channels. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.core.lock().wake_all();
        self.events.close();
        info!("subscription store closed");
    }

    /// Rewrite the WAL as a checkpoint once it outgrows the threshold.
    /// The triggering entry is already durable, so failures are only logged.
    fn compact_if_needed(&self, core: &CoreState) {
        if self.wal.len() <= self.compact_threshold {
            return;
        }
        let checkpoint = vec![
            WalOperation::Commit {
                version: core.latest.version,
                subscriptions: core.latest.subscriptions.clone(),
            },
            WalOperation::State {
                version: core.latest.version,
                status: core.status.clone(),
            },
        ];
        if let Err(e) = self.wal.rewrite(checkpoint) {
            warn!(error = %e, "WAL compaction failed");
        }
    }
}
