//! Event types for subscription set notifications.

use crate::subscriptions::Subscription;
use crate::types::{SubscriptionId, SubscriptionSetState, Version};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for an event channel.
#[derive(Clone, Debug)]
pub struct EventConfig {
    /// Max buffered events before dropping the subscriber.
    /// Default: 256
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: EventFilter,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            buffer_size: 256,
            filter: EventFilter::all(),
        }
    }
}

/// Which events a channel receives.
#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    /// Include commit events.
    pub include_commits: bool,

    /// Include state transitions (pending, complete, error).
    pub include_state_changes: bool,

    /// Include superseded notices.
    pub include_superseded: bool,
}

impl EventFilter {
    /// Only commits.
    pub fn commits() -> Self {
        Self {
            include_commits: true,
            ..Default::default()
        }
    }

    /// Only state transitions.
    pub fn states() -> Self {
        Self {
            include_state_changes: true,
            ..Default::default()
        }
    }

    /// Everything.
    pub fn all() -> Self {
        Self {
            include_commits: true,
            include_state_changes: true,
            include_superseded: true,
        }
    }

    pub(crate) fn accepts(&self, event: &SyncEvent) -> bool {
        match event {
            SyncEvent::Committed { .. } => self.include_commits,
            SyncEvent::StateChanged { .. } => self.include_state_changes,
            SyncEvent::Superseded { .. } => self.include_superseded,
            SyncEvent::Dropped { .. } => true,
        }
    }
}

/// Events emitted by a realm's subscription store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A new subscription set version was committed locally.
    Committed {
        version: Version,
        changes: ChangeSet,
    },

    /// The latest version changed synchronization state.
    StateChanged {
        version: Version,
        state: SubscriptionSetState,
        /// Server message, only for `error`.
        error: Option<String>,
    },

    /// An older version stopped being authoritative.
    Superseded {
        version: Version,
        by: Version,
    },

    /// Channel was dropped.
    Dropped {
        reason: DropReason,
    },
}

/// Why an event channel was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Realm was closed.
    Closed,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Difference between two consecutive versions.
///
/// Fields are ordered the way listeners should apply them: insertions and
/// deletions first, then in-place query replacements.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub insertions: Vec<SubscriptionId>,
    pub deletions: Vec<SubscriptionId>,
    pub modifications: Vec<SubscriptionId>,
}

impl ChangeSet {
    /// Diff `before` against `after` by subscription id.
    pub fn between(before: &[Subscription], after: &[Subscription]) -> Self {
        let old: HashMap<SubscriptionId, &Subscription> =
            before.iter().map(|s| (s.id(), s)).collect();
        let new: HashMap<SubscriptionId, &Subscription> =
            after.iter().map(|s| (s.id(), s)).collect();

        let mut changes = ChangeSet::default();
        for sub in after {
            match old.get(&sub.id()) {
                None => changes.insertions.push(sub.id()),
                Some(prev) if !prev.same_content(sub) => changes.modifications.push(sub.id()),
                Some(_) => {}
            }
        }
        for sub in before {
            if !new.contains_key(&sub.id()) {
                changes.deletions.push(sub.id());
            }
        }
        changes
    }

    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty() && self.deletions.is_empty() && self.modifications.is_empty()
    }
}

/// Unique identifier for an event channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub u64);

/// Unique identifier for a callback listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Handle to an event channel.
pub struct EventHandle {
    pub id: SubscriberId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<SyncEvent>,
}

impl EventHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<SyncEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<SyncEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<SyncEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything currently buffered.
    pub fn drain(&self) -> Vec<SyncEvent> {
        self.receiver.try_iter().collect()
    }
}
