//! Notification hub for subscription set events.

use crossbeam_channel::{bounded, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

use super::types::{
    DropReason, EventConfig, EventHandle, ListenerId, SubscriberId, SyncEvent,
};

/// Callback invoked for every event.
pub type Listener = dyn Fn(&SyncEvent) + Send + Sync;

/// Internal channel state.
struct Subscriber {
    config: EventConfig,
    sender: Sender<SyncEvent>,
}

impl Subscriber {
    /// Try to send an event. Returns false if buffer is full (subscriber will be dropped).
    fn try_send(&self, event: SyncEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(crossbeam_channel::TrySendError::Full(_)) => false,
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Queues events raised under the realm lock and dispatches them later,
/// on the thread that raised them.
pub struct NotificationHub {
    /// Event channels by ID.
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
    /// Callback listeners in registration order.
    listeners: RwLock<Vec<(ListenerId, Arc<Listener>)>>,
    /// Events waiting for dispatch.
    queue: Mutex<VecDeque<SyncEvent>>,
    /// Counter for generating channel and listener IDs.
    next_id: AtomicU64,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            queue: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
        }
    }

    // --- Channels ---

    /// Open an event channel.
    pub fn subscribe(&self, config: EventConfig) -> EventHandle {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size);

        self.subscribers
            .write()
            .insert(id, Subscriber { config, sender });

        EventHandle { id, receiver }
    }

    /// Close an event channel.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut subs = self.subscribers.write();
        if let Some(sub) = subs.remove(&id) {
            // Send dropped event (best effort)
            let _ = sub.sender.try_send(SyncEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    // --- Listeners ---

    /// Register a callback. Callbacks run in registration order.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Returns false if the listener was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn remove_all_listeners(&self) {
        self.listeners.write().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    // --- Dispatch ---

    /// Queue an event for the next `drain`.
    pub(crate) fn enqueue(&self, event: SyncEvent) {
        self.queue.lock().push_back(event);
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Deliver queued events in FIFO order.
    ///
    /// Must not be called while holding the realm lock: listeners may call
    /// back into the realm.
    pub(crate) fn drain(&self) {
        loop {
            let next = self.queue.lock().pop_front();
            match next {
                Some(event) => self.broadcast(event),
                None => break,
            }
        }
    }

    /// Drop every channel, telling it the realm closed.
    pub(crate) fn close(&self) {
        self.queue.lock().clear();
        let mut subs = self.subscribers.write();
        for (_, sub) in subs.drain() {
            let _ = sub.sender.try_send(SyncEvent::Dropped {
                reason: DropReason::Closed,
            });
        }
        self.listeners.write().clear();
    }

    /// Send to channels and listeners. Drops channels that fail to receive.
    fn broadcast(&self, event: SyncEvent) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscribers.read();
            for (id, sub) in subs.iter() {
                if sub.config.filter.accepts(&event) && !sub.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        // Remove dropped channels
        if !to_remove.is_empty() {
            let mut subs = self.subscribers.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    warn!(subscriber = id.0, "dropping slow event subscriber");
                    // Try to notify about the drop (might fail, that's ok)
                    let _ = sub.sender.try_send(SyncEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }

        // Snapshot so listeners can add or remove listeners.
        let listeners: Vec<Arc<Listener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        trace!(listeners = listeners.len(), ?event, "dispatching event");
        for listener in listeners {
            listener(&event);
        }
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}
