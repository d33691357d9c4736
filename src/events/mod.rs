//! Change notification for subscription sets.
//!
//! Every commit and state transition raises a [`SyncEvent`]. Events are
//! queued while the realm is locked and delivered afterwards, in order,
//! to two kinds of consumers:
//! - channel subscribers with a bounded buffer (slow ones are dropped)
//! - callback listeners, invoked in registration order
//!
//! # Example
//!
//! ```ignore
//! let handle = realm.events().subscribe(EventConfig {
//!     filter: EventFilter::states(),
//!     ..Default::default()
//! });
//!
//! loop {
//!     match handle.recv() {
//!         Ok(SyncEvent::StateChanged { version, state, .. }) => println!("{version}: {state}"),
//!         Ok(SyncEvent::Dropped { .. }) | Err(_) => break,
//!         Ok(_) => {}
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::{Listener, NotificationHub};
pub use types::{
    ChangeSet, DropReason, EventConfig, EventFilter, EventHandle, ListenerId, SubscriberId,
    SyncEvent,
};
