//! Boundary to the sync service.
//!
//! Committed versions leave through a [`SyncTransport`]; the server's
//! answers come back through [`SyncSession`].

mod session;
mod transport;

pub use session::SyncSession;
pub use transport::{channel_transport, ChannelTransport, NullTransport, SyncRequest, SyncTransport};
