//! Outgoing side of the sync session.

use crate::error::{Result, SyncError};
use crate::query::QueryDescriptor;
use crate::types::Version;
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

/// A committed version on its way to the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub version: Version,
    pub queries: Vec<QueryDescriptor>,
}

/// Delivers committed versions to the sync service.
///
/// Called after the commit is durable, outside any realm lock. Errors are
/// logged and leave the version `Pending`; the request is sent again on
/// the next open or `SyncSession::resend`.
pub trait SyncTransport: Send + Sync {
    fn deliver(&self, request: SyncRequest) -> Result<()>;
}

/// Transport that hands requests to a crossbeam channel.
///
/// The receiving end plays the server: it reads requests and answers
/// through [`SyncSession`](super::SyncSession).
#[derive(Clone)]
pub struct ChannelTransport {
    sender: Sender<SyncRequest>,
}

impl SyncTransport for ChannelTransport {
    fn deliver(&self, request: SyncRequest) -> Result<()> {
        self.sender
            .send(request)
            .map_err(|_| SyncError::Transport("sync channel disconnected".into()))
    }
}

/// Create a channel transport and the receiver for its requests.
pub fn channel_transport() -> (ChannelTransport, Receiver<SyncRequest>) {
    let (sender, receiver) = unbounded();
    (ChannelTransport { sender }, receiver)
}

/// Transport that discards every request.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullTransport;

impl SyncTransport for NullTransport {
    fn deliver(&self, _request: SyncRequest) -> Result<()> {
        Ok(())
    }
}
