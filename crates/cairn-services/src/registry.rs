//! Connection registry — send handles for unicast and broadcast delivery.
//!
//! A connection's send handle is the sending side of its writer task's
//! queue: anything accepted here is written to that connection's socket
//! in FIFO order, whether it came from the session's own task or from
//! another session's broadcast.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;

use cairn_core::Frame;

use crate::users::UserDirectory;

/// Send handle for one connection: encoded frames drained by its writer task.
pub type FrameSender = UnboundedSender<Bytes>;

pub struct ConnectionRegistry {
    connections: DashMap<u64, FrameSender>,
    users: Arc<UserDirectory>,
}

impl ConnectionRegistry {
    pub fn new(users: Arc<UserDirectory>) -> Self {
        Self {
            connections: DashMap::new(),
            users,
        }
    }

    /// Register a new connection's send handle.
    ///
    /// Returns false if the id is already registered — an existing entry
    /// is never overwritten.
    pub fn connect(&self, id: u64, sender: FrameSender) -> bool {
        match self.connections.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(sender);
                true
            }
        }
    }

    /// Queue a frame for one connection.
    ///
    /// Returns false if the id is unknown or its writer is gone. Safe to
    /// call from any task; delivery to a single id is FIFO.
    pub fn send(&self, id: u64, frame: &Frame) -> bool {
        match self.connections.get(&id) {
            Some(sender) => sender.send(frame.encode()).is_ok(),
            None => false,
        }
    }

    /// Remove a connection and its logged-in entry. Idempotent.
    ///
    /// After removal the id never resolves again; later sends to it
    /// report failure instead of erroring.
    pub fn disconnect(&self, id: u64) {
        if self.connections.remove(&id).is_some() {
            tracing::debug!(id, "connection deregistered");
        }
        let _ = self.users.logout(id);
    }

    /// Fan a frame out to every logged-in connection, best-effort.
    ///
    /// A missing or failing recipient never fails the caller.
    pub fn broadcast(&self, frame: &Frame) {
        let payload = frame.encode();
        let recipients = self.users.ids();
        tracing::debug!(recipients = recipients.len(), "broadcast");
        for id in recipients {
            if let Some(sender) = self.connections.get(&id) {
                let _ = sender.send(payload.clone());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
