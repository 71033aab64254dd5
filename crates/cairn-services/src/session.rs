//! Per-connection server session — the protocol engine.
//!
//! One `Session` per accepted connection, driven by its connection task:
//! every complete frame from the framer goes through [`Session::process`],
//! which updates session state, touches the file store under its guard,
//! and emits responses through the connection registry (unicast to the
//! session's own connection, broadcast to all logged-in connections for
//! store-change notifications).

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::BytesMut;

use cairn_core::wire::{self, ErrorKind, Frame, MAX_DATA_PAYLOAD};

use crate::registry::ConnectionRegistry;
use crate::store::{FileStore, StoreError};
use crate::users::UserDirectory;

/// Transfer state. Exactly one transfer may be active per session, and
/// only the fields of the active variant exist.
#[derive(Debug)]
enum Transfer {
    Idle,
    /// Outbound stop-and-wait queue (DATA frames, block-ordered). The head
    /// is the only block in flight; it is popped by its matching ACK.
    Sending { queue: VecDeque<Frame> },
    /// Inbound upload: the file being received and its bytes so far.
    Receiving { filename: String, data: BytesMut },
}

pub struct Session {
    id: u64,
    /// Set once the LOGRQ handshake succeeds.
    username: Option<String>,
    transfer: Transfer,
    terminated: bool,
    store: Arc<FileStore>,
    registry: Arc<ConnectionRegistry>,
    users: Arc<UserDirectory>,
}

impl Session {
    pub fn new(
        id: u64,
        store: Arc<FileStore>,
        registry: Arc<ConnectionRegistry>,
        users: Arc<UserDirectory>,
    ) -> Self {
        Self {
            id,
            username: None,
            transfer: Transfer::Idle,
            terminated: false,
            store,
            registry,
            users,
        }
    }

    /// Once true, the connection task must stop feeding frames and close.
    pub fn should_terminate(&self) -> bool {
        self.terminated
    }

    /// Interpret one complete inbound frame.
    pub async fn process(&mut self, frame: Frame) {
        if self.terminated {
            return;
        }

        // Everything except the login handshake requires a login.
        if self.username.is_none() && !matches!(frame, Frame::Login { .. }) {
            self.reply_error(ErrorKind::NotLoggedIn);
            return;
        }

        match frame {
            Frame::Login { username } => self.handle_login(username),
            Frame::Read { filename } => self.handle_read(&filename).await,
            Frame::Write { filename } => self.handle_write(filename).await,
            Frame::Delete { filename } => self.handle_delete(&filename).await,
            Frame::Data { block, payload } => self.handle_data(block, &payload).await,
            Frame::Ack { block } => self.handle_ack(block),
            Frame::List => self.handle_list().await,
            Frame::Disconnect => self.handle_disconnect(),
            Frame::Error { kind, message } => {
                tracing::warn!(
                    id = self.id,
                    code = kind.code(),
                    message = %message,
                    "peer reported error"
                );
            }
            // Only the server originates BCAST.
            Frame::Broadcast { .. } => self.reply_error(ErrorKind::IllegalOperation),
        }
    }

    fn handle_login(&mut self, username: String) {
        if self.username.is_some() || !self.users.login(self.id, &username) {
            self.reply_error(ErrorKind::AlreadyLoggedIn);
            return;
        }
        self.username = Some(username);
        self.ack(0);
    }

    async fn handle_read(&mut self, filename: &str) {
        if !matches!(self.transfer, Transfer::Idle) {
            self.reply_error(ErrorKind::AccessViolation);
            return;
        }
        match self.store.read(filename).await {
            Ok(contents) => {
                let queue: VecDeque<Frame> = wire::split_blocks(&contents).into();
                tracing::debug!(
                    id = self.id,
                    filename,
                    bytes = contents.len(),
                    blocks = queue.len(),
                    "read transfer started"
                );
                self.start_sending(queue);
            }
            Err(e) => self.reply_store_error(&e),
        }
    }

    async fn handle_write(&mut self, filename: String) {
        match self.store.exists(&filename).await {
            Ok(true) => {
                self.reply_error(ErrorKind::FileExists);
                return;
            }
            Ok(false) => {}
            Err(e) => {
                self.reply_store_error(&e);
                return;
            }
        }
        if !matches!(self.transfer, Transfer::Idle) {
            // A transfer is already running on this session.
            self.reply_error(ErrorKind::AccessViolation);
            return;
        }
        tracing::debug!(id = self.id, filename = %filename, "write transfer started");
        self.transfer = Transfer::Receiving {
            filename,
            data: BytesMut::new(),
        };
        self.ack(0);
    }

    async fn handle_data(&mut self, block: u16, payload: &[u8]) {
        let Transfer::Receiving { data, .. } = &mut self.transfer else {
            self.reply_error(ErrorKind::IllegalOperation);
            return;
        };
        data.extend_from_slice(payload);
        self.ack(block);

        // A short block (anything under 512 bytes, empty included) is the
        // end of the upload; a full 512-byte block never is.
        if payload.len() < MAX_DATA_PAYLOAD {
            let Transfer::Receiving { filename, data } =
                std::mem::replace(&mut self.transfer, Transfer::Idle)
            else {
                unreachable!("checked above");
            };
            match self.store.create(&filename, &data).await {
                Ok(()) => {
                    tracing::debug!(
                        id = self.id,
                        filename = %filename,
                        bytes = data.len(),
                        blocks = block,
                        "write transfer complete"
                    );
                    self.registry.broadcast(&Frame::Broadcast {
                        added: true,
                        filename,
                    });
                }
                Err(StoreError::Io(e)) => {
                    tracing::warn!(id = self.id, filename = %filename, error = %e, "file create failed");
                    self.reply_error(ErrorKind::DiskFull);
                }
                Err(e) => self.reply_store_error(&e),
            }
        }
    }

    fn handle_ack(&mut self, block: u16) {
        match std::mem::replace(&mut self.transfer, Transfer::Idle) {
            Transfer::Sending { mut queue } => {
                let head = match queue.front() {
                    Some(Frame::Data { block: head, .. }) => *head,
                    _ => unreachable!("sending queue is never empty"),
                };
                if head != block {
                    // Out-of-sequence ACK: report it, keep the queue as-is.
                    tracing::warn!(id = self.id, expected = head, got = block, "ack mismatch");
                    self.transfer = Transfer::Sending { queue };
                    self.reply_error(ErrorKind::NotDefined);
                    return;
                }
                queue.pop_front();
                match queue.front() {
                    Some(next) => {
                        let next = next.clone();
                        self.transfer = Transfer::Sending { queue };
                        self.send(&next);
                    }
                    None => {
                        tracing::debug!(id = self.id, "read transfer complete");
                    }
                }
            }
            other => {
                // Nothing in flight to acknowledge.
                self.transfer = other;
                self.reply_error(ErrorKind::NotDefined);
            }
        }
    }

    async fn handle_delete(&mut self, filename: &str) {
        match self.store.delete(filename).await {
            Ok(()) => {
                self.ack(0);
                self.registry.broadcast(&Frame::Broadcast {
                    added: false,
                    filename: filename.to_string(),
                });
            }
            Err(e) => self.reply_store_error(&e),
        }
    }

    async fn handle_list(&mut self) {
        if !matches!(self.transfer, Transfer::Idle) {
            self.reply_error(ErrorKind::AccessViolation);
            return;
        }
        match self.store.list().await {
            Ok(names) => {
                let listing = wire::encode_listing(&names);
                tracing::debug!(id = self.id, entries = names.len(), "listing transfer started");
                self.start_sending(wire::split_blocks(&listing).into());
            }
            Err(e) => self.reply_store_error(&e),
        }
    }

    fn handle_disconnect(&mut self) {
        // The ACK is queued while this connection is still registered;
        // the writer task drains it before the socket closes.
        self.ack(0);
        self.registry.disconnect(self.id);
        self.username = None;
        self.terminated = true;
        tracing::debug!(id = self.id, "session terminated");
    }

    /// Enter stop-and-wait: send the queue head, keep the rest for ACKs.
    fn start_sending(&mut self, queue: VecDeque<Frame>) {
        let first = queue
            .front()
            .cloned()
            .expect("split_blocks always yields at least one block");
        self.transfer = Transfer::Sending { queue };
        self.send(&first);
    }

    fn send(&self, frame: &Frame) {
        if !self.registry.send(self.id, frame) {
            tracing::warn!(id = self.id, "send to own connection failed");
        }
    }

    fn ack(&self, block: u16) {
        self.send(&Frame::Ack { block });
    }

    fn reply_error(&self, kind: ErrorKind) {
        tracing::debug!(id = self.id, code = kind.code(), "rejecting request");
        self.send(&Frame::error(kind));
    }

    fn reply_store_error(&self, err: &StoreError) {
        let kind = match err {
            StoreError::NotFound(_) => ErrorKind::FileNotFound,
            StoreError::AlreadyExists(_) => ErrorKind::FileExists,
            StoreError::InvalidName(_) => ErrorKind::AccessViolation,
            StoreError::Io(_) => ErrorKind::NotDefined,
        };
        self.reply_error(kind);
    }
}
