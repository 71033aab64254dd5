//! TCP accept loop and per-connection plumbing.
//!
//! One reader task per connection drives bytes → framer → session; one
//! writer task drains the connection's outbound queue (the registry's
//! send handle) to the socket. The writer exists so broadcasts from other
//! sessions' tasks interleave safely with the session's own responses.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use cairn_core::{ErrorKind, Frame, Framer};

use crate::registry::ConnectionRegistry;
use crate::session::Session;
use crate::store::FileStore;
use crate::users::UserDirectory;

/// Connection ids are process-wide and never reused while a connection
/// is open.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Accept connections forever, one session per connection.
pub async fn run(
    listener: TcpListener,
    store: Arc<FileStore>,
    registry: Arc<ConnectionRegistry>,
    users: Arc<UserDirectory>,
) -> Result<()> {
    loop {
        let (socket, addr) = listener.accept().await?;
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        tracing::info!(id, peer = %addr, "connection accepted");

        let store = store.clone();
        let registry = registry.clone();
        let users = users.clone();
        tokio::spawn(async move {
            handle_connection(socket, id, store, registry, users).await;
        });
    }
}

async fn handle_connection(
    socket: TcpStream,
    id: u64,
    store: Arc<FileStore>,
    registry: Arc<ConnectionRegistry>,
    users: Arc<UserDirectory>,
) {
    let (reader, mut writer) = socket.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();

    if !registry.connect(id, tx) {
        tracing::warn!(id, "connection id collision, dropping connection");
        return;
    }

    // Writer: drains until every send handle for this id is gone
    // (i.e. the registry entry was removed), then closes the socket.
    let writer_task = tokio::spawn(async move {
        while let Some(buf) = rx.recv().await {
            if writer.write_all(&buf).await.is_err() {
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    let session = Session::new(id, store, registry.clone(), users);
    read_loop(reader, id, session, &registry).await;

    registry.disconnect(id);
    let _ = writer_task.await;
    tracing::info!(id, "connection closed");
}

/// Feed socket bytes through the framer into the session until the peer
/// hangs up, the session terminates, or framing fails.
async fn read_loop(
    mut reader: OwnedReadHalf,
    id: u64,
    mut session: Session,
    registry: &ConnectionRegistry,
) {
    let mut framer = Framer::new();
    let mut buf = [0u8; 1024];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(id, error = %e, "socket read failed");
                return;
            }
        };

        for &byte in &buf[..n] {
            match framer.feed(byte) {
                Ok(None) => {}
                Ok(Some(frame)) => {
                    session.process(frame).await;
                    if session.should_terminate() {
                        return;
                    }
                }
                Err(e) => {
                    // Framing errors are unrecoverable: tell the peer
                    // best-effort and drop the connection.
                    tracing::warn!(id, error = %e, "framing error, closing connection");
                    let _ = registry.send(id, &Frame::error(ErrorKind::IllegalOperation));
                    return;
                }
            }
        }
    }
}
