//! Cairn integration test harness.
//!
//! Each test starts a real server on a loopback socket and drives it with
//! raw wire bytes through [`TestClient`], exercising the framer, session
//! engine, registries, and store guard end to end. No external setup is
//! required; every server gets its own temp-dir store.

mod sessions;
mod transfers;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use cairn_core::{Frame, Framer};
use cairn_services::{server, ConnectionRegistry, FileStore, UserDirectory};

// ── Harness ───────────────────────────────────────────────────────────────────

static NEXT_STORE: AtomicU32 = AtomicU32::new(0);

/// How long to wait for a frame the server is expected to send.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to listen before concluding the server sent nothing.
const SILENCE_WINDOW: Duration = Duration::from_millis(200);

/// A server running in-process, plus the store directory behind it.
pub struct TestServer {
    pub addr: SocketAddr,
    pub root: PathBuf,
    pub store: Arc<FileStore>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

/// Start a server on an ephemeral loopback port with a fresh store.
pub async fn start_server() -> Result<TestServer> {
    let root = std::env::temp_dir().join(format!(
        "cairn-it-{}-{}",
        std::process::id(),
        NEXT_STORE.fetch_add(1, Ordering::Relaxed)
    ));
    let _ = std::fs::remove_dir_all(&root);

    let store = Arc::new(FileStore::new(&root)?);
    let users = Arc::new(UserDirectory::new());
    let registry = Arc::new(ConnectionRegistry::new(users.clone()));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("failed to bind loopback listener")?;
    let addr = listener.local_addr()?;

    let accept_store = store.clone();
    tokio::spawn(async move {
        let _ = server::run(listener, accept_store, registry, users).await;
    });

    Ok(TestServer { addr, root, store })
}

/// A raw protocol client: sends encoded frames, reads frames back through
/// the real framer.
pub struct TestClient {
    pub stream: TcpStream,
    framer: Framer,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .context("failed to connect test client")?;
        Ok(Self {
            stream,
            framer: Framer::new(),
        })
    }

    pub async fn send(&mut self, frame: &Frame) -> Result<()> {
        self.stream.write_all(&frame.encode()).await?;
        Ok(())
    }

    /// Read until one complete frame arrives.
    pub async fn recv(&mut self) -> Result<Frame> {
        timeout(RECV_TIMEOUT, async {
            loop {
                let byte = self.stream.read_u8().await?;
                if let Some(frame) = self.framer.feed(byte)? {
                    return Ok(frame);
                }
            }
        })
        .await
        .context("timed out waiting for a frame")?
    }

    /// Assert the server sends nothing within the silence window.
    pub async fn expect_silence(&mut self) -> Result<()> {
        let mut byte = [0u8; 1];
        match timeout(SILENCE_WINDOW, self.stream.read(&mut byte)).await {
            Err(_) => Ok(()), // timed out: silence, as expected
            Ok(Ok(0)) => bail!("connection closed while expecting silence"),
            Ok(Ok(_)) => bail!("unexpected byte from server: {:#04x}", byte[0]),
            Ok(Err(e)) => Err(e.into()),
        }
    }

    /// Assert the server closed the connection.
    pub async fn expect_closed(&mut self) -> Result<()> {
        let mut byte = [0u8; 1];
        match timeout(RECV_TIMEOUT, self.stream.read(&mut byte)).await {
            Ok(Ok(0)) => Ok(()),
            Ok(Ok(_)) => bail!("expected EOF, got a byte"),
            Ok(Err(_)) => Ok(()), // reset also counts as closed
            Err(_) => bail!("timed out waiting for the connection to close"),
        }
    }

    /// Log in and consume the ACK.
    pub async fn login(&mut self, username: &str) -> Result<()> {
        self.send(&Frame::Login {
            username: username.to_string(),
        })
        .await?;
        let reply = self.recv().await?;
        if reply != (Frame::Ack { block: 0 }) {
            bail!("login as {username} failed: {reply:?}");
        }
        Ok(())
    }

    /// Pull a whole stop-and-wait transfer, acking every block; returns
    /// the reassembled bytes.
    pub async fn pull_transfer(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let frame = self.recv().await?;
            let Frame::Data { block, payload } = frame else {
                bail!("expected a data block, got {frame:?}");
            };
            out.extend_from_slice(&payload);
            let last = payload.len() < cairn_core::MAX_DATA_PAYLOAD;
            self.send(&Frame::Ack { block }).await?;
            if last {
                return Ok(out);
            }
        }
    }
}
