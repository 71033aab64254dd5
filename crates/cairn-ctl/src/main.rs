//! cairn-ctl — interactive cairn client.
//!
//! Two tasks share the protocol engine: this task reads keyboard
//! commands, a spawned task reads server frames. Everything outbound
//! funnels through one writer task so frames hit the socket in FIFO
//! order no matter which side produced them.

use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

use cairn_core::Framer;

mod command;
mod engine;

use engine::Engine;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let host = args.get(1).map(String::as_str).unwrap_or("127.0.0.1");
    let port = args.get(2).map(String::as_str).unwrap_or("7777");
    let addr = format!("{host}:{port}");

    let stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {addr}"))?;
    println!("connected to {addr}");
    println!("commands: LOGRQ <user> | RRQ <file> | WRQ <file> | DELRQ <file> | DIRQ | DISC");

    let (read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();

    let writer = tokio::spawn(async move {
        while let Some(buf) = rx.recv().await {
            if write_half.write_all(&buf).await.is_err() {
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let engine = Arc::new(Mutex::new(Engine::new(
        std::env::current_dir().context("cannot resolve working directory")?,
    )));

    let mut listener = tokio::spawn(listen(read_half, engine.clone(), tx.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            // Server side ended the session (DISC completed, connection
            // lost, or protocol error).
            _ = &mut listener => break,

            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match command::parse(line) {
                    Ok(cmd) => match engine.lock().await.submit(cmd) {
                        Ok(frame) => {
                            let _ = tx.send(frame.encode());
                        }
                        Err(e) => println!("{e}"),
                    },
                    Err(e) => println!("{e}"),
                }
            }
        }
    }

    drop(tx);
    let _ = writer.await;
    Ok(())
}

/// Socket side: bytes → framer → engine, replies back through the writer.
async fn listen(
    mut reader: OwnedReadHalf,
    engine: Arc<Mutex<Engine>>,
    tx: mpsc::UnboundedSender<Bytes>,
) {
    let mut framer = Framer::new();
    let mut buf = [0u8; 1024];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                println!("server closed the connection");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                println!("connection lost: {e}");
                return;
            }
        };

        for &byte in &buf[..n] {
            match framer.feed(byte) {
                Ok(None) => {}
                Ok(Some(frame)) => {
                    let (replies, terminated) = {
                        let mut engine = engine.lock().await;
                        let replies = engine.handle(frame);
                        (replies, engine.is_terminated())
                    };
                    for reply in replies {
                        let _ = tx.send(reply.encode());
                    }
                    if terminated {
                        return;
                    }
                }
                Err(e) => {
                    println!("protocol error: {e}");
                    return;
                }
            }
        }
    }
}
