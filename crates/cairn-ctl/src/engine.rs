//! Client-side protocol engine — the mirror of the server session.
//!
//! The keyboard task submits commands, the socket task hands in server
//! frames; the engine tracks the single request allowed in flight and
//! says what to send back. User-facing output goes straight to stdout:
//! this is an interactive tool.

use std::collections::VecDeque;
use std::path::PathBuf;

use bytes::BytesMut;

use cairn_core::wire::{self, ErrorKind, Frame, MAX_DATA_PAYLOAD};

use crate::command::Command;

/// The request currently awaiting its response, if any.
#[derive(Debug)]
enum Pending {
    None,
    Login,
    /// RRQ sent; DATA blocks accumulate here.
    Download { filename: String, data: BytesMut },
    /// DIRQ sent; listing bytes accumulate here.
    Listing { data: BytesMut },
    /// WRQ sent; the file's bytes wait for the server's go-ahead ACK 0.
    UploadPending { content: Vec<u8> },
    /// Upload running: stop-and-wait queue of DATA frames.
    Uploading { queue: VecDeque<Frame> },
    Delete,
    Disconnect,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("still waiting for the server's reply to the previous request")]
    Busy,

    #[error("cannot read {path}: {source}")]
    LocalRead {
        path: String,
        source: std::io::Error,
    },
}

pub struct Engine {
    pending: Pending,
    /// Where downloaded files land.
    download_dir: PathBuf,
    terminated: bool,
}

impl Engine {
    pub fn new(download_dir: PathBuf) -> Self {
        Self {
            pending: Pending::None,
            download_dir,
            terminated: false,
        }
    }

    /// True once the DISC exchange completed; the client should exit.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Turn a keyboard command into the frame to send.
    ///
    /// Strict one-request-at-a-time: anything submitted while a reply is
    /// outstanding is refused locally.
    pub fn submit(&mut self, command: Command) -> Result<Frame, EngineError> {
        if !matches!(self.pending, Pending::None) {
            return Err(EngineError::Busy);
        }

        match command {
            Command::Login { username } => {
                self.pending = Pending::Login;
                Ok(Frame::Login { username })
            }
            Command::Read { filename } => {
                self.pending = Pending::Download {
                    filename: filename.clone(),
                    data: BytesMut::new(),
                };
                Ok(Frame::Read { filename })
            }
            Command::Write { filename } => {
                // Read the file up front so a missing path fails locally
                // instead of leaving the server waiting for blocks.
                let content =
                    std::fs::read(&filename).map_err(|source| EngineError::LocalRead {
                        path: filename.clone(),
                        source,
                    })?;
                self.pending = Pending::UploadPending { content };
                Ok(Frame::Write { filename })
            }
            Command::Delete { filename } => {
                self.pending = Pending::Delete;
                Ok(Frame::Delete { filename })
            }
            Command::List => {
                self.pending = Pending::Listing {
                    data: BytesMut::new(),
                };
                Ok(Frame::List)
            }
            Command::Disconnect => {
                self.pending = Pending::Disconnect;
                Ok(Frame::Disconnect)
            }
        }
    }

    /// Handle a server frame; returns the frames to send in reply.
    pub fn handle(&mut self, frame: Frame) -> Vec<Frame> {
        match frame {
            Frame::Data { block, payload } => self.handle_data(block, &payload),
            Frame::Ack { block } => self.handle_ack(block),
            Frame::Error { kind, message } => {
                println!("Error {} ({})", kind.code(), message);
                // The outstanding request is dead; allow a new one.
                self.pending = Pending::None;
                Vec::new()
            }
            Frame::Broadcast { added, filename } => {
                println!("BCAST {} {}", if added { "add" } else { "del" }, filename);
                Vec::new()
            }
            // The server never sends requests.
            other => {
                println!("unexpected frame from server: {:?}", other.opcode());
                vec![Frame::error(ErrorKind::IllegalOperation)]
            }
        }
    }

    fn handle_data(&mut self, block: u16, payload: &[u8]) -> Vec<Frame> {
        let is_final = payload.len() < MAX_DATA_PAYLOAD;

        match &mut self.pending {
            Pending::Download { data, .. } => {
                data.extend_from_slice(payload);
                if is_final {
                    let Pending::Download { filename, data } =
                        std::mem::replace(&mut self.pending, Pending::None)
                    else {
                        unreachable!("checked above");
                    };
                    let path = self.download_dir.join(&filename);
                    match std::fs::write(&path, &data) {
                        Ok(()) => println!("downloaded {} ({} bytes)", filename, data.len()),
                        Err(e) => println!("failed to save {}: {}", path.display(), e),
                    }
                }
                vec![Frame::Ack { block }]
            }
            Pending::Listing { data } => {
                data.extend_from_slice(payload);
                if is_final {
                    let Pending::Listing { data } =
                        std::mem::replace(&mut self.pending, Pending::None)
                    else {
                        unreachable!("checked above");
                    };
                    for name in wire::decode_listing(&data) {
                        println!("{name}");
                    }
                }
                vec![Frame::Ack { block }]
            }
            _ => {
                println!("unexpected DATA block {block} from server");
                vec![Frame::error(ErrorKind::IllegalOperation)]
            }
        }
    }

    fn handle_ack(&mut self, block: u16) -> Vec<Frame> {
        match std::mem::replace(&mut self.pending, Pending::None) {
            Pending::Login => {
                println!("logged in");
                Vec::new()
            }
            Pending::Delete => {
                println!("file deleted");
                Vec::new()
            }
            Pending::UploadPending { content } => {
                if block != 0 {
                    println!("unexpected ACK {block} for write request");
                    return vec![Frame::error(ErrorKind::NotDefined)];
                }
                // Go-ahead received: start the stop-and-wait upload.
                let queue: VecDeque<Frame> = wire::split_blocks(&content).into();
                let first = queue
                    .front()
                    .cloned()
                    .expect("split_blocks always yields at least one block");
                self.pending = Pending::Uploading { queue };
                vec![first]
            }
            Pending::Uploading { mut queue } => {
                let head = match queue.front() {
                    Some(Frame::Data { block: head, .. }) => *head,
                    _ => unreachable!("upload queue is never empty"),
                };
                if head != block {
                    println!("server acknowledged block {block}, expected {head}");
                    self.pending = Pending::Uploading { queue };
                    return vec![Frame::error(ErrorKind::NotDefined)];
                }
                queue.pop_front();
                match queue.front() {
                    Some(next) => {
                        let next = next.clone();
                        self.pending = Pending::Uploading { queue };
                        vec![next]
                    }
                    None => {
                        println!("upload complete");
                        Vec::new()
                    }
                }
            }
            Pending::Disconnect => {
                // The DISC exchange is complete; this is the exit signal.
                println!("disconnected");
                self.terminated = true;
                Vec::new()
            }
            other => {
                self.pending = other;
                println!("unexpected ACK {block} from server");
                vec![Frame::error(ErrorKind::NotDefined)]
            }
        }
    }
}
