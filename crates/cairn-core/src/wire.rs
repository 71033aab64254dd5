//! Cairn wire format — every frame that crosses a connection.
//!
//! These types ARE the protocol. Opcodes, error codes, field order, and the
//! 512-byte payload ceiling are all fixed; changing anything here is a
//! breaking change for every deployed peer.
//!
//! All multi-byte integers are big-endian. Textual fields (usernames,
//! filenames, error messages) are UTF-8 and zero-terminated on the wire;
//! only the DATA payload carries an explicit length.

use bytes::{BufMut, Bytes, BytesMut};

/// Maximum DATA payload size in bytes.
///
/// A payload shorter than this is the end-of-transfer sentinel, so a
/// transfer whose length is an exact multiple of 512 ends with an empty
/// DATA block. See [`split_blocks`].
pub const MAX_DATA_PAYLOAD: usize = 512;

// ── Opcodes ───────────────────────────────────────────────────────────────────

/// 2-byte frame type identifier, sent big-endian as the first frame field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
    /// Read a file from the store.
    Rrq = 1,
    /// Write a file into the store.
    Wrq = 2,
    /// One block of transfer payload.
    Data = 3,
    /// Acknowledge a request or a DATA block.
    Ack = 4,
    /// Report a protocol or store error to the peer.
    Error = 5,
    /// List the store's contents.
    Dirq = 6,
    /// Log in with a username.
    Logrq = 7,
    /// Delete a file from the store.
    Delrq = 8,
    /// Server-pushed store-change notification.
    Bcast = 9,
    /// Orderly disconnect.
    Disc = 10,
}

impl TryFrom<u16> for Opcode {
    type Error = WireError;

    fn try_from(value: u16) -> Result<Self, WireError> {
        match value {
            1 => Ok(Opcode::Rrq),
            2 => Ok(Opcode::Wrq),
            3 => Ok(Opcode::Data),
            4 => Ok(Opcode::Ack),
            5 => Ok(Opcode::Error),
            6 => Ok(Opcode::Dirq),
            7 => Ok(Opcode::Logrq),
            8 => Ok(Opcode::Delrq),
            9 => Ok(Opcode::Bcast),
            10 => Ok(Opcode::Disc),
            other => Err(WireError::UnknownOpcode(other)),
        }
    }
}

// ── Error kinds ───────────────────────────────────────────────────────────────

/// 2-byte error code carried by ERROR frames, with its canonical message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorKind {
    /// Catch-all, including acknowledgment sequence violations.
    NotDefined = 0,
    FileNotFound = 1,
    AccessViolation = 2,
    DiskFull = 3,
    IllegalOperation = 4,
    FileExists = 5,
    NotLoggedIn = 6,
    AlreadyLoggedIn = 7,
}

impl ErrorKind {
    /// The wire code for this kind.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// The canonical human-readable message sent with this kind.
    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::NotDefined => "Not defined, see error message (if any)",
            ErrorKind::FileNotFound => "File not found",
            ErrorKind::AccessViolation => "Access violation",
            ErrorKind::DiskFull => "Disk full or allocation exceeded",
            ErrorKind::IllegalOperation => "Illegal TFTP operation",
            ErrorKind::FileExists => "File already exists",
            ErrorKind::NotLoggedIn => "User not logged in",
            ErrorKind::AlreadyLoggedIn => "User already logged in",
        }
    }
}

impl TryFrom<u16> for ErrorKind {
    type Error = WireError;

    fn try_from(value: u16) -> Result<Self, WireError> {
        match value {
            0 => Ok(ErrorKind::NotDefined),
            1 => Ok(ErrorKind::FileNotFound),
            2 => Ok(ErrorKind::AccessViolation),
            3 => Ok(ErrorKind::DiskFull),
            4 => Ok(ErrorKind::IllegalOperation),
            5 => Ok(ErrorKind::FileExists),
            6 => Ok(ErrorKind::NotLoggedIn),
            7 => Ok(ErrorKind::AlreadyLoggedIn),
            other => Err(WireError::UnknownErrorCode(other)),
        }
    }
}

// ── Frames ────────────────────────────────────────────────────────────────────

/// A complete protocol frame.
///
/// The opcode determines the layout:
///
/// | Frame                | Layout                                              |
/// |----------------------|-----------------------------------------------------|
/// | Login/Read/Write/Delete | `[opcode:2][utf8 argument][0x00]`                |
/// | Data                 | `[opcode:2][payload-size:2][block:2][payload]`      |
/// | Ack                  | `[opcode:2][block:2]`                               |
/// | Error                | `[opcode:2][code:2][utf8 message][0x00]`            |
/// | List/Disconnect      | `[opcode:2]`                                        |
/// | Broadcast            | `[opcode:2][added:1][utf8 filename][0x00]`          |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// LOGRQ — log in with a username.
    Login { username: String },
    /// RRQ — request a file's contents.
    Read { filename: String },
    /// WRQ — announce an upload of a new file.
    Write { filename: String },
    /// DELRQ — delete a file.
    Delete { filename: String },
    /// DATA — one transfer block, numbered from 1.
    Data { block: u16, payload: Bytes },
    /// ACK — acknowledge block `block` (0 for non-transfer requests).
    Ack { block: u16 },
    /// ERROR — reject the peer's last action.
    Error { kind: ErrorKind, message: String },
    /// DIRQ — request the store listing.
    List,
    /// BCAST — a file was added to or removed from the store.
    Broadcast { added: bool, filename: String },
    /// DISC — orderly disconnect.
    Disconnect,
}

impl Frame {
    /// The opcode this frame is sent under.
    pub fn opcode(&self) -> Opcode {
        match self {
            Frame::Login { .. } => Opcode::Logrq,
            Frame::Read { .. } => Opcode::Rrq,
            Frame::Write { .. } => Opcode::Wrq,
            Frame::Delete { .. } => Opcode::Delrq,
            Frame::Data { .. } => Opcode::Data,
            Frame::Ack { .. } => Opcode::Ack,
            Frame::Error { .. } => Opcode::Error,
            Frame::List => Opcode::Dirq,
            Frame::Broadcast { .. } => Opcode::Bcast,
            Frame::Disconnect => Opcode::Disc,
        }
    }

    /// An ERROR frame carrying `kind`'s canonical message.
    pub fn error(kind: ErrorKind) -> Frame {
        Frame::Error {
            kind,
            message: kind.message().to_string(),
        }
    }

    /// Serialize to wire bytes.
    ///
    /// Textual fields must not contain NUL bytes; callers validate them at
    /// the input boundary (command parsing, store name checks).
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u16(self.opcode() as u16);

        match self {
            Frame::Login { username } => {
                buf.put_slice(username.as_bytes());
                buf.put_u8(0);
            }
            Frame::Read { filename } | Frame::Write { filename } | Frame::Delete { filename } => {
                buf.put_slice(filename.as_bytes());
                buf.put_u8(0);
            }
            Frame::Data { block, payload } => {
                buf.put_u16(payload.len() as u16);
                buf.put_u16(*block);
                buf.put_slice(payload);
            }
            Frame::Ack { block } => {
                buf.put_u16(*block);
            }
            Frame::Error { kind, message } => {
                buf.put_u16(kind.code());
                buf.put_slice(message.as_bytes());
                buf.put_u8(0);
            }
            Frame::Broadcast { added, filename } => {
                buf.put_u8(u8::from(*added));
                buf.put_slice(filename.as_bytes());
                buf.put_u8(0);
            }
            Frame::List | Frame::Disconnect => {}
        }

        buf.freeze()
    }

    /// Parse one complete frame from its exact wire bytes.
    pub fn decode(buf: &[u8]) -> Result<Frame, WireError> {
        if buf.len() < 2 {
            return Err(WireError::Truncated);
        }
        let opcode = Opcode::try_from(u16::from_be_bytes([buf[0], buf[1]]))?;

        match opcode {
            Opcode::Logrq => Ok(Frame::Login {
                username: terminated_text(&buf[2..])?,
            }),
            Opcode::Rrq => Ok(Frame::Read {
                filename: terminated_text(&buf[2..])?,
            }),
            Opcode::Wrq => Ok(Frame::Write {
                filename: terminated_text(&buf[2..])?,
            }),
            Opcode::Delrq => Ok(Frame::Delete {
                filename: terminated_text(&buf[2..])?,
            }),
            Opcode::Data => {
                if buf.len() < 6 {
                    return Err(WireError::Truncated);
                }
                let declared = u16::from_be_bytes([buf[2], buf[3]]) as usize;
                if declared > MAX_DATA_PAYLOAD {
                    return Err(WireError::PayloadTooLarge(declared));
                }
                let actual = buf.len() - 6;
                if declared != actual {
                    return Err(WireError::LengthMismatch { declared, actual });
                }
                Ok(Frame::Data {
                    block: u16::from_be_bytes([buf[4], buf[5]]),
                    payload: Bytes::copy_from_slice(&buf[6..]),
                })
            }
            Opcode::Ack => {
                if buf.len() != 4 {
                    return Err(WireError::Truncated);
                }
                Ok(Frame::Ack {
                    block: u16::from_be_bytes([buf[2], buf[3]]),
                })
            }
            Opcode::Error => {
                if buf.len() < 5 {
                    return Err(WireError::Truncated);
                }
                let kind = ErrorKind::try_from(u16::from_be_bytes([buf[2], buf[3]]))?;
                Ok(Frame::Error {
                    kind,
                    message: terminated_text(&buf[4..])?,
                })
            }
            Opcode::Dirq => Ok(Frame::List),
            Opcode::Disc => Ok(Frame::Disconnect),
            Opcode::Bcast => {
                if buf.len() < 4 {
                    return Err(WireError::Truncated);
                }
                Ok(Frame::Broadcast {
                    added: buf[2] == 1,
                    filename: terminated_text(&buf[3..])?,
                })
            }
        }
    }
}

/// Decode a zero-terminated UTF-8 field spanning `buf` exactly.
fn terminated_text(buf: &[u8]) -> Result<String, WireError> {
    match buf.split_last() {
        Some((&0, text)) => Ok(std::str::from_utf8(text)?.to_string()),
        Some(_) => Err(WireError::MissingTerminator),
        None => Err(WireError::Truncated),
    }
}

// ── Block chunking ────────────────────────────────────────────────────────────

/// Split transfer bytes into DATA frames numbered from 1.
///
/// Shared by file reads, directory listings, and client uploads. When the
/// input length is an exact multiple of [`MAX_DATA_PAYLOAD`] (including
/// empty input), an empty final block is appended — the receiver's
/// end-of-transfer test is payload length < 512, nothing else.
///
/// Block numbers wrap at 65535, matching classic TFTP; both ends compare
/// them for equality only.
pub fn split_blocks(data: &[u8]) -> Vec<Frame> {
    let mut blocks: Vec<Frame> = data
        .chunks(MAX_DATA_PAYLOAD)
        .enumerate()
        .map(|(i, chunk)| Frame::Data {
            block: (i as u16).wrapping_add(1),
            payload: Bytes::copy_from_slice(chunk),
        })
        .collect();

    if data.len() % MAX_DATA_PAYLOAD == 0 {
        blocks.push(Frame::Data {
            block: (blocks.len() as u16).wrapping_add(1),
            payload: Bytes::new(),
        });
    }

    blocks
}

/// Encode a directory listing: each name's UTF-8 bytes followed by 0x00.
pub fn encode_listing<S: AsRef<str>>(names: &[S]) -> Vec<u8> {
    let mut out = Vec::new();
    for name in names {
        out.extend_from_slice(name.as_ref().as_bytes());
        out.push(0);
    }
    out
}

/// Decode a directory listing produced by [`encode_listing`].
pub fn decode_listing(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|b| *b == 0)
        .filter(|name| !name.is_empty())
        .map(|name| String::from_utf8_lossy(name).into_owned())
        .collect()
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
///
/// All of these are fatal to the connection that produced them: once a
/// byte stream desynchronizes there is no reliable way to find the next
/// frame boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unknown opcode: {0}")]
    UnknownOpcode(u16),

    #[error("unknown error code: {0}")]
    UnknownErrorCode(u16),

    #[error("data payload length {0} exceeds maximum {MAX_DATA_PAYLOAD}")]
    PayloadTooLarge(usize),

    #[error("data length field says {declared} but payload is {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("frame truncated")]
    Truncated,

    #[error("text field missing zero terminator")]
    MissingTerminator,

    #[error("text field is not valid UTF-8")]
    InvalidText(#[from] std::str::Utf8Error),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
