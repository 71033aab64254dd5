//! cairn-core — wire format, framing, and configuration.
//! The daemon and client crates both depend on this one.

pub mod config;
pub mod framer;
pub mod wire;

pub use framer::Framer;
pub use wire::{ErrorKind, Frame, Opcode, WireError, MAX_DATA_PAYLOAD};
