//! Wire-level primitives for the Hotline binary transaction protocol.
//!
//! Everything in this crate is pure data transformation: framing, field
//! codecs, path encodings and the handful of legacy byte formats the
//! protocol inherited from the original Mac clients. Nothing here touches
//! the network or the filesystem.

use std::fmt;

pub const TRTP_MAGIC: &[u8; 4] = b"TRTP";
pub const HOTL_MAGIC: &[u8; 4] = b"HOTL";
pub const HTXF_MAGIC: &[u8; 4] = b"HTXF";

/// Server protocol version reported in the login reply.
pub const SERVER_VERSION: u16 = 123;

pub mod access;
pub mod date;
pub mod field;
pub mod flattened;
pub mod macroman;
pub mod obfuscate;
pub mod path;
pub mod payload;
pub mod transaction;
pub mod types;
pub mod xfer;

pub use crate::field::Field;
pub use crate::transaction::Transaction;

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding wire data. All of these are
/// connection-fatal on the control channel.
#[derive(Debug, Eq, PartialEq)]
pub enum ProtocolError {
    /// A field payload exceeded the 2-byte size representation.
    FieldTooLong(usize),
    /// Handshake or side-channel magic did not match.
    BadMagic,
    /// Header advertised a segmented transaction (dataSize != totalSize).
    Segmented,
    /// Advertised payload exceeds the frame cap.
    PayloadTooLarge(u32),
    /// Declared sizes are inconsistent with the actual payload.
    SizeMismatch,
    /// A path segment was absolute, contained a separator or was "..".
    BadPathSegment,
    /// Malformed path or field structure.
    Malformed,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProtocolError::FieldTooLong(size) => write!(f, "field of {} bytes is not representable", size),
            ProtocolError::BadMagic => write!(f, "bad protocol magic"),
            ProtocolError::Segmented => write!(f, "segmented transactions are not supported"),
            ProtocolError::PayloadTooLarge(size) => write!(f, "payload of {} bytes exceeds frame cap", size),
            ProtocolError::SizeMismatch => write!(f, "declared size does not match payload"),
            ProtocolError::BadPathSegment => write!(f, "illegal path segment"),
            ProtocolError::Malformed => write!(f, "malformed wire structure"),
        }
    }
}

impl std::error::Error for ProtocolError {}
