//! Handshake frames for the control channel and the file-transfer side
//! channel, plus the small structures exchanged during folder transfers.

use crate::{ProtocolError, ProtocolResult, HOTL_MAGIC, HTXF_MAGIC, TRTP_MAGIC};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

pub const HANDSHAKE_SIZE: usize = 12;
pub const HANDSHAKE_REPLY_SIZE: usize = 8;
pub const HTXF_HEADER_SIZE: usize = 16;

/// The 12-byte client hello opening every control connection.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ClientHandshake {
    pub version: u16,
    pub sub_version: u16,
}

/// Parse and validate the client hello. Anything but `TRTP` + `HOTL` is a
/// protocol violation and the caller closes after sending a non-zero reply.
pub fn decode_handshake(buf: &[u8]) -> ProtocolResult<ClientHandshake> {
    if buf.len() < HANDSHAKE_SIZE {
        return Err(ProtocolError::Malformed);
    }
    if &buf[..4] != TRTP_MAGIC || &buf[4..8] != HOTL_MAGIC {
        return Err(ProtocolError::BadMagic);
    }

    let mut stream = Cursor::new(&buf[8..12]);
    let version = stream.read_u16::<BigEndian>().expect("sized read");
    let sub_version = stream.read_u16::<BigEndian>().expect("sized read");

    Ok(ClientHandshake { version, sub_version })
}

/// The 8-byte server response: magic plus an error code, zero on success.
pub fn encode_handshake_reply(error_code: u32) -> [u8; HANDSHAKE_REPLY_SIZE] {
    let mut reply = [0u8; HANDSHAKE_REPLY_SIZE];
    reply[..4].copy_from_slice(TRTP_MAGIC);
    reply[4..].copy_from_slice(&error_code.to_be_bytes());
    reply
}

/// The 16-byte header opening every side-channel connection:
/// `"HTXF"` + refNum + dataSize + reserved.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TransferHandshake {
    pub ref_num: u32,
    pub data_size: u32,
}

impl TransferHandshake {
    pub fn decode(buf: &[u8]) -> ProtocolResult<TransferHandshake> {
        if buf.len() < HTXF_HEADER_SIZE {
            return Err(ProtocolError::Malformed);
        }
        if &buf[..4] != HTXF_MAGIC {
            return Err(ProtocolError::BadMagic);
        }

        let mut stream = Cursor::new(&buf[4..12]);
        let ref_num = stream.read_u32::<BigEndian>().expect("sized read");
        let data_size = stream.read_u32::<BigEndian>().expect("sized read");

        Ok(TransferHandshake { ref_num, data_size })
    }

    pub fn encode(&self) -> [u8; HTXF_HEADER_SIZE] {
        let mut buf = [0u8; HTXF_HEADER_SIZE];
        buf[..4].copy_from_slice(HTXF_MAGIC);
        buf[4..8].copy_from_slice(&self.ref_num.to_be_bytes());
        buf[8..12].copy_from_slice(&self.data_size.to_be_bytes());
        buf
    }
}

// Per-item action codes sent by the receiving side of a folder transfer.
pub const FLDR_ACTION_SEND_FILE: u16 = 1;
pub const FLDR_ACTION_RESUME_FILE: u16 = 2;
pub const FLDR_ACTION_NEXT_FILE: u16 = 3;

/// Per-item header streamed during a folder transfer:
/// `headerLen(2) type(2) dataSize(4) pathBytes`. The path is the standard
/// wire path encoding relative to the folder being transferred.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FolderItemHeader {
    pub is_folder: bool,
    pub data_size: u32,
    pub path: Vec<u8>,
}

impl FolderItemHeader {
    pub fn encode(&self) -> Vec<u8> {
        let body_len = (8 + self.path.len()) as u16;
        let mut buf = Vec::with_capacity(2 + body_len as usize);
        buf.extend_from_slice(&body_len.to_be_bytes());
        buf.extend_from_slice(&(self.is_folder as u16).to_be_bytes());
        buf.extend_from_slice(&self.data_size.to_be_bytes());
        buf.extend_from_slice(&self.path);
        buf
    }

    pub fn decode(buf: &[u8]) -> ProtocolResult<FolderItemHeader> {
        let mut stream = Cursor::new(buf);
        let body_len = stream.read_u16::<BigEndian>().map_err(|_| ProtocolError::Malformed)? as usize;
        if body_len < 8 || buf.len() < 2 + body_len {
            return Err(ProtocolError::Malformed);
        }

        let kind = stream.read_u16::<BigEndian>().expect("sized read");
        let data_size = stream.read_u32::<BigEndian>().expect("sized read");

        let mut path = vec![0u8; body_len - 8];
        stream.read_exact(&mut path).map_err(|_| ProtocolError::Malformed)?;

        Ok(FolderItemHeader {
            is_folder: kind == 1,
            data_size,
            path,
        })
    }
}
