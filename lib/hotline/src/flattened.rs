//! The "flattened file object" container streamed during file transfers,
//! and the resume structure clients send to continue a partial transfer.
//!
//! A flattened file is a fixed header followed by up to three forks: the
//! small INFO fork (materialized in memory), the DATA fork (streamed from
//! disk) and an optional MACR resource fork. Offsets are fixed and parsed
//! by legacy clients.

use crate::{ProtocolError, ProtocolResult};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

pub const FILP_MAGIC: &[u8; 4] = b"FILP";
pub const RFLT_MAGIC: &[u8; 4] = b"RFLT";
pub const FORK_INFO: &[u8; 4] = b"INFO";
pub const FORK_DATA: &[u8; 4] = b"DATA";
pub const FORK_RSRC: &[u8; 4] = b"MACR";
pub const PLATFORM_AMAC: &[u8; 4] = b"AMAC";

pub const FLAT_FILE_HEADER_SIZE: usize = 24;
pub const FORK_HEADER_SIZE: usize = 16;

/// `"FILP"` + version + 16 reserved bytes + fork count.
pub fn encode_flat_file_header(fork_count: u16) -> [u8; FLAT_FILE_HEADER_SIZE] {
    let mut buf = [0u8; FLAT_FILE_HEADER_SIZE];
    buf[..4].copy_from_slice(FILP_MAGIC);
    buf[4..6].copy_from_slice(&1u16.to_be_bytes());
    buf[22..24].copy_from_slice(&fork_count.to_be_bytes());
    buf
}

/// Fork section header: type + compression (always 0) + reserved + size.
pub fn encode_fork_header(fork_type: &[u8; 4], data_size: u32) -> [u8; FORK_HEADER_SIZE] {
    let mut buf = [0u8; FORK_HEADER_SIZE];
    buf[..4].copy_from_slice(fork_type);
    buf[12..16].copy_from_slice(&data_size.to_be_bytes());
    buf
}

/// The INFO fork payload. Small enough to materialize whole; everything a
/// legacy client knows about a file that is not its data.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InfoFork {
    pub type_code: [u8; 4],
    pub creator_code: [u8; 4],
    pub flags: u32,
    pub platform_flags: u32,
    pub create_date: [u8; 8],
    pub modify_date: [u8; 8],
    pub name_script: u16,
    pub name: Vec<u8>,
    pub comment: Vec<u8>,
}

impl InfoFork {
    /// Serialized size of this fork.
    pub fn size(&self) -> usize {
        74 + self.name.len() + self.comment.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        buf.extend_from_slice(PLATFORM_AMAC);
        buf.extend_from_slice(&self.type_code);
        buf.extend_from_slice(&self.creator_code);
        buf.extend_from_slice(&self.flags.to_be_bytes());
        buf.extend_from_slice(&self.platform_flags.to_be_bytes());
        buf.extend_from_slice(&[0u8; 32]);
        buf.extend_from_slice(&self.create_date);
        buf.extend_from_slice(&self.modify_date);
        buf.extend_from_slice(&self.name_script.to_be_bytes());
        buf.extend_from_slice(&(self.name.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.name);
        buf.extend_from_slice(&(self.comment.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.comment);
        buf
    }

    pub fn decode(data: &[u8]) -> ProtocolResult<InfoFork> {
        let mut stream = Cursor::new(data);

        let mut platform = [0u8; 4];
        stream.read_exact(&mut platform).map_err(|_| ProtocolError::Malformed)?;

        let mut type_code = [0u8; 4];
        stream.read_exact(&mut type_code).map_err(|_| ProtocolError::Malformed)?;
        let mut creator_code = [0u8; 4];
        stream.read_exact(&mut creator_code).map_err(|_| ProtocolError::Malformed)?;

        let flags = stream.read_u32::<BigEndian>().map_err(|_| ProtocolError::Malformed)?;
        let platform_flags = stream.read_u32::<BigEndian>().map_err(|_| ProtocolError::Malformed)?;

        let mut reserved = [0u8; 32];
        stream.read_exact(&mut reserved).map_err(|_| ProtocolError::Malformed)?;

        let mut create_date = [0u8; 8];
        stream.read_exact(&mut create_date).map_err(|_| ProtocolError::Malformed)?;
        let mut modify_date = [0u8; 8];
        stream.read_exact(&mut modify_date).map_err(|_| ProtocolError::Malformed)?;

        let name_script = stream.read_u16::<BigEndian>().map_err(|_| ProtocolError::Malformed)?;
        let name_len = stream.read_u16::<BigEndian>().map_err(|_| ProtocolError::Malformed)? as usize;
        let mut name = vec![0u8; name_len];
        stream.read_exact(&mut name).map_err(|_| ProtocolError::Malformed)?;

        // The comment is optional in files written by some older servers.
        let comment = match stream.read_u16::<BigEndian>() {
            Ok(comment_len) => {
                let mut comment = vec![0u8; comment_len as usize];
                stream.read_exact(&mut comment).map_err(|_| ProtocolError::Malformed)?;
                comment
            }
            Err(_) => Vec::new(),
        };

        Ok(InfoFork {
            type_code,
            creator_code,
            flags,
            platform_flags,
            create_date,
            modify_date,
            name_script,
            name,
            comment,
        })
    }
}

/// Byte offsets a client wants to resume each fork from, parsed out of the
/// `FileResumeData` field: `"RFLT"` + version + 34 reserved + fork count +
/// per-fork `{type(4) offset(4) reserved(8)}`.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct ResumeData {
    pub data_offset: u32,
    pub rsrc_offset: u32,
}

impl ResumeData {
    pub fn decode(data: &[u8]) -> ProtocolResult<ResumeData> {
        let mut stream = Cursor::new(data);

        let mut magic = [0u8; 4];
        stream.read_exact(&mut magic).map_err(|_| ProtocolError::Malformed)?;
        if &magic != RFLT_MAGIC {
            return Err(ProtocolError::BadMagic);
        }

        stream.read_u16::<BigEndian>().map_err(|_| ProtocolError::Malformed)?;
        let mut reserved = [0u8; 34];
        stream.read_exact(&mut reserved).map_err(|_| ProtocolError::Malformed)?;

        let fork_count = stream.read_u16::<BigEndian>().map_err(|_| ProtocolError::Malformed)?;

        let mut resume = ResumeData::default();
        for _ in 0..fork_count {
            let mut fork_type = [0u8; 4];
            stream.read_exact(&mut fork_type).map_err(|_| ProtocolError::Malformed)?;
            let offset = stream.read_u32::<BigEndian>().map_err(|_| ProtocolError::Malformed)?;
            let mut fork_reserved = [0u8; 8];
            stream.read_exact(&mut fork_reserved).map_err(|_| ProtocolError::Malformed)?;

            if &fork_type == FORK_DATA {
                resume.data_offset = offset;
            } else if &fork_type == FORK_RSRC {
                resume.rsrc_offset = offset;
            }
        }

        Ok(resume)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(42 + 2 * 16);
        buf.extend_from_slice(RFLT_MAGIC);
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&[0u8; 34]);
        buf.extend_from_slice(&2u16.to_be_bytes());

        buf.extend_from_slice(FORK_DATA);
        buf.extend_from_slice(&self.data_offset.to_be_bytes());
        buf.extend_from_slice(&[0u8; 8]);

        buf.extend_from_slice(FORK_RSRC);
        buf.extend_from_slice(&self.rsrc_offset.to_be_bytes());
        buf.extend_from_slice(&[0u8; 8]);

        buf
    }
}
