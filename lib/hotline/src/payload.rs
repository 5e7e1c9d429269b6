//! Composite field payloads: structures carried whole inside a single
//! field's byte value.

use crate::{ProtocolError, ProtocolResult};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

/// Payload of a `UsernameWithInfo` field:
/// `id(2) icon(2) flags(2) nameLen(2) nameBytes`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UserNameWithInfo {
    pub id: u16,
    pub icon: u16,
    pub flags: u16,
    pub name: Vec<u8>,
}

impl UserNameWithInfo {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.name.len());
        buf.extend_from_slice(&self.id.to_be_bytes());
        buf.extend_from_slice(&self.icon.to_be_bytes());
        buf.extend_from_slice(&self.flags.to_be_bytes());
        buf.extend_from_slice(&(self.name.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.name);
        buf
    }

    pub fn decode(data: &[u8]) -> ProtocolResult<UserNameWithInfo> {
        let mut stream = Cursor::new(data);
        let id = stream.read_u16::<BigEndian>().map_err(|_| ProtocolError::Malformed)?;
        let icon = stream.read_u16::<BigEndian>().map_err(|_| ProtocolError::Malformed)?;
        let flags = stream.read_u16::<BigEndian>().map_err(|_| ProtocolError::Malformed)?;
        let name_len = stream.read_u16::<BigEndian>().map_err(|_| ProtocolError::Malformed)? as usize;

        let mut name = vec![0u8; name_len];
        stream.read_exact(&mut name).map_err(|_| ProtocolError::Malformed)?;

        Ok(UserNameWithInfo { id, icon, flags, name })
    }
}

/// Payload of a `FileNameWithInfo` field, one per listed item:
/// `type(4) creator(4) size(4) reserved(4) nameScript(2) nameLen(2) name`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FileNameWithInfo {
    pub type_code: [u8; 4],
    pub creator_code: [u8; 4],
    pub file_size: u32,
    pub name_script: u16,
    pub name: Vec<u8>,
}

/// Type code reported for directories.
pub const TYPE_FOLDER: [u8; 4] = *b"fldr";
/// Type code reported for symlinked items.
pub const TYPE_ALIAS_CREATOR: [u8; 4] = *b"alis";
/// Default type/creator for plain files.
pub const TYPE_GENERIC: [u8; 4] = *b"TEXT";
pub const CREATOR_GENERIC: [u8; 4] = *b"TTXT";

impl FileNameWithInfo {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(20 + self.name.len());
        buf.extend_from_slice(&self.type_code);
        buf.extend_from_slice(&self.creator_code);
        buf.extend_from_slice(&self.file_size.to_be_bytes());
        buf.extend_from_slice(&[0u8; 4]);
        buf.extend_from_slice(&self.name_script.to_be_bytes());
        buf.extend_from_slice(&(self.name.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.name);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_name_with_info_layout() {
        let info = UserNameWithInfo {
            id: 1,
            icon: 0x07D0,
            flags: 0x0002,
            name: b"Alice".to_vec(),
        };

        let bytes = info.encode();

        assert_eq!(
            bytes,
            vec![0x00, 0x01, 0x07, 0xD0, 0x00, 0x02, 0x00, 0x05, b'A', b'l', b'i', b'c', b'e']
        );
        assert_eq!(UserNameWithInfo::decode(&bytes).unwrap(), info);
    }

    #[test]
    fn test_user_name_with_info_truncated() {
        let result = UserNameWithInfo::decode(&[0x00, 0x01, 0x07]);
        assert_eq!(result.unwrap_err(), ProtocolError::Malformed);
    }

    #[test]
    fn test_file_name_with_info_layout() {
        let info = FileNameWithInfo {
            type_code: TYPE_FOLDER,
            creator_code: [0; 4],
            file_size: 3,
            name_script: 0,
            name: b"Uploads".to_vec(),
        };

        let bytes = info.encode();

        assert_eq!(&bytes[..4], b"fldr");
        assert_eq!(&bytes[8..12], &[0, 0, 0, 3]);
        assert_eq!(&bytes[18..20], &[0x00, 0x07]);
        assert_eq!(&bytes[20..], b"Uploads");
    }
}
