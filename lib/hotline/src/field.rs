//! Tagged, length-prefixed field values carried inside transactions.

use crate::{ProtocolError, ProtocolResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Largest payload representable by the 2-byte field size.
pub const MAX_FIELD_SIZE: usize = 65535;

/// A single `{type, size, bytes}` triple. The payload is opaque at this
/// layer; numeric interpretation is up to the caller via [`Field::read_int`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Field {
    pub id: u16,
    pub data: Vec<u8>,
}

impl Field {
    #[inline]
    pub fn new(id: u16, data: Vec<u8>) -> Field {
        Field { id, data }
    }

    /// Field with a 2-byte big-endian integer payload.
    #[inline]
    pub fn with_u16(id: u16, value: u16) -> Field {
        Field::new(id, value.to_be_bytes().to_vec())
    }

    /// Field with a 4-byte big-endian integer payload.
    #[inline]
    pub fn with_u32(id: u16, value: u32) -> Field {
        Field::new(id, value.to_be_bytes().to_vec())
    }

    /// Field with a textual payload.
    #[inline]
    pub fn with_str(id: u16, value: &str) -> Field {
        Field::new(id, value.as_bytes().to_vec())
    }

    /// Interpret the payload as a big-endian integer. Clients are sloppy
    /// about widths, so any payload up to 4 bytes is accepted and
    /// left-padded with zeros. Wider payloads are not integers.
    pub fn read_int(&self) -> Option<u32> {
        if self.data.len() > 4 {
            return None;
        }

        let mut value: u32 = 0;
        for &byte in &self.data {
            value = (value << 8) | u32::from(byte);
        }
        Some(value)
    }

    /// Serialized size of this field, header included.
    #[inline]
    pub fn wire_len(&self) -> usize {
        4 + self.data.len()
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> ProtocolResult<()> {
        if self.data.len() > MAX_FIELD_SIZE {
            return Err(ProtocolError::FieldTooLong(self.data.len()));
        }

        stream.write_u16::<BigEndian>(self.id).map_err(io_malformed)?;
        stream
            .write_u16::<BigEndian>(self.data.len() as u16)
            .map_err(io_malformed)?;
        stream.write_all(&self.data).map_err(io_malformed)?;
        Ok(())
    }

    pub fn read_from<R: Read>(stream: &mut R) -> ProtocolResult<Field> {
        let id = stream.read_u16::<BigEndian>().map_err(io_malformed)?;
        let size = stream.read_u16::<BigEndian>().map_err(io_malformed)? as usize;

        let mut data = vec![0u8; size];
        stream.read_exact(&mut data).map_err(io_malformed)?;

        Ok(Field { id, data })
    }
}

#[inline]
fn io_malformed(_: std::io::Error) -> ProtocolError {
    ProtocolError::Malformed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_roundtrip() {
        let field = Field::new(101, b"hello".to_vec());

        let mut buf = Vec::new();
        field.write_to(&mut buf).unwrap();

        assert_eq!(&buf[..], &[0x00, 0x65, 0x00, 0x05, b'h', b'e', b'l', b'l', b'o']);

        let decoded = Field::read_from(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, field);
    }

    #[test]
    fn test_overlong_field_rejected() {
        let field = Field::new(101, vec![0u8; MAX_FIELD_SIZE + 1]);

        let mut buf = Vec::new();
        let result = field.write_to(&mut buf);

        assert_eq!(result.unwrap_err(), ProtocolError::FieldTooLong(MAX_FIELD_SIZE + 1));
    }

    #[test]
    fn test_read_int_widths() {
        assert_eq!(Field::new(103, vec![0x02]).read_int(), Some(2));
        assert_eq!(Field::new(103, vec![0x00, 0x02]).read_int(), Some(2));
        assert_eq!(Field::new(103, vec![0x00, 0x00, 0x01, 0x02]).read_int(), Some(258));
        assert_eq!(Field::new(103, vec![]).read_int(), Some(0));
        assert_eq!(Field::new(103, vec![0; 5]).read_int(), None);
    }

    #[test]
    fn test_read_from_truncated() {
        let bytes = [0x00, 0x65, 0x00, 0x10, 0x01];
        let result = Field::read_from(&mut Cursor::new(&bytes[..]));

        assert_eq!(result.unwrap_err(), ProtocolError::Malformed);
    }
}
