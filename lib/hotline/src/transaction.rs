//! Transaction framing: the 20-byte header plus a counted field list.

use crate::field::Field;
use crate::types::FIELD_ERROR;
use crate::{ProtocolError, ProtocolResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Frames larger than this are treated as hostile and kill the connection.
/// The largest legitimate payloads are news article posts, which are far
/// below this.
pub const MAX_PAYLOAD_SIZE: u32 = 1024 * 1024;

pub const HEADER_SIZE: usize = 20;

/// One framed unit of the control protocol.
///
/// `total_size`/`data_size` are computed on encode; the decoder rejects
/// frames where they disagree since no known client segments transactions.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Transaction {
    pub flags: u8,
    pub is_reply: u8,
    pub ty: u16,
    pub id: u32,
    pub error_code: u32,
    pub fields: Vec<Field>,
}

impl Transaction {
    /// A fresh request transaction. The correlation id is assigned by the
    /// connection engine just before the frame is queued.
    pub fn new(ty: u16, fields: Vec<Field>) -> Transaction {
        Transaction {
            flags: 0,
            is_reply: 0,
            ty,
            id: 0,
            error_code: 0,
            fields,
        }
    }

    /// A success reply carrying the given fields. Type is zero on replies;
    /// the id is filled in from the request by the connection engine.
    pub fn reply(fields: Vec<Field>) -> Transaction {
        Transaction {
            flags: 0,
            is_reply: 1,
            ty: 0,
            id: 0,
            error_code: 0,
            fields,
        }
    }

    /// An error reply with `errorCode=1` and the human-readable message in
    /// the error field. The exact message strings are part of the protocol
    /// surface.
    pub fn error_reply(message: &str) -> Transaction {
        Transaction {
            flags: 0,
            is_reply: 1,
            ty: 0,
            id: 0,
            error_code: 1,
            fields: vec![Field::with_str(FIELD_ERROR, message)],
        }
    }

    /// First field with the given id, if present.
    pub fn get_field(&self, id: u16) -> Option<&Field> {
        self.fields.iter().find(|field| field.id == id)
    }

    /// All fields with the given id, in wire order.
    pub fn fields_with_id<'a>(&'a self, id: u16) -> impl Iterator<Item = &'a Field> {
        self.fields.iter().filter(move |field| field.id == id)
    }

    /// Payload bytes of the first field with the given id, or empty.
    pub fn field_bytes(&self, id: u16) -> &[u8] {
        self.get_field(id).map(|field| &field.data[..]).unwrap_or(&[])
    }

    /// Integer value of the first field with the given id.
    pub fn field_int(&self, id: u16) -> Option<u32> {
        self.get_field(id).and_then(Field::read_int)
    }

    fn payload_size(&self) -> usize {
        2 + self.fields.iter().map(Field::wire_len).sum::<usize>()
    }

    /// Serialize to wire bytes. Fails if any field is overlong.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let payload_size = self.payload_size();
        if payload_size as u64 > u64::from(MAX_PAYLOAD_SIZE) {
            return Err(ProtocolError::PayloadTooLarge(payload_size as u32));
        }

        let mut buf = Vec::with_capacity(HEADER_SIZE + payload_size);

        buf.write_u8(self.flags).expect("vec write");
        buf.write_u8(self.is_reply).expect("vec write");
        buf.write_u16::<BigEndian>(self.ty).expect("vec write");
        buf.write_u32::<BigEndian>(self.id).expect("vec write");
        buf.write_u32::<BigEndian>(self.error_code).expect("vec write");
        buf.write_u32::<BigEndian>(payload_size as u32).expect("vec write");
        buf.write_u32::<BigEndian>(payload_size as u32).expect("vec write");

        buf.write_u16::<BigEndian>(self.fields.len() as u16).expect("vec write");
        for field in &self.fields {
            field.write_to(&mut buf)?;
        }

        Ok(buf)
    }

    /// Decode one transaction from the front of `buf`.
    ///
    /// Returns `Ok(None)` when the buffer does not yet hold a complete
    /// frame; on success returns the transaction and the number of bytes
    /// consumed.
    pub fn decode(buf: &[u8]) -> ProtocolResult<Option<(Transaction, usize)>> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let mut header = Cursor::new(&buf[..HEADER_SIZE]);
        let flags = header.read_u8().expect("sized read");
        let is_reply = header.read_u8().expect("sized read");
        let ty = header.read_u16::<BigEndian>().expect("sized read");
        let id = header.read_u32::<BigEndian>().expect("sized read");
        let error_code = header.read_u32::<BigEndian>().expect("sized read");
        let total_size = header.read_u32::<BigEndian>().expect("sized read");
        let data_size = header.read_u32::<BigEndian>().expect("sized read");

        if total_size != data_size {
            return Err(ProtocolError::Segmented);
        }
        if total_size > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge(total_size));
        }
        if total_size < 2 {
            return Err(ProtocolError::SizeMismatch);
        }

        let frame_len = HEADER_SIZE + total_size as usize;
        if buf.len() < frame_len {
            return Ok(None);
        }

        let mut payload = Cursor::new(&buf[HEADER_SIZE..frame_len]);
        let field_count = payload.read_u16::<BigEndian>().map_err(|_| ProtocolError::Malformed)?;

        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            fields.push(Field::read_from(&mut payload)?);
        }

        if payload.position() as usize != total_size as usize {
            return Err(ProtocolError::SizeMismatch);
        }

        Ok(Some((
            Transaction {
                flags,
                is_reply,
                ty,
                id,
                error_code,
                fields,
            },
            frame_len,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FIELD_DATA, TRAN_CHAT_SEND};

    fn sample() -> Transaction {
        let mut tx = Transaction::new(TRAN_CHAT_SEND, vec![Field::new(FIELD_DATA, b"hello".to_vec())]);
        tx.id = 7;
        tx
    }

    #[test]
    fn test_encode_header_layout() {
        let bytes = sample().encode().unwrap();

        // flags, isReply, type
        assert_eq!(&bytes[..4], &[0x00, 0x00, 0x00, 0x69]);
        // id
        assert_eq!(&bytes[4..8], &[0x00, 0x00, 0x00, 0x07]);
        // errorCode
        assert_eq!(&bytes[8..12], &[0x00, 0x00, 0x00, 0x00]);
        // totalSize == dataSize == 2 + (4 + 5)
        assert_eq!(&bytes[12..16], &[0x00, 0x00, 0x00, 0x0b]);
        assert_eq!(&bytes[16..20], &[0x00, 0x00, 0x00, 0x0b]);
        // field count
        assert_eq!(&bytes[20..22], &[0x00, 0x01]);
    }

    #[test]
    fn test_roundtrip_bytes_identical() {
        let bytes = sample().encode().unwrap();

        let (decoded, consumed) = Transaction::decode(&bytes).unwrap().unwrap();

        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn test_decode_incomplete_header() {
        assert_eq!(Transaction::decode(&[0u8; 10]).unwrap(), None);
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let bytes = sample().encode().unwrap();
        assert_eq!(Transaction::decode(&bytes[..bytes.len() - 1]).unwrap(), None);
    }

    #[test]
    fn test_decode_trailing_bytes_left() {
        let mut bytes = sample().encode().unwrap();
        let frame_len = bytes.len();
        bytes.extend_from_slice(&[0xAA, 0xBB]);

        let (_, consumed) = Transaction::decode(&bytes).unwrap().unwrap();

        assert_eq!(consumed, frame_len);
    }

    #[test]
    fn test_decode_rejects_segmented() {
        let mut bytes = sample().encode().unwrap();
        // Bump totalSize so it disagrees with dataSize.
        bytes[15] += 1;

        assert_eq!(Transaction::decode(&bytes).unwrap_err(), ProtocolError::Segmented);
    }

    #[test]
    fn test_decode_rejects_oversize() {
        let mut bytes = sample().encode().unwrap();
        bytes[12] = 0xFF;
        bytes[16] = 0xFF;

        match Transaction::decode(&bytes).unwrap_err() {
            ProtocolError::PayloadTooLarge(_) => (),
            err => panic!("unexpected error {:?}", err),
        }
    }

    #[test]
    fn test_decode_rejects_undeclared_trailing_fields() {
        let tx = sample();
        let mut bytes = tx.encode().unwrap();
        // Declare one byte more payload than the field list occupies.
        let bad_size = (bytes.len() - HEADER_SIZE + 1) as u32;
        bytes[12..16].copy_from_slice(&bad_size.to_be_bytes());
        bytes[16..20].copy_from_slice(&bad_size.to_be_bytes());
        bytes.push(0x00);

        assert_eq!(Transaction::decode(&bytes).unwrap_err(), ProtocolError::SizeMismatch);
    }

    #[test]
    fn test_repeated_fields_preserve_order() {
        let tx = Transaction::new(
            TRAN_CHAT_SEND,
            vec![
                Field::new(FIELD_DATA, b"one".to_vec()),
                Field::new(FIELD_DATA, b"two".to_vec()),
            ],
        );

        let bytes = tx.encode().unwrap();
        let (decoded, _) = Transaction::decode(&bytes).unwrap().unwrap();

        let payloads: Vec<_> = decoded.fields_with_id(FIELD_DATA).map(|f| f.data.clone()).collect();
        assert_eq!(payloads, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn test_error_reply_shape() {
        let tx = Transaction::error_reply("You are not allowed to delete files.");

        assert_eq!(tx.is_reply, 1);
        assert_eq!(tx.error_code, 1);
        assert_eq!(
            tx.field_bytes(FIELD_ERROR),
            b"You are not allowed to delete files.".as_ref()
        );
    }
}
