//! Wire encoding of hierarchical paths.
//!
//! File paths and threaded-news paths share the same shape: a 2-byte
//! segment count followed by `{reserved:2, len:1, bytes}` per segment.
//! Segments are raw bytes (Mac-Roman for filenames); decoding validates
//! them against traversal, since they are later joined onto on-disk paths.

use crate::{ProtocolError, ProtocolResult};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

/// Reject a segment that could escape the root or smuggle a separator
/// through the join.
fn validate_segment(segment: &[u8]) -> ProtocolResult<()> {
    if segment.is_empty() || segment == b".." {
        return Err(ProtocolError::BadPathSegment);
    }
    if segment.iter().any(|&b| b == b'/' || b == b'\\' || b == 0) {
        return Err(ProtocolError::BadPathSegment);
    }
    Ok(())
}

/// Decode a wire path into its segments, rejecting traversal attempts.
pub fn decode_path(data: &[u8]) -> ProtocolResult<Vec<Vec<u8>>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let mut stream = Cursor::new(data);
    let count = stream.read_u16::<BigEndian>().map_err(|_| ProtocolError::Malformed)?;

    let mut segments = Vec::with_capacity(count as usize);
    for _ in 0..count {
        // Two reserved bytes, then a 1-byte length.
        stream.read_u16::<BigEndian>().map_err(|_| ProtocolError::Malformed)?;
        let len = stream.read_u8().map_err(|_| ProtocolError::Malformed)? as usize;

        let mut segment = vec![0u8; len];
        stream.read_exact(&mut segment).map_err(|_| ProtocolError::Malformed)?;

        validate_segment(&segment)?;
        segments.push(segment);
    }

    if stream.position() as usize != data.len() {
        return Err(ProtocolError::Malformed);
    }

    Ok(segments)
}

/// Encode segments into the wire shape. Segments longer than 255 bytes are
/// not representable.
pub fn encode_path(segments: &[Vec<u8>]) -> ProtocolResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(2 + segments.iter().map(|s| 3 + s.len()).sum::<usize>());
    buf.extend_from_slice(&(segments.len() as u16).to_be_bytes());

    for segment in segments {
        if segment.len() > 255 {
            return Err(ProtocolError::FieldTooLong(segment.len()));
        }
        buf.extend_from_slice(&[0, 0]);
        buf.push(segment.len() as u8);
        buf.extend_from_slice(segment);
    }

    Ok(buf)
}

/// A filename arriving in its own field (not inside a path) gets the same
/// scrutiny, except that dot-dot is sanitized rather than fatal: the legacy
/// clients send plain names here and the server strips anything dangerous.
pub fn sanitize_name(name: &[u8]) -> Vec<u8> {
    name.iter()
        .copied()
        .filter(|&b| b != b'/' && b != b'\\' && b != 0)
        .collect::<Vec<u8>>()
        .split(|&b| b == b'.')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(&b'.')
}
