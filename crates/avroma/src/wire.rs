//! Confluent wire format
//!
//! ```text
//! [magic: 1 byte][schema_id: 4 bytes big-endian][avro binary body]
//! ```
//!
//! The magic byte is written as `0x00` but not checked on read; producers
//! in the wild are not consistent about it and the schema id is what matters.

use crate::error::{DecodeError, DecodeResult};
use crate::types::SchemaId;

/// Magic byte written in front of every frame
pub const MAGIC_BYTE: u8 = 0x00;

/// Magic byte plus schema id
pub const HEADER_LEN: usize = 5;

/// Split a framed payload into its schema id and Avro body
pub fn parse_header(payload: &[u8]) -> DecodeResult<(SchemaId, &[u8])> {
    if payload.len() < HEADER_LEN {
        return Err(DecodeError::InputFormat { len: payload.len() });
    }
    let id = u32::from_be_bytes([payload[1], payload[2], payload[3], payload[4]]);
    Ok((SchemaId::new(id), &payload[HEADER_LEN..]))
}

/// Header bytes for `schema_id`
pub fn encode_header(schema_id: SchemaId) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0] = MAGIC_BYTE;
    header[1..HEADER_LEN].copy_from_slice(&schema_id.0.to_be_bytes());
    header
}

/// Prefix an Avro body with the header for `schema_id`
pub fn frame(schema_id: SchemaId, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&encode_header(schema_id));
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header_big_endian() {
        let payload = [0x00, 0x00, 0x01, 0x02, 0x03, 0xAA, 0xBB];
        let (id, body) = parse_header(&payload).unwrap();
        assert_eq!(id, SchemaId::new(0x0001_0203));
        assert_eq!(body, &[0xAA, 0xBB]);
    }

    #[test]
    fn test_parse_header_ignores_magic() {
        let payload = [0x7F, 0x00, 0x00, 0x00, 0x09];
        let (id, body) = parse_header(&payload).unwrap();
        assert_eq!(id, SchemaId::new(9));
        assert!(body.is_empty());
    }

    #[test]
    fn test_short_buffers_rejected() {
        for len in 0..HEADER_LEN {
            let payload = vec![0u8; len];
            match parse_header(&payload) {
                Err(DecodeError::InputFormat { len: got }) => assert_eq!(got, len),
                other => panic!("expected InputFormat, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_frame_layout() {
        let framed = frame(SchemaId::new(12345), &[1, 2, 3]);
        assert_eq!(framed[0], MAGIC_BYTE);
        assert_eq!(&framed[1..5], &12345u32.to_be_bytes());
        assert_eq!(&framed[5..], &[1, 2, 3]);
    }
}
