//! Serialize messages into the protobuf wire format.
//!
//! Doozer requests and responses are proto2 messages; every field is
//! optional, and absent fields are simply not emitted. Only two wire types
//! appear in the protocol: varints (ints and enums) and length-delimited
//! fields (strings and bytes).

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Result;

/// Protobuf wire type for varint-encoded fields.
pub const WIRE_VARINT: u64 = 0;
/// Protobuf wire type for length-delimited fields.
pub const WIRE_LEN_DELIMITED: u64 = 2;

/// A message that can be rendered into the protobuf wire format.
pub trait ToWire {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()>;

    /// Serialize with the 4-byte big-endian length prefix used on the TCP
    /// stream: `[u32 length] [message bytes]`.
    fn to_packet(&self) -> Result<Bytes> {
        let mut body = BytesMut::new();
        self.encode(&mut body)?;
        let mut packet = BytesMut::with_capacity(4 + body.len());
        packet.put_u32(body.len() as u32);
        packet.extend_from_slice(&body);
        Ok(packet.freeze())
    }
}

/// Encode an unsigned base-128 varint to the buffer.
pub fn put_uvarint<B: BufMut>(buffer: &mut B, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buffer.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

/// Encode a varint-typed field (int32, int64 or enum) with its key.
///
/// Negative values are sign-extended to 64 bits first, matching proto2
/// `int32`/`int64` encoding.
pub fn put_varint_field<B: BufMut>(buffer: &mut B, field: u32, value: i64) {
    put_uvarint(buffer, ((field as u64) << 3) | WIRE_VARINT);
    put_uvarint(buffer, value as u64);
}

/// Encode a length-delimited field (string or bytes) with its key.
pub fn put_bytes_field<B: BufMut>(buffer: &mut B, field: u32, data: &[u8]) {
    put_uvarint(buffer, ((field as u64) << 3) | WIRE_LEN_DELIMITED);
    put_uvarint(buffer, data.len() as u64);
    buffer.put_slice(data);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uvarint_bytes(value: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        put_uvarint(&mut buf, value);
        buf
    }

    #[test]
    fn uvarint_single_byte() {
        assert_eq!(uvarint_bytes(0), vec![0x00]);
        assert_eq!(uvarint_bytes(1), vec![0x01]);
        assert_eq!(uvarint_bytes(127), vec![0x7F]);
    }

    #[test]
    fn uvarint_multi_byte() {
        // Reference vectors from the protobuf encoding documentation.
        assert_eq!(uvarint_bytes(128), vec![0x80, 0x01]);
        assert_eq!(uvarint_bytes(300), vec![0xAC, 0x02]);
        assert_eq!(uvarint_bytes(u64::MAX).len(), 10);
    }

    #[test]
    fn varint_field_sign_extends() {
        let mut buf = Vec::new();
        put_varint_field(&mut buf, 1, -1);
        // key 0x08, then ten bytes of sign-extended -1
        assert_eq!(buf[0], 0x08);
        assert_eq!(buf.len(), 11);
        assert_eq!(buf[buf.len() - 1], 0x01);
    }

    #[test]
    fn bytes_field_layout() {
        let mut buf = Vec::new();
        put_bytes_field(&mut buf, 4, b"/a");
        // key (4 << 3) | 2 = 0x22, length 2, then the bytes
        assert_eq!(buf, vec![0x22, 0x02, b'/', b'a']);
    }
}
